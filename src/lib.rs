//! Resource cache and adaptive preload engine for localized text bundles.

pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod i18n;
pub mod retry;
pub mod store;

mod sync;
