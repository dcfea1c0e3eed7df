//! Localized resource loading, caching and preloading.
//!
//! Resources are JSON documents addressed by language and namespace. This
//! module loads them, keeps them in a bounded cache, resolves keys that are
//! missing from the active language and warms the cache for languages the
//! user is likely to switch to next.
//!
//! # Architecture
//!
//! - `bundle`: Resource trees and per-language assemblies
//! - `cache`: Count- and memory-bounded cache with LRU eviction and TTL expiry
//! - `loader`: Deduplicated, retried fetches and bundle assembly
//! - `fallback`: Missing-key resolution chain and diagnostics
//! - `integrity`: Key-set diffs against the reference language
//! - `preload`: Strategy scoring and background preloading
//! - `metrics`: Performance events, aggregates and recommendations
//! - `registry`: Supported languages and their metadata
//! - `environment`: Host locale, network and memory hints
//! - `manager`: The public API composing all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! use locale_resources::{config::Config, fetch::DirectoryFetcher};
//! use locale_resources::i18n::{ResolveOptions, ResourceManager};
//!
//! let manager = ResourceManager::builder(Config::default(), Arc::new(DirectoryFetcher::new("locales")))
//!     .build();
//! manager.initialize().await?;
//!
//! let label = manager.translate("common.save", &ResolveOptions::default());
//! manager.spawn_preload(&manager.registry().enabled_codes(), None)?;
//! ```

mod bundle;
mod cache;
mod environment;
mod fallback;
mod integrity;
mod loader;
mod manager;
mod metrics;
mod preload;
mod registry;

pub use bundle::{LanguageBundle, ResourceBundle, ResourceKey};
pub use cache::{CacheEntry, CacheStats, CacheStore};
pub use environment::{EnvironmentProbe, MemoryHint, NetworkHint, StaticProbe, SystemProbe};
pub use fallback::{FallbackResolver, MissingKeyRecord, MissingKeyStats, ResolveOptions};
pub use integrity::{IntegrityChecker, IntegrityReport, REPORT_TTL};
pub use loader::ResourceLoader;
pub use manager::{ResourceManager, ResourceManagerBuilder, ResourceVersion, UpdateReport};
pub use metrics::{EventKind, LanguageMetrics, MetricsCollector, MetricsReport, PerformanceEvent};
pub use preload::{
    default_strategies, PreloadCandidate, PreloadContext, PreloadResult, PreloadScheduler,
    PreloadStrategy, StrategyPredicate, RECENT_CAPACITY,
};
pub use registry::{LanguageConfig, LanguageRegistry};
