//! Error types for resource loading and persistence.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the resource layer.
///
/// A missing translation key is deliberately absent from this enum: it is
/// resolved through the fallback chain and only recorded for diagnostics.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// Transient failure (network, timeout, server error). Retried.
    #[error("failed to load {language}/{namespace}: {message}")]
    LoadFailed {
        language: String,
        namespace: String,
        message: String,
    },

    /// The resource does not exist. Never retried.
    #[error("resource not found: {language}/{namespace}")]
    NotFound { language: String, namespace: String },

    /// The resource exists but could not be parsed. Never retried.
    #[error("malformed resource {language}/{namespace}: {message}")]
    Malformed {
        language: String,
        namespace: String,
        message: String,
    },

    /// A whole language could not be loaded.
    #[error("failed to switch to language '{language}': {source}")]
    LanguageSwitchFailed {
        language: String,
        #[source]
        source: Box<ResourceError>,
    },

    #[error("unsupported language: '{0}'")]
    UnsupportedLanguage(String),

    #[error("hot reload is disabled")]
    HotReloadDisabled,

    #[error("loading '{language}' exceeded the {budget:?} budget")]
    LoadTimeout { language: String, budget: Duration },

    #[error("resource manager has been shut down")]
    ShutDown,
}

impl ResourceError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResourceError::LoadFailed { .. })
    }

    /// Whether the failure is permanent for the requested resource.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ResourceError::NotFound { .. } | ResourceError::Malformed { .. }
        )
    }
}

/// Errors reported by a [`crate::fetch::Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    #[error("parse error: {0}")]
    Malformed(String),

    #[error("transient error: {0}")]
    Transient(String),
}

impl FetchError {
    /// Attach the resource coordinates to a transport error.
    pub fn into_resource_error(self, language: &str, namespace: &str) -> ResourceError {
        match self {
            FetchError::NotFound => ResourceError::NotFound {
                language: language.to_string(),
                namespace: namespace.to_string(),
            },
            FetchError::Malformed(message) => ResourceError::Malformed {
                language: language.to_string(),
                namespace: namespace.to_string(),
                message,
            },
            FetchError::Transient(message) => ResourceError::LoadFailed {
                language: language.to_string(),
                namespace: namespace.to_string(),
                message,
            },
        }
    }
}

/// Errors reported by a [`crate::store::PersistentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_load_failed_is_retryable() {
        let transient = FetchError::Transient("timeout".into()).into_resource_error("en", "common");
        let missing = FetchError::NotFound.into_resource_error("en", "common");
        let malformed = FetchError::Malformed("eof".into()).into_resource_error("en", "common");

        assert!(transient.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!malformed.is_retryable());
        assert!(missing.is_permanent());
        assert!(malformed.is_permanent());
        assert!(!transient.is_permanent());
    }

    #[test]
    fn test_error_messages_carry_coordinates() {
        let err = FetchError::NotFound.into_resource_error("fr", "menu");
        assert_eq!(err.to_string(), "resource not found: fr/menu");

        let switch = ResourceError::LanguageSwitchFailed {
            language: "fr".into(),
            source: Box::new(err),
        };
        assert!(switch.to_string().contains("'fr'"));
        assert!(switch.to_string().contains("fr/menu"));
    }
}
