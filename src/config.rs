use anyhow::{ensure, Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Tuning knobs for the resource cache, loader, fallback chain and preloader.
#[derive(Debug, Clone)]
pub struct Config {
    // Cache
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub ttl: Duration,

    // Retry
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,

    // Preload
    pub max_concurrent_loads: usize,
    pub preload_debounce: Duration,
    /// Languages that are commonly switched between (e.g. simplified and
    /// traditional Chinese). Pairs are symmetric.
    pub language_pairs: Vec<(String, String)>,

    // Languages and namespaces
    pub languages: Vec<String>,
    /// Supported languages that are listed but neither loaded nor preloaded.
    pub disabled_languages: Vec<String>,
    pub namespaces: Vec<String>,
    pub default_language: String,
    /// Language whose key set every other language is diffed against.
    pub reference_language: String,

    // Fallback
    pub fallback_language_order: Vec<String>,
    /// Development mode: tag cross-language fallbacks with their source.
    pub annotate_fallbacks: bool,
    /// Turn `common.saveButton` into `Save Button` before giving up.
    pub derive_labels: bool,
    pub missing_key_prefix: String,
    pub missing_key_suffix: String,

    // Features
    pub enable_integrity_check: bool,
    pub enable_hot_reload: bool,

    // Metrics
    pub metrics_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 50,
            max_memory_bytes: 10 * 1024 * 1024,
            ttl: Duration::from_secs(30 * 60),

            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(10),

            max_concurrent_loads: 2,
            preload_debounce: Duration::from_secs(2),
            language_pairs: vec![("zh-CN".to_string(), "zh-TW".to_string())],

            languages: ["en", "zh-CN", "zh-TW", "ja", "ko", "fr", "de", "es", "ru", "pt-BR"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            disabled_languages: Vec::new(),
            namespaces: vec!["common".to_string()],
            default_language: "en".to_string(),
            reference_language: "en".to_string(),

            fallback_language_order: vec!["en".to_string()],
            annotate_fallbacks: false,
            derive_labels: false,
            missing_key_prefix: "[".to_string(),
            missing_key_suffix: "]".to_string(),

            enable_integrity_check: true,
            enable_hot_reload: false,

            metrics_capacity: 1000,
        }
    }
}

impl Config {
    /// Build a configuration from `I18N_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            max_entries: env_parse("I18N_MAX_ENTRIES")?.unwrap_or(defaults.max_entries),
            max_memory_bytes: env_parse("I18N_MAX_MEMORY_BYTES")?
                .unwrap_or(defaults.max_memory_bytes),
            ttl: env_millis("I18N_TTL_MS")?.unwrap_or(defaults.ttl),

            max_retries: env_parse("I18N_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            retry_delay: env_millis("I18N_RETRY_DELAY_MS")?.unwrap_or(defaults.retry_delay),
            backoff_multiplier: env_parse("I18N_BACKOFF_MULTIPLIER")?
                .unwrap_or(defaults.backoff_multiplier),
            max_retry_delay: env_millis("I18N_MAX_RETRY_DELAY_MS")?
                .unwrap_or(defaults.max_retry_delay),

            max_concurrent_loads: env_parse("I18N_MAX_CONCURRENT_LOADS")?
                .unwrap_or(defaults.max_concurrent_loads),
            preload_debounce: env_millis("I18N_PRELOAD_DEBOUNCE_MS")?
                .unwrap_or(defaults.preload_debounce),
            language_pairs: match env_string("I18N_LANGUAGE_PAIRS") {
                Some(raw) => parse_pairs(&raw)?,
                None => defaults.language_pairs,
            },

            languages: env_list("I18N_LANGUAGES").unwrap_or(defaults.languages),
            disabled_languages: env_list("I18N_DISABLED_LANGUAGES")
                .unwrap_or(defaults.disabled_languages),
            namespaces: env_list("I18N_NAMESPACES").unwrap_or(defaults.namespaces),
            default_language: env_string("I18N_DEFAULT_LANGUAGE")
                .unwrap_or(defaults.default_language),
            reference_language: env_string("I18N_REFERENCE_LANGUAGE")
                .unwrap_or(defaults.reference_language),

            fallback_language_order: env_list("I18N_FALLBACK_LANGUAGES")
                .unwrap_or(defaults.fallback_language_order),
            annotate_fallbacks: env_parse("I18N_ANNOTATE_FALLBACKS")?
                .unwrap_or(defaults.annotate_fallbacks),
            derive_labels: env_parse("I18N_DERIVE_LABELS")?.unwrap_or(defaults.derive_labels),
            missing_key_prefix: env_string("I18N_MISSING_KEY_PREFIX")
                .unwrap_or(defaults.missing_key_prefix),
            missing_key_suffix: env_string("I18N_MISSING_KEY_SUFFIX")
                .unwrap_or(defaults.missing_key_suffix),

            enable_integrity_check: env_parse("I18N_ENABLE_INTEGRITY_CHECK")?
                .unwrap_or(defaults.enable_integrity_check),
            enable_hot_reload: env_parse("I18N_ENABLE_HOT_RELOAD")?
                .unwrap_or(defaults.enable_hot_reload),

            metrics_capacity: env_parse("I18N_METRICS_CAPACITY")?
                .unwrap_or(defaults.metrics_capacity),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the cache or scheduler unusable.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_entries > 0, "max_entries must be at least 1");
        ensure!(self.max_memory_bytes > 0, "max_memory_bytes must be at least 1");
        ensure!(
            self.max_concurrent_loads > 0,
            "max_concurrent_loads must be at least 1"
        );
        ensure!(
            self.backoff_multiplier >= 1.0,
            "backoff_multiplier must be >= 1.0, got {}",
            self.backoff_multiplier
        );
        ensure!(!self.namespaces.is_empty(), "at least one namespace is required");
        ensure!(
            self.metrics_capacity > 0,
            "metrics_capacity must be at least 1"
        );
        ensure!(
            self.languages.contains(&self.default_language),
            "default language '{}' is not in the supported set",
            self.default_language
        );
        ensure!(
            !self.disabled_languages.contains(&self.default_language),
            "default language '{}' is disabled",
            self.default_language
        );
        ensure!(
            self.languages.contains(&self.reference_language),
            "reference language '{}' is not in the supported set",
            self.reference_language
        );
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_string(name)
        .map(|raw| raw.parse::<T>().with_context(|| format!("{} is invalid: {:?}", name, raw)))
        .transpose()
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env_string(name).map(|raw| split_list(&raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `a:b,c:d` into symmetric language pairs.
fn parse_pairs(raw: &str) -> Result<Vec<(String, String)>> {
    split_list(raw)
        .into_iter()
        .map(|pair| {
            let (a, b) = pair
                .split_once(':')
                .with_context(|| format!("Invalid language pair: {}. Expected a:b", pair))?;
            Ok((a.trim().to_string(), b.trim().to_string()))
        })
        .collect()
}
