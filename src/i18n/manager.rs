//! The public face of the resource layer.
//!
//! [`ResourceManager`] owns every component (cache, loader, resolver,
//! scheduler, metrics and integrity checker) and keeps the active language.
//! Hosts build one per process and share it behind an `Arc`.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::ResourceError;
use crate::fetch::Fetcher;
use crate::i18n::bundle::LanguageBundle;
use crate::i18n::cache::{CacheStats, CacheStore};
use crate::i18n::environment::{EnvironmentProbe, SystemProbe};
use crate::i18n::fallback::{FallbackResolver, MissingKeyRecord, MissingKeyStats, ResolveOptions};
use crate::i18n::integrity::{IntegrityChecker, IntegrityReport};
use crate::i18n::loader::ResourceLoader;
use crate::i18n::metrics::{EventKind, MetricsCollector, MetricsReport};
use crate::i18n::preload::{PreloadResult, PreloadScheduler};
use crate::i18n::registry::LanguageRegistry;
use crate::store::{
    load_json, save_json, MemoryStore, PersistentStore, PREFERRED_LANGUAGE_KEY, VERSIONS_KEY,
};
use crate::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Content version of one language, bumped whenever its checksum changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub language: String,
    pub version: u64,
    /// Hex SHA-256 of the assembled bundle
    pub checksum: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of [`ResourceManager::update_language`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub language: String,
    pub previous: Option<ResourceVersion>,
    /// `None` when the refetch was partial and no version was recorded
    pub current: Option<ResourceVersion>,
    pub changed: bool,
}

#[derive(Debug, Clone)]
struct ActiveLanguage {
    language: String,
    bundle: Arc<LanguageBundle>,
}

pub struct ResourceManagerBuilder {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    store: Option<Arc<dyn PersistentStore>>,
    clock: Option<Arc<dyn Clock>>,
    probe: Option<Arc<dyn EnvironmentProbe>>,
}

impl ResourceManagerBuilder {
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn EnvironmentProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn build(self) -> ResourceManager {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(SystemProbe::new()));

        let registry = Arc::new(LanguageRegistry::from_config(&config));
        let cache = Arc::new(CacheStore::from_config(&config, clock.clone()));
        let resolver = Arc::new(FallbackResolver::new(&config, clock.clone()));
        let metrics = Arc::new(MetricsCollector::new(config.metrics_capacity, clock.clone()));
        let integrity = Arc::new(IntegrityChecker::new(clock.clone()));
        let loader = Arc::new(ResourceLoader::new(
            &config,
            self.fetcher,
            cache.clone(),
            resolver.clone(),
            metrics.clone(),
            integrity.clone(),
        ));
        let scheduler = Arc::new(PreloadScheduler::new(
            &config,
            loader.clone(),
            metrics.clone(),
            store.clone(),
            probe.clone(),
            registry.clone(),
        ));

        ResourceManager {
            config,
            clock,
            store,
            probe,
            registry,
            cache,
            resolver,
            metrics,
            integrity,
            loader,
            scheduler,
            active: RwLock::new(None),
            versions: Mutex::new(BTreeMap::new()),
            background: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }
    }
}

pub struct ResourceManager {
    config: Config,
    clock: Arc<dyn Clock>,
    store: Arc<dyn PersistentStore>,
    probe: Arc<dyn EnvironmentProbe>,
    registry: Arc<LanguageRegistry>,
    cache: Arc<CacheStore>,
    resolver: Arc<FallbackResolver>,
    metrics: Arc<MetricsCollector>,
    integrity: Arc<IntegrityChecker>,
    loader: Arc<ResourceLoader>,
    scheduler: Arc<PreloadScheduler>,
    active: RwLock<Option<ActiveLanguage>>,
    versions: Mutex<BTreeMap<String, ResourceVersion>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl ResourceManager {
    pub fn builder(config: Config, fetcher: Arc<dyn Fetcher>) -> ResourceManagerBuilder {
        ResourceManagerBuilder {
            config,
            fetcher,
            store: None,
            clock: None,
            probe: None,
        }
    }

    /// Restore persisted state and activate the first loadable language out
    /// of the stored preference, the system locale and the default language.
    pub async fn initialize(&self) -> Result<Arc<LanguageBundle>, ResourceError> {
        self.ensure_alive()?;
        self.scheduler.restore();
        self.restore_versions();

        if self.config.enable_integrity_check {
            match self
                .loader
                .establish_reference(&self.config.reference_language)
                .await
            {
                Ok(count) => debug!("Established reference keys for {} namespace(s)", count),
                Err(e) => warn!("Integrity reference unavailable: {}", e),
            }
        }

        let mut candidates: Vec<String> = Vec::new();
        let preferred = self.store.get(PREFERRED_LANGUAGE_KEY);
        let system = self
            .probe
            .system_locale()
            .and_then(|locale| self.registry.match_locale(&locale))
            .map(|lang| lang.code.clone());
        for language in preferred
            .into_iter()
            .chain(system)
            .chain(Some(self.config.default_language.clone()))
        {
            if self.registry.is_enabled(&language) && !candidates.contains(&language) {
                candidates.push(language);
            }
        }

        let mut last_error = ResourceError::UnsupportedLanguage(self.config.default_language.clone());
        for language in candidates {
            match self.switch_to(&language, false).await {
                Ok(bundle) => {
                    info!("Initialized resources with language {}", language);
                    return Ok(bundle);
                }
                Err(e) => {
                    warn!("Initial language {} unavailable: {}", language, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Switch the active language. On failure the previous language and
    /// bundle stay active.
    pub async fn load_language(&self, language: &str) -> Result<Arc<LanguageBundle>, ResourceError> {
        self.ensure_alive()?;
        self.ensure_supported(language)?;
        self.switch_to(language, true).await
    }

    /// [`Self::load_language`] with a time budget.
    ///
    /// On timeout the fetches keep running and still populate the cache, but
    /// the active language is not switched.
    pub async fn load_language_within(
        &self,
        language: &str,
        budget: Duration,
    ) -> Result<Arc<LanguageBundle>, ResourceError> {
        match tokio::time::timeout(budget, self.load_language(language)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Loading {} exceeded {:?}", language, budget);
                Err(ResourceError::LoadTimeout {
                    language: language.to_string(),
                    budget,
                })
            }
        }
    }

    async fn switch_to(
        &self,
        language: &str,
        user_initiated: bool,
    ) -> Result<Arc<LanguageBundle>, ResourceError> {
        let started = Instant::now();
        let result = self.loader.load(language).await;
        self.metrics
            .record(EventKind::Switch, language, started.elapsed(), result.is_ok());

        let bundle = match result {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("Failed to switch to {}: {}", language, e);
                return Err(e);
            }
        };

        *write(&self.active) = Some(ActiveLanguage {
            language: language.to_string(),
            bundle: Arc::clone(&bundle),
        });
        self.track_version(language, &bundle);

        if user_initiated {
            if let Err(e) = self.store.set(PREFERRED_LANGUAGE_KEY, language) {
                warn!("Failed to persist preferred language: {}", e);
            }
            self.scheduler.record_usage(language);
        }

        info!("Active language is now {}", language);
        Ok(bundle)
    }

    /// Rank and load likely next languages, waiting for the result.
    ///
    /// `current` defaults to the active language.
    pub async fn smart_preload(
        &self,
        available: &[String],
        current: Option<&str>,
    ) -> Result<Vec<PreloadResult>, ResourceError> {
        self.ensure_alive()?;
        let available = self.supported_only(available);
        let current = current
            .map(str::to_string)
            .or_else(|| self.current_language());
        Ok(self.scheduler.schedule(&available, current.as_deref()).await)
    }

    /// [`Self::smart_preload`] as a background task, aborted by [`Self::destroy`].
    pub fn spawn_preload(
        &self,
        available: &[String],
        current: Option<&str>,
    ) -> Result<(), ResourceError> {
        self.ensure_alive()?;
        let available = self.supported_only(available);
        let current = current
            .map(str::to_string)
            .or_else(|| self.current_language());
        let scheduler = Arc::clone(&self.scheduler);

        let handle = tokio::spawn(async move {
            let results = scheduler.schedule(&available, current.as_deref()).await;
            let failed = results.iter().filter(|r| !r.success).count();
            debug!(
                "Background preload finished: {} loaded, {} failed",
                results.len() - failed,
                failed
            );
        });

        let mut background = lock(&self.background);
        background.retain(|task| !task.is_finished());
        background.push(handle);
        Ok(())
    }

    pub fn record_usage(&self, language: &str) {
        self.scheduler.record_usage(language);
    }

    /// Integrity reports for `language`, or for every supported language
    /// other than the reference when `None`.
    ///
    /// For a single language the first failure is returned; across all
    /// languages failures are logged and skipped.
    pub async fn check_integrity(
        &self,
        language: Option<&str>,
    ) -> Result<Vec<IntegrityReport>, ResourceError> {
        self.ensure_alive()?;

        let mut reports = Vec::new();
        if let Some(language) = language {
            self.ensure_supported(language)?;
            for namespace in self.loader.namespaces() {
                reports.push(self.loader.check_integrity(language, namespace).await?);
            }
            return Ok(reports);
        }

        let languages: Vec<String> = self
            .registry
            .enabled_codes()
            .into_iter()
            .filter(|code| *code != self.config.reference_language)
            .collect();
        for language in &languages {
            for namespace in self.loader.namespaces() {
                match self.loader.check_integrity(language, namespace).await {
                    Ok(report) => reports.push(report),
                    Err(e) => warn!("Skipping integrity check of {}/{}: {}", language, namespace, e),
                }
            }
        }
        Ok(reports)
    }

    /// Refetch `language` bypassing the cache and record a new version when
    /// its content changed.
    pub async fn update_language(&self, language: &str) -> Result<UpdateReport, ResourceError> {
        self.ensure_alive()?;
        self.ensure_supported(language)?;
        let (report, _) = self.refetch(language).await?;
        Ok(report)
    }

    /// Like [`Self::update_language`], and swap in the new content when
    /// `language` is active. Requires `enable_hot_reload`.
    pub async fn hot_reload(&self, language: &str) -> Result<UpdateReport, ResourceError> {
        self.ensure_alive()?;
        if !self.config.enable_hot_reload {
            return Err(ResourceError::HotReloadDisabled);
        }
        self.ensure_supported(language)?;

        let (report, bundle) = self.refetch(language).await?;
        let mut active = write(&self.active);
        if let Some(active) = active.as_mut().filter(|a| a.language == language) {
            active.bundle = bundle;
            info!("Hot reloaded active language {}", language);
        }
        Ok(report)
    }

    async fn refetch(
        &self,
        language: &str,
    ) -> Result<(UpdateReport, Arc<LanguageBundle>), ResourceError> {
        let previous = self.version(language);
        let bundle = self.loader.reload(language).await?;
        let current = self.track_version(language, &bundle);
        let changed = match (&previous, &current) {
            (Some(previous), Some(current)) => previous.checksum != current.checksum,
            _ => false,
        };
        if changed {
            info!("Resources for {} changed", language);
        }

        let report = UpdateReport {
            language: language.to_string(),
            previous,
            current,
            changed,
        };
        Ok((report, bundle))
    }

    /// Look `key` up in the active bundle, falling back through the resolver.
    ///
    /// Without an explicit namespace the first key segment names it.
    pub fn translate(&self, key: &str, options: &ResolveOptions<'_>) -> String {
        let active = read(&self.active).clone();
        let language = match &active {
            Some(active) => {
                let found = match options.namespace {
                    Some(namespace) => active.bundle.get_in(namespace, key),
                    None => active.bundle.get(key),
                };
                if let Some(value) = found {
                    return value.to_string();
                }
                active.language.as_str()
            }
            None => self.config.default_language.as_str(),
        };
        self.resolver.resolve(key, language, options)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Resource cache cleared");
    }

    /// Abort background work and drop all in-memory state. Persisted state is
    /// left alone. Every later operation fails with [`ResourceError::ShutDown`].
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in lock(&self.background).drain(..) {
            task.abort();
        }
        self.loader.shutdown();
        *write(&self.active) = None;
        self.cache.clear();
        self.resolver.clear_mirror();
        self.resolver.clear_missing_keys();
        self.integrity.clear();
        self.metrics.clear();
        self.scheduler.clear_history();
        lock(&self.versions).clear();
        info!("Resource manager shut down");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // ==================== Accessors ====================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// For registering custom preload strategies.
    pub fn scheduler(&self) -> &PreloadScheduler {
        &self.scheduler
    }

    pub fn current_language(&self) -> Option<String> {
        read(&self.active).as_ref().map(|a| a.language.clone())
    }

    pub fn active_bundle(&self) -> Option<Arc<LanguageBundle>> {
        read(&self.active).as_ref().map(|a| Arc::clone(&a.bundle))
    }

    pub fn is_cached(&self, language: &str) -> bool {
        self.loader.is_cached(language)
    }

    pub fn metrics_report(&self) -> MetricsReport {
        self.metrics.report()
    }

    pub fn recommendations(&self) -> Vec<String> {
        self.metrics.recommendations()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn version(&self, language: &str) -> Option<ResourceVersion> {
        lock(&self.versions).get(language).cloned()
    }

    pub fn missing_keys(&self) -> Vec<MissingKeyRecord> {
        self.resolver.missing_keys()
    }

    pub fn missing_key_stats(&self) -> MissingKeyStats {
        self.resolver.missing_key_stats()
    }

    // ==================== Internals ====================

    fn ensure_alive(&self) -> Result<(), ResourceError> {
        if self.is_destroyed() {
            Err(ResourceError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn ensure_supported(&self, language: &str) -> Result<(), ResourceError> {
        if self.registry.is_enabled(language) {
            Ok(())
        } else {
            Err(ResourceError::UnsupportedLanguage(language.to_string()))
        }
    }

    fn supported_only(&self, languages: &[String]) -> Vec<String> {
        languages
            .iter()
            .filter(|language| self.registry.is_enabled(language))
            .cloned()
            .collect()
    }

    /// Record the checksum of a complete bundle, bumping the version when it
    /// differs from the stored one. Partial bundles are not versioned.
    fn track_version(&self, language: &str, bundle: &LanguageBundle) -> Option<ResourceVersion> {
        if bundle.is_partial() {
            debug!("Not versioning partial bundle for {}", language);
            return self.version(language);
        }

        let checksum = bundle.checksum();
        let mut versions = lock(&self.versions);
        let next = match versions.get(language) {
            Some(existing) if existing.checksum == checksum => return Some(existing.clone()),
            Some(existing) => existing.version + 1,
            None => 1,
        };

        let record = ResourceVersion {
            language: language.to_string(),
            version: next,
            checksum,
            timestamp: self.clock.now(),
        };
        versions.insert(language.to_string(), record.clone());
        if let Err(e) = save_json(self.store.as_ref(), VERSIONS_KEY, &*versions) {
            warn!("Failed to persist resource versions: {}", e);
        }
        Some(record)
    }

    fn restore_versions(&self) {
        if let Some(stored) =
            load_json::<BTreeMap<String, ResourceVersion>>(self.store.as_ref(), VERSIONS_KEY)
        {
            debug!("Restored {} resource version record(s)", stored.len());
            *lock(&self.versions) = stored;
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        for task in lock(&self.background).drain(..) {
            task.abort();
        }
        self.loader.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fetch::MemoryFetcher;
    use crate::i18n::environment::{MemoryHint, NetworkHint, StaticProbe};
    use serde_json::json;

    fn test_config() -> Config {
        Config {
            languages: vec!["en".to_string(), "fr".to_string(), "ja".to_string()],
            retry_delay: Duration::from_millis(1),
            preload_debounce: Duration::ZERO,
            ..Config::default()
        }
    }

    fn manager_with(
        config: Config,
        locale: Option<&str>,
    ) -> (ResourceManager, Arc<MemoryFetcher>, Arc<MemoryStore>) {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert_json("en", "common", &json!({"save": "Save", "cancel": "Cancel"}));
        fetcher.insert_json("fr", "common", &json!({"save": "Enregistrer"}));
        fetcher.insert_json("ja", "common", &json!({"save": "保存", "cancel": "キャンセル"}));
        let store = Arc::new(MemoryStore::new());
        let manager = ResourceManager::builder(config, fetcher.clone())
            .store(store.clone())
            .clock(Arc::new(ManualClock::default()))
            .probe(Arc::new(StaticProbe::new(
                locale,
                NetworkHint::Unknown,
                MemoryHint::Unknown,
            )))
            .build();
        (manager, fetcher, store)
    }

    // ==================== Initialization ====================

    #[tokio::test]
    async fn test_initialize_prefers_stored_language() {
        let (manager, _, store) = manager_with(test_config(), Some("ja-JP"));
        store.set(PREFERRED_LANGUAGE_KEY, "fr").unwrap();

        manager.initialize().await.unwrap();
        assert_eq!(manager.current_language().as_deref(), Some("fr"));
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_system_locale_then_default() {
        let (manager, _, _) = manager_with(test_config(), Some("ja-JP"));
        manager.initialize().await.unwrap();
        assert_eq!(manager.current_language().as_deref(), Some("ja"));

        let (manager, _, _) = manager_with(test_config(), Some("sv-SE"));
        manager.initialize().await.unwrap();
        assert_eq!(manager.current_language().as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_initialize_skips_unloadable_preference() {
        let (manager, fetcher, store) = manager_with(test_config(), None);
        store.set(PREFERRED_LANGUAGE_KEY, "ja").unwrap();
        fetcher.remove("ja", "common");

        manager.initialize().await.unwrap();
        assert_eq!(manager.current_language().as_deref(), Some("en"));
    }

    // ==================== Switching ====================

    #[tokio::test]
    async fn test_load_language_persists_preference_and_usage() {
        let (manager, _, store) = manager_with(test_config(), None);
        manager.load_language("fr").await.unwrap();

        assert_eq!(store.get(PREFERRED_LANGUAGE_KEY).as_deref(), Some("fr"));
        assert_eq!(manager.scheduler().recent_languages(), vec!["fr"]);
        assert_eq!(manager.metrics_report().switch_count, 1);
    }

    #[tokio::test]
    async fn test_unsupported_language_is_rejected() {
        let (manager, fetcher, _) = manager_with(test_config(), None);
        let err = manager.load_language("de").await.unwrap_err();
        assert!(matches!(err, ResourceError::UnsupportedLanguage(code) if code == "de"));
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_language_is_neither_loaded_nor_preloaded() {
        let config = Config {
            disabled_languages: vec!["ja".to_string()],
            ..test_config()
        };
        let (manager, fetcher, _) = manager_with(config, Some("ja_JP.UTF-8"));

        let err = manager.load_language("ja").await.unwrap_err();
        assert!(matches!(err, ResourceError::UnsupportedLanguage(code) if code == "ja"));

        let initial = manager.initialize().await.unwrap();
        assert_eq!(initial.language, "en");
        let results = manager
            .smart_preload(&manager.registry().enabled_codes(), None)
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.language != "ja"));
        assert_eq!(fetcher.calls("ja", "common"), 0);
    }

    #[tokio::test]
    async fn test_translate_uses_active_bundle_then_fallback() {
        let (manager, _, _) = manager_with(test_config(), None);
        manager.load_language("en").await.unwrap();
        manager.load_language("fr").await.unwrap();

        let options = ResolveOptions::default();
        assert_eq!(manager.translate("common.save", &options), "Enregistrer");
        assert_eq!(manager.translate("common.cancel", &options), "Cancel");
        assert_eq!(manager.translate("common.nothing", &options), "[common.nothing]");
        assert_eq!(
            manager.translate("save", &ResolveOptions::default().in_namespace("common")),
            "Enregistrer"
        );
        assert_eq!(manager.missing_keys().len(), 2);
    }

    // ==================== Versions ====================

    #[tokio::test]
    async fn test_update_language_bumps_version_on_change_only() {
        let (manager, fetcher, store) = manager_with(test_config(), None);
        manager.load_language("fr").await.unwrap();
        assert_eq!(manager.version("fr").unwrap().version, 1);

        let unchanged = manager.update_language("fr").await.unwrap();
        assert!(!unchanged.changed);
        assert_eq!(unchanged.current.as_ref().unwrap().version, 1);

        fetcher.insert_json("fr", "common", &json!({"save": "Sauvegarder"}));
        let changed = manager.update_language("fr").await.unwrap();
        assert!(changed.changed);
        assert_eq!(changed.previous.unwrap().version, 1);
        assert_eq!(changed.current.unwrap().version, 2);

        let stored: BTreeMap<String, ResourceVersion> =
            load_json(store.as_ref(), VERSIONS_KEY).unwrap();
        assert_eq!(stored["fr"].version, 2);
    }

    #[tokio::test]
    async fn test_versions_survive_restart() {
        let (manager, _, store) = manager_with(test_config(), None);
        manager.load_language("fr").await.unwrap();
        let checksum = manager.version("fr").unwrap().checksum;

        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert_json("fr", "common", &json!({"save": "Sauvegarder"}));
        fetcher.insert_json("en", "common", &json!({"save": "Save"}));
        let restarted = ResourceManager::builder(test_config(), fetcher)
            .store(store)
            .probe(Arc::new(StaticProbe::default()))
            .build();
        restarted.initialize().await.unwrap();

        assert_eq!(restarted.current_language().as_deref(), Some("fr"));
        let version = restarted.version("fr").unwrap();
        assert_eq!(version.version, 2);
        assert_ne!(version.checksum, checksum);
    }

    #[tokio::test]
    async fn test_hot_reload_requires_flag() {
        let (manager, _, _) = manager_with(test_config(), None);
        let err = manager.hot_reload("en").await.unwrap_err();
        assert!(matches!(err, ResourceError::HotReloadDisabled));
    }

    #[tokio::test]
    async fn test_hot_reload_swaps_active_bundle() {
        let config = Config {
            enable_hot_reload: true,
            ..test_config()
        };
        let (manager, fetcher, _) = manager_with(config, None);
        manager.load_language("fr").await.unwrap();

        fetcher.insert_json("fr", "common", &json!({"save": "Sauvegarder"}));
        let report = manager.hot_reload("fr").await.unwrap();

        assert!(report.changed);
        assert_eq!(
            manager.translate("common.save", &ResolveOptions::default()),
            "Sauvegarder"
        );
    }

    // ==================== Shutdown ====================

    #[tokio::test]
    async fn test_destroy_rejects_later_calls() {
        let (manager, _, _) = manager_with(test_config(), None);
        manager.load_language("en").await.unwrap();
        manager.spawn_preload(&["fr".to_string()], None).unwrap();

        manager.destroy();
        assert!(manager.is_destroyed());
        assert!(manager.current_language().is_none());
        assert_eq!(manager.cache_stats().size, 0);
        assert!(matches!(
            manager.load_language("fr").await,
            Err(ResourceError::ShutDown)
        ));
        assert!(matches!(
            manager.spawn_preload(&[], None),
            Err(ResourceError::ShutDown)
        ));
        manager.destroy();
    }

    #[tokio::test]
    async fn test_destroy_discards_fetch_still_in_flight() {
        let fetcher = Arc::new(MemoryFetcher::new().with_latency(Duration::from_millis(100)));
        fetcher.insert_json("fr", "common", &json!({"save": "Enregistrer"}));
        let manager = ResourceManager::builder(test_config(), fetcher.clone())
            .clock(Arc::new(ManualClock::default()))
            .probe(Arc::new(StaticProbe::new(
                None,
                NetworkHint::Unknown,
                MemoryHint::Unknown,
            )))
            .build();

        let result = manager
            .load_language_within("fr", Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(ResourceError::LoadTimeout { .. })));

        manager.destroy();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.cache_stats().size, 0);
        assert!(manager.active_bundle().is_none());
        assert_eq!(fetcher.calls("fr", "common"), 1);
    }
}
