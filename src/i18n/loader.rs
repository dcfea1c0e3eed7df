//! Resource loading: cache lookup, deduplicated fetches, retries, assembly.
//!
//! Each `(language, namespace)` fetch runs as its own spawned task. Callers
//! that ask for the same resource while it is in flight await the same shared
//! result, and a caller that gives up waiting does not cancel the fetch: the
//! task still publishes into the cache when it settles. [`ResourceLoader::shutdown`]
//! aborts whatever is still running and stops anything from publishing.

use crate::config::Config;
use crate::error::ResourceError;
use crate::fetch::Fetcher;
use crate::i18n::bundle::{LanguageBundle, ResourceBundle, ResourceKey};
use crate::i18n::cache::CacheStore;
use crate::i18n::fallback::FallbackResolver;
use crate::i18n::integrity::{IntegrityChecker, IntegrityReport};
use crate::i18n::metrics::{EventKind, MetricsCollector};
use crate::retry::{with_retry_if, RetryConfig};
use crate::sync::lock;
use futures::future::{join_all, ready, BoxFuture, Shared};
use futures::{stream, FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

type NamespaceResult = Result<Arc<ResourceBundle>, ResourceError>;
type InFlight = Shared<BoxFuture<'static, NamespaceResult>>;

struct PendingFetch {
    result: InFlight,
    task: AbortHandle,
}

/// Everything a spawned fetch task needs, cheap to clone into it.
#[derive(Clone)]
struct FetchContext {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<CacheStore>,
    resolver: Arc<FallbackResolver>,
    metrics: Arc<MetricsCollector>,
    retry: RetryConfig,
    in_flight: Arc<Mutex<HashMap<ResourceKey, PendingFetch>>>,
    // Cache and mirror are updated together under this lock.
    publish: Arc<Mutex<()>>,
    // Set under `publish`; nothing is published once it is true.
    closed: Arc<AtomicBool>,
}

impl FetchContext {
    async fn fetch_and_publish(self, key: ResourceKey) -> NamespaceResult {
        let started = Instant::now();
        let result = self.fetch_parsed(&key).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(bundle) => {
                self.publish(&key, Arc::clone(bundle));
                debug!("Loaded {} in {:?}", key, elapsed);
            }
            Err(e @ ResourceError::Malformed { .. }) => {
                warn!("Rejected malformed resource {}: {}", key, e);
            }
            Err(e) => debug!("Failed to load {}: {}", key, e),
        }
        self.metrics
            .record(EventKind::Load, &key.language, elapsed, result.is_ok());

        lock(&self.in_flight).remove(&key);
        result
    }

    async fn fetch_parsed(&self, key: &ResourceKey) -> NamespaceResult {
        let operation = format!("fetch {}", key);
        let bytes = with_retry_if(
            &self.retry,
            &operation,
            || {
                let pending = self.fetcher.fetch(&key.language, &key.namespace);
                async move {
                    pending
                        .await
                        .map_err(|e| e.into_resource_error(&key.language, &key.namespace))
                }
            },
            ResourceError::is_retryable,
        )
        .await?;

        let bundle =
            ResourceBundle::from_slice(&bytes).map_err(|message| ResourceError::Malformed {
                language: key.language.clone(),
                namespace: key.namespace.clone(),
                message,
            })?;
        Ok(Arc::new(bundle))
    }

    fn publish(&self, key: &ResourceKey, bundle: Arc<ResourceBundle>) {
        let _guard = lock(&self.publish);
        if self.closed.load(Ordering::SeqCst) {
            debug!("Dropping {}: loader is shut down", key);
            return;
        }
        if !self.cache.set(key.clone(), Arc::clone(&bundle)) {
            debug!("{} served uncached", key);
        }
        self.resolver.mirror(key, bundle);
    }
}

pub struct ResourceLoader {
    ctx: FetchContext,
    integrity: Arc<IntegrityChecker>,
    namespaces: Vec<String>,
    reference_language: String,
    max_concurrent_loads: usize,
}

impl ResourceLoader {
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<CacheStore>,
        resolver: Arc<FallbackResolver>,
        metrics: Arc<MetricsCollector>,
        integrity: Arc<IntegrityChecker>,
    ) -> Self {
        Self {
            ctx: FetchContext {
                fetcher,
                cache,
                resolver,
                metrics,
                retry: RetryConfig::namespace_fetch(config),
                in_flight: Arc::new(Mutex::new(HashMap::new())),
                publish: Arc::new(Mutex::new(())),
                closed: Arc::new(AtomicBool::new(false)),
            },
            integrity,
            namespaces: config.namespaces.clone(),
            reference_language: config.reference_language.clone(),
            max_concurrent_loads: config.max_concurrent_loads.max(1),
        }
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Load every configured namespace of `language`, from cache when possible.
    ///
    /// A namespace that fails is replaced by empty content and listed in
    /// [`LanguageBundle::failed_namespaces`]. The load only fails when no
    /// namespace could be loaded at all.
    pub async fn load(&self, language: &str) -> Result<Arc<LanguageBundle>, ResourceError> {
        let results = join_all(
            self.namespaces
                .iter()
                .map(|namespace| self.load_namespace(language, namespace)),
        )
        .await;
        self.assemble(language, results)
    }

    /// Load one namespace, from cache when possible.
    pub async fn load_namespace(&self, language: &str, namespace: &str) -> NamespaceResult {
        let key = ResourceKey::new(language, namespace);
        if let Some(bundle) = self.ctx.cache.get(&key) {
            self.ctx.metrics.record_cache_hit(language);
            return Ok(bundle);
        }
        self.ctx.metrics.record_cache_miss(language);
        self.fetch_shared(key, true).await
    }

    /// Fetch every namespace of `language` again, ignoring cached content.
    ///
    /// Cached entries are replaced only by successful fetches, so a failed
    /// reload leaves the previous content in place.
    pub async fn reload(&self, language: &str) -> Result<Arc<LanguageBundle>, ResourceError> {
        info!("Reloading resources for {}", language);
        let results = join_all(
            self.namespaces
                .iter()
                .map(|namespace| self.fetch_shared(ResourceKey::new(language, namespace), false)),
        )
        .await;

        self.integrity.invalidate(language);
        if language == self.reference_language {
            for (namespace, result) in self.namespaces.iter().zip(&results) {
                if let Ok(bundle) = result {
                    self.integrity.set_reference(language, namespace, bundle);
                }
            }
        }

        self.assemble(language, results)
    }

    /// Load several languages, at most `max_concurrent_loads` at a time.
    pub async fn preload_many(
        &self,
        languages: &[String],
    ) -> Vec<(String, Result<Arc<LanguageBundle>, ResourceError>)> {
        stream::iter(languages.iter().cloned())
            .map(|language| async move {
                let result = self.load(&language).await;
                (language, result)
            })
            .buffered(self.max_concurrent_loads)
            .collect()
            .await
    }

    /// Every configured namespace of `language` is cached and fresh.
    pub fn is_cached(&self, language: &str) -> bool {
        self.namespaces
            .iter()
            .all(|namespace| self.ctx.cache.has(&ResourceKey::new(language, namespace)))
    }

    /// Some namespace of `language` is being fetched right now.
    pub fn is_loading(&self, language: &str) -> bool {
        lock(&self.ctx.in_flight)
            .keys()
            .any(|key| key.language == language)
    }

    /// Use `language` as the reference key set for every namespace.
    ///
    /// Returns the number of namespaces established; fails only when none
    /// could be loaded.
    pub async fn establish_reference(&self, language: &str) -> Result<usize, ResourceError> {
        let mut established = 0;
        let mut first_error = None;
        for namespace in &self.namespaces {
            match self.load_namespace(language, namespace).await {
                Ok(bundle) => {
                    self.integrity.set_reference(language, namespace, &bundle);
                    established += 1;
                }
                Err(e) => {
                    warn!(
                        "Could not establish reference keys for {}/{}: {}",
                        language, namespace, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if established == 0 => Err(e),
            _ => Ok(established),
        }
    }

    /// Diff one namespace of `language` against the reference key set.
    ///
    /// The reference is established on first use. Reports are reused for five
    /// minutes unless the language is reloaded.
    pub async fn check_integrity(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<IntegrityReport, ResourceError> {
        if let Some(report) = self.integrity.cached(language, namespace) {
            return Ok(report);
        }

        if !self.integrity.has_reference(namespace) {
            let reference = self
                .load_namespace(&self.reference_language, namespace)
                .await?;
            self.integrity
                .set_reference(&self.reference_language, namespace, &reference);
        }

        let bundle = self.load_namespace(language, namespace).await?;
        let report = self
            .integrity
            .check(language, namespace, &bundle)
            .ok_or_else(|| ResourceError::NotFound {
                language: self.reference_language.clone(),
                namespace: namespace.to_string(),
            })?;

        if !report.is_complete {
            info!(
                "{}/{} is missing {} of {} keys",
                language,
                namespace,
                report.missing_keys.len(),
                report.reference_keys
            );
        }
        Ok(report)
    }

    /// Abort every in-flight fetch and refuse new ones. Fetches that already
    /// finished their transfer are not published.
    pub fn shutdown(&self) {
        {
            let _guard = lock(&self.ctx.publish);
            self.ctx.closed.store(true, Ordering::SeqCst);
        }
        let pending: Vec<PendingFetch> = lock(&self.ctx.in_flight)
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        if !pending.is_empty() {
            info!("Aborting {} in-flight resource fetches", pending.len());
        }
        for fetch in pending {
            fetch.task.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.ctx.closed.load(Ordering::SeqCst)
    }

    /// Join the in-flight fetch of `key` or start one.
    ///
    /// With `reuse_cached`, a fresh cache entry found under the in-flight lock
    /// is returned instead; it covers a fetch that published between the
    /// caller's cache miss and this call.
    fn fetch_shared(&self, key: ResourceKey, reuse_cached: bool) -> InFlight {
        if self.is_shut_down() {
            return ready(Err(ResourceError::ShutDown)).boxed().shared();
        }

        let mut in_flight = lock(&self.ctx.in_flight);
        if let Some(pending) = in_flight.get(&key) {
            debug!("Joining in-flight load of {}", key);
            return pending.result.clone();
        }
        if reuse_cached {
            if let Some(bundle) = self.ctx.cache.peek(&key) {
                debug!("{} was published while waiting", key);
                return ready(Ok(bundle)).boxed().shared();
            }
        }

        let ctx = self.ctx.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(ctx.fetch_and_publish(task_key));
        let task = handle.abort_handle();

        let (language, namespace) = (key.language.clone(), key.namespace.clone());
        let pending = async move {
            handle.await.unwrap_or_else(|e| {
                Err(ResourceError::LoadFailed {
                    language,
                    namespace,
                    message: format!("load task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared();

        in_flight.insert(
            key,
            PendingFetch {
                result: pending.clone(),
                task,
            },
        );
        pending
    }

    fn assemble(
        &self,
        language: &str,
        results: Vec<NamespaceResult>,
    ) -> Result<Arc<LanguageBundle>, ResourceError> {
        let mut bundle = LanguageBundle::new(language);
        let mut first_error = None;

        for (namespace, result) in self.namespaces.iter().zip(results) {
            match result {
                Ok(content) => {
                    bundle.namespaces.insert(namespace.clone(), content);
                }
                Err(e) => {
                    warn!(
                        "Namespace {}/{} unavailable, using empty content: {}",
                        language, namespace, e
                    );
                    bundle
                        .namespaces
                        .insert(namespace.clone(), Arc::new(ResourceBundle::empty()));
                    bundle.failed_namespaces.push(namespace.clone());
                    first_error.get_or_insert(e);
                }
            }
        }

        if bundle.failed_namespaces.len() == self.namespaces.len() {
            if let Some(source) = first_error {
                return Err(ResourceError::LanguageSwitchFailed {
                    language: language.to_string(),
                    source: Box::new(source),
                });
            }
        }

        Ok(Arc::new(bundle))
    }
}
