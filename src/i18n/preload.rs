//! Adaptive preloading.
//!
//! Candidate languages are scored by a set of weighted strategies, each a
//! named predicate over the candidate and a [`PreloadContext`]. Languages that
//! score above zero are loaded in the background, most likely first, with a
//! bounded number of loads in flight.

use crate::config::Config;
use crate::i18n::environment::{EnvironmentProbe, MemoryHint, NetworkHint};
use crate::i18n::loader::ResourceLoader;
use crate::i18n::metrics::{EventKind, MetricsCollector};
use crate::i18n::registry::LanguageRegistry;
use crate::store::{
    load_json, save_json, PersistentStore, PREFERRED_LANGUAGE_KEY, RECENT_LANGUAGES_KEY,
};
use crate::sync::{lock, read, write};
use futures::{stream, StreamExt};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How many recently used languages are remembered.
pub const RECENT_CAPACITY: usize = 5;

/// What the strategies know about the host when ranking.
#[derive(Debug, Clone, Default)]
pub struct PreloadContext {
    pub current_language: Option<String>,
    /// The OS locale mapped to a supported language
    pub system_language: Option<String>,
    /// Most recent first
    pub recent_languages: Vec<String>,
    pub preferred_language: Option<String>,
    pub language_pairs: Vec<(String, String)>,
    pub network: NetworkHint,
    pub memory: MemoryHint,
}

impl PreloadContext {
    /// Whether `language` is paired with the current language.
    pub fn is_paired_with_current(&self, language: &str) -> bool {
        let Some(current) = self.current_language.as_deref() else {
            return false;
        };
        self.language_pairs
            .iter()
            .any(|(a, b)| (a == current && b == language) || (b == current && a == language))
    }
}

pub type StrategyPredicate = Arc<dyn Fn(&str, &PreloadContext) -> bool + Send + Sync>;

/// A named, weighted reason to preload a language.
#[derive(Clone)]
pub struct PreloadStrategy {
    pub name: String,
    pub weight: u32,
    predicate: StrategyPredicate,
}

impl PreloadStrategy {
    pub fn new<F>(name: impl Into<String>, weight: u32, predicate: F) -> Self
    where
        F: Fn(&str, &PreloadContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            weight,
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, language: &str, context: &PreloadContext) -> bool {
        (self.predicate)(language, context)
    }
}

impl fmt::Debug for PreloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadStrategy")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// The built-in strategies, strongest first.
pub fn default_strategies() -> Vec<PreloadStrategy> {
    vec![
        PreloadStrategy::new("system_locale", 10, |language, ctx| {
            ctx.system_language.as_deref() == Some(language)
        }),
        PreloadStrategy::new("recent_use", 9, |language, ctx| {
            ctx.recent_languages.iter().any(|recent| recent == language)
        }),
        PreloadStrategy::new("user_preference", 8, |language, ctx| {
            ctx.preferred_language.as_deref() == Some(language)
        }),
        PreloadStrategy::new("language_pair", 6, |language, ctx| {
            ctx.is_paired_with_current(language)
        }),
        PreloadStrategy::new("favorable_conditions", 3, |_, ctx| {
            ctx.network == NetworkHint::Fast && ctx.memory != MemoryHint::Low
        }),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadCandidate {
    pub language: String,
    pub score: u32,
    pub matched_strategies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadResult {
    pub language: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

pub struct PreloadScheduler {
    loader: Arc<ResourceLoader>,
    metrics: Arc<MetricsCollector>,
    store: Arc<dyn PersistentStore>,
    probe: Arc<dyn EnvironmentProbe>,
    registry: Arc<LanguageRegistry>,
    strategies: RwLock<Vec<PreloadStrategy>>,
    recent: Mutex<VecDeque<String>>,
    language_pairs: Vec<(String, String)>,
    debounce: Duration,
    max_concurrent_loads: usize,
    generation: AtomicU64,
}

impl PreloadScheduler {
    pub fn new(
        config: &Config,
        loader: Arc<ResourceLoader>,
        metrics: Arc<MetricsCollector>,
        store: Arc<dyn PersistentStore>,
        probe: Arc<dyn EnvironmentProbe>,
        registry: Arc<LanguageRegistry>,
    ) -> Self {
        Self {
            loader,
            metrics,
            store,
            probe,
            registry,
            strategies: RwLock::new(default_strategies()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            language_pairs: config.language_pairs.clone(),
            debounce: config.preload_debounce,
            max_concurrent_loads: config.max_concurrent_loads.max(1),
            generation: AtomicU64::new(0),
        }
    }

    /// Add a strategy, replacing any existing one with the same name.
    pub fn register_strategy(&self, strategy: PreloadStrategy) {
        let mut strategies = write(&self.strategies);
        match strategies.iter_mut().find(|s| s.name == strategy.name) {
            Some(existing) => *existing = strategy,
            None => strategies.push(strategy),
        }
    }

    /// `(name, weight)` of every registered strategy.
    pub fn strategies(&self) -> Vec<(String, u32)> {
        read(&self.strategies)
            .iter()
            .map(|s| (s.name.clone(), s.weight))
            .collect()
    }

    /// Snapshot of everything the strategies consult.
    pub fn context(&self, current: Option<&str>) -> PreloadContext {
        let system_language = self
            .probe
            .system_locale()
            .and_then(|locale| self.registry.match_locale(&locale))
            .map(|lang| lang.code.clone());

        PreloadContext {
            current_language: current.map(str::to_string),
            system_language,
            recent_languages: self.recent_languages(),
            preferred_language: self.store.get(PREFERRED_LANGUAGE_KEY),
            language_pairs: self.language_pairs.clone(),
            network: self.probe.network(),
            memory: self.probe.memory(),
        }
    }

    /// Score every language in `available` except `current`.
    ///
    /// Candidates with a zero score are dropped. Equal scores keep the order
    /// of `available`.
    pub fn rank(&self, available: &[String], current: Option<&str>) -> Vec<PreloadCandidate> {
        let context = self.context(current);
        self.rank_with(available, &context)
    }

    pub fn rank_with(
        &self,
        available: &[String],
        context: &PreloadContext,
    ) -> Vec<PreloadCandidate> {
        let strategies = read(&self.strategies);
        let mut candidates: Vec<PreloadCandidate> = available
            .iter()
            .filter(|language| context.current_language.as_deref() != Some(language.as_str()))
            .filter_map(|language| {
                let matched: Vec<&PreloadStrategy> = strategies
                    .iter()
                    .filter(|strategy| strategy.matches(language, context))
                    .collect();
                let score: u32 = matched.iter().map(|s| s.weight).sum();
                (score > 0).then(|| PreloadCandidate {
                    language: language.clone(),
                    score,
                    matched_strategies: matched.iter().map(|s| s.name.clone()).collect(),
                })
            })
            .collect();

        // Stable, so ties keep the caller's order.
        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates
    }

    /// Rank and load candidates in the background.
    ///
    /// Waits for the debounce interval first; a newer call made during that
    /// wait supersedes this one, which then returns nothing. Languages that
    /// are already cached or being loaded are skipped and omitted from the
    /// result, which is otherwise in rank order.
    pub async fn schedule(
        &self,
        available: &[String],
        current: Option<&str>,
    ) -> Vec<PreloadResult> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!("Preload superseded by a newer request");
                return Vec::new();
            }
        }

        let context = self.context(current);
        if context.network == NetworkHint::Offline {
            info!("Skipping preload while offline");
            return Vec::new();
        }

        let candidates: Vec<PreloadCandidate> = self
            .rank_with(available, &context)
            .into_iter()
            .filter(|candidate| {
                let busy = self.loader.is_cached(&candidate.language)
                    || self.loader.is_loading(&candidate.language);
                if busy {
                    debug!("Preload of {} skipped: already available", candidate.language);
                }
                !busy
            })
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }
        info!(
            "Preloading {} language(s): {}",
            candidates.len(),
            candidates
                .iter()
                .map(|c| c.language.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        stream::iter(candidates)
            .map(|candidate| self.preload_one(candidate.language))
            .buffered(self.max_concurrent_loads)
            .collect()
            .await
    }

    async fn preload_one(&self, language: String) -> PreloadResult {
        let started = Instant::now();
        let result = self.loader.load(&language).await;
        let elapsed = started.elapsed();

        self.metrics
            .record(EventKind::Preload, &language, elapsed, result.is_ok());
        if let Err(e) = &result {
            warn!("Preload of {} failed: {}", language, e);
        }

        PreloadResult {
            language,
            success: result.is_ok(),
            duration_ms: elapsed.as_millis() as u64,
            error: result.err().map(|e| e.to_string()),
        }
    }

    /// Move `language` to the front of the usage history and persist it.
    pub fn record_usage(&self, language: &str) {
        let snapshot: Vec<String> = {
            let mut recent = lock(&self.recent);
            recent.retain(|l| l != language);
            recent.push_front(language.to_string());
            recent.truncate(RECENT_CAPACITY);
            recent.iter().cloned().collect()
        };

        if let Err(e) = save_json(self.store.as_ref(), RECENT_LANGUAGES_KEY, &snapshot) {
            warn!("Failed to persist recent languages: {}", e);
        }
    }

    /// Most recent first.
    pub fn recent_languages(&self) -> Vec<String> {
        lock(&self.recent).iter().cloned().collect()
    }

    /// Reload the usage history from the store.
    pub fn restore(&self) {
        let stored: Vec<String> =
            load_json(self.store.as_ref(), RECENT_LANGUAGES_KEY).unwrap_or_default();
        let mut recent = lock(&self.recent);
        recent.clear();
        for language in stored {
            if recent.len() == RECENT_CAPACITY {
                break;
            }
            if !recent.contains(&language) {
                recent.push_back(language);
            }
        }
        debug!("Restored {} recent language(s)", recent.len());
    }

    pub fn clear_history(&self) {
        lock(&self.recent).clear();
    }
}
