//! Resource loading metrics and observability.
//!
//! Events are kept in a bounded ring buffer (oldest dropped first) so the
//! collector never grows without bound; every aggregate is derived on demand
//! from the buffer and reading never mutates it.

use crate::clock::Clock;
use crate::sync::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hit rate (percent) below which a larger cache is suggested.
const LOW_HIT_RATE: f64 = 70.0;
/// Minimum cache lookups before the hit rate is judged.
const MIN_LOOKUPS_FOR_HIT_RATE: usize = 10;
/// Average load time (ms) above which preloading is suggested.
const SLOW_AVERAGE_LOAD_MS: f64 = 1000.0;
/// Single load time (ms) above which the transport is suspect.
const SLOW_MAX_LOAD_MS: u64 = 3000;
/// Preload success rate (percent) below which preloading is wasteful.
const LOW_PRELOAD_SUCCESS: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Load,
    Switch,
    CacheHit,
    CacheMiss,
    Preload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceEvent {
    pub kind: EventKind,
    pub language: String,
    pub duration_ms: u64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Rolling log of performance events.
pub struct MetricsCollector {
    events: Mutex<VecDeque<PerformanceEvent>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl MetricsCollector {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock,
        }
    }

    /// Append an event stamped with the current time.
    pub fn record(&self, kind: EventKind, language: &str, duration: Duration, success: bool) {
        self.record_event(PerformanceEvent {
            kind,
            language: language.to_string(),
            duration_ms: duration.as_millis() as u64,
            success,
            timestamp: self.clock.now(),
        });
    }

    pub fn record_event(&self, event: PerformanceEvent) {
        let mut events = lock(&self.events);
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn record_cache_hit(&self, language: &str) {
        self.record(EventKind::CacheHit, language, Duration::ZERO, true);
    }

    pub fn record_cache_miss(&self, language: &str) {
        self.record(EventKind::CacheMiss, language, Duration::ZERO, true);
    }

    /// Oldest first.
    pub fn events(&self) -> Vec<PerformanceEvent> {
        lock(&self.events).iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let events = lock(&self.events);

        let mut totals = Tally::default();
        let mut per_language: BTreeMap<String, Tally> = BTreeMap::new();
        for event in events.iter() {
            totals.add(event);
            per_language
                .entry(event.language.clone())
                .or_default()
                .add(event);
        }

        MetricsReport {
            total_events: events.len(),
            buffer_saturated: events.len() >= self.capacity,
            cache_hits: totals.cache_hits,
            cache_misses: totals.cache_misses,
            cache_hit_rate: percentage(totals.cache_hits, totals.cache_hits + totals.cache_misses),
            load_count: totals.loads,
            load_failures: totals.load_failures,
            average_load_ms: totals.average_load_ms(),
            min_load_ms: totals.min_load_ms,
            max_load_ms: totals.max_load_ms,
            preload_count: totals.preloads,
            preload_success_rate: percentage(totals.preload_successes, totals.preloads),
            switch_count: totals.switches,
            switch_failures: totals.switch_failures,
            per_language: per_language
                .into_iter()
                .map(|(language, tally)| (language, tally.language_metrics()))
                .collect(),
        }
    }

    /// Advisory suggestions derived from the current aggregates.
    pub fn recommendations(&self) -> Vec<String> {
        let report = self.report();
        let mut advice = Vec::new();

        let lookups = report.cache_hits + report.cache_misses;
        if lookups >= MIN_LOOKUPS_FOR_HIT_RATE && report.cache_hit_rate < LOW_HIT_RATE {
            advice.push(format!(
                "Cache hit rate is {:.1}% (below {:.0}%); consider increasing the cache size or TTL",
                report.cache_hit_rate, LOW_HIT_RATE
            ));
        }

        if report.load_count > 0 && report.average_load_ms > SLOW_AVERAGE_LOAD_MS {
            advice.push(format!(
                "Average load time is {:.0}ms; consider preloading likely languages",
                report.average_load_ms
            ));
        }

        if report.max_load_ms.is_some_and(|max| max > SLOW_MAX_LOAD_MS) {
            advice.push(format!(
                "Slowest load took {}ms; check the resource transport",
                report.max_load_ms.unwrap_or_default()
            ));
        }

        if report.preload_count > 0 && report.preload_success_rate < LOW_PRELOAD_SUCCESS {
            advice.push(format!(
                "Preload success rate is {:.1}%; consider reducing preload concurrency or candidates",
                report.preload_success_rate
            ));
        }

        if report.buffer_saturated {
            advice.push(format!(
                "Metrics buffer is full ({} events); older events are being discarded",
                self.capacity
            ));
        }

        advice
    }
}

/// Metrics report containing current loading statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub total_events: usize,
    /// The ring buffer is full and dropping its oldest events
    pub buffer_saturated: bool,

    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Cache hit rate as a percentage (0-100)
    pub cache_hit_rate: f64,

    pub load_count: usize,
    pub load_failures: usize,
    pub average_load_ms: f64,
    pub min_load_ms: Option<u64>,
    pub max_load_ms: Option<u64>,

    pub preload_count: usize,
    /// Preload success rate as a percentage (0-100)
    pub preload_success_rate: f64,

    pub switch_count: usize,
    pub switch_failures: usize,

    pub per_language: BTreeMap<String, LanguageMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageMetrics {
    pub loads: usize,
    pub average_load_ms: f64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub preloads: usize,
    pub switches: usize,
    pub failures: usize,
}

#[derive(Debug, Default)]
struct Tally {
    cache_hits: usize,
    cache_misses: usize,
    loads: usize,
    load_failures: usize,
    load_ms_total: u64,
    min_load_ms: Option<u64>,
    max_load_ms: Option<u64>,
    preloads: usize,
    preload_successes: usize,
    switches: usize,
    switch_failures: usize,
    failures: usize,
}

impl Tally {
    fn add(&mut self, event: &PerformanceEvent) {
        if !event.success {
            self.failures += 1;
        }
        match event.kind {
            EventKind::CacheHit => self.cache_hits += 1,
            EventKind::CacheMiss => self.cache_misses += 1,
            EventKind::Load => {
                self.loads += 1;
                if !event.success {
                    self.load_failures += 1;
                }
                self.load_ms_total += event.duration_ms;
                self.min_load_ms = Some(
                    self.min_load_ms
                        .map_or(event.duration_ms, |min| min.min(event.duration_ms)),
                );
                self.max_load_ms = Some(
                    self.max_load_ms
                        .map_or(event.duration_ms, |max| max.max(event.duration_ms)),
                );
            }
            EventKind::Preload => {
                self.preloads += 1;
                if event.success {
                    self.preload_successes += 1;
                }
            }
            EventKind::Switch => {
                self.switches += 1;
                if !event.success {
                    self.switch_failures += 1;
                }
            }
        }
    }

    fn average_load_ms(&self) -> f64 {
        if self.loads == 0 {
            0.0
        } else {
            self.load_ms_total as f64 / self.loads as f64
        }
    }

    fn language_metrics(&self) -> LanguageMetrics {
        LanguageMetrics {
            loads: self.loads,
            average_load_ms: self.average_load_ms(),
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            preloads: self.preloads,
            switches: self.switches,
            failures: self.failures,
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}
