//! Missing-key resolution.
//!
//! When the active bundle has no entry for a key, [`FallbackResolver::resolve`]
//! walks a fixed chain and always produces a string:
//!
//! 1. the caller's default value,
//! 2. the key in each configured fallback language (optionally annotated),
//! 3. a label derived from the key itself, when enabled,
//! 4. the raw key wrapped in the missing-key markers.
//!
//! Every resolution is counted so hosts can see which keys go untranslated.

use crate::clock::Clock;
use crate::config::Config;
use crate::i18n::bundle::{ResourceBundle, ResourceKey};
use crate::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tracing::debug;

static WORD_REGEX: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions<'a> {
    /// Returned verbatim before any other fallback is tried.
    pub default_value: Option<&'a str>,
    /// When set, the whole key is a path inside this namespace. Otherwise the
    /// first segment of the key names the namespace.
    pub namespace: Option<&'a str>,
}

impl<'a> ResolveOptions<'a> {
    pub fn with_default(mut self, default_value: &'a str) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn in_namespace(mut self, namespace: &'a str) -> Self {
        self.namespace = Some(namespace);
        self
    }
}

/// How often one key went missing for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingKeyRecord {
    pub key: String,
    pub language: String,
    pub namespace: String,
    pub count: u64,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingKeyStats {
    pub unique_keys: usize,
    pub total_occurrences: u64,
    pub by_language: BTreeMap<String, u64>,
    pub by_namespace: BTreeMap<String, u64>,
}

#[derive(Debug, Clone)]
struct FallbackSettings {
    order: Vec<String>,
    annotate: bool,
    derive_labels: bool,
    prefix: String,
    suffix: String,
}

type MissingKeyId = (String, String, String);

pub struct FallbackResolver {
    settings: FallbackSettings,
    mirror: RwLock<HashMap<String, HashMap<String, Arc<ResourceBundle>>>>,
    missing: Mutex<HashMap<MissingKeyId, MissingKeyRecord>>,
    clock: Arc<dyn Clock>,
}

impl FallbackResolver {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: FallbackSettings {
                order: config.fallback_language_order.clone(),
                annotate: config.annotate_fallbacks,
                derive_labels: config.derive_labels,
                prefix: config.missing_key_prefix.clone(),
                suffix: config.missing_key_suffix.clone(),
            },
            mirror: RwLock::new(HashMap::new()),
            missing: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Make a loaded namespace available as fallback content.
    pub fn mirror(&self, key: &ResourceKey, bundle: Arc<ResourceBundle>) {
        write(&self.mirror)
            .entry(key.language.clone())
            .or_default()
            .insert(key.namespace.clone(), bundle);
    }

    pub fn unmirror(&self, language: &str) {
        write(&self.mirror).remove(language);
    }

    pub fn clear_mirror(&self) {
        write(&self.mirror).clear();
    }

    pub fn is_mirrored(&self, key: &ResourceKey) -> bool {
        read(&self.mirror)
            .get(&key.language)
            .is_some_and(|namespaces| namespaces.contains_key(&key.namespace))
    }

    /// Resolve a key that the active bundle could not answer.
    pub fn resolve(&self, key: &str, language: &str, options: &ResolveOptions<'_>) -> String {
        let address = split_key(key, options.namespace);
        let namespace = address.map(|(ns, _)| ns).unwrap_or_default();
        self.record_missing(key, language, namespace);

        if let Some(default_value) = options.default_value {
            debug!(key, language, "Missing key resolved with default value");
            return default_value.to_string();
        }

        if let Some((namespace, path)) = address {
            let mirror = read(&self.mirror);
            for fallback in self.settings.order.iter().filter(|l| *l != language) {
                let found = mirror
                    .get(fallback)
                    .and_then(|namespaces| namespaces.get(namespace))
                    .and_then(|bundle| bundle.get(path));
                if let Some(value) = found {
                    debug!(key, language, fallback = %fallback, "Missing key resolved from fallback language");
                    return if self.settings.annotate {
                        format!("{} ({})", value, fallback)
                    } else {
                        value.to_string()
                    };
                }
            }
        }

        if self.settings.derive_labels {
            if let Some(label) = derive_label(key) {
                debug!(key, language, "Missing key resolved with derived label");
                return label;
            }
        }

        debug!(key, language, "Missing key has no fallback");
        format!("{}{}{}", self.settings.prefix, key, self.settings.suffix)
    }

    fn record_missing(&self, key: &str, language: &str, namespace: &str) {
        let now = self.clock.now();
        let id = (key.to_string(), language.to_string(), namespace.to_string());
        lock(&self.missing)
            .entry(id)
            .and_modify(|record| {
                record.count += 1;
                record.last_seen_at = now;
            })
            .or_insert_with(|| MissingKeyRecord {
                key: key.to_string(),
                language: language.to_string(),
                namespace: namespace.to_string(),
                count: 1,
                last_seen_at: now,
            });
    }

    /// Every missing-key record, most frequent first.
    pub fn missing_keys(&self) -> Vec<MissingKeyRecord> {
        let mut records: Vec<MissingKeyRecord> = lock(&self.missing).values().cloned().collect();
        records.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.key.cmp(&b.key))
                .then_with(|| a.language.cmp(&b.language))
        });
        records
    }

    pub fn missing_key_stats(&self) -> MissingKeyStats {
        let missing = lock(&self.missing);
        let mut stats = MissingKeyStats {
            unique_keys: missing.len(),
            ..MissingKeyStats::default()
        };
        for record in missing.values() {
            stats.total_occurrences += record.count;
            *stats.by_language.entry(record.language.clone()).or_default() += record.count;
            *stats
                .by_namespace
                .entry(record.namespace.clone())
                .or_default() += record.count;
        }
        stats
    }

    pub fn clear_missing_keys(&self) {
        lock(&self.missing).clear();
    }
}

/// Split a key into `(namespace, path)`.
fn split_key<'a>(key: &'a str, namespace: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    match namespace {
        Some(namespace) => Some((namespace, key)),
        None => key.split_once('.'),
    }
}

/// `common.saveButton` -> `Save Button`, `menu.open_recent` -> `Open Recent`,
/// `loadHTMLParser` -> `Load HTML Parser`.
fn derive_label(key: &str) -> Option<String> {
    let last = key.rsplit('.').next().unwrap_or(key);
    let regex = WORD_REGEX
        .get_or_init(|| Regex::new(r"[A-Z]+[a-z0-9]*|[a-z0-9]+").expect("word pattern is valid"));

    // An uppercase run followed by lowercase ends one letter early:
    // `HTMLParser` is `HTML` then `Parser`.
    let mut words: Vec<&str> = Vec::new();
    for m in regex.find_iter(last) {
        let word = m.as_str();
        let upper = word.bytes().take_while(u8::is_ascii_uppercase).count();
        if upper > 1 && word[upper..].starts_with(|c: char| c.is_ascii_lowercase()) {
            words.push(&word[..upper - 1]);
            words.push(&word[upper - 1..]);
        } else {
            words.push(word);
        }
    }

    let words: Vec<String> = words
        .into_iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    (!words.is_empty()).then(|| words.join(" "))
}
