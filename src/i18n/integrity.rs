//! Translation completeness checks.
//!
//! Each namespace of a non-reference language is diffed against the key set of
//! the same namespace in the reference language. Placeholders such as
//! `{count}` or `{{name}}` are compared for keys present on both sides, since a
//! translation that drops one renders broken text.

use crate::clock::Clock;
use crate::i18n::bundle::{ResourceBundle, ResourceKey};
use crate::sync::{lock, read, write};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

/// How long a computed report is reused.
pub const REPORT_TTL: Duration = Duration::from_secs(5 * 60);

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Result of diffing one namespace against the reference key set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub language: String,
    pub namespace: String,
    pub reference_language: String,
    /// Keys the reference has and this language lacks
    pub missing_keys: Vec<String>,
    /// Keys this language has and the reference lacks
    pub extra_keys: Vec<String>,
    /// Keys whose placeholders differ from the reference
    pub placeholder_mismatches: Vec<String>,
    pub is_complete: bool,
    pub total_keys: usize,
    pub reference_keys: usize,
    /// Share of reference keys present, as a percentage (0-100)
    pub coverage: f64,
    pub checked_at: DateTime<Utc>,
}

impl IntegrityReport {
    pub fn has_warnings(&self) -> bool {
        !self.extra_keys.is_empty() || !self.placeholder_mismatches.is_empty()
    }
}

#[derive(Debug, Clone)]
struct ReferenceKeys {
    language: String,
    keys: BTreeSet<String>,
    placeholders: BTreeMap<String, BTreeSet<String>>,
}

pub struct IntegrityChecker {
    references: RwLock<HashMap<String, ReferenceKeys>>,
    reports: Mutex<HashMap<ResourceKey, IntegrityReport>>,
    clock: Arc<dyn Clock>,
}

impl IntegrityChecker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            references: RwLock::new(HashMap::new()),
            reports: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Establish `bundle` as the reference for `namespace`.
    ///
    /// Every cached report for the namespace is discarded.
    pub fn set_reference(&self, language: &str, namespace: &str, bundle: &ResourceBundle) {
        let keys = bundle.key_paths();
        let placeholders = placeholders_by_key(bundle, &keys);
        write(&self.references).insert(
            namespace.to_string(),
            ReferenceKeys {
                language: language.to_string(),
                keys,
                placeholders,
            },
        );
        lock(&self.reports).retain(|key, _| key.namespace != namespace);
    }

    pub fn has_reference(&self, namespace: &str) -> bool {
        read(&self.references).contains_key(namespace)
    }

    pub fn reference_keys(&self, namespace: &str) -> Option<BTreeSet<String>> {
        read(&self.references)
            .get(namespace)
            .map(|reference| reference.keys.clone())
    }

    /// A report computed less than [`REPORT_TTL`] ago.
    pub fn cached(&self, language: &str, namespace: &str) -> Option<IntegrityReport> {
        let now = self.clock.now();
        let key = ResourceKey::new(language, namespace);
        let mut reports = lock(&self.reports);
        let fresh = reports
            .get(&key)
            .is_some_and(|report| !is_stale(report.checked_at, now));
        if fresh {
            reports.get(&key).cloned()
        } else {
            reports.remove(&key);
            None
        }
    }

    /// Diff `bundle` against the reference for `namespace` and cache the report.
    ///
    /// Returns `None` when no reference has been established for the namespace.
    pub fn check(
        &self,
        language: &str,
        namespace: &str,
        bundle: &ResourceBundle,
    ) -> Option<IntegrityReport> {
        let references = read(&self.references);
        let reference = references.get(namespace)?;

        let keys = bundle.key_paths();
        let missing_keys: Vec<String> = reference.keys.difference(&keys).cloned().collect();
        let extra_keys: Vec<String> = keys.difference(&reference.keys).cloned().collect();

        let actual_placeholders = placeholders_by_key(bundle, &keys);
        let none = BTreeSet::new();
        let placeholder_mismatches: Vec<String> = reference
            .keys
            .intersection(&keys)
            .filter(|key| {
                let expected = reference.placeholders.get(*key).unwrap_or(&none);
                let actual = actual_placeholders.get(*key).unwrap_or(&none);
                actual != expected
            })
            .cloned()
            .collect();

        let present = reference.keys.len() - missing_keys.len();
        let coverage = if reference.keys.is_empty() {
            100.0
        } else {
            (present as f64 / reference.keys.len() as f64) * 100.0
        };

        let report = IntegrityReport {
            language: language.to_string(),
            namespace: namespace.to_string(),
            reference_language: reference.language.clone(),
            is_complete: missing_keys.is_empty(),
            missing_keys,
            extra_keys,
            placeholder_mismatches,
            total_keys: keys.len(),
            reference_keys: reference.keys.len(),
            coverage,
            checked_at: self.clock.now(),
        };
        drop(references);

        lock(&self.reports).insert(ResourceKey::new(language, namespace), report.clone());
        Some(report)
    }

    /// Forget cached reports for `language`.
    pub fn invalidate(&self, language: &str) {
        lock(&self.reports).retain(|key, _| key.language != language);
    }

    pub fn clear(&self) {
        write(&self.references).clear();
        lock(&self.reports).clear();
    }
}

fn is_stale(checked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - checked_at)
        .to_std()
        .map(|age| age > REPORT_TTL)
        .unwrap_or(false)
}

fn placeholders_by_key(
    bundle: &ResourceBundle,
    keys: &BTreeSet<String>,
) -> BTreeMap<String, BTreeSet<String>> {
    keys.iter()
        .filter_map(|key| {
            let value = bundle.get(key)?;
            let placeholders = extract_placeholders(value);
            (!placeholders.is_empty()).then(|| (key.clone(), placeholders))
        })
        .collect()
}

/// Extract `{name}` and `{{name}}` placeholder names from a message.
fn extract_placeholders(text: &str) -> BTreeSet<String> {
    let regex = PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{\{?\s*([A-Za-z0-9_.]+)\s*\}?\}").expect("placeholder pattern is valid")
    });

    regex
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn bundle(json: &str) -> ResourceBundle {
        ResourceBundle::from_slice(json.as_bytes()).unwrap()
    }

    fn checker() -> (IntegrityChecker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (IntegrityChecker::new(clock.clone()), clock)
    }

    // ==================== Placeholder Extraction ====================

    #[test]
    fn test_extract_placeholders_single_and_double_braces() {
        let found = extract_placeholders("Deleted {count} rows from {{ table }}");
        assert_eq!(
            found.into_iter().collect::<Vec<_>>(),
            vec!["count", "table"]
        );
    }

    #[test]
    fn test_extract_placeholders_none() {
        assert!(extract_placeholders("No placeholders here").is_empty());
    }

    // ==================== Diffing ====================

    #[test]
    fn test_reports_exactly_the_missing_key() {
        let (checker, _) = checker();
        checker.set_reference(
            "en",
            "common",
            &bundle(r#"{"save":"Save","cancel":"Cancel","menu":{"file":"File"}}"#),
        );

        let report = checker
            .check(
                "fr",
                "common",
                &bundle(r#"{"save":"Enregistrer","menu":{"file":"Fichier"}}"#),
            )
            .unwrap();

        assert_eq!(report.missing_keys, vec!["cancel"]);
        assert!(report.extra_keys.is_empty());
        assert!(!report.is_complete);
        assert_eq!(report.reference_language, "en");
        assert_eq!(report.reference_keys, 3);
        assert!((report.coverage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_extra_keys_do_not_make_report_incomplete() {
        let (checker, _) = checker();
        checker.set_reference("en", "common", &bundle(r#"{"save":"Save"}"#));

        let report = checker
            .check("de", "common", &bundle(r#"{"save":"Speichern","old":"Alt"}"#))
            .unwrap();

        assert!(report.is_complete);
        assert_eq!(report.extra_keys, vec!["old"]);
        assert!(report.has_warnings());
        assert_eq!(report.coverage, 100.0);
    }

    #[test]
    fn test_placeholder_mismatch_is_reported() {
        let (checker, _) = checker();
        checker.set_reference(
            "en",
            "common",
            &bundle(r#"{"rows":"{count} rows","title":"Query {name}"}"#),
        );

        let report = checker
            .check(
                "ja",
                "common",
                &bundle(r#"{"rows":"{count} 行","title":"クエリ"}"#),
            )
            .unwrap();

        assert_eq!(report.placeholder_mismatches, vec!["title"]);
        assert!(report.is_complete);
    }

    #[test]
    fn test_dropped_placeholder_is_reported() {
        let (checker, _) = checker();
        checker.set_reference("en", "common", &bundle(r#"{"rows":"Deleted {count} rows"}"#));

        let report = checker
            .check("fr", "common", &bundle(r#"{"rows":"Lignes supprimees"}"#))
            .unwrap();

        assert_eq!(report.placeholder_mismatches, vec!["rows"]);
        assert!(report.has_warnings());
    }

    #[test]
    fn test_added_placeholder_is_reported() {
        let (checker, _) = checker();
        checker.set_reference(
            "en",
            "common",
            &bundle(r#"{"greeting":"Hello","save":"Save"}"#),
        );

        let report = checker
            .check(
                "de",
                "common",
                &bundle(r#"{"greeting":"Hallo {name}","save":"Speichern"}"#),
            )
            .unwrap();

        assert_eq!(report.placeholder_mismatches, vec!["greeting"]);
        assert!(report.is_complete);
    }

    #[test]
    fn test_check_without_reference_is_none() {
        let (checker, _) = checker();
        assert!(checker.check("fr", "common", &bundle("{}")).is_none());
        assert!(!checker.has_reference("common"));
    }

    // ==================== Report Cache ====================

    #[test]
    fn test_reports_are_cached_for_five_minutes() {
        let (checker, clock) = checker();
        checker.set_reference("en", "common", &bundle(r#"{"save":"Save"}"#));
        checker.check("fr", "common", &bundle("{}")).unwrap();

        clock.advance(chrono::Duration::minutes(4));
        assert!(checker.cached("fr", "common").is_some());

        clock.advance(chrono::Duration::minutes(2));
        assert!(checker.cached("fr", "common").is_none());
    }

    #[test]
    fn test_invalidate_and_new_reference_drop_cached_reports() {
        let (checker, _) = checker();
        checker.set_reference("en", "common", &bundle(r#"{"save":"Save"}"#));
        checker.check("fr", "common", &bundle("{}")).unwrap();
        checker.check("de", "common", &bundle("{}")).unwrap();

        checker.invalidate("fr");
        assert!(checker.cached("fr", "common").is_none());
        assert!(checker.cached("de", "common").is_some());

        checker.set_reference("en", "common", &bundle(r#"{"open":"Open"}"#));
        assert!(checker.cached("de", "common").is_none());
        assert_eq!(
            checker.reference_keys("common").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["open"]
        );
    }
}
