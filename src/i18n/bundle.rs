//! Resource bundles: immutable trees of localized strings.
//!
//! A namespace document such as
//!
//! ```json
//! { "toolbar": { "save": "Save", "open": "Open" }, "title": "Connections" }
//! ```
//!
//! becomes a [`ResourceBundle`] addressed by dot paths (`toolbar.save`).
//! A [`LanguageBundle`] groups the namespaces of one language, and its paths
//! carry the namespace as their first segment (`common.toolbar.save`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// The addressable unit of loading and caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub language: String,
    pub namespace: String,
}

impl ResourceKey {
    pub fn new(language: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.language, self.namespace)
    }
}

/// A tree of string leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceBundle {
    Leaf(String),
    Node(BTreeMap<String, ResourceBundle>),
}

impl Default for ResourceBundle {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceBundle {
    pub fn empty() -> Self {
        ResourceBundle::Node(BTreeMap::new())
    }

    /// Parse a namespace document. The root must be an object and every leaf
    /// a string.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        match serde_json::from_slice::<ResourceBundle>(bytes) {
            Ok(bundle @ ResourceBundle::Node(_)) => Ok(bundle),
            Ok(ResourceBundle::Leaf(_)) => Err("document root must be an object".to_string()),
            Err(e) => Err(format!(
                "expected nested objects with string values ({})",
                e
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ResourceBundle::Leaf(_) => false,
            ResourceBundle::Node(children) => children.is_empty(),
        }
    }

    /// Find the subtree at `path`.
    ///
    /// Keys that themselves contain dots are matched before the path is split,
    /// so `{"a.b": "x"}` answers `a.b`.
    pub fn lookup(&self, path: &str) -> Option<&ResourceBundle> {
        if path.is_empty() {
            return None;
        }
        let ResourceBundle::Node(children) = self else {
            return None;
        };
        if let Some(found) = children.get(path) {
            return Some(found);
        }
        let (head, rest) = path.split_once('.')?;
        children.get(head)?.lookup(rest)
    }

    /// The string at `path`, if `path` names a leaf.
    pub fn get(&self, path: &str) -> Option<&str> {
        match self.lookup(path)? {
            ResourceBundle::Leaf(value) => Some(value),
            ResourceBundle::Node(_) => None,
        }
    }

    /// Every dot path that ends in a leaf.
    pub fn key_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        collect_paths(self, None, &mut paths);
        paths
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            ResourceBundle::Leaf(_) => 1,
            ResourceBundle::Node(children) => children.values().map(|c| c.leaf_count()).sum(),
        }
    }

    /// Serialized JSON length, used as the cache size estimate.
    pub fn size_bytes(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

fn collect_paths(bundle: &ResourceBundle, prefix: Option<&str>, out: &mut BTreeSet<String>) {
    match bundle {
        ResourceBundle::Leaf(_) => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string());
            }
        }
        ResourceBundle::Node(children) => {
            for (key, child) in children {
                let path = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, key),
                    None => key.clone(),
                };
                collect_paths(child, Some(&path), out);
            }
        }
    }
}

/// All namespaces of one language, as assembled by the loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageBundle {
    pub language: String,
    pub namespaces: BTreeMap<String, Arc<ResourceBundle>>,
    /// Namespaces that failed to load and were substituted with empty content.
    pub failed_namespaces: Vec<String>,
}

impl LanguageBundle {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    pub fn namespace(&self, namespace: &str) -> Option<&Arc<ResourceBundle>> {
        self.namespaces.get(namespace)
    }

    /// Look up `namespace.path`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let (namespace, path) = key.split_once('.')?;
        self.get_in(namespace, path)
    }

    pub fn get_in(&self, namespace: &str, path: &str) -> Option<&str> {
        self.namespaces.get(namespace)?.get(path)
    }

    /// Every leaf path, prefixed with its namespace.
    pub fn key_paths(&self) -> BTreeSet<String> {
        self.namespaces
            .iter()
            .flat_map(|(namespace, bundle)| {
                bundle
                    .key_paths()
                    .into_iter()
                    .map(move |path| format!("{}.{}", namespace, path))
            })
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_namespaces.is_empty()
    }

    /// SHA-256 over every namespace's serialized content, hex encoded.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for (namespace, bundle) in &self.namespaces {
            hasher.update(namespace.as_bytes());
            hasher.update([0u8]);
            hasher.update(serde_json::to_vec(bundle.as_ref()).unwrap_or_default());
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResourceBundle {
        ResourceBundle::from_slice(
            br#"{
                "toolbar": { "save": "Save", "open": "Open" },
                "title": "Connections",
                "dotted.key": "Dotted"
            }"#,
        )
        .unwrap()
    }

    // ==================== Parsing ====================

    #[test]
    fn test_from_slice_rejects_non_string_leaves() {
        assert!(ResourceBundle::from_slice(br#"{"count": 3}"#).is_err());
        assert!(ResourceBundle::from_slice(br#"{"list": ["a"]}"#).is_err());
        assert!(ResourceBundle::from_slice(br#"{"nothing": null}"#).is_err());
    }

    #[test]
    fn test_from_slice_rejects_scalar_root_and_garbage() {
        assert!(ResourceBundle::from_slice(br#""just a string""#).is_err());
        assert!(ResourceBundle::from_slice(b"{ not json").is_err());
    }

    #[test]
    fn test_empty_object_is_empty_bundle() {
        let bundle = ResourceBundle::from_slice(b"{}").unwrap();
        assert!(bundle.is_empty());
        assert_eq!(bundle, ResourceBundle::empty());
    }

    // ==================== Lookup ====================

    #[test]
    fn test_get_nested_and_top_level() {
        let bundle = sample();
        assert_eq!(bundle.get("toolbar.save"), Some("Save"));
        assert_eq!(bundle.get("title"), Some("Connections"));
        assert_eq!(bundle.get("dotted.key"), Some("Dotted"));
    }

    #[test]
    fn test_get_subtree_or_missing_is_none() {
        let bundle = sample();
        assert_eq!(bundle.get("toolbar"), None);
        assert_eq!(bundle.get("toolbar.close"), None);
        assert_eq!(bundle.get("title.deeper"), None);
        assert_eq!(bundle.get(""), None);
        assert!(bundle.lookup("toolbar").is_some());
    }

    // ==================== Key Paths ====================

    #[test]
    fn test_key_paths_lists_leaves_only() {
        let paths: Vec<String> = sample().key_paths().into_iter().collect();
        assert_eq!(
            paths,
            vec!["dotted.key", "title", "toolbar.open", "toolbar.save"]
        );
        assert_eq!(sample().leaf_count(), 4);
    }

    #[test]
    fn test_size_bytes_matches_serialized_length() {
        let bundle = ResourceBundle::from_slice(br#"{"a":"b"}"#).unwrap();
        assert_eq!(bundle.size_bytes(), r#"{"a":"b"}"#.len());
    }

    // ==================== Language Bundle ====================

    #[test]
    fn test_language_bundle_lookup_by_namespace() {
        let mut bundle = LanguageBundle::new("en");
        bundle
            .namespaces
            .insert("common".to_string(), Arc::new(sample()));

        assert_eq!(bundle.get("common.toolbar.save"), Some("Save"));
        assert_eq!(bundle.get_in("common", "title"), Some("Connections"));
        assert_eq!(bundle.get("menu.file"), None);
        assert_eq!(bundle.get("common"), None);
        assert!(bundle.key_paths().contains("common.toolbar.open"));
        assert!(!bundle.is_partial());
    }

    #[test]
    fn test_checksum_tracks_content() {
        let mut a = LanguageBundle::new("en");
        a.namespaces.insert("common".to_string(), Arc::new(sample()));
        let mut b = a.clone();
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum().len(), 64);

        b.namespaces.insert(
            "common".to_string(),
            Arc::new(ResourceBundle::from_slice(br#"{"title":"Other"}"#).unwrap()),
        );
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_resource_key_display() {
        assert_eq!(ResourceKey::new("fr", "menu").to_string(), "fr/menu");
    }
}
