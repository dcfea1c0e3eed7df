//! Transports that produce raw resource documents.
//!
//! A [`Fetcher`] knows nothing about caching or retries; it only turns a
//! `(language, namespace)` pair into bytes or a classified [`FetchError`].

use crate::error::FetchError;
use crate::sync::{lock, read, write};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

pub trait Fetcher: Send + Sync {
    fn fetch(&self, language: &str, namespace: &str)
        -> BoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

/// Reject coordinates that could escape the resource root or URL prefix.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

// ==================== Directory ====================

/// Reads `{root}/{language}/{namespace}.json` from the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetcher for DirectoryFetcher {
    fn fetch(
        &self,
        language: &str,
        namespace: &str,
    ) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        if !is_safe_segment(language) || !is_safe_segment(namespace) {
            return futures::future::ready(Err(FetchError::NotFound)).boxed();
        }

        let path = self
            .root
            .join(language)
            .join(format!("{}.json", namespace));

        async move {
            debug!("Reading resource file {}", path.display());
            tokio::fs::read(&path).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FetchError::NotFound,
                _ => FetchError::Transient(format!("{}: {}", path.display(), e)),
            })
        }
        .boxed()
    }
}

// ==================== HTTP ====================

/// Fetches `{base_url}/{language}/{namespace}.json` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url_for(&self, language: &str, namespace: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, language, namespace)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        language: &str,
        namespace: &str,
    ) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        if !is_safe_segment(language) || !is_safe_segment(namespace) {
            return futures::future::ready(Err(FetchError::NotFound)).boxed();
        }

        let client = self.client.clone();
        let url = self.url_for(language, namespace);

        async move {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Transient(format!("request to {} failed: {}", url, e)))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(FetchError::NotFound);
            }
            if !status.is_success() {
                return Err(FetchError::Transient(format!("HTTP {} from {}", status, url)));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transient(format!("reading body of {}: {}", url, e)))?;
            Ok(body.to_vec())
        }
        .boxed()
    }
}

// ==================== In-memory ====================

type DocKey = (String, String);

#[derive(Debug, Clone)]
struct FailurePlan {
    error: FetchError,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// Serves documents from memory.
///
/// Counts calls per resource and can inject latency or failures, which makes
/// it the transport of choice for embedded resources and for tests.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    documents: RwLock<HashMap<DocKey, Vec<u8>>>,
    failures: Mutex<HashMap<DocKey, FailurePlan>>,
    calls: Mutex<HashMap<DocKey, u32>>,
    latency: Duration,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&self, language: &str, namespace: &str, document: impl Into<Vec<u8>>) {
        write(&self.documents).insert(key(language, namespace), document.into());
    }

    pub fn insert_json(&self, language: &str, namespace: &str, document: &serde_json::Value) {
        self.insert(language, namespace, document.to_string());
    }

    pub fn remove(&self, language: &str, namespace: &str) {
        write(&self.documents).remove(&key(language, namespace));
    }

    /// Fail every fetch of this resource with `error`.
    pub fn fail_always(&self, language: &str, namespace: &str, error: FetchError) {
        lock(&self.failures).insert(
            key(language, namespace),
            FailurePlan {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` fetches of this resource with `error`.
    pub fn fail_times(&self, language: &str, namespace: &str, times: u32, error: FetchError) {
        lock(&self.failures).insert(
            key(language, namespace),
            FailurePlan {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Number of fetches issued for one resource.
    pub fn calls(&self, language: &str, namespace: &str) -> u32 {
        lock(&self.calls)
            .get(&key(language, namespace))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        lock(&self.calls).values().sum()
    }

    fn respond(&self, language: &str, namespace: &str) -> Result<Vec<u8>, FetchError> {
        let doc_key = key(language, namespace);
        *lock(&self.calls).entry(doc_key.clone()).or_insert(0) += 1;

        {
            let mut failures = lock(&self.failures);
            if let Some(plan) = failures.get_mut(&doc_key) {
                match plan.remaining {
                    None => return Err(plan.error.clone()),
                    Some(n) if n > 0 => {
                        plan.remaining = Some(n - 1);
                        return Err(plan.error.clone());
                    }
                    Some(_) => {
                        failures.remove(&doc_key);
                    }
                }
            }
        }

        read(&self.documents)
            .get(&doc_key)
            .cloned()
            .ok_or(FetchError::NotFound)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(
        &self,
        language: &str,
        namespace: &str,
    ) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let result = self.respond(language, namespace);
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
        .boxed()
    }
}

fn key(language: &str, namespace: &str) -> DocKey {
    (language.to_string(), namespace.to_string())
}
