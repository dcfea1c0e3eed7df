use anyhow::{bail, Context, Result};
use locale_resources::config::Config;
use locale_resources::fetch::{DirectoryFetcher, Fetcher, HttpFetcher};
use locale_resources::i18n::{NetworkHint, ResourceManager, SystemProbe};
use locale_resources::store::{JsonFileStore, MemoryStore, PersistentStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("locale_resources=info".parse()?),
        )
        .init();

    info!("Starting locale resource check");

    let config = Config::from_env()?;
    let fetcher = fetcher_from_env()?;
    let store = store_from_env()?;
    let probe = SystemProbe::new().with_network(network_from_env()?);

    let manager = ResourceManager::builder(config, fetcher)
        .store(store)
        .probe(Arc::new(probe))
        .build();

    // Step 1: Load the initial language
    let bundle = manager
        .initialize()
        .await
        .context("No language could be loaded")?;
    info!(
        "Loaded {} with {} keys",
        bundle.language,
        bundle.key_paths().len()
    );

    // Step 2: Switch language if one was requested
    if let Some(language) = std::env::args().nth(1) {
        manager
            .load_language(&language)
            .await
            .with_context(|| format!("Failed to switch to {}", language))?;
    }

    // Step 3: Warm the cache for likely next languages
    let available = manager.registry().enabled_codes();
    let results = manager.smart_preload(&available, None).await?;
    let loaded = results.iter().filter(|r| r.success).count();
    info!("Preloaded {}/{} candidate languages", loaded, results.len());

    // Step 4: Check translation completeness
    for report in manager.check_integrity(None).await? {
        if report.is_complete {
            info!(
                "{}/{}: complete ({} keys)",
                report.language, report.namespace, report.total_keys
            );
        } else {
            warn!(
                "{}/{}: {:.1}% coverage, missing {}",
                report.language,
                report.namespace,
                report.coverage,
                report.missing_keys.join(", ")
            );
        }
    }

    // Step 5: Report
    println!("{}", serde_json::to_string_pretty(&manager.metrics_report())?);
    for recommendation in manager.recommendations() {
        info!("Recommendation: {}", recommendation);
    }

    manager.destroy();
    info!("Done");
    Ok(())
}

/// `I18N_RESOURCES_URL` wins over `I18N_RESOURCES_DIR` (default `locales`).
fn fetcher_from_env() -> Result<Arc<dyn Fetcher>> {
    if let Ok(base_url) = std::env::var("I18N_RESOURCES_URL") {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        info!("Fetching resources from {}", base_url);
        return Ok(Arc::new(HttpFetcher::new(client, base_url)));
    }

    let dir = std::env::var("I18N_RESOURCES_DIR").unwrap_or_else(|_| "locales".to_string());
    info!("Reading resources from {}", dir);
    Ok(Arc::new(DirectoryFetcher::new(dir)))
}

fn store_from_env() -> Result<Arc<dyn PersistentStore>> {
    match std::env::var("I18N_STORE_PATH") {
        Ok(path) => {
            let store = JsonFileStore::open(&path)
                .with_context(|| format!("Failed to open store at {}", path))?;
            Ok(Arc::new(store))
        }
        Err(_) => Ok(Arc::new(MemoryStore::new())),
    }
}

fn network_from_env() -> Result<NetworkHint> {
    let hint = match std::env::var("I18N_NETWORK_HINT").as_deref() {
        Err(_) | Ok("") | Ok("unknown") => NetworkHint::Unknown,
        Ok("fast") => NetworkHint::Fast,
        Ok("slow") => NetworkHint::Slow,
        Ok("offline") => NetworkHint::Offline,
        Ok(other) => bail!(
            "Invalid I18N_NETWORK_HINT: {}. Expected fast, slow, offline or unknown",
            other
        ),
    };
    Ok(hint)
}
