//! Shared wiring: config, dataset, services and cache into an orchestrator.

use pathwise_agent::{Orchestrator, ServiceSet};
use pathwise_cache::{CacheClient, CacheSettings};
use pathwise_config::AppConfig;
use pathwise_core::profile::UserProfile;
use pathwise_tools::StaticRepository;
use std::path::Path;
use std::sync::Arc;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Model-backed services when a key is configured, offline rules otherwise.
pub fn services(config: &AppConfig, offline: bool) -> ServiceSet {
    if offline {
        tracing::info!("Offline mode, using rule-based services");
        return ServiceSet::heuristic();
    }
    if !config.has_api_key() {
        tracing::warn!("No API key configured, using rule-based services");
        return ServiceSet::heuristic();
    }

    let router = pathwise_providers::build_from_config(config);
    match router.default_provider() {
        Some(provider) => {
            tracing::info!(
                provider = %config.default_provider,
                model = %config.default_model,
                "Using model-backed services"
            );
            ServiceSet::llm(provider, &config.default_model, config.default_temperature)
        }
        None => {
            tracing::warn!(provider = %config.default_provider, "Default provider unavailable, using rule-based services");
            ServiceSet::heuristic()
        }
    }
}

pub fn build_orchestrator(config: &AppConfig, offline: bool) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let repository = StaticRepository::from_optional_path(config.data.dataset_path.as_deref().map(Path::new))
        .map_err(|e| format!("Failed to load dataset: {e}"))?;
    let cache = Arc::new(CacheClient::in_memory(CacheSettings::from(&config.cache)));

    Ok(Orchestrator::builder(services(config, offline), Arc::new(repository))
        .with_cache(cache)
        .with_app_config(config)
        .build())
}

/// Read a JSON profile, or the empty profile when no path is given.
pub fn load_profile(path: Option<&Path>) -> Result<UserProfile, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(UserProfile::default());
    };
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read profile {}: {e}", path.display()))?;
    let profile =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse profile {}: {e}", path.display()))?;
    Ok(profile)
}
