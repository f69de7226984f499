//! `pathwise config`: configuration management commands.

use pathwise_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();

            if config.api_key.is_none() {
                warnings.push("No API key set, answers use the offline rules (set PATHWISE_API_KEY)");
            }

            if !config.cache.enabled {
                warnings.push("Cache disabled, every question runs the full pipeline");
            }

            if config.warmup.common_queries.is_empty() {
                warnings.push("No warmup queries configured");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:   {}", config.default_provider);
            println!("   Model:      {}", config.default_model);
            println!("   Attempts:   {}", config.orchestrator.max_attempts);
            println!("   Timeout:    {}s", config.orchestrator.pipeline_timeout_secs);
            println!(
                "   Cache:      {} (similarity >= {})",
                if config.cache.enabled { "enabled" } else { "disabled" },
                config.cache.similarity_threshold
            );
            println!(
                "   Dataset:    {}",
                config.data.dataset_path.as_deref().unwrap_or("built-in sample")
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn defaults() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::default_toml());
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = pathwise_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let parsed: pathwise_config::AppConfig = toml::from_str(&pathwise_config::AppConfig::default_toml()).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
