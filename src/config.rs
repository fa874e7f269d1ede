use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    8
}

/// Base URL of the dashboard the alert links point at.
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_client_url")]
    pub client_url: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            client_url: default_client_url(),
        }
    }
}

fn default_client_url() -> String {
    "http://localhost:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertingConfig {
    /// Re-alert on every nth re-occurrence of a known fingerprint.
    /// 0 alerts only when a fingerprint is first created.
    #[serde(default)]
    pub realert_every: u64,
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            realert_every: 0,
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    10
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // Load from config file
        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (FAULTLINE__DATABASE__PATH=..., etc.)
        builder = builder.add_source(
            Environment::with_prefix("FAULTLINE")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let alerting = AlertingConfig::default();
        assert_eq!(alerting.realert_every, 0, "alert only on create by default");
        assert_eq!(alerting.webhook_timeout_secs, 10);
        assert_eq!(DashboardConfig::default().client_url, "http://localhost:3000");
    }
}
