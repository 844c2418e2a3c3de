use std::path::PathBuf;

use anyhow::{Context, Result};

/// Entitlement service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the usage API, e.g. `https://api.example.com`.
    pub api_base_url: String,
    /// Directory for the guest session store file.
    pub storage_dir: PathBuf,
    /// Global quota-enforcement switch. Off means every feature passes
    /// ungated and no usage calls are made.
    pub premium_mode_enabled: bool,
    pub request_timeout_secs: u64,
    pub rust_log: String,
    /// Fixed bearer token for the diagnostic binary. Real deployments get
    /// tokens from the identity provider instead.
    pub bearer_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            api_base_url: require_env("ENTITLEMENTS_API_URL")?,
            storage_dir: std::env::var("ENTITLEMENTS_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("entitlements")),
            premium_mode_enabled: std::env::var("PREMIUM_MODE_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .context("REQUEST_TIMEOUT_SECS must be a number of seconds")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            bearer_token: std::env::var("ENTITLEMENTS_BEARER_TOKEN").ok(),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
