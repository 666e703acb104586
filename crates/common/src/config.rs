use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub server: Server,
    pub providers: Providers,
    pub retry: Retry,
    pub scoring: Scoring,
    pub evaluation: Evaluation,
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
    pub etherscan_api_url: String,
    pub alchemy_api_url: String,
    pub bitquery_api_url: String,
    #[serde(default)]
    pub etherscan_api_keys: Vec<String>,
    #[serde(default)]
    pub alchemy_api_keys: Vec<String>,
    #[serde(default)]
    pub bitquery_api_keys: Vec<String>,
    pub request_timeout_secs: u64,
    pub dex_trade_limit: u32,
}

impl Providers {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retry {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scoring {
    pub stats_cache_ttl_secs: u64,
    pub stats_cache_max_writes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Evaluation {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observability {
    pub prometheus_port: u16,
}

impl Config {
    /// Load `config/default.toml` and layer environment overrides on top.
    pub fn load() -> Result<Self> {
        let content = std::fs::read_to_string("config/default.toml")?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Apply deploy-time overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ETHERSCAN_API_KEY") {
            self.providers.etherscan_api_keys = split_keys(&v);
        }
        if let Some(v) = lookup("ALCHEMY_API_KEY") {
            self.providers.alchemy_api_keys = split_keys(&v);
        }
        if let Some(v) = lookup("BITQUERY_API_KEYS") {
            self.providers.bitquery_api_keys = split_keys(&v);
        }
        if let Some(v) = lookup("BITQUERY_API_URL").filter(|v| !v.trim().is_empty()) {
            self.providers.bitquery_api_url = v.trim().to_string();
        }
        if let Some(port) = lookup("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(v) = lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            self.database.path = v.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.server.port > 0, "server.port must be > 0");
        anyhow::ensure!(
            self.providers.request_timeout_secs > 0,
            "providers.request_timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.evaluation.timeout_secs > 0,
            "evaluation.timeout_secs must be > 0"
        );
        anyhow::ensure!(
            self.providers.dex_trade_limit > 0,
            "providers.dex_trade_limit must be > 0"
        );
        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

/// Comma-separated key list; blanks are dropped.
fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToString::to_string)
        .collect()
}
