use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub upstream: Upstream,
    pub session: Session,
    pub rate_limit: RateLimits,
    pub cache: Cache,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Http {
    pub address: String,
    /// TLS is enabled when both paths are set.
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            cert_path: None,
            key_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Log {
    pub filter: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Upstream {
    pub backend: String, // "fake" or "real"
    pub base_url: String,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub refresh_timeout_ms: u64,
    pub shipping_offer_ttl_secs: u64,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            backend: "fake".to_string(),
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_ms: 30_000,
            retry_attempts: 2,
            retry_delay_ms: 1_500,
            refresh_timeout_ms: 10_000,
            shipping_offer_ttl_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Session {
    pub access_ttl_secs: i64,
    pub refresh_threshold_secs: i64,
    pub refresh_cooldown_secs: i64,
    pub check_interval_secs: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            access_ttl_secs: 15 * 60,
            refresh_threshold_secs: 3 * 60,
            refresh_cooldown_secs: 30,
            check_interval_secs: 2 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub auth: Limit,
    pub api: Limit,
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            auth: Limit {
                limit: 5,
                window_secs: 15 * 60,
                max_tracked: 1000,
            },
            api: Limit::default(),
            cleanup_interval_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limit {
    pub limit: u32,
    pub window_secs: u64,
    pub max_tracked: usize,
}

impl Default for Limit {
    fn default() -> Self {
        Self {
            limit: 60,
            window_secs: 60,
            max_tracked: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
    pub ttl_secs: u64,
    pub capacity: usize,
    pub purge_interval_secs: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            ttl_secs: 5 * 60,
            capacity: 100,
            purge_interval_secs: 5 * 60,
        }
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Reads the TOML file, then lets `STOREFRONT__SECTION__KEY` variables override it.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix("STOREFRONT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
