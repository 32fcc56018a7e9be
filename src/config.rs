//! Env-driven configuration.
//!
//! `dotenvy` is loaded by the binary before [`AppConfig::from_env`] runs.
//! Every value has a development default except the provider credentials.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::normalize_base_url;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 100;
const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// Upstream credentials; a blank value counts as missing.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
}

impl ProviderCredentials {
    /// Names of the variables that still need to be set.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.gemini_api_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }
        if self.replicate_api_token.is_none() {
            missing.push("REPLICATE_API_TOKEN");
        }
        missing
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |value: &Option<String>| if value.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ProviderCredentials")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("replicate_api_token", &mask(&self.replicate_api_token))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    /// Read `LOG_FORMAT` directly so logging can start before the rest of
    /// the config is parsed.
    pub fn from_env() -> Self {
        Self::parse(env::var("LOG_FORMAT").ok().as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cache_dir: PathBuf,
    /// Public base for locally stored blobs, ending in `/cache`.
    pub cache_base_url: String,
    pub blob_token: Option<String>,
    pub database_url: Option<String>,
    pub credentials: ProviderCredentials,
    pub provider_timeout: Option<Duration>,
    pub history_limit: usize,
    /// Request body limit for `/api/generate`.
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host = get("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match get("APP_PORT") {
            Some(raw) => raw.parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Invalid APP_PORT '{raw}', falling back to {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };
        let bind_address = format!("{host}:{port}");

        let cache_dir = get("CACHE_DIR").map(PathBuf::from).unwrap_or_else(|| {
            let mut base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
            base.push("style-compare");
            base
        });
        let cache_base_url = match get("CACHE_URL") {
            Some(cache_url) => format!("{}/cache", normalize_base_url(&cache_url)),
            None => {
                let domain = get("DOMAIN").unwrap_or(bind_address);
                let base = if domain.starts_with("http://") || domain.starts_with("https://") {
                    domain
                } else {
                    format!("http://{domain}")
                };
                format!("{}/cache", normalize_base_url(&base))
            }
        };

        let provider_timeout = get("PROVIDER_TIMEOUT_SECS").and_then(|raw| {
            match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    tracing::warn!("Invalid PROVIDER_TIMEOUT_SECS '{raw}', leaving calls unbounded");
                    None
                }
            }
        });

        let history_limit = get("HISTORY_LIMIT")
            .and_then(|raw| raw.parse::<usize>().ok())
            .map(|limit| limit.clamp(1, MAX_HISTORY_LIMIT))
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        let max_upload_mb = get("MAX_UPLOAD_MB")
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|mb| *mb > 0)
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);

        let log_format = LogFormat::parse(get("LOG_FORMAT").as_deref());

        Self {
            host,
            port,
            cache_dir,
            cache_base_url,
            blob_token: get("BLOB_READ_WRITE_TOKEN"),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            credentials: ProviderCredentials {
                openai_api_key: get("OPENAI_API_KEY"),
                gemini_api_key: get("GEMINI_API_KEY"),
                replicate_api_token: get("REPLICATE_API_TOKEN"),
            },
            provider_timeout,
            history_limit,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            log_format,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
