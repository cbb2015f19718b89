use std::time::Duration;

use crate::api::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TOKEN_STORAGE_KEY: &str = "token";

#[derive(Debug, Clone)]
pub struct Env {
    pub api_base_url: String,
    pub token_storage_key: String,
    pub session_file: Option<String>,
    pub redis_url: Option<String>,
    pub cache_stale_seconds: u64,
    pub cache_gc_seconds: u64,
    pub request_timeout_seconds: Option<u64>,
}

impl Env {
    pub fn load() -> Result<Self, ConfigError> {
        let api_base_url =
            std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let token_storage_key = std::env::var("TOKEN_STORAGE_KEY")
            .unwrap_or_else(|_| DEFAULT_TOKEN_STORAGE_KEY.to_string());

        let session_file = optional_var("SESSION_FILE");
        let redis_url = optional_var("REDIS_URL");

        let cache_stale_seconds = parse_u64("CACHE_STALE_SECONDS")?.unwrap_or(30);
        let cache_gc_seconds = parse_u64("CACHE_GC_SECONDS")?.unwrap_or(300);
        let request_timeout_seconds = parse_u64("REQUEST_TIMEOUT_SECONDS")?;

        Ok(Env {
            api_base_url,
            token_storage_key,
            session_file,
            redis_url,
            cache_stale_seconds,
            cache_gc_seconds,
            request_timeout_seconds,
        })
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.cache_stale_seconds)
    }

    pub fn gc_window(&self) -> Duration {
        Duration::from_secs(self.cache_gc_seconds)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for Env {
    fn default() -> Self {
        Env {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_storage_key: DEFAULT_TOKEN_STORAGE_KEY.to_string(),
            session_file: None,
            redis_url: None,
            cache_stale_seconds: 30,
            cache_gc_seconds: 300,
            request_timeout_seconds: None,
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, expected: "u64 integer" }),
        None => Ok(None),
    }
}
