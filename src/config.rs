use std::env;
use std::time::Duration;

use crate::models::{EngineSettings, Id};

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_base_url: String,
    pub bind_addr: String,
    pub backend_timeout_secs: u64,
    pub engine: EngineSettings,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend_base_url = env::var("BACKEND_BASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let backend_timeout_secs = parsed("BACKEND_TIMEOUT_SECS", 30u64);

        let engine = EngineSettings {
            iud_method_id: parsed::<Id>("IUD_METHOD_ID", 4),
            history_cache_ttl: Duration::from_secs(parsed("HISTORY_CACHE_TTL_SECS", 60u64)),
            therapist_cache_ttl: Duration::from_secs(parsed("THERAPIST_CACHE_TTL_SECS", 300u64)),
            therapist_page_size: parsed("THERAPIST_PAGE_SIZE", 20u32),
            session_idle_ttl: Duration::from_secs(parsed("SESSION_IDLE_TTL_SECS", 1800u64)),
        };

        Ok(Self {
            backend_base_url,
            bind_addr,
            backend_timeout_secs,
            engine,
        })
    }
}
