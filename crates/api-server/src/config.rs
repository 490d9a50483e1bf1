use anyhow::{bail, Context, Result};
use chrono::TimeDelta;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct PulseConfig {
    // Upstream credentials and endpoints
    pub fmp_api_key: String,
    pub fmp_base_url: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub upstream_timeout: Duration,

    // Result cache
    pub cache_ttl_secs: i64,
    pub cache_capacity: u64,

    // HTTP
    pub bind_addr: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl PulseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            fmp_api_key: required(&lookup, "FMP_API_KEY")?,
            fmp_base_url: lookup("FMP_BASE_URL")
                .unwrap_or_else(|| fmp_client::DEFAULT_BASE_URL.to_string()),
            gemini_api_key: required(&lookup, "GEMINI_API_KEY")?,
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| gemini_client::DEFAULT_BASE_URL.to_string()),
            gemini_model: lookup("GEMINI_MODEL")
                .unwrap_or_else(|| gemini_client::DEFAULT_MODEL.to_string()),
            upstream_timeout: Duration::from_secs(parse_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 15u64)?),

            cache_ttl_secs: parse_or(
                &lookup,
                "CACHE_TTL_SECS",
                pulse_orchestrator::DEFAULT_CACHE_TTL_SECS,
            )?,
            cache_capacity: parse_or(
                &lookup,
                "CACHE_CAPACITY",
                pulse_orchestrator::DEFAULT_CACHE_CAPACITY,
            )?,

            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3001u16)?,
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.upstream_timeout.is_zero() {
            bail!("UPSTREAM_TIMEOUT_SECS must be greater than 0");
        }
        if self.cache_ttl_secs < 0 {
            bail!("CACHE_TTL_SECS must not be negative");
        }
        self.cache_ttl()?;
        if self.cache_capacity == 0 {
            bail!("CACHE_CAPACITY must be greater than 0");
        }
        Ok(())
    }

    /// Cache lifetime as a chrono delta; fails for values chrono cannot represent.
    pub fn cache_ttl(&self) -> Result<TimeDelta> {
        TimeDelta::try_seconds(self.cache_ttl_secs)
            .with_context(|| format!("CACHE_TTL_SECS is out of range: {}", self.cache_ttl_secs))
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .with_context(|| format!("Invalid BIND_ADDR/PORT: {}:{}", self.bind_addr, self.port))
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} must be set", name))
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        None => Ok(default),
    }
}
