use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use murmur_api::rate_limit::RateLimitConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub rate_limit: RateLimitConfig,
    pub log_buffer: usize,
    pub directory: Option<DirectoryConfig>,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub url: String,
    pub secret_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let directory = match (lookup("MURMUR_DIRECTORY_URL"), lookup("MURMUR_DIRECTORY_KEY")) {
            (Some(url), Some(secret_key)) => Some(DirectoryConfig { url, secret_key }),
            (Some(_), None) => anyhow::bail!("MURMUR_DIRECTORY_URL is set but MURMUR_DIRECTORY_KEY is not"),
            _ => None,
        };

        Ok(Self {
            host: string("MURMUR_HOST", "0.0.0.0"),
            port: parse(&lookup, "MURMUR_PORT", 3000)?,
            db_path: string("MURMUR_DB_PATH", "murmur.db"),
            jwt_secret: string("MURMUR_JWT_SECRET", "dev-secret-change-me"),
            rate_limit: RateLimitConfig {
                max_requests: parse(&lookup, "RATE_LIMIT_MAX", 60)?,
                window: Duration::from_millis(parse(&lookup, "RATE_LIMIT_WINDOW_MS", 60_000)?),
            },
            log_buffer: parse(&lookup, "MURMUR_LOG_BUFFER", 1000)?,
            directory,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("Invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
