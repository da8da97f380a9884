//! Environment-driven runtime configuration.
//!
//! Every setting mirrors the default the reference implementation ships
//! with (`original_source/app/config.py`); nothing here is read from a
//! file — production deployments inject environment variables directly,
//! and `apisched-daemon::main` optionally loads a `.env.local` for dev
//! convenience before `Settings::from_env` is called.

use anyhow::{Context, Result};

pub const ENV_DATABASE_URL: &str = "APISCHED_DATABASE_URL";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: String,
    pub default_timeout_seconds: f64,
    pub max_timeout_seconds: f64,
    pub max_retries: i32,
    pub retry_delay_seconds: f64,
    pub verify_ssl: bool,
    pub max_concurrent_jobs: i64,
    pub misfire_grace_seconds: i64,
    pub api_prefix: String,
    pub scheduler_tz: String,
}

impl Settings {
    /// Build from environment variables, falling back to the reference's
    /// defaults for everything but the database URL, which is required.
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            database_url: std::env::var(ENV_DATABASE_URL)
                .with_context(|| format!("missing env var {ENV_DATABASE_URL}"))?,
            bind_addr: env_or("APISCHED_BIND_ADDR", "127.0.0.1:8080"),
            default_timeout_seconds: env_parse_or("APISCHED_DEFAULT_TIMEOUT_SECONDS", 30.0)?,
            max_timeout_seconds: env_parse_or("APISCHED_MAX_TIMEOUT_SECONDS", 120.0)?,
            max_retries: env_parse_or("APISCHED_MAX_RETRIES", 3)?,
            retry_delay_seconds: env_parse_or("APISCHED_RETRY_DELAY_SECONDS", 1.0)?,
            verify_ssl: env_parse_or("APISCHED_VERIFY_SSL", false)?,
            max_concurrent_jobs: env_parse_or("APISCHED_MAX_CONCURRENT_JOBS", 100)?,
            misfire_grace_seconds: env_parse_or("APISCHED_MISFIRE_GRACE_SECONDS", 60)?,
            api_prefix: env_or("APISCHED_API_PREFIX", "/api/v1"),
            scheduler_tz: env_or("APISCHED_SCHEDULER_TZ", "Asia/Kolkata"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        std::env::remove_var("APISCHED_TEST_UNSET_KEY");
        assert_eq!(env_or("APISCHED_TEST_UNSET_KEY", "fallback"), "fallback");
    }

    #[test]
    fn env_parse_or_rejects_malformed_values() {
        std::env::set_var("APISCHED_TEST_BAD_NUMBER", "not-a-number");
        let result: Result<i32> = env_parse_or("APISCHED_TEST_BAD_NUMBER", 3);
        assert!(result.is_err());
        std::env::remove_var("APISCHED_TEST_BAD_NUMBER");
    }
}
