use anyhow::Context;
use chrono::Duration;

use crate::sas::builder::DEFAULT_TIME_TO_LIVE_SECS;
use crate::sas::grammar::SHARED_ACCESS_SIGNATURE;
use crate::sas::refresh::DEFAULT_BUFFER_PERCENT;
use crate::sas::RefreshPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Validity of generated tokens in seconds.
    /// Set via SASTOKEN_TTL_SECS. Default: 3600.
    pub ttl_secs: i64,
    /// Label used when inspecting or verifying tokens.
    /// Set via SASTOKEN_POLICY_NAME. Default: SharedAccessSignature.
    pub policy_name: String,
    /// Share of a token's lifetime reserved for renewal.
    /// Set via SASTOKEN_REFRESH_BUFFER_PERCENT. Default: 15.
    pub refresh_buffer_percent: u8,
}

impl Config {
    pub fn time_to_live(&self) -> anyhow::Result<Duration> {
        ttl_from_secs(self.ttl_secs)
    }

    pub fn refresh_policy(&self) -> anyhow::Result<RefreshPolicy> {
        Ok(RefreshPolicy::new(self.refresh_buffer_percent)?)
    }
}

/// Token validity from a positive number of seconds.
pub fn ttl_from_secs(secs: i64) -> anyhow::Result<Duration> {
    if secs <= 0 {
        anyhow::bail!("time to live must be positive, got {}", secs);
    }
    Duration::try_seconds(secs)
        .ok_or_else(|| anyhow::anyhow!("time to live of {} seconds is out of range", secs))
}

/// Loads `.env` into the process environment, then reads settings from it.
/// Flags that fall back to the environment (SASTOKEN_CONNECTION_STRING,
/// SASTOKEN_KEY) see `.env` values as well once this has run.
pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let ttl_secs = match std::env::var("SASTOKEN_TTL_SECS") {
        Ok(v) => parse_ttl_secs(&v)?,
        Err(_) => DEFAULT_TIME_TO_LIVE_SECS,
    };

    let refresh_buffer_percent = match std::env::var("SASTOKEN_REFRESH_BUFFER_PERCENT") {
        Ok(v) => parse_buffer_percent(&v)?,
        Err(_) => DEFAULT_BUFFER_PERCENT,
    };

    Ok(Config {
        ttl_secs,
        policy_name: std::env::var("SASTOKEN_POLICY_NAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| SHARED_ACCESS_SIGNATURE.into()),
        refresh_buffer_percent,
    })
}

fn parse_ttl_secs(value: &str) -> anyhow::Result<i64> {
    let secs = value
        .trim()
        .parse::<i64>()
        .map_err(|e| anyhow::anyhow!("SASTOKEN_TTL_SECS must be a number of seconds: {}", e))?;
    ttl_from_secs(secs).context("invalid SASTOKEN_TTL_SECS")?;
    Ok(secs)
}

fn parse_buffer_percent(value: &str) -> anyhow::Result<u8> {
    let percent = value.trim().parse::<u8>().map_err(|e| {
        anyhow::anyhow!("SASTOKEN_REFRESH_BUFFER_PERCENT must be a percentage: {}", e)
    })?;
    if percent >= 100 {
        anyhow::bail!(
            "SASTOKEN_REFRESH_BUFFER_PERCENT must be below 100, got {}",
            percent
        );
    }
    Ok(percent)
}
