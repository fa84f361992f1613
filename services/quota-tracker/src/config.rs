use std::env;

use anyhow::{Context, Result};
use chrono::Duration;

use crate::tracker::{RolloverAnchor, WindowPolicy};

#[derive(Debug, Clone)]
pub struct QuotaTrackerConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Base URL of the remote record store. Records are kept in memory when unset.
    pub store_url: Option<String>,
    pub store_token: Option<String>,
    pub quota_sheet: String,
    pub registry_sheet: String,
    pub store_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub default_limit: u32,
    pub window_length: Duration,
    pub rollover_anchor: RolloverAnchor,
    /// Identity that bypasses quota checks entirely.
    pub owner_id: Option<String>,
    pub log_level: String,
}

impl Default for QuotaTrackerConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8183,
            store_url: None,
            store_token: None,
            quota_sheet: "quota".to_string(),
            registry_sheet: "access".to_string(),
            store_timeout_secs: 5,
            request_timeout_secs: 30,
            default_limit: 4,
            window_length: Duration::days(7),
            rollover_anchor: RolloverAnchor::Schedule,
            owner_id: None,
            log_level: "info".to_string(),
        }
    }
}

impl QuotaTrackerConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("QUOTA_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("QUOTA_PORT") {
            cfg.server_port = port.parse().context("QUOTA_PORT must be a valid u16")?;
        }
        cfg.store_url = non_empty_var("STORE_URL");
        cfg.store_token = non_empty_var("STORE_TOKEN");
        if let Ok(sheet) = env::var("QUOTA_SHEET") {
            cfg.quota_sheet = sheet;
        }
        if let Ok(sheet) = env::var("REGISTRY_SHEET") {
            cfg.registry_sheet = sheet;
        }
        if let Ok(secs) = env::var("STORE_TIMEOUT_SECS") {
            cfg.store_timeout_secs = secs
                .parse()
                .context("STORE_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(secs) = env::var("REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout_secs = secs
                .parse()
                .context("REQUEST_TIMEOUT_SECS must be a positive integer")?;
        }
        if let Ok(limit) = env::var("DEFAULT_LIMIT") {
            cfg.default_limit = limit
                .parse()
                .context("DEFAULT_LIMIT must be a positive integer")?;
        }
        if let Ok(window) = env::var("WINDOW_LENGTH") {
            cfg.window_length = parse_window(&window)
                .with_context(|| format!("WINDOW_LENGTH is invalid: {window}"))?;
        }
        if let Ok(anchor) = env::var("ROLLOVER_ANCHOR") {
            cfg.rollover_anchor = parse_anchor(&anchor)?;
        }
        cfg.owner_id = non_empty_var("OWNER_ID");
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_limit == 0 {
            anyhow::bail!("DEFAULT_LIMIT must be greater than zero");
        }
        if self.window_length <= Duration::zero() {
            anyhow::bail!("WINDOW_LENGTH must be greater than zero");
        }
        if self.store_timeout_secs == 0 {
            anyhow::bail!("STORE_TIMEOUT_SECS must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        match (&self.store_url, &self.store_token) {
            (Some(url), Some(_)) => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    anyhow::bail!("STORE_URL must be an http(s) URL");
                }
            }
            (Some(_), None) => anyhow::bail!("STORE_TOKEN is required when STORE_URL is set"),
            (None, Some(_)) => anyhow::bail!("STORE_TOKEN is set but STORE_URL is missing"),
            (None, None) => {}
        }

        Ok(())
    }

    pub fn window_policy(&self) -> WindowPolicy {
        WindowPolicy::new(self.default_limit, self.window_length, self.rollover_anchor)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_anchor(value: &str) -> Result<RolloverAnchor> {
    value
        .trim()
        .parse()
        .with_context(|| format!("ROLLOVER_ANCHOR is invalid: {value}"))
}

/// Parses `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
fn parse_window(value: &str) -> Result<Duration> {
    let value = value.trim();
    let split = value
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: i64 = amount
        .parse()
        .with_context(|| format!("missing amount in {value:?}"))?;

    let duration = match unit.to_ascii_lowercase().as_str() {
        "" | "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        other => anyhow::bail!("unsupported unit {other:?}"),
    };
    duration.ok_or_else(|| anyhow::anyhow!("{value:?} is out of range"))
}
