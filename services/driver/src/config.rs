use std::time::Duration;

use anyhow::{Context, Result};
use doks_reconcile::{FixedRetry, DEFAULT_POLL_INTERVAL};

/// Public DigitalOcean API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub kubeconfig_retry: FixedRetry,
    /// Applied when a host request carries no timeout of its own.
    pub operation_timeout: Duration,
    pub log_level: String,
    /// Serve against the in-process provider instead of DigitalOcean.
    pub dev_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
            kubeconfig_retry: FixedRetry::default(),
            operation_timeout: Duration::from_secs(3600),
            log_level: "info".to_string(),
            dev_mode: false,
        }
    }
}

fn secs(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| {
                    format!("{name} must be a whole number of seconds, got {raw:?}")
                })?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_url = std::env::var("DOKS_API_URL").unwrap_or(defaults.api_url);

        let request_timeout = secs("DOKS_REQUEST_TIMEOUT_SECS", defaults.request_timeout)?;
        let poll_interval = secs("DOKS_POLL_INTERVAL_SECS", defaults.poll_interval)?;
        let operation_timeout = secs("DOKS_OPERATION_TIMEOUT_SECS", defaults.operation_timeout)?;

        let attempts = match std::env::var("DOKS_KUBECONFIG_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| {
                    format!("DOKS_KUBECONFIG_ATTEMPTS must be a positive integer, got {raw:?}")
                })?,
            Err(_) => defaults.kubeconfig_retry.attempts,
        };
        let delay = secs("DOKS_KUBECONFIG_RETRY_DELAY_SECS", defaults.kubeconfig_retry.delay)?;

        let log_level = std::env::var("DOKS_LOG_LEVEL").unwrap_or(defaults.log_level);

        let dev_mode = std::env::var("DOKS_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            api_url,
            request_timeout,
            poll_interval,
            kubeconfig_retry: FixedRetry { attempts, delay },
            operation_timeout,
            log_level,
            dev_mode,
        })
    }
}
