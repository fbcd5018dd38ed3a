//! Environment configuration for the service binary.

use std::time::Duration;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Poll period for Postgres-backed watches.
    pub watch_poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT is not a valid port number")?;
        let watch_poll_ms: u64 = std::env::var("WATCH_POLL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .context("WATCH_POLL_MS is not a valid millisecond count")?;
        Ok(Self {
            database_url,
            port,
            watch_poll_interval: Duration::from_millis(watch_poll_ms),
        })
    }
}
