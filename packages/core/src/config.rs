use std::env;
use std::net::SocketAddr;

use crate::cli::Cli;
use crate::services::distance_matrix::DEFAULT_BASE_URL;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://travel_time_monitor.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub distance_matrix_url: String,
    /// Out-of-band API key. Wins over the stored settings when set.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("bind_addr", &self.bind_addr)
            .field("distance_matrix_url", &self.distance_matrix_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|_| "BIND_ADDR must be a valid socket address")?;

        let distance_matrix_url =
            get("DISTANCE_MATRIX_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let api_key = get("DISTANCE_MATRIX_API_KEY").map(|key| key.trim().to_string());

        Ok(Self {
            database_url,
            bind_addr,
            distance_matrix_url,
            api_key,
        })
    }

    /// CLI flags take precedence over the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, String> {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(addr) = &cli.bind_addr {
            self.bind_addr = addr
                .parse()
                .map_err(|_| format!("Invalid --bind-addr: {}", addr))?;
        }
        if let Some(url) = &cli.distance_matrix_url {
            self.distance_matrix_url = url.clone();
        }
        Ok(self)
    }
}
