use std::{net::SocketAddr, str::FromStr, time::Duration};

use lotbook_core::constants::QUANTITY_THRESHOLD;
use lotbook_core::errors::{Error, Result};
use rust_decimal::Decimal;

pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: String,
    pub request_timeout: Duration,
    pub reconcile_epsilon: Decimal,
}

impl Config {
    /// Reads the configuration from the process environment, after loading `.env`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr_raw = lookup("LB_LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into());
        let listen_addr: SocketAddr = listen_addr_raw.parse().map_err(|_| {
            Error::InvalidConfigValue(format!("LB_LISTEN_ADDR '{}'", listen_addr_raw))
        })?;

        let db_path = lookup("LB_DB_PATH").unwrap_or_else(|| "./db/lotbook.db".into());

        let timeout_ms: u64 = lookup("LB_REQUEST_TIMEOUT_MS")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(30000);

        let epsilon_raw =
            lookup("LB_RECONCILE_EPSILON").unwrap_or_else(|| QUANTITY_THRESHOLD.to_string());
        let reconcile_epsilon = Decimal::from_str(epsilon_raw.trim())
            .ok()
            .filter(|eps| !eps.is_sign_negative())
            .ok_or_else(|| {
                Error::InvalidConfigValue(format!("LB_RECONCILE_EPSILON '{}'", epsilon_raw))
            })?;

        Ok(Self {
            listen_addr,
            db_path,
            request_timeout: Duration::from_millis(timeout_ms),
            reconcile_epsilon,
        })
    }
}
