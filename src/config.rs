//! Runtime configuration, read from the environment (and `.env`).

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::models::market::Symbol;
use crate::services::bitget_client::{BITGET_REST_URL, BITGET_WS_URL};
use crate::services::supervisor::SupervisorConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Exchange feeds to run, lower-cased
    pub exchanges: Vec<String>,
    pub bitget_ws_url: String,
    pub bitget_rest_url: String,
    pub bitget_symbols: Vec<Symbol>,
    pub supervisor: SupervisorConfig,
    pub status_bind_addr: SocketAddr,
    pub entity_cache_capacity: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let exchanges = list(&get("EXCHANGES").unwrap_or_else(|| "bitget".to_string()))
            .map(|e| e.to_lowercase())
            .collect();

        let bitget_symbols = list(
            &get("BITGET_SYMBOLS").unwrap_or_else(|| "BTC_USDT,ETH_USDT,ETH_BTC".to_string()),
        )
        .map(|pair| {
            Symbol::from_str(pair).map_err(|e| ConfigError::Invalid {
                name: "BITGET_SYMBOLS",
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

        let supervisor = SupervisorConfig {
            heartbeat_interval: Duration::from_secs(positive(&get, "HEARTBEAT_INTERVAL_SECS", 25)?),
            reconnect_base_delay: Duration::from_millis(positive(&get, "RECONNECT_BASE_DELAY_MS", 500)?),
            reconnect_max_delay: Duration::from_millis(positive(&get, "RECONNECT_MAX_DELAY_MS", 30_000)?),
            drain_timeout: Duration::from_millis(positive(&get, "DRAIN_TIMEOUT_MS", 1_000)?),
            ..SupervisorConfig::default()
        };
        if supervisor.reconnect_max_delay < supervisor.reconnect_base_delay {
            return Err(ConfigError::Invalid {
                name: "RECONNECT_MAX_DELAY_MS",
                reason: "must not be below RECONNECT_BASE_DELAY_MS".to_string(),
            });
        }

        let status_bind_addr = get("STATUS_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "STATUS_BIND_ADDR",
                reason: e.to_string(),
            })?;

        Ok(Self {
            database_url,
            exchanges,
            bitget_ws_url: get("BITGET_WS_URL").unwrap_or_else(|| BITGET_WS_URL.to_string()),
            bitget_rest_url: get("BITGET_REST_URL").unwrap_or_else(|| BITGET_REST_URL.to_string()),
            bitget_symbols,
            supervisor,
            status_bind_addr,
            entity_cache_capacity: positive(&get, "ENTITY_CACHE_CAPACITY", 10_000)?,
        })
    }
}

fn list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn positive<F>(get: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(config.exchanges, vec!["bitget"]);
        assert_eq!(config.bitget_symbols.len(), 3);
        assert_eq!(config.bitget_symbols[2].to_string(), "ETH_BTC");
        assert_eq!(config.supervisor.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(config.supervisor.reconnect_base_delay, Duration::from_millis(500));
        assert_eq!(config.supervisor.drain_timeout, Duration::from_secs(1));
        assert_eq!(config.status_bind_addr.port(), 3000);
        assert_eq!(config.entity_cache_capacity, 10_000);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/md"),
            ("EXCHANGES", "Bitget, demo"),
            ("BITGET_SYMBOLS", "ltc_btc"),
            ("HEARTBEAT_INTERVAL_SECS", "5"),
            ("STATUS_BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.exchanges, vec!["bitget", "demo"]);
        assert_eq!(config.bitget_symbols[0].to_string(), "LTC_BTC");
        assert_eq!(config.supervisor.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.status_bind_addr.port(), 8080);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("HEARTBEAT_INTERVAL_SECS", "0")])),
            Err(ConfigError::Invalid { name: "HEARTBEAT_INTERVAL_SECS", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("DATABASE_URL", "x"), ("BITGET_SYMBOLS", "BTCUSDT")])),
            Err(ConfigError::Invalid { name: "BITGET_SYMBOLS", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                ("DATABASE_URL", "x"),
                ("RECONNECT_BASE_DELAY_MS", "5000"),
                ("RECONNECT_MAX_DELAY_MS", "100"),
            ])),
            Err(ConfigError::Invalid { name: "RECONNECT_MAX_DELAY_MS", .. })
        ));
    }
}
