use crate::shared::error::{BrokerError, BrokerResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tablebroker_core::ConnectionDescriptor;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_PORT: u16 = 1521;
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Memory,
    Postgres,
}

/// Settings the lifecycle service needs at request time.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub async_mode: bool,
    pub admin_connection: ConnectionDescriptor,
    pub db_host: String,
    pub db_port: u16,
    pub backend_timeout: Duration,
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub listen_addr: SocketAddr,
    pub catalog_path: Option<PathBuf>,
    pub backend: BackendChoice,
    pub lifecycle: LifecycleSettings,
}

impl BrokerConfig {
    pub fn from_env() -> BrokerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> BrokerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let listen_addr = get("BROKER_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| BrokerError::Configuration(format!("BROKER_LISTEN_ADDR: {e}")))?;

        let async_mode = match get("BROKER_ASYNC") {
            Some(raw) => parse_bool("BROKER_ASYNC", &raw)?,
            None => false,
        };

        let admin_connection = get("DB_CONN_STR")
            .ok_or_else(|| BrokerError::Configuration("DB_CONN_STR is required".to_string()))?
            .parse::<ConnectionDescriptor>()
            .map_err(|e| BrokerError::Configuration(format!("DB_CONN_STR: {e}")))?;

        let db_host = get("DB_HOST").unwrap_or_else(|| admin_connection.host.clone());

        let db_port = match get("DB_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| BrokerError::Configuration(format!("DB_PORT: {e}")))?,
            None => admin_connection.port.unwrap_or(DEFAULT_DB_PORT),
        };

        let backend_timeout_secs = match get("BACKEND_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    BrokerError::Configuration(format!(
                        "BACKEND_TIMEOUT_SECS must be a positive integer, got '{raw}'"
                    ))
                })?,
            None => DEFAULT_BACKEND_TIMEOUT_SECS,
        };

        let backend = match get("BROKER_BACKEND").as_deref() {
            None | Some("memory") => BackendChoice::Memory,
            Some("postgres") => BackendChoice::Postgres,
            Some(other) => {
                return Err(BrokerError::Configuration(format!(
                    "BROKER_BACKEND must be 'memory' or 'postgres', got '{other}'"
                )))
            }
        };

        Ok(Self {
            listen_addr,
            catalog_path: get("BROKER_CATALOG_PATH").map(PathBuf::from),
            backend,
            lifecycle: LifecycleSettings {
                async_mode,
                admin_connection,
                db_host,
                db_port,
                backend_timeout: Duration::from_secs(backend_timeout_secs),
            },
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> BrokerResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BrokerError::Configuration(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}
