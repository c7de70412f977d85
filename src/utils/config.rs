use std::fmt;
use std::str::FromStr;

use ini::Ini;
use serde::Serialize;

use crate::storage::StoreBackend;
use crate::utils::cli::Cli;
use crate::utils::constants::*;
use crate::utils::types::Address;

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "failed to read config file: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fully resolved node configuration. Values come from the ini file given
/// via --config, CLI flags override the file, and everything else falls
/// back to the defaults in [`crate::utils::constants`].
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub grpc_address: Address,
    pub web_address: Option<Address>,
    pub peer: Option<Address>,
    pub dev_mode: bool,

    pub successor_list_size: usize,
    pub finger_bits: u32,
    pub retry_budget: u32,

    pub stabilize_period_ms: u64,
    pub check_predecessor_period_ms: u64,
    pub fix_fingers_period_ms: u64,
    pub rejoin_period_ms: u64,
    pub replication_period_ms: u64,

    pub store_backend: StoreBackend,
    pub store_root: Option<String>,
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
        let ini = match &cli.config {
            Some(path) => {
                Some(Ini::load_from_file(path).map_err(|e| ConfigError::Io(e.to_string()))?)
            }
            None => None,
        };

        let node = |key: &str| lookup(&ini, "node", key);
        let ring = |key: &str| lookup(&ini, "ring", key);
        let storage = |key: &str| lookup(&ini, "storage", key);

        let grpc_address = cli
            .grpc
            .clone()
            .or_else(|| node("grpc_address"))
            .ok_or_else(|| ConfigError::Invalid("no gRPC address given".to_string()))?;

        let store_backend: StoreBackend = match cli.store.clone().or_else(|| storage("backend")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown store backend '{}'", raw)))?,
            None => StoreBackend::Memory,
        };
        let store_root = cli.store_root.clone().or_else(|| storage("root"));
        if store_backend == StoreBackend::File && store_root.is_none() {
            return Err(ConfigError::Invalid(
                "file store backend requires a root path".to_string(),
            ));
        }

        let finger_bits: u32 = parse(ring("finger_bits"), "finger_bits", 64)?;
        if finger_bits != 64 {
            return Err(ConfigError::Invalid(format!(
                "finger_bits must be 64 for 64 bit identifiers, got {}",
                finger_bits
            )));
        }

        let successor_list_size: usize = parse(
            ring("successor_cache_size"),
            "successor_cache_size",
            DEFAULT_SUCCESSOR_LIST_SIZE,
        )?;
        if successor_list_size == 0 {
            return Err(ConfigError::Invalid(
                "successor_cache_size must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            grpc_address,
            web_address: cli.web.clone().or_else(|| node("web_address")),
            peer: cli.peer.clone().or_else(|| node("peer")),
            dev_mode: cli.dev || parse(node("dev_mode"), "dev_mode", false)?,
            successor_list_size,
            finger_bits,
            retry_budget: parse(ring("retry_budget"), "retry_budget", DEFAULT_RETRY_BUDGET)?,
            stabilize_period_ms: parse(
                ring("stabilize_period_ms"),
                "stabilize_period_ms",
                DEFAULT_STABILIZE_PERIOD_MILLIS,
            )?,
            check_predecessor_period_ms: parse(
                ring("check_predecessor_period_ms"),
                "check_predecessor_period_ms",
                DEFAULT_CHECK_PREDECESSOR_PERIOD_MILLIS,
            )?,
            fix_fingers_period_ms: parse(
                ring("fix_fingers_period_ms"),
                "fix_fingers_period_ms",
                DEFAULT_FIX_FINGERS_PERIOD_MILLIS,
            )?,
            rejoin_period_ms: parse(
                ring("rejoin_period_ms"),
                "rejoin_period_ms",
                DEFAULT_REJOIN_PERIOD_MILLIS,
            )?,
            replication_period_ms: parse(
                ring("replication_period_ms"),
                "replication_period_ms",
                DEFAULT_REPLICATION_PERIOD_MILLIS,
            )?,
            store_backend,
            store_root,
        })
    }
}

fn lookup(ini: &Option<Ini>, section: &str, key: &str) -> Option<String> {
    ini.as_ref()
        .and_then(|ini| ini.section(Some(section)))
        .and_then(|section| section.get(key))
        .map(|value| value.to_string())
}

fn parse<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("cannot parse '{}' for key {}", raw, key))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_grpc() -> Cli {
        Cli {
            config: None,
            grpc: Some("127.0.0.1:5601".to_string()),
            web: None,
            peer: None,
            store: None,
            store_root: None,
            dev: false,
        }
    }

    #[test]
    fn defaults_apply_without_config_file() {
        let config = Config::load(&cli_with_grpc()).unwrap();
        assert_eq!(config.successor_list_size, DEFAULT_SUCCESSOR_LIST_SIZE);
        assert_eq!(config.retry_budget, DEFAULT_RETRY_BUDGET);
        assert_eq!(config.stabilize_period_ms, DEFAULT_STABILIZE_PERIOD_MILLIS);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.peer.is_none());
    }

    #[test]
    fn missing_grpc_address_is_rejected() {
        let mut cli = cli_with_grpc();
        cli.grpc = None;
        assert!(Config::load(&cli).is_err());
    }

    #[test]
    fn file_backend_requires_root() {
        let mut cli = cli_with_grpc();
        cli.store = Some("file".to_string());
        assert!(Config::load(&cli).is_err());

        cli.store_root = Some("/tmp/ringdht".to_string());
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.store_backend, StoreBackend::File);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut cli = cli_with_grpc();
        cli.store = Some("cloud".to_string());
        assert!(Config::load(&cli).is_err());
    }
}
