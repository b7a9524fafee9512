use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineOptions;
use crate::localtime::LocalZone;

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {var}: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub directory_file: Option<PathBuf>,
    pub zone: LocalZone,
    pub storage_timeout: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and empty values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let zone = match get("HOTEL_UTC_OFFSET") {
            Some(raw) => LocalZone::from_offset_str(&raw).map_err(|_| ConfigError {
                var: "HOTEL_UTC_OFFSET",
                value: raw,
            })?,
            None => LocalZone::utc(),
        };

        Ok(Self {
            bind: get("HOTEL_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("HOTEL_PORT"), "HOTEL_PORT", 4000)?,
            data_dir: get("HOTEL_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            directory_file: get("HOTEL_DIRECTORY_FILE").map(PathBuf::from),
            zone,
            storage_timeout: Duration::from_millis(parse_or(
                get("HOTEL_STORAGE_TIMEOUT_MS"),
                "HOTEL_STORAGE_TIMEOUT_MS",
                5000,
            )?),
            compact_threshold: parse_or(get("HOTEL_COMPACT_THRESHOLD"), "HOTEL_COMPACT_THRESHOLD", 1000)?,
            metrics_port: get("HOTEL_METRICS_PORT")
                .map(|raw| parse_or(Some(raw), "HOTEL_METRICS_PORT", 0))
                .transpose()?,
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            storage_timeout: self.storage_timeout,
            compact_threshold: self.compact_threshold,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| ConfigError { var, value }),
        None => Ok(default),
    }
}
