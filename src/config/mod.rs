use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::endpoint::{EndpointError, EndpointTarget};

const PREFIX: &str = "LOGDNA_RELAY_";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    Gzip,
    None,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LOGDNA_RELAY_HOST is required but not set")]
    HostMissing,

    #[error("LOGDNA_RELAY_TOKEN is required but not set")]
    TokenMissing,

    #[error("invalid ingestion endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} must be greater than zero")]
    Zero(String),

    #[error("LOGDNA_RELAY_COMPRESSION has invalid value: {0} (expected \"gzip\" or \"none\")")]
    InvalidCompression(String),
}

#[derive(Debug)]
pub struct Config {
    pub endpoint: EndpointTarget,
    pub batch_max_records: usize,
    pub flush_interval: Duration,
    pub export_timeout: Duration,
    /// `None` leaves concurrent deliveries unbounded.
    pub max_in_flight: Option<usize>,
    pub intake_capacity: usize,
    pub compression: Compression,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(PREFIX) || k == "HOSTNAME")
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let host = required(vars, "LOGDNA_RELAY_HOST", ConfigError::HostMissing)?;
        let token = required(vars, "LOGDNA_RELAY_TOKEN", ConfigError::TokenMissing)?;
        let tags = vars.get("LOGDNA_RELAY_TAGS").map(String::as_str).unwrap_or("");
        let hostname = vars
            .get("LOGDNA_RELAY_HOSTNAME")
            .or_else(|| vars.get("HOSTNAME"))
            .map(String::as_str)
            .unwrap_or("");
        let endpoint = EndpointTarget::build(host, token, tags, hostname)?;

        let batch_max_records = parse_positive(vars, "LOGDNA_RELAY_BATCH_MAX_RECORDS", 10_000)?;
        let flush_interval = Duration::from_millis(parse_positive(
            vars,
            "LOGDNA_RELAY_FLUSH_TIMEOUT_MS",
            1000,
        )? as u64);
        let export_timeout = parse_duration_ms(vars, "LOGDNA_RELAY_EXPORT_TIMEOUT_MS", 5000)?;
        let max_in_flight = parse_max_in_flight(vars, "LOGDNA_RELAY_MAX_IN_FLIGHT")?;
        let intake_capacity = parse_positive(vars, "LOGDNA_RELAY_INTAKE_CAPACITY", 1024)?;
        let compression = parse_compression(vars)?;

        Ok(Self {
            endpoint,
            batch_max_records,
            flush_interval,
            export_timeout,
            max_in_flight,
            intake_capacity,
            compression,
        })
    }
}

fn required<'a>(
    vars: &'a HashMap<String, String>,
    name: &str,
    missing: ConfigError,
) -> Result<&'a str, ConfigError> {
    vars.get(name)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(missing)
}

fn parse_usize(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match parse_usize(vars, name, default)? {
        0 => Err(ConfigError::Zero(name.to_owned())),
        n => Ok(n),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn parse_max_in_flight(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<usize>, ConfigError> {
    match parse_usize(vars, name, 0)? {
        0 => Ok(None),
        n => Ok(Some(n)),
    }
}

fn parse_compression(vars: &HashMap<String, String>) -> Result<Compression, ConfigError> {
    match vars.get("LOGDNA_RELAY_COMPRESSION").map(|s| s.as_str()) {
        Some("none") | Some("") | None => Ok(Compression::None),
        Some("gzip") => Ok(Compression::Gzip),
        Some(other) => Err(ConfigError::InvalidCompression(other.to_owned())),
    }
}
