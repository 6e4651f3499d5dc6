use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub auto_dispatch_enabled: bool,
    pub dispatch_interval: Duration,
    pub heartbeat_interval: Duration,
    pub in_flight_ttl: Duration,
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            auto_dispatch_enabled: parse_or_default("AUTO_DISPATCH_ENABLED", true)?,
            dispatch_interval: Duration::from_secs(parse_or_default("DISPATCH_INTERVAL_SECS", 30)?),
            heartbeat_interval: Duration::from_secs(parse_or_default("HEARTBEAT_INTERVAL_SECS", 30)?),
            in_flight_ttl: Duration::from_secs(parse_or_default("IN_FLIGHT_TTL_SECS", 5)?),
            seed_file: env::var("SEED_FILE").ok().map(PathBuf::from),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
