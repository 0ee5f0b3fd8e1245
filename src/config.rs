use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// Auto-release window for a provisional driver hold. `None` keeps the
    /// hold open until the driver responds or an admin intervenes.
    pub offer_timeout: Option<Duration>,
    pub strict_transitions: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let offer_timeout = match env::var("OFFER_TIMEOUT_MS") {
            Ok(raw) => {
                let ms: u64 = raw
                    .parse()
                    .map_err(|err| AppError::Internal(format!("invalid OFFER_TIMEOUT_MS: {err}")))?;
                Some(Duration::from_millis(ms))
            }
            Err(_) => None,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            offer_timeout,
            strict_transitions: parse_or_default("STRICT_TRANSITIONS", false)?,
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
