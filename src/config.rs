//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Limits that shape matching, caching, and browsing.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Maximum candidates returned by one search.
    pub match_limit: usize,
    /// How long a cached match list stays valid.
    pub cache_ttl: Duration,
    /// Candidates a user may view per window.
    pub view_limit: u32,
    /// Length of the rolling view window.
    pub view_window: Duration,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            match_limit: 10,
            cache_ttl: Duration::from_secs(12 * 3600), // 12 hours
            view_limit: 20,
            view_window: Duration::from_secs(24 * 3600), // 24 hours
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: SecretString,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Directory for uploaded profile photos.
    pub storage_dir: PathBuf,
    /// Port for the status API; disabled when `None`.
    pub http_port: Option<u16>,
    /// Idle time after which a per-user session worker retires.
    pub session_idle: Duration,
    pub matching: MatchSettings,
}

impl BotConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let db_path = std::env::var("PARTNER_DB_PATH")
            .unwrap_or_else(|_| "./data/english-partner.db".to_string());
        let storage_dir =
            std::env::var("PARTNER_STORAGE_DIR").unwrap_or_else(|_| "./storage".to_string());

        let http_port = optional_env::<u16>("PARTNER_HTTP_PORT")?;
        let session_idle_secs = optional_env::<u64>("PARTNER_SESSION_IDLE_SECS")?.unwrap_or(300);

        let defaults = MatchSettings::default();
        let matching = MatchSettings {
            match_limit: optional_env("PARTNER_MATCH_LIMIT")?.unwrap_or(defaults.match_limit),
            cache_ttl: optional_hours("PARTNER_CACHE_TTL_HOURS")?.unwrap_or(defaults.cache_ttl),
            view_limit: optional_env("PARTNER_VIEW_LIMIT")?.unwrap_or(defaults.view_limit),
            view_window: optional_hours("PARTNER_VIEW_WINDOW_HOURS")?
                .unwrap_or(defaults.view_window),
        };

        if matching.match_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PARTNER_MATCH_LIMIT".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            db_path: PathBuf::from(db_path),
            storage_dir: PathBuf::from(storage_dir),
            http_port,
            session_idle: Duration::from_secs(session_idle_secs),
            matching,
        })
    }
}

/// Longest accepted `*_HOURS` value (ten years).
const MAX_HOURS: u64 = 24 * 365 * 10;

/// Read an optional whole-hours duration, bounded by `MAX_HOURS`.
fn optional_hours(key: &str) -> Result<Option<Duration>, ConfigError> {
    let Some(h) = optional_env::<u64>(key)? else {
        return Ok(None);
    };
    match h.checked_mul(3600) {
        Some(secs) if h <= MAX_HOURS => Ok(Some(Duration::from_secs(secs))),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at most {MAX_HOURS} hours"),
        }),
    }
}

/// Read and parse an optional environment variable.
fn optional_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
