//! Error types for the partner bot.

use std::time::Duration;

/// Top-level error type for process setup and the binary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download file on channel {name}: {reason}")]
    DownloadFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Blob storage errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("No media stored for id {0}")]
    NotFound(i64),

    #[error("Media record error: {0}")]
    Database(#[from] DatabaseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cache store errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Backend(String),

    #[error("Cached value is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A user answer that failed validation. The session re-prompts the same
/// question and nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("Name is longer than {max} characters")]
    NameTooLong { max: usize },

    #[error("Mobile number must be exactly 11 digits")]
    InvalidMobile,

    #[error("Unknown English level: {0:?}")]
    InvalidEnglishLevel(String),

    #[error("Unknown gender: {0:?}")]
    InvalidGender(String),

    #[error("Unknown gender filter: {0:?}")]
    InvalidGenderFilter(String),

    #[error("Expected a photo upload")]
    MissingPhoto,

    #[error("Expected a text answer")]
    ExpectedText,
}

/// Navigation errors over the cached match list.
#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// The cached list is absent or expired; a fresh search is needed.
    #[error("Cached match list is unavailable")]
    CacheUnavailable,

    /// The cursor already points at the last candidate.
    #[error("No more candidates in the cached match list")]
    NoMoreCandidates,

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Rate limiter rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("View limit reached, retry after {remaining:?}")]
    Cooldown { remaining: Duration },
}

/// Follow-request workflow errors.
#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("A follow request from {requester_id} to {target_id} is already pending")]
    AlreadyRequested { requester_id: i64, target_id: i64 },

    #[error("No pending follow request from {requester_id} to {target_id}")]
    NotFound { requester_id: i64, target_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Everything that can go wrong while the session controller handles one
/// inbound event.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pagination error: {0}")]
    Pagination(#[from] PaginationError),

    #[error("Rate limited: {0}")]
    RateLimited(#[from] RateLimitError),

    #[error("Follow error: {0}")]
    Follow(#[from] FollowError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Result type alias for process-level operations.
pub type Result<T> = std::result::Result<T, Error>;
