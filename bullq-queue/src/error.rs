//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A version string is not valid semver
    #[error("Invalid version '{version}': {source}")]
    VersionParse {
        version: String,
        #[source]
        source: semver::Error,
    },

    /// The server is older than the configured minimum
    #[error("Redis {current} is not supported, {minimum} or newer is required")]
    UnsupportedRedisVersion { current: String, minimum: String },

    /// A stored field is not valid JSON
    #[error("Invalid JSON in field '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Job execution failed
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// No handler registered for job name
    #[error("No handler registered for job: {0}")]
    NoHandler(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Queue is full
    #[error("Queue is full")]
    QueueFull,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Operation timeout")]
    Timeout,
}

impl QueueError {
    /// Name of the field that failed to decode, if this is a decode error.
    pub fn decode_key(&self) -> Option<&str> {
        match self {
            Self::Decode { key, .. } => Some(key),
            _ => None,
        }
    }
}
