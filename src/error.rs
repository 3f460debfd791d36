//! Error types for the live audio pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the live audio pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone unavailable or permission denied
    #[error("device access error: {0}")]
    DeviceAccess(String),

    /// Encoded audio chunk could not be decoded
    #[error("malformed audio blob: {0}")]
    MalformedBlob(String),

    /// A bounded queue refused a new item
    #[error("queue full: {0}")]
    QueueFull(String),

    /// Live session transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// WebSocket protocol error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
