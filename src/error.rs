//! Error types for the room hub
//!
//! Defines connection-level errors and actor mailbox send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// None of these are fatal to the process; they end a single connection
/// or, for `Config`, abort startup.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol or handshake error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The hub actor is gone and can no longer accept clients
    #[error("Hub closed")]
    HubClosed,

    /// Upgrade request carried no usable `name` query parameter
    #[error("Missing client name")]
    MissingName,

    /// Bad command line configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Actor mailbox send errors
///
/// Occurs when attempting to send commands through closed channels.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

impl From<SendError> for AppError {
    fn from(_: SendError) -> Self {
        AppError::HubClosed
    }
}
