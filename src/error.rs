//! Error types for the teleop driver
//!
//! Channel-level failures stay local to the loop that owns the channel;
//! only configuration errors abort the process.

use thiserror::Error;

/// Errors produced by the teleop core
#[derive(Debug, Error)]
pub enum TeleopError {
    /// Startup configuration problem (missing credential, bad URL).
    /// Fatal: reported before any channel is opened.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to open a channel within the connect timeout
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// WebSocket transport failure on an established channel
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Command payload could not be serialized
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The remote closed the channel
    #[error("channel closed by remote")]
    ChannelClosed,
}
