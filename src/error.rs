//! Error types
//!
//! Failures are classified by how far they reach:
//!
//! - [`FrameError`]: one frame is skipped, the session continues
//! - [`HandshakeError`]: one connection is closed before a session exists
//! - [`CollaboratorError`]: the worker falls back to unknown / no context / no notification
//! - [`WorkerError`]: fatal to the owning session only
//! - [`Error`]: server-level failures (binding, serving)
//!
//! Queue backpressure is not an error at all; see [`crate::queue::PutOutcome`].

use std::time::Duration;

use thiserror::Error;

/// Result alias for server-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Server-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Socket bind or serve failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A listener task panicked or was cancelled
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Registration handshake failure on an ingestion connection
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No session id arrived within the handshake timeout
    #[error("no session id received within {0:?}")]
    Timeout(Duration),

    /// Peer went away before registering
    #[error("connection closed before registration")]
    Closed,

    /// First message was not a text session id
    #[error("expected a text session id, got a {0} message")]
    UnexpectedMessage(&'static str),

    /// Session id was empty or too long
    #[error("invalid session id: {0:?}")]
    InvalidId(String),

    /// WebSocket transport failure
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// A single inbound or outbound frame could not be handled
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload is below the minimum plausible image size
    #[error("payload of {len} bytes is below the {min} byte minimum")]
    TooSmall {
        /// Received length
        len: usize,
        /// Configured minimum
        min: usize,
    },

    /// Payload is not a decodable still image
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// Annotated image could not be encoded as JPEG
    #[error("failed to encode image: {0}")]
    Encode(String),
}

/// Failure reported by one of the external collaborators
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Face detection or identification failed
    #[error("face matcher failed: {0}")]
    Matcher(String),

    /// Notification delivery failed
    #[error("notifier failed: {0}")]
    Notifier(String),

    /// Owner lookup failed
    #[error("user directory failed: {0}")]
    Directory(String),
}

/// Unrecoverable worker failure; terminates the owning session
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The frame processing task panicked or was cancelled
    #[error("frame processing task failed: {0}")]
    Fatal(String),
}
