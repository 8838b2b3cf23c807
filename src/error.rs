//! Error type shared by the proxy core and its ambient layers.
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can end a session or abort startup.
///
/// The session-level kinds never escalate past the worker that ran the
/// session; only `Config` and I/O failures during startup reach `main`.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed, truncated or wrong-version input. The connection is
    /// closed without a reply.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The client presented credentials that do not match.
    #[error("authentication rejected for user {0:?}")]
    AuthRejected(String),

    /// A command or address type this server does not implement.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Name resolution or the outbound dial failed.
    #[error("destination unreachable: {0}")]
    Unreachable(String),

    /// A socket operation ran past its deadline.
    #[error("operation timed out")]
    Timeout,

    /// No worker claimed the connection within the wait timeout.
    #[error("no worker available")]
    QueueSaturated,

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn protocol<S: Into<String>>(desc: S) -> Self {
        Self::Protocol(desc.into())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
