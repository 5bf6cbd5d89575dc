//! Crate-wide error type.
//!
//! Every pipeline stage reports through this enum so the orchestrator can
//! tell a real failure apart from the shutdown cascade that follows it
//! (`Error::PipeClosed`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// AES accepts 16, 24 or 32 byte keys only.
    #[error("invalid key length {0} (expected 16, 24 or 32 bytes)")]
    InvalidKeyLength(usize),

    #[error("system randomness unavailable: {0}")]
    Entropy(#[from] rand::Error),

    /// The stream ended before a required prefix or trailer was complete.
    #[error("truncated stream: {0}")]
    TruncatedStream(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The peer stage released its channel endpoint. This is the normal
    /// shutdown cascade after some other stage failed; the orchestrator
    /// reports it only when no stage produced a more specific error.
    #[error("pipeline channel closed before the stream completed")]
    PipeClosed,

    #[error("remote command failed on {pod}: {message}")]
    Execution { pod: String, message: String },

    #[error("upload failed: {0}")]
    Upload(#[from] object_store::Error),

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Config(String),
}
