//! Error taxonomy for the Steno daemon.
//!
//! One variant family per failure domain: `permission`, `device/source`,
//! `recognizer`, `summarizer`, `storage`, `protocol`, `lifecycle`.

use thiserror::Error;

/// All errors produced by `steno-core`.
#[derive(Debug, Error)]
pub enum StenoError {
    /// Missing microphone or speech-recognition authorization.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Audio source enumeration or capture setup failure.
    #[error("audio source error: {0}")]
    Source(String),

    /// Recognizer failure. `transient` indicates the engine may retry once
    /// in place rather than tearing the session down.
    #[error("recognizer error: {message}")]
    Recognizer { message: String, transient: bool },

    /// Summarizer failure. `retryable` distinguishes `unavailable`/
    /// `rate_limited` (coordinator re-arms) from `invalid_output` (skip).
    #[error("summarizer error: {message}")]
    Summarizer { message: String, retryable: bool },

    /// A session is already active.
    #[error("already recording")]
    AlreadyRecording,

    /// No session is currently active.
    #[error("not recording")]
    NotRecording,

    /// Unique-violation or other storage bug — indicates an engine bug,
    /// the caller should treat this as fatal for the in-flight operation.
    #[error("storage bug: {0}")]
    StorageBug(String),

    /// Malformed command line on the control socket.
    #[error("Invalid JSON")]
    Protocol,

    /// Another daemon instance is already running.
    #[error("another instance is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StenoError>;
