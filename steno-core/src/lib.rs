//! # steno-core
//!
//! Local transcription daemon engine: recording state machine, transcript
//! repository, rolling topic summarization and the Unix-socket control
//! protocol.
//!
//! ## Architecture
//!
//! ```text
//! AudioSource (mic/system) ──▶ per-source task ──▶ Recognizer
//!                                                       │
//!                                             Engine actor (single mailbox)
//!                                              │                 │
//!                                     TranscriptRepository   Coordinator ──▶ Summarizer
//!                                                       │
//!                                                  Broadcaster ──▶ control socket clients
//! ```
//!
//! `Engine` serializes all recording-session state behind one actor task;
//! `Dispatcher` and `Server` turn that into the newline-delimited JSON
//! protocol documented in `ipc`.

#![warn(clippy::all)]

pub mod audio;
pub mod broadcaster;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod paths;
pub mod recognizer;
pub mod repository;
pub mod server;
pub mod summarizer;

// Convenience re-exports for the daemon binary.
pub use broadcaster::Broadcaster;
pub use config::{CliOverrides, DaemonConfig};
pub use dispatcher::Dispatcher;
pub use engine::{Engine, EngineConfig};
pub use error::{Result, StenoError};
pub use ipc::{DaemonCommand, DaemonResponse, EngineEvent};
pub use paths::{PidLock, Paths};
pub use server::Server;
