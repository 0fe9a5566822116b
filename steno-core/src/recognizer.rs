//! Recognizer abstraction (component D).
//!
//! A concrete recognizer (a real speech-recognition engine) is an external
//! collaborator out of scope for this crate. This module defines the
//! contract plus `ScriptedRecognizer`, a test double that replays a
//! pre-programmed sequence of events.

use tokio::sync::mpsc;

use crate::audio::{AudioFormat, AudioStream};
use crate::error::Result;

/// One event emitted by a recognizer while it is running.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Best-effort, frequent, superseded text. Never persisted.
    Partial { text: String },
    /// Committed text spanning a recognizer-chosen interval.
    Final {
        text: String,
        started_at: f64,
        ended_at: f64,
        confidence: Option<f32>,
    },
    /// A recognizer-side failure. `transient` indicates the engine may
    /// restart the recognizer in place without tearing the session down.
    Error {
        message: String,
        transient: bool,
    },
}

/// Contract for a speech-recognition backend.
///
/// `start` takes ownership of the buffer stream; the returned event stream
/// ends when the input stream ends or `stop` is called.
pub trait Recognizer: Send {
    fn start(
        &mut self,
        input: AudioStream,
        format: AudioFormat,
        locale: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>>;

    fn stop(&mut self);
}

/// A scripted recognizer that ignores its input stream's contents and
/// replays a fixed sequence of events, one per input buffer received (or,
/// once the script is exhausted, is silent until the input stream ends).
pub struct ScriptedRecognizer {
    script: Vec<RecognizerEvent>,
    stopped: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<RecognizerEvent>) -> Self {
        Self {
            script,
            stopped: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

impl Recognizer for ScriptedRecognizer {
    fn start(
        &mut self,
        mut input: AudioStream,
        _format: AudioFormat,
        _locale: &str,
    ) -> Result<mpsc::Receiver<RecognizerEvent>> {
        let (tx, rx) = mpsc::channel(64);
        let script = self.script.clone();
        let stopped = self.stopped.clone();
        stopped.store(false, std::sync::atomic::Ordering::SeqCst);

        tokio::spawn(async move {
            let mut events = script.into_iter();
            while let Some(_buf) = input.recv().await {
                if stopped.load(std::sync::atomic::Ordering::SeqCst) {
                    break;
                }
                let Some(event) = events.next() else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    fn stop(&mut self) {
        self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
