//! Capability backends the engine depends on beyond the repository:
//! permission checks, device enumeration, and concrete source/recognizer
//! construction. A daemon binary selects one concrete implementation at
//! startup; tests use `FakeBackends`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::audio::{AudioBuffer, AudioFormat, AudioSource, ChannelAudioSource};
use crate::error::{Result, StenoError};
use crate::recognizer::{Recognizer, RecognizerEvent, ScriptedRecognizer};
use crate::repository::SourceKind;

/// Selects concrete audio/recognizer implementations and answers permission
/// and device-enumeration queries. Implementations must be cheap to probe
/// repeatedly — `available_devices` may be called on every `devices` command.
pub trait EngineBackends: Send + Sync {
    fn check_permissions(&self) -> Result<()>;
    fn available_devices(&self) -> Vec<String>;
    fn open_microphone(&self, device: Option<&str>) -> Result<Box<dyn AudioSource>>;
    fn open_system_audio(&self) -> Result<Box<dyn AudioSource>>;
    fn new_recognizer(&self) -> Box<dyn Recognizer>;
}

/// In-memory backend used by tests: sources are `ChannelAudioSource`s whose
/// feed handles are captured for the test to drive, and recognizers replay
/// scripts queued with `push_recognizer_script` (FIFO, one script per
/// `new_recognizer` call; an empty script once the queue is drained).
pub struct FakeBackends {
    permission_ok: AtomicBool,
    devices: Vec<String>,
    scripts: Mutex<VecDeque<Vec<RecognizerEvent>>>,
    mic_feed: Mutex<Option<tokio::sync::mpsc::Sender<AudioBuffer>>>,
    sys_feed: Mutex<Option<tokio::sync::mpsc::Sender<AudioBuffer>>>,
}

impl FakeBackends {
    pub fn new() -> Self {
        Self {
            permission_ok: AtomicBool::new(true),
            devices: vec!["Fake Microphone".to_string()],
            scripts: Mutex::new(VecDeque::new()),
            mic_feed: Mutex::new(None),
            sys_feed: Mutex::new(None),
        }
    }

    pub fn deny_permissions(&self) {
        self.permission_ok.store(false, Ordering::SeqCst);
    }

    /// Queue a recognizer script, consumed FIFO by successive sources.
    pub fn push_recognizer_script(&self, script: Vec<RecognizerEvent>) {
        self.scripts.lock().push_back(script);
    }

    /// The feed handle for the most recently opened microphone source.
    pub fn mic_feed(&self) -> tokio::sync::mpsc::Sender<AudioBuffer> {
        self.mic_feed
            .lock()
            .clone()
            .expect("open_microphone was not called yet")
    }

    pub fn sys_feed(&self) -> tokio::sync::mpsc::Sender<AudioBuffer> {
        self.sys_feed
            .lock()
            .clone()
            .expect("open_system_audio was not called yet")
    }
}

impl Default for FakeBackends {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBackends for FakeBackends {
    fn check_permissions(&self) -> Result<()> {
        if self.permission_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StenoError::PermissionDenied(
                "microphone access not authorized".to_string(),
            ))
        }
    }

    fn available_devices(&self) -> Vec<String> {
        self.devices.clone()
    }

    fn open_microphone(&self, device: Option<&str>) -> Result<Box<dyn AudioSource>> {
        let source = ChannelAudioSource::new(
            device.unwrap_or("Fake Microphone"),
            SourceKind::Microphone,
            AudioFormat::default(),
        );
        *self.mic_feed.lock() = Some(source.feed());
        Ok(Box::new(source))
    }

    fn open_system_audio(&self) -> Result<Box<dyn AudioSource>> {
        let source = ChannelAudioSource::new(
            "System Audio",
            SourceKind::SystemAudio,
            AudioFormat::default(),
        );
        *self.sys_feed.lock() = Some(source.feed());
        Ok(Box::new(source))
    }

    fn new_recognizer(&self) -> Box<dyn Recognizer> {
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        Box::new(ScriptedRecognizer::new(script))
    }
}
