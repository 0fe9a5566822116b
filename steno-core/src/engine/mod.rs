//! Recording engine (component G): the state machine that wires the
//! repository, audio sources, recognizers and the rolling-summary
//! coordinator together, persists segments in sequence, and aggregates
//! events for the broadcaster.
//!
//! Implemented as a single actor task owning all mutable state (sessions,
//! sequence counters, running sources) behind a command mailbox, so every
//! transition is linearized without locks.

pub mod backends;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::audio::{AudioBuffer, AudioSource};
use crate::broadcaster::{Broadcaster, EventKind};
use crate::coordinator::{Coordinator, CoordinatorConfig, CoordinatorEvent};
use crate::error::{Result, StenoError};
use crate::ipc::event::EngineEvent;
use crate::recognizer::RecognizerEvent;
use crate::repository::models::now_secs;
use crate::repository::{Segment, Session, SessionStatus, SourceKind, TranscriptRepository};
use crate::summarizer::Summarizer;
use backends::EngineBackends;

/// Tuning knobs that aren't part of the coordinator's own configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Minimum spacing between `level` events while recording.
    pub level_tick: Duration,
    /// Window within which a second transient recognizer error on the same
    /// source escalates to a permanent (session-ending) error.
    pub restart_window: Duration,
    /// Bound on how long `stop` waits for an in-flight summarization run.
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level_tick: Duration::from_millis(100),
            restart_window: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// A point-in-time read of everything the `status` command reports.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub session_id: Option<Uuid>,
    pub recording: bool,
    pub segments: u32,
    pub status: String,
    pub device: Option<String>,
    pub system_audio: bool,
}

impl StatusSnapshot {
    fn idle() -> Self {
        Self {
            session_id: None,
            recording: false,
            segments: 0,
            status: "idle".to_string(),
            device: None,
            system_audio: false,
        }
    }
}

enum Msg {
    Start {
        locale: String,
        device: Option<String>,
        system_audio: bool,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    Stop {
        reply: oneshot::Sender<Result<bool>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Devices {
        reply: oneshot::Sender<Vec<String>>,
    },
    SourceMsg {
        source: SourceKind,
        payload: SourcePayload,
    },
    LevelTick,
    Coordinator(CoordinatorEvent),
}

enum SourcePayload {
    Partial(String),
    Final {
        text: String,
        started_at: f64,
        ended_at: f64,
        confidence: Option<f32>,
    },
    /// A source/recognizer failure the engine cannot recover from in place.
    Fatal(String),
    Ended,
}

/// A cheaply-cloneable handle to the running engine actor.
#[derive(Clone)]
pub struct Engine {
    tx: mpsc::Sender<Msg>,
}

impl Engine {
    pub fn new(
        repo: Arc<TranscriptRepository>,
        backends: Arc<dyn EngineBackends>,
        summarizer: Arc<dyn Summarizer>,
        broadcaster: Arc<Broadcaster>,
        coordinator_config: CoordinatorConfig,
        config: EngineConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let actor = Actor {
            repo,
            backends,
            summarizer,
            broadcaster,
            coordinator_config,
            config,
            self_tx: tx.clone(),
            fsm: Fsm::Idle,
        };
        tokio::spawn(actor.run(rx));
        Self { tx }
    }

    /// Begin recording. Only the returned `session_id` and success/failure
    /// are decided here — emitting the resulting `status_changed`/`error`
    /// event caused by *this command* is the caller's job, done after the
    /// reply is written, to preserve the reply-before-event ordering rule.
    pub async fn start(
        &self,
        locale: String,
        device: Option<String>,
        system_audio: bool,
    ) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(Msg::Start {
            locale,
            device,
            system_audio,
            reply,
        })
        .await?;
        rx.await.map_err(|_| actor_gone())?
    }

    /// Stop recording, or no-op if already idle. Returns whether a session
    /// was actually torn down — the caller only emits `status_changed` on
    /// a real transition, per the no-op-has-no-side-effects rule. Same
    /// caller-emits-the-event contract as `start` for the real-transition
    /// case.
    pub async fn stop(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Msg::Stop { reply }).await?;
        rx.await.map_err(|_| actor_gone())?
    }

    pub async fn status(&self) -> StatusSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.send(Msg::Status { reply }).await.is_err() {
            return StatusSnapshot::idle();
        }
        rx.await.unwrap_or_else(|_| StatusSnapshot::idle())
    }

    pub async fn available_devices(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        if self.send(Msg::Devices { reply }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn current_session(&self) -> Option<Uuid> {
        self.status().await.session_id
    }

    pub async fn segment_count(&self) -> u32 {
        self.status().await.segments
    }

    pub async fn current_device(&self) -> Option<String> {
        self.status().await.device
    }

    pub async fn is_system_audio_enabled(&self) -> bool {
        self.status().await.system_audio
    }

    async fn send(&self, msg: Msg) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| actor_gone())
    }
}

fn actor_gone() -> StenoError {
    StenoError::Other(anyhow::anyhow!("engine actor is no longer running"))
}

enum Fsm {
    Idle,
    Recording(Active),
}

struct SourceControl {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

struct Active {
    session: Session,
    next_sequence: u32,
    device: Option<String>,
    system_audio: bool,
    coordinator: Coordinator,
    sources: HashMap<SourceKind, SourceControl>,
    level_mic: Arc<SyncMutex<f32>>,
    level_sys: Arc<SyncMutex<f32>>,
    ticker: JoinHandle<()>,
}

struct Actor {
    repo: Arc<TranscriptRepository>,
    backends: Arc<dyn EngineBackends>,
    summarizer: Arc<dyn Summarizer>,
    broadcaster: Arc<Broadcaster>,
    coordinator_config: CoordinatorConfig,
    config: EngineConfig,
    self_tx: mpsc::Sender<Msg>,
    fsm: Fsm,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Start {
                    locale,
                    device,
                    system_audio,
                    reply,
                } => {
                    let result = self.handle_start(locale, device, system_audio).await;
                    let _ = reply.send(result);
                }
                Msg::Stop { reply } => {
                    let result = self.handle_stop().await;
                    let _ = reply.send(result);
                }
                Msg::Status { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Msg::Devices { reply } => {
                    let _ = reply.send(self.backends.available_devices());
                }
                Msg::SourceMsg { source, payload } => self.handle_source_msg(source, payload).await,
                Msg::LevelTick => self.handle_level_tick(),
                Msg::Coordinator(event) => self.handle_coordinator_event(event),
            }
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        match &self.fsm {
            Fsm::Idle => StatusSnapshot::idle(),
            Fsm::Recording(active) => StatusSnapshot {
                session_id: Some(active.session.id),
                recording: true,
                segments: active.next_sequence - 1,
                status: "recording".to_string(),
                device: active.device.clone(),
                system_audio: active.system_audio,
            },
        }
    }

    async fn handle_start(
        &mut self,
        locale: String,
        device: Option<String>,
        system_audio: bool,
    ) -> Result<Uuid> {
        if matches!(self.fsm, Fsm::Recording(_)) {
            return Err(StenoError::AlreadyRecording);
        }

        self.backends.check_permissions()?;
        let session = self.repo.create_session(&locale)?;

        let mic = match self.backends.open_microphone(device.as_deref()) {
            Ok(source) => source,
            Err(e) => {
                let _ = self.repo.end_session(session.id, SessionStatus::Interrupted);
                return Err(e);
            }
        };
        let sys = if system_audio {
            match self.backends.open_system_audio() {
                Ok(source) => Some(source),
                Err(e) => {
                    let _ = self.repo.end_session(session.id, SessionStatus::Interrupted);
                    return Err(e);
                }
            }
        } else {
            None
        };

        let level_mic = Arc::new(SyncMutex::new(0.0f32));
        let level_sys = Arc::new(SyncMutex::new(0.0f32));

        let (coord_tx, coord_rx) = mpsc::channel(32);
        let coordinator = Coordinator::new(
            self.coordinator_config,
            Arc::clone(&self.repo),
            Arc::clone(&self.summarizer),
            coord_tx,
            session.id,
        );
        tokio::spawn(forward_coordinator_events(coord_rx, self.self_tx.clone()));

        let mut sources = HashMap::new();
        sources.insert(
            SourceKind::Microphone,
            spawn_source(
                SourceKind::Microphone,
                mic,
                Arc::clone(&self.backends),
                locale.clone(),
                Arc::clone(&level_mic),
                self.config.restart_window,
                self.self_tx.clone(),
            ),
        );
        if let Some(sys_source) = sys {
            sources.insert(
                SourceKind::SystemAudio,
                spawn_source(
                    SourceKind::SystemAudio,
                    sys_source,
                    Arc::clone(&self.backends),
                    locale.clone(),
                    Arc::clone(&level_sys),
                    self.config.restart_window,
                    self.self_tx.clone(),
                ),
            );
        }

        let ticker = spawn_level_ticker(self.config.level_tick, self.self_tx.clone());

        self.fsm = Fsm::Recording(Active {
            session: session.clone(),
            next_sequence: 1,
            device,
            system_audio,
            coordinator,
            sources,
            level_mic,
            level_sys,
            ticker,
        });

        Ok(session.id)
    }

    async fn handle_stop(&mut self) -> Result<bool> {
        match std::mem::replace(&mut self.fsm, Fsm::Idle) {
            Fsm::Idle => Ok(false),
            Fsm::Recording(active) => {
                self.teardown(active, SessionStatus::Completed).await;
                Ok(true)
            }
        }
    }

    async fn teardown(&mut self, active: Active, status: SessionStatus) {
        active.ticker.abort();
        for ctrl in active.sources.values() {
            ctrl.stop.notify_waiters();
        }
        for (_, ctrl) in active.sources {
            let _ = ctrl.task.await;
        }
        active.coordinator.shutdown(self.config.shutdown_timeout).await;
        let _ = self.repo.end_session(active.session.id, status);
    }

    /// Tear the active session down for a cause the engine discovered on
    /// its own (no pending client command to order the event against), and
    /// emit the error/status events immediately.
    async fn fail_active_session(&mut self, message: String) {
        if let Fsm::Recording(active) = std::mem::replace(&mut self.fsm, Fsm::Idle) {
            self.teardown(active, SessionStatus::Interrupted).await;
            self.broadcaster.publish(
                EventKind::Error,
                &EngineEvent::Error {
                    message,
                    transient: false,
                },
            );
            self.broadcaster
                .publish(EventKind::Status, &EngineEvent::Status { recording: false });
        }
    }

    async fn handle_source_msg(&mut self, source: SourceKind, payload: SourcePayload) {
        match payload {
            SourcePayload::Partial(text) => {
                if matches!(self.fsm, Fsm::Recording(_)) {
                    self.broadcaster.publish(
                        EventKind::Partial,
                        &EngineEvent::Partial {
                            text,
                            source: source.as_str().to_string(),
                        },
                    );
                }
            }
            SourcePayload::Final {
                text,
                started_at,
                ended_at,
                confidence,
            } => {
                self.handle_final(source, text, started_at, ended_at, confidence).await;
            }
            SourcePayload::Fatal(message) => {
                warn!(%message, source = source.as_str(), "source failed, ending session");
                self.fail_active_session(message).await;
            }
            SourcePayload::Ended => {
                // Informational only: shutdown already awaits this source's
                // task directly in `teardown`.
            }
        }
    }

    async fn handle_final(
        &mut self,
        source: SourceKind,
        text: String,
        started_at: f64,
        ended_at: f64,
        confidence: Option<f32>,
    ) {
        let Fsm::Recording(active) = &mut self.fsm else {
            return;
        };
        let sequence_number = active.next_sequence;
        let session_id = active.session.id;

        let segment = Segment {
            id: Uuid::new_v4(),
            session_id,
            text: text.clone(),
            started_at,
            ended_at,
            confidence,
            sequence_number,
            source,
            created_at: now_secs(),
        };

        match self.repo.append_segment(&segment) {
            Ok(()) => {
                active.next_sequence += 1;
                active.coordinator.on_segment_finalized();
                self.broadcaster.publish(
                    EventKind::Segment,
                    &EngineEvent::Segment {
                        text,
                        source: source.as_str().to_string(),
                        session_id: session_id.to_string(),
                        sequence_number,
                    },
                );
            }
            Err(StenoError::StorageBug(msg)) => {
                error!(%msg, "segment store invariant violated");
                panic!("segment persistence bug: {msg}");
            }
            Err(e) => {
                warn!(error = %e, "storage failure finalizing segment, ending session");
                self.fail_active_session(e.to_string()).await;
            }
        }
    }

    fn handle_level_tick(&self) {
        if let Fsm::Recording(active) = &self.fsm {
            let mic = *active.level_mic.lock();
            let sys = *active.level_sys.lock();
            self.broadcaster
                .publish(EventKind::Level, &EngineEvent::Level { mic, sys });
        }
    }

    fn handle_coordinator_event(&self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::ModelProcessing(flag) => {
                self.broadcaster.publish(
                    EventKind::ModelProcessing,
                    &EngineEvent::ModelProcessing {
                        model_processing: flag,
                    },
                );
            }
            CoordinatorEvent::TopicsUpdated { session_id } => {
                if let Ok(topics) = self.repo.topics_for(session_id) {
                    let title = topics
                        .iter()
                        .map(|t| t.title.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.broadcaster
                        .publish(EventKind::Topics, &EngineEvent::Topics { title });
                }
            }
        }
    }
}

async fn forward_coordinator_events(mut rx: mpsc::Receiver<CoordinatorEvent>, tx: mpsc::Sender<Msg>) {
    while let Some(event) = rx.recv().await {
        if tx.send(Msg::Coordinator(event)).await.is_err() {
            break;
        }
    }
}

fn spawn_level_ticker(period: Duration, tx: mpsc::Sender<Msg>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if tx.send(Msg::LevelTick).await.is_err() {
                break;
            }
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_source(
    source_kind: SourceKind,
    source: Box<dyn AudioSource>,
    backends: Arc<dyn EngineBackends>,
    locale: String,
    level: Arc<SyncMutex<f32>>,
    restart_window: Duration,
    actor_tx: mpsc::Sender<Msg>,
) -> SourceControl {
    let stop = Arc::new(Notify::new());
    let task = tokio::spawn(run_source(
        source_kind,
        source,
        backends,
        locale,
        level,
        restart_window,
        actor_tx,
        Arc::clone(&stop),
    ));
    SourceControl { stop, task }
}

fn rms(buf: &[f32]) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = buf.iter().map(|s| s * s).sum();
    (sum_sq / buf.len() as f32).sqrt()
}

/// Drives one source end to end: captures audio, feeds it to a recognizer,
/// forwards recognizer events up to the actor, and restarts the recognizer
/// in place on one transient error before escalating.
async fn run_source(
    source_kind: SourceKind,
    mut source: Box<dyn AudioSource>,
    backends: Arc<dyn EngineBackends>,
    locale: String,
    level: Arc<SyncMutex<f32>>,
    restart_window: Duration,
    actor_tx: mpsc::Sender<Msg>,
    stop_notify: Arc<Notify>,
) {
    let (mut audio_stream, format) = match source.start() {
        Ok(v) => v,
        Err(e) => {
            send(&actor_tx, source_kind, SourcePayload::Fatal(e.to_string())).await;
            send(&actor_tx, source_kind, SourcePayload::Ended).await;
            return;
        }
    };

    let mut last_restart: Option<Instant> = None;

    'restart: loop {
        let mut recognizer = backends.new_recognizer();
        let (fwd_tx, fwd_rx) = mpsc::channel::<AudioBuffer>(64);
        let mut events = match recognizer.start(fwd_rx, format, &locale) {
            Ok(events) => events,
            Err(e) => {
                send(&actor_tx, source_kind, SourcePayload::Fatal(e.to_string())).await;
                break 'restart;
            }
        };

        loop {
            tokio::select! {
                _ = stop_notify.notified() => {
                    recognizer.stop();
                    source.stop();
                    break 'restart;
                }
                buf = audio_stream.recv() => {
                    match buf {
                        Some(b) => {
                            *level.lock() = rms(&b);
                            if fwd_tx.send(b).await.is_err() {
                                break 'restart;
                            }
                        }
                        None => {
                            recognizer.stop();
                            send(&actor_tx, source_kind, SourcePayload::Fatal("audio source ended unexpectedly".to_string())).await;
                            break 'restart;
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(RecognizerEvent::Partial { text }) => {
                            send(&actor_tx, source_kind, SourcePayload::Partial(text)).await;
                        }
                        Some(RecognizerEvent::Final { text, started_at, ended_at, confidence }) => {
                            send(&actor_tx, source_kind, SourcePayload::Final { text, started_at, ended_at, confidence }).await;
                        }
                        Some(RecognizerEvent::Error { message, transient: true }) => {
                            let now = Instant::now();
                            let escalate = last_restart
                                .map(|t| now.duration_since(t) < restart_window)
                                .unwrap_or(false);
                            recognizer.stop();
                            if escalate {
                                send(&actor_tx, source_kind, SourcePayload::Fatal(message)).await;
                                break 'restart;
                            }
                            last_restart = Some(now);
                            continue 'restart;
                        }
                        Some(RecognizerEvent::Error { message, transient: false }) => {
                            send(&actor_tx, source_kind, SourcePayload::Fatal(message)).await;
                            break 'restart;
                        }
                        None => {
                            break 'restart;
                        }
                    }
                }
            }
        }
    }

    send(&actor_tx, source_kind, SourcePayload::Ended).await;
}

async fn send(actor_tx: &mpsc::Sender<Msg>, source: SourceKind, payload: SourcePayload) {
    let _ = actor_tx.send(Msg::SourceMsg { source, payload }).await;
}
