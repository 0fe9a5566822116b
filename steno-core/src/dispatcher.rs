//! Command dispatcher (component I): turns a validated `DaemonCommand`
//! into engine/broadcaster calls and exactly one JSON reply.
//!
//! A command's *own* resulting event (e.g. `status_changed` after `start`)
//! is never published here — it is handed back to the caller as a deferred
//! event and published only after the reply line has been written, which is
//! what gives the reply-before-event ordering guarantee (see the socket
//! server's per-connection loop).

use std::sync::Arc;

use uuid::Uuid;

use crate::broadcaster::{Broadcaster, ClientSink, EventKind};
use crate::engine::Engine;
use crate::error::StenoError;
use crate::ipc::{DaemonCommand, DaemonResponse, EngineEvent};

pub struct Dispatcher {
    engine: Arc<Engine>,
    broadcaster: Arc<Broadcaster>,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { engine, broadcaster }
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Handle one command from `client_id`, whose connection sink is `sink`
    /// (used only by `subscribe`). Returns the reply plus any events that
    /// must be published strictly after the reply is written.
    pub async fn handle(
        &self,
        client_id: Uuid,
        sink: &ClientSink,
        command: DaemonCommand,
    ) -> (DaemonResponse, Vec<EngineEvent>) {
        match command {
            DaemonCommand::Start {
                locale,
                device,
                system_audio,
            } => self.handle_start(locale, device, system_audio).await,
            DaemonCommand::Stop => self.handle_stop().await,
            DaemonCommand::Status => self.handle_status().await,
            DaemonCommand::Devices => self.handle_devices().await,
            DaemonCommand::Subscribe { events } => {
                self.handle_subscribe(client_id, sink, events)
            }
            DaemonCommand::Unknown(cmd) => (
                DaemonResponse::err(format!("Unknown command: {cmd}")),
                Vec::new(),
            ),
        }
    }

    async fn handle_start(
        &self,
        locale: Option<String>,
        device: Option<String>,
        system_audio: Option<bool>,
    ) -> (DaemonResponse, Vec<EngineEvent>) {
        let locale = locale.unwrap_or_else(|| "en_US".to_string());
        match self
            .engine
            .start(locale, device, system_audio.unwrap_or(false))
            .await
        {
            Ok(session_id) => (
                DaemonResponse {
                    session_id: Some(session_id.to_string()),
                    recording: Some(true),
                    ..DaemonResponse::ok()
                },
                vec![EngineEvent::Status { recording: true }],
            ),
            Err(StenoError::AlreadyRecording) => {
                (DaemonResponse::err("already recording"), Vec::new())
            }
            Err(e) => (
                DaemonResponse::err(e.to_string()),
                vec![
                    EngineEvent::Error {
                        message: e.to_string(),
                        transient: false,
                    },
                    EngineEvent::Status { recording: false },
                ],
            ),
        }
    }

    async fn handle_stop(&self) -> (DaemonResponse, Vec<EngineEvent>) {
        let transitioned = self.engine.stop().await.unwrap_or(false);
        let events = if transitioned {
            vec![EngineEvent::Status { recording: false }]
        } else {
            Vec::new()
        };
        (
            DaemonResponse {
                recording: Some(false),
                ..DaemonResponse::ok()
            },
            events,
        )
    }

    async fn handle_status(&self) -> (DaemonResponse, Vec<EngineEvent>) {
        let snapshot = self.engine.status().await;
        (
            DaemonResponse {
                session_id: snapshot.session_id.map(|id| id.to_string()),
                recording: Some(snapshot.recording),
                segments: Some(snapshot.segments),
                status: Some(snapshot.status),
                device: snapshot.device,
                system_audio: Some(snapshot.system_audio),
                ..DaemonResponse::ok()
            },
            Vec::new(),
        )
    }

    async fn handle_devices(&self) -> (DaemonResponse, Vec<EngineEvent>) {
        let devices = self.engine.available_devices().await;
        (
            DaemonResponse {
                devices: Some(devices),
                ..DaemonResponse::ok()
            },
            Vec::new(),
        )
    }

    fn handle_subscribe(
        &self,
        client_id: Uuid,
        sink: &ClientSink,
        events: Option<Vec<String>>,
    ) -> (DaemonResponse, Vec<EngineEvent>) {
        let kinds = events
            .unwrap_or_default()
            .iter()
            .filter_map(|s| EventKind::parse(s))
            .collect();
        self.broadcaster.subscribe(client_id, sink.clone(), kinds);
        (DaemonResponse::ok(), Vec::new())
    }

    /// Publish a deferred event after the reply it is ordered behind has
    /// been written.
    pub fn publish_deferred(&self, event: EngineEvent) {
        let kind = event.kind();
        self.broadcaster.publish(kind, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::engine::backends::FakeBackends;
    use crate::engine::{Engine, EngineConfig};
    use crate::repository::TranscriptRepository;
    use crate::summarizer::StubSummarizer;

    fn test_dispatcher() -> (Dispatcher, Arc<Broadcaster>) {
        let repo = Arc::new(TranscriptRepository::open_in_memory().unwrap());
        let backends = Arc::new(FakeBackends::new());
        let broadcaster = Arc::new(Broadcaster::new());
        let summarizer: Arc<dyn crate::summarizer::Summarizer> = Arc::new(StubSummarizer);
        let engine = Arc::new(Engine::new(
            repo,
            backends,
            summarizer,
            broadcaster.clone(),
            CoordinatorConfig::default(),
            EngineConfig::default(),
        ));
        (Dispatcher::new(engine, broadcaster.clone()), broadcaster)
    }

    #[tokio::test]
    async fn start_reply_matches_the_wire_contract_and_defers_the_status_event() {
        let (dispatcher, _broadcaster) = test_dispatcher();
        let (sink, _rx) = tokio::sync::mpsc::unbounded_channel();
        let (reply, events) = dispatcher
            .handle(
                Uuid::new_v4(),
                &sink,
                DaemonCommand::Start {
                    locale: Some("en_US".into()),
                    device: None,
                    system_audio: None,
                },
            )
            .await;
        assert!(reply.ok);
        assert_eq!(reply.recording, Some(true));
        assert!(reply.session_id.is_some());
        assert_eq!(events, vec![EngineEvent::Status { recording: true }]);
    }

    #[tokio::test]
    async fn stop_from_idle_is_idempotent_and_emits_no_event() {
        let (dispatcher, _broadcaster) = test_dispatcher();
        let (sink, _rx) = tokio::sync::mpsc::unbounded_channel();
        let (reply, events) = dispatcher.handle(Uuid::new_v4(), &sink, DaemonCommand::Stop).await;
        assert!(reply.ok);
        assert_eq!(reply.recording, Some(false));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn unknown_command_reports_the_literal_name() {
        let (dispatcher, _broadcaster) = test_dispatcher();
        let (sink, _rx) = tokio::sync::mpsc::unbounded_channel();
        let (reply, events) = dispatcher
            .handle(Uuid::new_v4(), &sink, DaemonCommand::Unknown("frobnicate".into()))
            .await;
        assert!(!reply.ok);
        assert_eq!(reply.error.as_deref(), Some("Unknown command: frobnicate"));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn subscribe_registers_the_client_sink() {
        let (dispatcher, broadcaster) = test_dispatcher();
        let (sink, _rx) = tokio::sync::mpsc::unbounded_channel();
        let (reply, _events) = dispatcher
            .handle(
                Uuid::new_v4(),
                &sink,
                DaemonCommand::Subscribe {
                    events: Some(vec!["segment".into()]),
                },
            )
            .await;
        assert!(reply.ok);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }
}
