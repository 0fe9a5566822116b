//! End-to-end scenarios driven through the real socket server, mirroring
//! the literal request/reply values the control protocol documents.

use std::sync::Arc;
use std::time::Duration;

use steno_core::broadcaster::Broadcaster;
use steno_core::coordinator::CoordinatorConfig;
use steno_core::engine::backends::FakeBackends;
use steno_core::engine::{Engine, EngineConfig};
use steno_core::recognizer::RecognizerEvent;
use steno_core::repository::TranscriptRepository;
use steno_core::summarizer::StubSummarizer;
use steno_core::{Dispatcher, Server};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

struct Harness {
    server: Server,
    socket_path: std::path::PathBuf,
    backends: Arc<FakeBackends>,
}

async fn spawn_harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("steno.sock");
    std::mem::forget(dir);

    let repo = Arc::new(TranscriptRepository::open_in_memory().unwrap());
    let backends = Arc::new(FakeBackends::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let summarizer: Arc<dyn steno_core::summarizer::Summarizer> = Arc::new(StubSummarizer);
    let engine = Arc::new(Engine::new(
        repo,
        backends.clone(),
        summarizer,
        broadcaster.clone(),
        CoordinatorConfig::default(),
        EngineConfig {
            level_tick: Duration::from_millis(20),
            ..EngineConfig::default()
        },
    ));
    let dispatcher = Arc::new(Dispatcher::new(engine, broadcaster));
    let server = Server::bind(socket_path.clone(), dispatcher).await.unwrap();

    Harness {
        server,
        socket_path,
        backends,
    }
}

async fn connect(socket_path: &std::path::Path) -> (tokio::net::unix::OwnedWriteHalf, tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>) {
    let stream = UnixStream::connect(socket_path).await.unwrap();
    let (reader, writer) = stream.into_split();
    (writer, BufReader::new(reader).lines())
}

#[tokio::test]
async fn start_stop_empty_session() {
    let harness = spawn_harness().await;
    let (mut writer, mut lines) = connect(&harness.socket_path).await;

    writer
        .write_all(b"{\"cmd\":\"start\",\"locale\":\"en_US\"}\n")
        .await
        .unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["recording"], true);
    assert!(reply["sessionId"].is_string());

    writer.write_all(b"{\"cmd\":\"stop\"}\n").await.unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply, serde_json::json!({"ok": true, "recording": false}));

    harness.server.stop().await;
}

#[tokio::test]
async fn subscribe_then_receive_a_finalized_segment() {
    let harness = spawn_harness().await;
    harness.backends.push_recognizer_script(vec![RecognizerEvent::Final {
        text: "hello".into(),
        started_at: 0.0,
        ended_at: 1.0,
        confidence: Some(0.95),
    }]);

    let (mut sub_writer, mut sub_lines) = connect(&harness.socket_path).await;
    sub_writer
        .write_all(b"{\"cmd\":\"subscribe\",\"events\":[\"segment\",\"status\"]}\n")
        .await
        .unwrap();
    let reply: serde_json::Value =
        serde_json::from_str(&sub_lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(reply, serde_json::json!({"ok": true}));

    let (mut start_writer, mut start_lines) = connect(&harness.socket_path).await;
    start_writer.write_all(b"{\"cmd\":\"start\"}\n").await.unwrap();
    let start_reply: serde_json::Value =
        serde_json::from_str(&start_lines.next_line().await.unwrap().unwrap()).unwrap();
    let session_id = start_reply["sessionId"].as_str().unwrap().to_string();

    harness
        .backends
        .mic_feed()
        .send(vec![0.0; 160])
        .await
        .unwrap();

    let status_event: serde_json::Value =
        serde_json::from_str(&sub_lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(status_event, serde_json::json!({"event": "status", "recording": true}));

    let segment_event: serde_json::Value =
        serde_json::from_str(&sub_lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(
        segment_event,
        serde_json::json!({
            "event": "segment",
            "text": "hello",
            "source": "microphone",
            "sessionId": session_id,
            "sequenceNumber": 1,
        })
    );

    harness.server.stop().await;
}

#[tokio::test]
async fn recognizer_transient_error_keeps_recording_and_continues_sequencing() {
    let harness = spawn_harness().await;
    harness.backends.push_recognizer_script(vec![RecognizerEvent::Error {
        message: "asr hiccup".into(),
        transient: true,
    }]);
    harness.backends.push_recognizer_script(vec![RecognizerEvent::Final {
        text: "after restart".into(),
        started_at: 0.0,
        ended_at: 1.0,
        confidence: None,
    }]);

    let (mut writer, mut lines) = connect(&harness.socket_path).await;
    writer.write_all(b"{\"cmd\":\"start\"}\n").await.unwrap();
    lines.next_line().await.unwrap().unwrap();

    harness.backends.mic_feed().send(vec![0.0; 160]).await.unwrap();
    // Gives the restarted recognizer task time to come up before the
    // second buffer feeds it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.backends.mic_feed().send(vec![0.0; 160]).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    writer.write_all(b"{\"cmd\":\"status\"}\n").await.unwrap();
    let status: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(status["recording"], true);
    assert_eq!(status["segments"], 1);

    harness.server.stop().await;
}

#[tokio::test]
async fn malformed_command_frame_does_not_close_the_connection() {
    let harness = spawn_harness().await;
    let (mut writer, mut lines) = connect(&harness.socket_path).await;

    writer.write_all(b"not-json\n").await.unwrap();
    let error_reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(
        error_reply,
        serde_json::json!({"ok": false, "error": "Invalid JSON"})
    );

    writer.write_all(b"{\"cmd\":\"status\"}\n").await.unwrap();
    let status_reply: serde_json::Value =
        serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(status_reply["ok"], true);

    harness.server.stop().await;
}
