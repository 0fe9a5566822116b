//! Unix-domain socket control server (component J).
//!
//! One task accepts connections; each connection gets its own read loop.
//! Frames are newline-delimited JSON in both directions. A connection's
//! outbound sink is a bounded-nowhere `UnboundedSender<String>` drained by a
//! dedicated writer task, so a slow reader cannot block the dispatcher or
//! other connections.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::ipc::DaemonCommand;

pub struct Server {
    socket_path: PathBuf,
    accept_task: JoinHandle<()>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl Server {
    /// Bind `socket_path`, removing a stale socket file left behind by a
    /// previous run, and start accepting connections in the background.
    pub async fn bind(socket_path: PathBuf, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        let listener = UnixListener::bind(&socket_path)?;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;
        info!(path = %socket_path.display(), "listening on control socket");

        let shutdown = Arc::new(tokio::sync::Notify::new());
        let accept_task = tokio::spawn(accept_loop(listener, dispatcher, shutdown.clone()));

        Ok(Self {
            socket_path,
            accept_task,
            shutdown,
        })
    }

    /// Stop accepting new connections and unlink the socket file. In-flight
    /// connections are dropped, not drained.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        self.accept_task.abort();
        let _ = self.accept_task.await;
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(listener: UnixListener, dispatcher: Arc<Dispatcher>, shutdown: Arc<tokio::sync::Notify>) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(handle_connection(stream, dispatcher));
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, dispatcher: Arc<Dispatcher>) {
    let client_id = Uuid::new_v4();
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let (sink, mut outbox) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(async move {
        while let Some(line) = outbox.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => line,
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!(%client_id, error = %e, "error reading from client");
                break;
            }
        };

        let command = match DaemonCommand::parse(&line) {
            Ok(cmd) => cmd,
            Err(_) => {
                let reply = crate::ipc::DaemonResponse::err("Invalid JSON").to_line();
                if sink.send(reply).is_err() {
                    break;
                }
                continue;
            }
        };

        let (reply, deferred) = dispatcher.handle(client_id, &sink, command).await;
        if sink.send(reply.to_line()).is_err() {
            break;
        }
        for event in deferred {
            dispatcher.publish_deferred(event);
        }
    }

    debug!(%client_id, "client disconnected");
    dispatcher.broadcaster().forget(client_id);
    drop(sink);
    let _ = writer_task.await;
}

pub fn remove_stale_socket(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::Broadcaster;
    use crate::coordinator::CoordinatorConfig;
    use crate::engine::backends::FakeBackends;
    use crate::engine::{Engine, EngineConfig};
    use crate::repository::TranscriptRepository;
    use crate::summarizer::StubSummarizer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};

    async fn test_server() -> (Server, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("steno.sock");
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
        let dispatcher = Arc::new(Dispatcher::new(engine, broadcaster));
        let server = Server::bind(socket_path.clone(), dispatcher).await.unwrap();
        // Keep the tempdir alive for the socket file's lifetime by leaking it;
        // the OS cleans `/tmp` eventually and the test process is short-lived.
        std::mem::forget(dir);
        (server, socket_path)
    }

    #[tokio::test]
    async fn status_round_trip_over_the_socket() {
        let (server, socket_path) = test_server().await;
        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(b"{\"cmd\":\"status\"}\n").await.unwrap();

        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);
        assert!(reply.contains("\"ok\":true"));
        assert!(reply.contains("\"recording\":false"));

        server.stop().await;
    }

    #[tokio::test]
    async fn malformed_line_gets_an_error_reply_without_closing_the_connection() {
        let (server, socket_path) = test_server().await;
        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        stream.write_all(b"not-json\n").await.unwrap();

        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).contains("Invalid JSON"));

        stream.write_all(b"{\"cmd\":\"status\"}\n").await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).contains("\"ok\":true"));

        server.stop().await;
    }

    #[tokio::test]
    async fn socket_file_is_created_with_owner_only_permissions() {
        let (server, socket_path) = test_server().await;
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        server.stop().await;
    }
}
