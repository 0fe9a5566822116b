//! Event broadcaster (component H).
//!
//! Holds each subscribed client's sink and event-kind filter, and fans
//! engine events out to them. Delivery is best-effort and single-pass: a
//! write failure drops that subscription rather than buffering.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

/// One line, without its trailing `\n`, destined for a client connection.
pub type ClientSink = UnboundedSender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Partial,
    Level,
    Segment,
    Topics,
    Status,
    ModelProcessing,
    Error,
}

impl EventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "partial" => Some(EventKind::Partial),
            "level" => Some(EventKind::Level),
            "segment" => Some(EventKind::Segment),
            "topics" => Some(EventKind::Topics),
            "status" => Some(EventKind::Status),
            "model_processing" => Some(EventKind::ModelProcessing),
            "error" => Some(EventKind::Error),
            _ => None,
        }
    }
}

struct Subscription {
    sink: ClientSink,
    /// `None` means "all kinds".
    kinds: Option<HashSet<EventKind>>,
}

/// Owns the subscription map. Exclusively mutated here — the socket server
/// only calls `subscribe`/`forget` on it.
#[derive(Default)]
pub struct Broadcaster {
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a client's subscription. An empty or absent
    /// kind set means "all kinds".
    pub fn subscribe(&self, client_id: Uuid, sink: ClientSink, kinds: Vec<EventKind>) {
        let kinds = if kinds.is_empty() {
            None
        } else {
            Some(kinds.into_iter().collect())
        };
        self.subscriptions
            .lock()
            .insert(client_id, Subscription { sink, kinds });
    }

    /// Forget a client's subscription. Idempotent — called both on write
    /// failure and from the server's disconnect callback.
    pub fn forget(&self, client_id: Uuid) {
        self.subscriptions.lock().remove(&client_id);
    }

    /// Encode `payload` once and write it to every subscriber whose filter
    /// includes `kind`. Any write failure removes that subscription.
    pub fn publish<T: Serialize>(&self, kind: EventKind, payload: &T) {
        let Ok(mut frame) = serde_json::to_string(payload) else {
            return;
        };
        frame.push('\n');

        let mut dead = Vec::new();
        {
            let subs = self.subscriptions.lock();
            for (client_id, sub) in subs.iter() {
                let interested = sub
                    .kinds
                    .as_ref()
                    .map(|kinds| kinds.contains(&kind))
                    .unwrap_or(true);
                if !interested {
                    continue;
                }
                if sub.sink.send(frame.clone()).is_err() {
                    dead.push(*client_id);
                }
            }
        }
        if !dead.is_empty() {
            let mut subs = self.subscriptions.lock();
            for client_id in dead {
                debug!(%client_id, "dropping subscription after write failure");
                subs.remove(&client_id);
            }
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}
