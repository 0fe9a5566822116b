//! Outbound event schema: `{"event": string, ...}`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Partial {
        text: String,
        source: String,
    },
    Level {
        mic: f32,
        sys: f32,
    },
    Segment {
        text: String,
        source: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "sequenceNumber")]
        sequence_number: u32,
    },
    /// Comma-joined topic titles as a change signal; clients read full
    /// topic records from the database.
    Topics {
        title: String,
    },
    Status {
        recording: bool,
    },
    ModelProcessing {
        #[serde(rename = "modelProcessing")]
        model_processing: bool,
    },
    Error {
        message: String,
        transient: bool,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> crate::broadcaster::EventKind {
        use crate::broadcaster::EventKind;
        match self {
            EngineEvent::Partial { .. } => EventKind::Partial,
            EngineEvent::Level { .. } => EventKind::Level,
            EngineEvent::Segment { .. } => EventKind::Segment,
            EngineEvent::Topics { .. } => EventKind::Topics,
            EngineEvent::Status { .. } => EventKind::Status,
            EngineEvent::ModelProcessing { .. } => EventKind::ModelProcessing,
            EngineEvent::Error { .. } => EventKind::Error,
        }
    }
}
