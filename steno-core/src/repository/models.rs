//! Entities persisted by the transcript repository.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous recording. Exactly one may have `status = Active` at a time,
/// enforced by the engine rather than the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub locale: String,
    pub started_at: f64,
    pub ended_at: Option<f64>,
    pub title: Option<String>,
    pub status: SessionStatus,
    pub created_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Interrupted => "interrupted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "interrupted" => Some(SessionStatus::Interrupted),
            _ => None,
        }
    }
}

/// Which physical source a finalized segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Microphone,
    SystemAudio,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Microphone => "microphone",
            SourceKind::SystemAudio => "system_audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "microphone" => Some(SourceKind::Microphone),
            "system_audio" => Some(SourceKind::SystemAudio),
            _ => None,
        }
    }
}

/// One finalized recognizer output, the atomic unit of transcript data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Uuid,
    pub session_id: Uuid,
    pub text: String,
    pub started_at: f64,
    pub ended_at: f64,
    pub confidence: Option<f32>,
    pub sequence_number: u32,
    pub source: SourceKind,
    pub created_at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Rolling,
    Final,
}

impl SummaryType {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryType::Rolling => "rolling",
            SummaryType::Final => "final",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rolling" => Some(SummaryType::Rolling),
            "final" => Some(SummaryType::Final),
            _ => None,
        }
    }
}

/// An audit record of one rolling summarization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub summary_type: SummaryType,
    pub segment_range_start: u32,
    pub segment_range_end: u32,
    pub model_id: String,
    pub created_at: f64,
}

/// A labelled span over a session's segments, the coordinator's current
/// best understanding of "what was talked about".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: Uuid,
    pub session_id: Uuid,
    pub title: String,
    pub summary: String,
    pub segment_range_start: u32,
    pub segment_range_end: u32,
    pub created_at: f64,
}

/// Current time as seconds since the UNIX epoch, the timestamp
/// representation used throughout the data model.
pub fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
