//! Summarizer abstraction (component E).
//!
//! A concrete summarizer (a real LLM) is an external collaborator out of
//! scope for this crate. `Summarizer` is a pure functional contract; this
//! module also provides `StubSummarizer`, a deterministic test double.

use async_trait::async_trait;
use uuid::Uuid;

use crate::repository::models::now_secs;
use crate::repository::{Segment, Topic};

/// Why a summarization attempt did not produce a usable topic list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizerError {
    /// Model not ready; the coordinator will retry later.
    Unavailable(String),
    /// Back off; the coordinator will retry later.
    RateLimited(String),
    /// Output failed validation; the coordinator skips this trigger.
    InvalidOutput(String),
}

impl SummarizerError {
    /// `unavailable`/`rate_limited` are retryable; `invalid_output` is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SummarizerError::InvalidOutput(_))
    }
}

/// Given newly-finalized segments and the previously-known topic list,
/// returns the new *complete* topic list for the session.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        session_id: Uuid,
        segments: &[Segment],
        previous_topics: &[Topic],
    ) -> Result<Vec<Topic>, SummarizerError>;
}

/// Deterministic summarizer used in tests and as the default backend before
/// a real model is wired in: titles the single topic after the first two
/// words of the first new segment and spans the full provided range.
pub struct StubSummarizer;

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(
        &self,
        session_id: Uuid,
        segments: &[Segment],
        _previous_topics: &[Topic],
    ) -> Result<Vec<Topic>, SummarizerError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        let first_words: String = segments[0]
            .text
            .split_whitespace()
            .take(2)
            .collect::<Vec<_>>()
            .join(" ");
        let title = if first_words.is_empty() {
            "Untitled".to_string()
        } else {
            first_words
        };
        let start = segments.iter().map(|s| s.sequence_number).min().unwrap();
        let end = segments.iter().map(|s| s.sequence_number).max().unwrap();

        Ok(vec![Topic {
            id: Uuid::new_v4(),
            session_id,
            title,
            summary: format!("Covers segments {start} through {end}."),
            segment_range_start: start,
            segment_range_end: end,
            created_at: now_secs(),
        }])
    }
}
