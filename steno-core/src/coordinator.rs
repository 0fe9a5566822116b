//! Rolling summary coordinator (component F).
//!
//! Decides when to invoke the summarizer (segment-count and/or elapsed-time
//! triggers), persists the topics it returns, and emits `topics_updated`.
//! At most one summarization runs per session at a time; additional
//! triggers observed while a run is in flight are coalesced into a single
//! follow-up run.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::models::now_secs;
use crate::repository::{Summary, SummaryType, TranscriptRepository};
use crate::summarizer::{Summarizer, SummarizerError};

/// Events the coordinator emits upward to the engine for re-broadcast.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    ModelProcessing(bool),
    TopicsUpdated { session_id: Uuid },
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub trigger_count: u32,
    pub time_threshold: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            trigger_count: 10,
            time_threshold: Duration::from_secs(120),
        }
    }
}

struct SessionState {
    session_id: Uuid,
    pending_count: AtomicU32,
    last_run_at: Mutex<Instant>,
    running: AtomicBool,
    follow_up_requested: AtomicBool,
    done: Arc<Notify>,
}

/// Owns the rolling-summarization trigger state for the currently active
/// session. Created fresh by the engine each time a session starts.
pub struct Coordinator {
    config: CoordinatorConfig,
    repo: Arc<TranscriptRepository>,
    summarizer: Arc<dyn Summarizer>,
    events_tx: mpsc::Sender<CoordinatorEvent>,
    state: Arc<SessionState>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        repo: Arc<TranscriptRepository>,
        summarizer: Arc<dyn Summarizer>,
        events_tx: mpsc::Sender<CoordinatorEvent>,
        session_id: Uuid,
    ) -> Self {
        Self {
            config,
            repo,
            summarizer,
            events_tx,
            state: Arc::new(SessionState {
                session_id,
                pending_count: AtomicU32::new(0),
                last_run_at: Mutex::new(Instant::now()),
                running: AtomicBool::new(false),
                follow_up_requested: AtomicBool::new(false),
                done: Arc::new(Notify::new()),
            }),
        }
    }

    /// Called once per segment finalized by the engine for this session.
    /// Checks both triggers and launches a summarization run if warranted.
    pub fn on_segment_finalized(&self) {
        let pending = self.state.pending_count.fetch_add(1, Ordering::SeqCst) + 1;
        let elapsed = self.state.last_run_at.lock().elapsed();

        let trigger_fired = pending >= self.config.trigger_count || elapsed >= self.config.time_threshold;
        if !trigger_fired {
            return;
        }

        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // A run is already in flight: coalesce this trigger into a
            // single follow-up once it completes.
            self.state.follow_up_requested.store(true, Ordering::SeqCst);
            return;
        }

        self.spawn_run();
    }

    fn spawn_run(&self) {
        let state = Arc::clone(&self.state);
        let repo = Arc::clone(&self.repo);
        let summarizer = Arc::clone(&self.summarizer);
        let events_tx = self.events_tx.clone();
        let config = self.config;

        tokio::spawn(async move {
            loop {
                let _ = events_tx.send(CoordinatorEvent::ModelProcessing(true)).await;
                let outcome = run_once(&repo, summarizer.as_ref(), state.session_id).await;
                let _ = events_tx.send(CoordinatorEvent::ModelProcessing(false)).await;

                match outcome {
                    Ok(true) => {
                        state.pending_count.store(0, Ordering::SeqCst);
                        *state.last_run_at.lock() = Instant::now();
                        let _ = events_tx
                            .send(CoordinatorEvent::TopicsUpdated {
                                session_id: state.session_id,
                            })
                            .await;
                    }
                    Ok(false) => {
                        // No new segments to summarize; treat as a no-op run.
                        *state.last_run_at.lock() = Instant::now();
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(error = ?e, "summarizer unavailable, re-arming time trigger");
                        *state.last_run_at.lock() = Instant::now();
                    }
                    Err(e) => {
                        warn!(error = ?e, "summarizer produced invalid output, skipping trigger");
                    }
                }

                if state
                    .follow_up_requested
                    .swap(false, Ordering::SeqCst)
                {
                    continue;
                }
                break;
            }

            state.running.store(false, Ordering::SeqCst);
            state.done.notify_waiters();
        });
    }

    /// Await any in-flight summarization up to `timeout`, after which the
    /// run is treated as cancelled (no topics are persisted for it).
    pub async fn shutdown(&self, timeout: Duration) {
        if !self.state.running.load(Ordering::SeqCst) {
            return;
        }
        let notified = self.state.done.notified();
        if tokio::time::timeout(timeout, notified).await.is_err() {
            info!("coordinator shutdown timed out waiting for in-flight summarization");
        }
    }
}

/// Runs one summarization pass: fetch not-yet-summarized segments and the
/// current topic list, call the summarizer, persist the result. Returns
/// `Ok(true)` if topics were replaced, `Ok(false)` if there was nothing new
/// to summarize.
async fn run_once(
    repo: &TranscriptRepository,
    summarizer: &dyn Summarizer,
    session_id: Uuid,
) -> Result<bool, SummarizerError> {
    let previous_topics = repo
        .topics_for(session_id)
        .map_err(|e| SummarizerError::Unavailable(e.to_string()))?;
    let all_segments = repo
        .segments_for(session_id)
        .map_err(|e| SummarizerError::Unavailable(e.to_string()))?;

    let already_covered = previous_topics
        .iter()
        .map(|t| t.segment_range_end)
        .max()
        .unwrap_or(0);
    let new_segments: Vec<_> = all_segments
        .into_iter()
        .filter(|s| s.sequence_number > already_covered)
        .collect();

    if new_segments.is_empty() {
        return Ok(false);
    }

    debug!(
        session_id = %session_id,
        new_segments = new_segments.len(),
        "invoking summarizer"
    );

    let topics = summarizer
        .summarize(session_id, &new_segments, &previous_topics)
        .await?;

    let start = new_segments
        .iter()
        .map(|s| s.sequence_number)
        .min()
        .unwrap_or(1);
    let end = new_segments
        .iter()
        .map(|s| s.sequence_number)
        .max()
        .unwrap_or(start);

    repo.save_topics_replacing(session_id, &topics)
        .map_err(|e| SummarizerError::Unavailable(e.to_string()))?;
    repo.save_summary(&Summary {
        id: Uuid::new_v4(),
        session_id,
        content: topics
            .iter()
            .map(|t| t.summary.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        summary_type: SummaryType::Rolling,
        segment_range_start: start,
        segment_range_end: end,
        model_id: "stub".to_string(),
        created_at: now_secs(),
    })
    .map_err(|e| SummarizerError::Unavailable(e.to_string()))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Segment, SourceKind};
    use std::time::Duration as StdDuration;

    fn segment(session_id: Uuid, seq: u32) -> Segment {
        Segment {
            id: Uuid::new_v4(),
            session_id,
            text: format!("segment {seq}"),
            started_at: seq as f64,
            ended_at: seq as f64 + 1.0,
            confidence: Some(0.9),
            sequence_number: seq,
            source: SourceKind::Microphone,
            created_at: now_secs(),
        }
    }

    #[tokio::test]
    async fn fires_after_trigger_count_segments_and_persists_topics() {
        let repo = Arc::new(TranscriptRepository::open_in_memory().unwrap());
        let session = repo.create_session("en_US").unwrap();
        let summarizer: Arc<dyn Summarizer> = Arc::new(crate::summarizer::StubSummarizer);
        let (tx, mut rx) = mpsc::channel(16);
        let coordinator = Coordinator::new(
            CoordinatorConfig {
                trigger_count: 2,
                time_threshold: StdDuration::from_secs(3600),
            },
            Arc::clone(&repo),
            summarizer,
            tx,
            session.id,
        );

        repo.append_segment(&segment(session.id, 1)).unwrap();
        coordinator.on_segment_finalized();
        repo.append_segment(&segment(session.id, 2)).unwrap();
        coordinator.on_segment_finalized();

        // ModelProcessing(true), ModelProcessing(false), TopicsUpdated
        let mut saw_topics_updated = false;
        for _ in 0..3 {
            if let Some(event) = rx.recv().await {
                if matches!(event, CoordinatorEvent::TopicsUpdated { .. }) {
                    saw_topics_updated = true;
                }
            }
        }
        assert!(saw_topics_updated);

        let topics = repo.topics_for(session.id).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].segment_range_start, 1);
        assert_eq!(topics[0].segment_range_end, 2);
    }

    #[tokio::test]
    async fn does_not_fire_before_either_trigger() {
        let repo = Arc::new(TranscriptRepository::open_in_memory().unwrap());
        let session = repo.create_session("en_US").unwrap();
        let summarizer: Arc<dyn Summarizer> = Arc::new(crate::summarizer::StubSummarizer);
        let (tx, mut rx) = mpsc::channel(16);
        let coordinator = Coordinator::new(
            CoordinatorConfig {
                trigger_count: 10,
                time_threshold: StdDuration::from_secs(3600),
            },
            repo,
            summarizer,
            tx,
            session.id,
        );

        coordinator.on_segment_finalized();

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
