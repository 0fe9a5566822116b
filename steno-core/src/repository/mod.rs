//! Durable store of sessions, segments, summaries and topics.
//!
//! A single `rusqlite::Connection` is held behind a mutex: all access is
//! serialized through this repository (the "single writer"), while WAL mode
//! still lets other processes open their own read-only connections.

pub mod migrations;
pub mod models;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{Result, StenoError};
pub use models::{Segment, Session, SessionStatus, SourceKind, Summary, SummaryType, Topic};
use models::now_secs;

pub struct TranscriptRepository {
    conn: Mutex<Connection>,
}

impl TranscriptRepository {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn create_session(&self, locale: &str) -> Result<Session> {
        let id = Uuid::new_v4();
        let now = now_secs();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, locale, started_at, ended_at, title, status, created_at)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5)",
            params![
                id.to_string(),
                locale,
                now,
                SessionStatus::Active.as_str(),
                now
            ],
        )?;
        Ok(Session {
            id,
            locale: locale.to_string(),
            started_at: now,
            ended_at: None,
            title: None,
            status: SessionStatus::Active,
            created_at: now,
        })
    }

    pub fn end_session(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE sessions SET ended_at = ?1, status = ?2 WHERE id = ?3",
            params![now_secs(), status.as_str(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StenoError::StorageBug(format!(
                "end_session: no such session {id}"
            )));
        }
        Ok(())
    }

    pub fn active_session(&self) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, locale, started_at, ended_at, title, status, created_at
             FROM sessions WHERE status = 'active' LIMIT 1",
            [],
            row_to_session,
        )
        .optional()
        .map_err(StenoError::from)
    }

    pub fn latest_session(&self) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, locale, started_at, ended_at, title, status, created_at
             FROM sessions ORDER BY created_at DESC LIMIT 1",
            [],
            row_to_session,
        )
        .optional()
        .map_err(StenoError::from)
    }

    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    pub fn append_segment(&self, seg: &Segment) -> Result<()> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO segments
             (id, session_id, text, started_at, ended_at, confidence, sequence_number, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                seg.id.to_string(),
                seg.session_id.to_string(),
                seg.text,
                seg.started_at,
                seg.ended_at,
                seg.confidence,
                seg.sequence_number,
                seg.source.as_str(),
                seg.created_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StenoError::StorageBug(format!(
                    "duplicate sequence_number {} for session {}",
                    seg.sequence_number, seg.session_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn segments_for(&self, session_id: Uuid) -> Result<Vec<Segment>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, text, started_at, ended_at, confidence, sequence_number, source, created_at
             FROM segments WHERE session_id = ?1 ORDER BY sequence_number ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id.to_string()], row_to_segment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Atomically replace the topic set for a session with a new one.
    pub fn save_topics_replacing(&self, session_id: Uuid, topics: &[Topic]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM topics WHERE session_id = ?1",
            params![session_id.to_string()],
        )?;
        for topic in topics {
            tx.execute(
                "INSERT INTO topics
                 (id, session_id, title, summary, segment_range_start, segment_range_end, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    topic.id.to_string(),
                    topic.session_id.to_string(),
                    topic.title,
                    topic.summary,
                    topic.segment_range_start,
                    topic.segment_range_end,
                    topic.created_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn topics_for(&self, session_id: Uuid) -> Result<Vec<Topic>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, title, summary, segment_range_start, segment_range_end, created_at
             FROM topics WHERE session_id = ?1 ORDER BY segment_range_start ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id.to_string()], row_to_topic)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn save_summary(&self, summary: &Summary) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO summaries
             (id, session_id, content, summary_type, segment_range_start, segment_range_end, model_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                summary.id.to_string(),
                summary.session_id.to_string(),
                summary.content,
                summary.summary_type.as_str(),
                summary.segment_range_start,
                summary.segment_range_end,
                summary.model_id,
                summary.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn summaries_for(&self, session_id: Uuid) -> Result<Vec<Summary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, content, summary_type, segment_range_start, segment_range_end, model_id, created_at
             FROM summaries WHERE session_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id.to_string()], row_to_summary)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let id: String = row.get(0)?;
    let status: String = row.get(5)?;
    Ok(Session {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        locale: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        title: row.get(4)?,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Interrupted),
        created_at: row.get(6)?,
    })
}

fn row_to_segment(row: &rusqlite::Row) -> rusqlite::Result<Segment> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    let source: String = row.get(7)?;
    Ok(Segment {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        session_id: Uuid::parse_str(&session_id).unwrap_or_default(),
        text: row.get(2)?,
        started_at: row.get(3)?,
        ended_at: row.get(4)?,
        confidence: row.get(5)?,
        sequence_number: row.get(6)?,
        source: SourceKind::parse(&source).unwrap_or(SourceKind::Microphone),
        created_at: row.get(8)?,
    })
}

fn row_to_topic(row: &rusqlite::Row) -> rusqlite::Result<Topic> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    Ok(Topic {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        session_id: Uuid::parse_str(&session_id).unwrap_or_default(),
        title: row.get(2)?,
        summary: row.get(3)?,
        segment_range_start: row.get(4)?,
        segment_range_end: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<Summary> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    let summary_type: String = row.get(3)?;
    Ok(Summary {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        session_id: Uuid::parse_str(&session_id).unwrap_or_default(),
        content: row.get(2)?,
        summary_type: SummaryType::parse(&summary_type).unwrap_or(SummaryType::Rolling),
        segment_range_start: row.get(4)?,
        segment_range_end: row.get(5)?,
        model_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_segment(session_id: Uuid, seq: u32) -> Segment {
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

    #[test]
    fn create_and_end_session_transitions_status() {
        let repo = TranscriptRepository::open_in_memory().unwrap();
        let session = repo.create_session("en_US").unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(repo.active_session().unwrap().unwrap().id, session.id);

        repo.end_session(session.id, SessionStatus::Completed).unwrap();
        assert!(repo.active_session().unwrap().is_none());
        let latest = repo.latest_session().unwrap().unwrap();
        assert_eq!(latest.status, SessionStatus::Completed);
        assert!(latest.ended_at.is_some());
    }

    #[test]
    fn append_segment_rejects_duplicate_sequence_number() {
        let repo = TranscriptRepository::open_in_memory().unwrap();
        let session = repo.create_session("en_US").unwrap();
        repo.append_segment(&sample_segment(session.id, 1)).unwrap();
        let err = repo.append_segment(&sample_segment(session.id, 1)).unwrap_err();
        assert!(matches!(err, StenoError::StorageBug(_)));
    }

    #[test]
    fn segments_for_are_ordered_by_sequence_number() {
        let repo = TranscriptRepository::open_in_memory().unwrap();
        let session = repo.create_session("en_US").unwrap();
        repo.append_segment(&sample_segment(session.id, 2)).unwrap();
        repo.append_segment(&sample_segment(session.id, 1)).unwrap();
        let segments = repo.segments_for(session.id).unwrap();
        assert_eq!(
            segments.iter().map(|s| s.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn save_topics_replacing_replaces_the_full_set() {
        let repo = TranscriptRepository::open_in_memory().unwrap();
        let session = repo.create_session("en_US").unwrap();
        let first = vec![Topic {
            id: Uuid::new_v4(),
            session_id: session.id,
            title: "Intro".into(),
            summary: "A.".into(),
            segment_range_start: 1,
            segment_range_end: 2,
            created_at: now_secs(),
        }];
        repo.save_topics_replacing(session.id, &first).unwrap();
        assert_eq!(repo.topics_for(session.id).unwrap().len(), 1);

        let second = vec![
            Topic {
                id: Uuid::new_v4(),
                session_id: session.id,
                title: "Intro".into(),
                summary: "A.".into(),
                segment_range_start: 1,
                segment_range_end: 2,
                created_at: now_secs(),
            },
            Topic {
                id: Uuid::new_v4(),
                session_id: session.id,
                title: "Follow-up".into(),
                summary: "B.".into(),
                segment_range_start: 3,
                segment_range_end: 4,
                created_at: now_secs(),
            },
        ];
        repo.save_topics_replacing(session.id, &second).unwrap();
        let stored = repo.topics_for(session.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].title, "Follow-up");
    }

    #[test]
    fn delete_session_cascades_to_segments_summaries_and_topics() {
        let repo = TranscriptRepository::open_in_memory().unwrap();
        let session = repo.create_session("en_US").unwrap();
        repo.append_segment(&sample_segment(session.id, 1)).unwrap();
        repo.save_summary(&Summary {
            id: Uuid::new_v4(),
            session_id: session.id,
            content: "summary".into(),
            summary_type: SummaryType::Rolling,
            segment_range_start: 1,
            segment_range_end: 1,
            model_id: "stub".into(),
            created_at: now_secs(),
        })
        .unwrap();
        repo.save_topics_replacing(
            session.id,
            &[Topic {
                id: Uuid::new_v4(),
                session_id: session.id,
                title: "Intro".into(),
                summary: "A.".into(),
                segment_range_start: 1,
                segment_range_end: 1,
                created_at: now_secs(),
            }],
        )
        .unwrap();

        repo.delete_session(session.id).unwrap();

        assert!(repo.segments_for(session.id).unwrap().is_empty());
        assert!(repo.summaries_for(session.id).unwrap().is_empty());
        assert!(repo.topics_for(session.id).unwrap().is_empty());
    }
}
