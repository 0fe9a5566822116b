//! Linear, idempotent schema migrations.
//!
//! Each migration is applied in order inside a transaction, gated on
//! `PRAGMA user_version` so re-opening an up-to-date database is a no-op.

use rusqlite::Connection;

use crate::error::Result;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                locale TEXT NOT NULL,
                started_at REAL NOT NULL,
                ended_at REAL,
                title TEXT,
                status TEXT NOT NULL,
                created_at REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS segments (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                text TEXT NOT NULL CHECK (length(text) BETWEEN 1 AND 10000),
                started_at REAL NOT NULL,
                ended_at REAL NOT NULL,
                confidence REAL CHECK (confidence IS NULL OR (confidence BETWEEN 0 AND 1)),
                sequence_number INTEGER NOT NULL,
                created_at REAL NOT NULL,
                UNIQUE (session_id, sequence_number)
            );

            CREATE TABLE IF NOT EXISTS summaries (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                summary_type TEXT NOT NULL,
                segment_range_start INTEGER NOT NULL,
                segment_range_end INTEGER NOT NULL,
                model_id TEXT NOT NULL,
                created_at REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_segments_session ON segments(session_id);
            CREATE INDEX IF NOT EXISTS idx_segments_time ON segments(started_at);
            CREATE INDEX IF NOT EXISTS idx_summaries_session ON summaries(session_id);
        "#,
    },
    Migration {
        version: 2,
        sql: r#"
            ALTER TABLE segments ADD COLUMN source TEXT NOT NULL DEFAULT 'microphone';
        "#,
    },
    Migration {
        version: 3,
        sql: r#"
            CREATE TABLE IF NOT EXISTS topics (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                segment_range_start INTEGER NOT NULL,
                segment_range_end INTEGER NOT NULL,
                created_at REAL NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_topics_session ON topics(session_id);
        "#,
    },
];

/// Apply all migrations newer than the database's current `user_version`.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;

    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        conn.execute_batch(migration.sql)?;
        conn.pragma_update(None, "user_version", migration.version)?;
    }

    Ok(())
}
