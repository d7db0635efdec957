use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use std::path::PathBuf;
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    command TEXT NOT NULL,
    output TEXT NOT NULL,
    success INTEGER NOT NULL,
    language TEXT NOT NULL
);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub output: String,
    pub success: bool,
    pub language: String,
}

impl CommandRecord {
    pub fn now(command: &str, output: &str, success: bool, language: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.to_string(),
            output: output.to_string(),
            success,
            language: language.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub record: CommandRecord,
}

/// Append-only command log that keeps the most recent `capacity` rows.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(path: PathBuf, capacity: usize) -> Self {
        Self {
            path,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts `record` and evicts everything older than the newest
    /// `capacity` rows, ordered by insertion id.
    pub fn append(&self, record: &CommandRecord) -> Result<i64> {
        let mut conn = super::open(&self.path, SCHEMA)?;
        let tx = conn.transaction().context("failed starting history transaction")?;

        tx.execute(
            "INSERT INTO history (timestamp, command, output, success, language)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.timestamp.to_rfc3339(),
                record.command,
                record.output,
                record.success,
                record.language,
            ],
        )
        .context("failed inserting history record")?;
        let id = tx.last_insert_rowid();

        let evicted = tx
            .execute(
                "DELETE FROM history WHERE id NOT IN
                 (SELECT id FROM history ORDER BY id DESC LIMIT ?1)",
                params![self.capacity as i64],
            )
            .context("failed trimming history")?;
        tx.commit().context("failed committing history record")?;

        if evicted > 0 {
            debug!(evicted, "trimmed history");
        }
        Ok(id)
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = super::open(&self.path, SCHEMA)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, command, output, success, language
                 FROM history ORDER BY id DESC LIMIT ?1",
            )
            .context("failed preparing history query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let timestamp: String = row.get(1)?;
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    record: CommandRecord {
                        timestamp: DateTime::parse_from_rfc3339(&timestamp)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_default(),
                        command: row.get(2)?,
                        output: row.get(3)?,
                        success: row.get(4)?,
                        language: row.get(5)?,
                    },
                })
            })
            .context("failed querying history")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed reading history rows")
    }

    pub fn count(&self) -> Result<usize> {
        let conn = super::open(&self.path, SCHEMA)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .context("failed counting history")?;
        Ok(count as usize)
    }
}
