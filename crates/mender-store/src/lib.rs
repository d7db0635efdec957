//! SQLite-backed logs. Each operation opens its own connection and closes it
//! when done; nothing is held between calls.

mod history;
mod patterns;

pub use history::{CommandRecord, HistoryEntry, HistoryLog};
pub use patterns::{PATTERN_KEY_CHARS, PatternHint, PatternLog, PatternRecord, pattern_key};

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

fn open(path: &Path, schema: &str) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed creating store dir {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed opening database {}", path.display()))?;
    conn.execute_batch(schema)
        .with_context(|| format!("failed initializing schema in {}", path.display()))?;
    Ok(conn)
}
