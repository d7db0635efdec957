use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use rusqlite::{OptionalExtension, params};
use std::path::PathBuf;

/// Number of leading characters of an error text used as its pattern key.
pub const PATTERN_KEY_CHARS: usize = 200;

const LEARNED: &str = "ai_learned";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS repair_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_type TEXT NOT NULL,
    pattern TEXT NOT NULL,
    replacement TEXT NOT NULL,
    language TEXT NOT NULL,
    effectiveness REAL NOT NULL DEFAULT 1.0,
    updated_at TEXT NOT NULL,
    UNIQUE (pattern_type, pattern)
);";

// (type, regex, replacement template, language, effectiveness)
const BUILTIN_PATTERNS: &[(&str, &str, &str, &str, f64)] = &[
    (
        "import_missing",
        r"ModuleNotFoundError: No module named '([^']+)'",
        "pip3 install $1",
        "python",
        0.9,
    ),
    (
        "dependency_missing",
        r"error while loading shared libraries: ([^:]+):",
        "apt-get install $1",
        "system",
        0.8,
    ),
    ("permission_denied", r"Permission denied", "chmod +x <file>", "system", 0.7),
    (
        "command_not_found",
        r"(\S+): (?:command )?not found",
        "apt-get install $1",
        "system",
        0.8,
    ),
    ("syntax_error", r"SyntaxError:", "Fix syntax in file", "python", 0.6),
    ("indentation_error", r"IndentationError:", "Fix indentation", "python", 0.7),
];

#[derive(Debug, Clone, PartialEq)]
pub struct PatternRecord {
    pub pattern_type: String,
    pub pattern: String,
    pub replacement: String,
    pub language: String,
    pub effectiveness: f64,
}

/// A known fix for an error text, learned or built in.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHint {
    pub pattern_type: String,
    pub suggestion: String,
    pub language: String,
    pub effectiveness: f64,
}

/// Repair pattern store: built-in regex seeds plus last-write-wins records of
/// suggestions keyed by error prefix.
#[derive(Debug, Clone)]
pub struct PatternLog {
    path: PathBuf,
}

pub fn pattern_key(error_text: &str) -> String {
    error_text.chars().take(PATTERN_KEY_CHARS).collect()
}

impl PatternLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        let conn = super::open(&self.path, SCHEMA)?;
        let now = Utc::now().to_rfc3339();
        for (kind, pattern, replacement, language, effectiveness) in BUILTIN_PATTERNS {
            conn.execute(
                "INSERT OR IGNORE INTO repair_patterns
                 (pattern_type, pattern, replacement, language, effectiveness, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![kind, pattern, replacement, language, effectiveness, now],
            )
            .context("failed seeding repair patterns")?;
        }
        Ok(conn)
    }

    /// Stores `replacement` under the truncated error prefix, replacing any
    /// earlier record with the same key.
    pub fn record(
        &self,
        error_text: &str,
        replacement: &str,
        language: &str,
        success: bool,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO repair_patterns
             (pattern_type, pattern, replacement, language, effectiveness, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(pattern_type, pattern) DO UPDATE SET
                replacement = excluded.replacement,
                language = excluded.language,
                effectiveness = excluded.effectiveness,
                updated_at = excluded.updated_at",
            params![
                LEARNED,
                pattern_key(error_text),
                replacement,
                language,
                if success { 1.0 } else { 0.0 },
                Utc::now().to_rfc3339(),
            ],
        )
        .context("failed recording repair pattern")?;
        Ok(())
    }

    /// The learned record for `error_text`, if any.
    pub fn lookup(&self, error_text: &str) -> Result<Option<PatternRecord>> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT pattern_type, pattern, replacement, language, effectiveness
             FROM repair_patterns WHERE pattern_type = ?1 AND pattern = ?2",
            params![LEARNED, pattern_key(error_text)],
            |row| {
                Ok(PatternRecord {
                    pattern_type: row.get(0)?,
                    pattern: row.get(1)?,
                    replacement: row.get(2)?,
                    language: row.get(3)?,
                    effectiveness: row.get(4)?,
                })
            },
        )
        .optional()
        .context("failed looking up repair pattern")
    }

    /// A learned fix that worked for this exact error wins; otherwise the
    /// best matching seeded pattern.
    pub fn hint(&self, error_text: &str) -> Result<Option<PatternHint>> {
        if let Some(record) = self.lookup(error_text)? {
            if record.effectiveness > 0.0 && !record.replacement.trim().is_empty() {
                return Ok(Some(PatternHint {
                    pattern_type: record.pattern_type,
                    suggestion: record.replacement.trim().to_string(),
                    language: record.language,
                    effectiveness: record.effectiveness,
                }));
            }
        }
        self.builtin_hint(error_text)
    }

    /// Matches `error_text` against the seeded regex patterns, best first.
    pub fn builtin_hint(&self, error_text: &str) -> Result<Option<PatternHint>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT pattern_type, pattern, replacement, language, effectiveness
                 FROM repair_patterns WHERE pattern_type != ?1
                 ORDER BY effectiveness DESC, id ASC",
            )
            .context("failed preparing pattern query")?;
        let rows = stmt
            .query_map(params![LEARNED], |row| {
                Ok(PatternRecord {
                    pattern_type: row.get(0)?,
                    pattern: row.get(1)?,
                    replacement: row.get(2)?,
                    language: row.get(3)?,
                    effectiveness: row.get(4)?,
                })
            })
            .context("failed querying repair patterns")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed reading repair patterns")?;

        for record in rows {
            let Ok(regex) = Regex::new(&record.pattern) else {
                continue;
            };
            if let Some(caps) = regex.captures(error_text) {
                let mut suggestion = String::new();
                caps.expand(&record.replacement, &mut suggestion);
                return Ok(Some(PatternHint {
                    pattern_type: record.pattern_type,
                    suggestion: suggestion.trim().to_string(),
                    language: record.language,
                    effectiveness: record.effectiveness,
                }));
            }
        }
        Ok(None)
    }
}
