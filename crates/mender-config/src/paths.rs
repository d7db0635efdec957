use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "mender.json";
const API_KEY_FILE: &str = "api_key";
const BACKUPS_DIR: &str = "backups";
const HISTORY_DB: &str = "history.db";
const PATTERNS_DB: &str = "repair_patterns.db";

/// On-disk layout rooted at the base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Explicit override, then `MENDER_HOME`, then `~/.mender`.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }
        if let Some(dir) = std::env::var_os("MENDER_HOME").filter(|v| !v.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        let home = dirs::home_dir().context("failed to resolve home directory")?;
        Ok(Self::new(home.join(".mender")))
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [self.base_dir.clone(), self.backups_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed creating directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    pub fn api_key_file(&self) -> PathBuf {
        self.base_dir.join(API_KEY_FILE)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join(BACKUPS_DIR)
    }

    pub fn history_db(&self) -> PathBuf {
        self.base_dir.join(HISTORY_DB)
    }

    pub fn patterns_db(&self) -> PathBuf {
        self.base_dir.join(PATTERNS_DB)
    }
}
