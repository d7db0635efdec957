use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MenderError {
    #[error("command timed out after {secs}s: {command}")]
    SubprocessTimeout { command: String, secs: u64 },

    #[error("command failed: {output}")]
    SubprocessFailure { command: String, output: String },

    #[error("repair advisor unavailable: {0}")]
    AdvisorUnavailable(String),

    #[error("could not parse AI response")]
    UnparseableSuggestion { raw: String },

    #[error("unsupported file type: {}", path.display())]
    UnsupportedLanguage { path: PathBuf },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("insufficient privilege: {0}")]
    InsufficientPrivilege(String),
}

impl MenderError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn unavailable(err: &anyhow::Error) -> Self {
        Self::AdvisorUnavailable(format!("{err:#}"))
    }
}
