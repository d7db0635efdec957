use crate::backup::backup_file;
use crate::error::MenderError;
use crate::language::{UNKNOWN, detect_language, spec_for};
use crate::prompts::{build_decrypt_prompt, build_file_repair_prompt};
use crate::{Assistant, ask};
use mender_exec::{CommandRunner, find_on_path};
use mender_llm::{CompletionRequest, CompletionService, strip_code_fence};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Substrings (compared case-insensitively) that mark a file as obfuscated.
pub const OBFUSCATION_MARKERS: &[&str] =
    &["exec(", "compile(", "base64", "decode(", "marshal", "loads("];

pub fn looks_obfuscated(content: &str) -> bool {
    let lowered = content.to_lowercase();
    OBFUSCATION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRepairReport {
    pub path: PathBuf,
    pub language: &'static str,
    pub backup_path: PathBuf,
    /// Toolchain binaries for `language` that are not on `PATH`.
    pub missing_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    NotEncrypted,
    Decrypted {
        language: &'static str,
        backup_path: PathBuf,
    },
}

fn read_source(path: &Path) -> Result<String, MenderError> {
    if !path.is_file() {
        return Err(MenderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path)
        .map_err(|err| MenderError::io(format!("failed reading {}", path.display()), err))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn missing_tools(language: &str) -> Vec<String> {
    spec_for(language)
        .map(|spec| spec.toolchain)
        .unwrap_or_default()
        .iter()
        .filter(|tool| find_on_path(tool).is_none())
        .map(|tool| tool.to_string())
        .collect()
}

/// Backs `path` up and then overwrites it with `contents`.
pub(crate) fn overwrite_with_backup(
    path: &Path,
    contents: &str,
    backups_dir: &Path,
) -> Result<PathBuf, MenderError> {
    let backup = backup_file(path, backups_dir)?;

    let mut contents = contents.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    fs::write(path, contents)
        .map_err(|err| MenderError::io(format!("failed writing {}", path.display()), err))?;
    info!(path = %path.display(), backup = %backup.display(), "file overwritten");
    Ok(backup)
}

impl<S, R> Assistant<S, R>
where
    S: CompletionService,
    R: CommandRunner,
{
    fn rewrite_from_completion(&self, path: &Path, prompt: String) -> Result<PathBuf, MenderError> {
        let response = ask(&self.service, &self.options.route, &CompletionRequest::new(prompt))?;
        debug!(provider = %response.provider, model = %response.model, "replacement received");

        let replacement =
            strip_code_fence(&response.text).map_err(|_| MenderError::UnparseableSuggestion {
                raw: response.text.clone(),
            })?;
        overwrite_with_backup(path, &replacement, &self.options.backups_dir)
    }

    /// Replaces `path` with a corrected version from the completion service.
    pub fn repair_file(&self, path: &Path) -> Result<FileRepairReport, MenderError> {
        if !path.is_file() {
            return Err(MenderError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let language = detect_language(path);
        if language == UNKNOWN {
            return Err(MenderError::UnsupportedLanguage {
                path: path.to_path_buf(),
            });
        }

        let source = read_source(path)?;
        let backup_path =
            self.rewrite_from_completion(path, build_file_repair_prompt(path, language, &source))?;

        Ok(FileRepairReport {
            path: path.to_path_buf(),
            language,
            backup_path,
            missing_tools: missing_tools(language),
        })
    }

    /// Rewrites an obfuscated file into readable source; files without any
    /// marker are left untouched.
    pub fn decrypt_file(&self, path: &Path) -> Result<DecryptOutcome, MenderError> {
        let source = read_source(path)?;
        if !looks_obfuscated(&source) {
            debug!(path = %path.display(), "no obfuscation markers");
            return Ok(DecryptOutcome::NotEncrypted);
        }

        let language = detect_language(path);
        let backup_path =
            self.rewrite_from_completion(path, build_decrypt_prompt(path, language, &source))?;
        Ok(DecryptOutcome::Decrypted {
            language,
            backup_path,
        })
    }
}
