use crate::runtime_context::MenderAssistant;
use mender_core::{AppliedPlan, Confirm, DecryptOutcome, FileRepairReport, MenderError};
use mender_store::{HistoryEntry, HistoryLog};
use serde_json::{Value as JsonValue, json};
use std::path::{Path, PathBuf};

/// One user request, from either the command line or the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Repair(PathBuf),
    Decrypt(PathBuf),
    /// Runs with elevation.
    Exec(String),
    /// Runs exactly as typed; mender adds no elevation.
    Sudo(String),
    Fix(String),
    Chat(String),
    History(usize),
}

/// Prints the outcome and reports whether the request succeeded. Failures
/// are printed, never returned.
pub(crate) fn run(assistant: &MenderAssistant, action: Action, confirm: &mut dyn Confirm) -> bool {
    match action {
        Action::Repair(path) => {
            let result = assistant.repair_file(&path);
            println!("{}", pretty(&repair_json(&path, &result)));
            result.is_ok()
        }
        Action::Decrypt(path) => {
            let result = assistant.decrypt_file(&path);
            println!("{}", decrypt_text(&path, &result));
            result.is_ok()
        }
        Action::Exec(command) => exec(assistant, &command, true, confirm),
        Action::Sudo(command) => exec(assistant, &command, false, confirm),
        Action::Fix(text) => {
            let result = assistant.fix(&text, confirm);
            println!("{}", pretty(&fix_json(&result)));
            result.is_ok_and(|plan| plan.succeeded())
        }
        Action::Chat(text) => match assistant.chat(&text) {
            Ok(reply) => {
                println!("{reply}");
                true
            }
            Err(err) => {
                println!("Error: {err}");
                false
            }
        },
        Action::History(limit) => show_history(assistant.history(), limit),
    }
}

fn exec(assistant: &MenderAssistant, command: &str, elevate: bool, confirm: &mut dyn Confirm) -> bool {
    let report = assistant.execute(command, elevate, confirm);
    let message = report.message();
    if message.ends_with('\n') {
        print!("{message}");
    } else {
        println!("{message}");
    }
    report.succeeded()
}

pub(crate) fn show_history(history: &HistoryLog, limit: usize) -> bool {
    match history.recent(limit) {
        Ok(entries) => {
            if entries.is_empty() {
                println!("No history yet.");
            }
            // Oldest first so the newest lands next to the prompt.
            for entry in entries.iter().rev() {
                println!("{}", history_line(entry));
            }
            true
        }
        Err(err) => {
            println!("Error: {err:#}");
            false
        }
    }
}

pub(crate) fn history_line(entry: &HistoryEntry) -> String {
    let record = &entry.record;
    format!(
        "{:>5}  {}  {:<4}  {:<10}  {}",
        entry.id,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        if record.success { "ok" } else { "fail" },
        record.language,
        record.command
    )
}

fn pretty(value: &JsonValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub(crate) fn repair_json(path: &Path, result: &Result<FileRepairReport, MenderError>) -> JsonValue {
    match result {
        Ok(report) => json!({
            "success": true,
            "message": format!(
                "File repaired and backed up to {}",
                report.backup_path.display()
            ),
            "path": report.path.display().to_string(),
            "language": report.language,
            "backup_path": report.backup_path.display().to_string(),
            "missing_tools": report.missing_tools,
        }),
        Err(err) => json!({
            "success": false,
            "path": path.display().to_string(),
            "message": err.to_string(),
        }),
    }
}

pub(crate) fn decrypt_text(path: &Path, result: &Result<DecryptOutcome, MenderError>) -> String {
    match result {
        Ok(DecryptOutcome::NotEncrypted) => {
            format!("{} is not encrypted; nothing to do", path.display())
        }
        Ok(DecryptOutcome::Decrypted {
            language,
            backup_path,
        }) => format!(
            "Decrypted {} ({language}); original backed up to {}",
            path.display(),
            backup_path.display()
        ),
        Err(err) => format!("Error: {err}"),
    }
}

pub(crate) fn fix_json(result: &Result<AppliedPlan, MenderError>) -> JsonValue {
    match result {
        Ok(plan) => json!({
            "success": plan.succeeded(),
            "repair_data": plan.suggestion,
            "results": plan.steps,
        }),
        Err(MenderError::UnparseableSuggestion { raw }) => json!({
            "success": false,
            "message": "could not parse AI response",
            "raw_response": raw,
        }),
        Err(err) => json!({
            "success": false,
            "message": err.to_string(),
        }),
    }
}
