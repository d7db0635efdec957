use crate::commands::Action;
use anyhow::{Context, Result};
use mender_core::Confirm;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

pub(crate) const DEFAULT_HISTORY_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellInput {
    Run(Action),
    Help,
    Exit,
    Usage(&'static str),
}

const KEYWORD_ACTIONS: &[(&str, &str, fn(&str) -> Action)] = &[
    ("repair", "repair <path>", |arg| Action::Repair(PathBuf::from(arg))),
    ("decrypt", "decrypt <path>", |arg| Action::Decrypt(PathBuf::from(arg))),
    ("exec", "exec <command>", |arg| Action::Exec(arg.to_string())),
    ("sudo", "sudo <command>", |arg| Action::Sudo(arg.to_string())),
    ("fix", "fix <error text>", |arg| Action::Fix(arg.to_string())),
];

fn argument<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

/// `None` for blank lines. Anything that is not a known keyword is chat.
pub(crate) fn parse_shell_line(line: &str) -> Option<ShellInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let lowered = line.to_ascii_lowercase();
    if lowered == "exit" || lowered == "quit" {
        return Some(ShellInput::Exit);
    }
    if lowered == "help" {
        return Some(ShellInput::Help);
    }

    for (keyword, usage, build) in KEYWORD_ACTIONS {
        if let Some(arg) = argument(line, keyword) {
            if arg.is_empty() {
                return Some(ShellInput::Usage(*usage));
            }
            return Some(ShellInput::Run(build(arg)));
        }
    }

    if let Some(arg) = argument(line, "history") {
        if arg.is_empty() {
            return Some(ShellInput::Run(Action::History(DEFAULT_HISTORY_ROWS)));
        }
        if let Ok(limit) = arg.parse() {
            return Some(ShellInput::Run(Action::History(limit)));
        }
    }

    Some(ShellInput::Run(Action::Chat(line.to_string())))
}

pub(crate) fn print_shell_help() {
    println!("Shell commands:");
    println!("  repair <path>     ask for a corrected version of a source file");
    println!("  decrypt <path>    de-obfuscate a file that looks encoded");
    println!("  exec <command>    run a command with elevation, repairing on failure");
    println!("  sudo <command>    run a command as typed");
    println!("  fix <error text>  ask for a repair plan for an error message");
    println!("  history [n]       show the n most recent commands (default {DEFAULT_HISTORY_ROWS})");
    println!("  exit | quit       leave the shell");
    println!("Anything else is sent to the assistant as a chat message.");
}

/// Asks on the terminal; without one, only `auto` approves.
pub(crate) struct StdinConfirm {
    auto: bool,
}

impl StdinConfirm {
    pub(crate) fn new(auto: bool) -> Self {
        Self { auto }
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        if self.auto {
            eprintln!("[mender] {question} yes (auto-confirm)");
            return true;
        }
        if !io::stdin().is_terminal() {
            eprintln!("[mender] {question} skipped: confirmation required, rerun with --yes");
            return false;
        }

        eprint!("[mender] {question} [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Interactive first-run prompt for the Gemini key. Returns `None` when no
/// terminal is attached or the user enters nothing.
pub(crate) fn prompt_for_api_key() -> Result<Option<String>> {
    if !io::stdin().is_terminal() {
        return Ok(None);
    }
    eprint!("Enter your Gemini API key (leave empty to skip): ");
    io::stderr().flush().context("failed flushing stderr")?;

    let mut key = String::new();
    io::stdin()
        .read_line(&mut key)
        .context("failed reading API key")?;
    let key = key.trim();
    Ok((!key.is_empty()).then(|| key.to_string()))
}
