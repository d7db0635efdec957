use crate::error::MenderError;
use crate::language::{detect_language, infer_command_language};
use crate::prompts::build_advisor_prompt;
use crate::{Route, ask};
use mender_llm::{CompletionRequest, CompletionService};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const COMMAND_MARKERS: &[&str] = &["apt-get", "pip", "npm", "chmod", "chown"];
const CODE_MARKERS: &[&str] = &["def ", "function ", "class "];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairSuggestion {
    pub root_cause: String,
    pub immediate_fix: String,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prevention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Result of pulling a suggestion out of a free-text completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Structured(RepairSuggestion),
    RawText(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestedFix {
    /// A shell command to run through the runner.
    Command(String),
    /// Full replacement source for the known target file.
    Code(String),
    Advice(String),
}

#[derive(Debug, Deserialize)]
struct WireSuggestion {
    #[serde(default)]
    root_cause: Option<Value>,
    #[serde(default)]
    immediate_fix: Option<Value>,
    #[serde(default)]
    dependencies: Option<Value>,
    #[serde(default)]
    prevention: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(" && "),
        other => other.to_string(),
    }
}

fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(text) => text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn value_confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

// Outermost braces, like a greedy `\{.*\}` over the whole reply.
fn json_candidate(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_reply(text: &str) -> ParsedReply {
    let raw = || ParsedReply::RawText(text.to_string());
    let Some(candidate) = json_candidate(text) else {
        return raw();
    };
    let Ok(wire) = serde_json::from_str::<WireSuggestion>(candidate) else {
        return raw();
    };

    let root_cause = wire.root_cause.as_ref().map(value_text).unwrap_or_default();
    let immediate_fix = wire
        .immediate_fix
        .as_ref()
        .map(value_text)
        .unwrap_or_default();
    if root_cause.is_empty() && immediate_fix.is_empty() {
        return raw();
    }

    ParsedReply::Structured(RepairSuggestion {
        root_cause,
        immediate_fix,
        dependencies: wire.dependencies.as_ref().map(value_list).unwrap_or_default(),
        prevention: wire
            .prevention
            .as_ref()
            .map(value_text)
            .filter(|text| !text.is_empty()),
        confidence: wire.confidence.as_ref().and_then(value_confidence),
    })
}

pub fn classify_fix(fix: &str, file_known: bool) -> SuggestedFix {
    let fix = fix.trim();
    if fix.is_empty() {
        return SuggestedFix::Advice(String::new());
    }
    if COMMAND_MARKERS.iter().any(|marker| fix.contains(marker)) {
        return SuggestedFix::Command(fix.to_string());
    }
    if CODE_MARKERS.iter().any(|marker| fix.contains(marker)) {
        return if file_known {
            SuggestedFix::Code(fix.to_string())
        } else {
            SuggestedFix::Advice(fix.to_string())
        };
    }
    if !file_known && !fix.contains('\n') {
        SuggestedFix::Command(fix.to_string())
    } else {
        SuggestedFix::Advice(fix.to_string())
    }
}

impl RepairSuggestion {
    pub fn classify(&self, file_known: bool) -> SuggestedFix {
        classify_fix(&self.immediate_fix, file_known)
    }
}

/// Asks the completion service for a repair plan for `error_text`.
pub fn analyze<S: CompletionService>(
    service: &S,
    route: &Route,
    error_text: &str,
    file_path: Option<&Path>,
    command: Option<&str>,
) -> Result<RepairSuggestion, MenderError> {
    let language = match (file_path, command) {
        (Some(path), _) => detect_language(path),
        (None, Some(command)) => infer_command_language(command),
        (None, None) => crate::language::UNKNOWN,
    };
    debug!(language, "requesting repair suggestion");

    let prompt = build_advisor_prompt(error_text, file_path, command);
    let request = CompletionRequest::new(format!("Language: {language}\n{prompt}"));
    let response = ask(service, route, &request)?;

    match parse_reply(&response.text) {
        ParsedReply::Structured(suggestion) => Ok(suggestion),
        ParsedReply::RawText(raw) => Err(MenderError::UnparseableSuggestion { raw }),
    }
}
