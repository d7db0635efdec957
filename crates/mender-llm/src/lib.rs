use anyhow::{Result, anyhow};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAiCompatible,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAiCompatible => "openai-compatible",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    Auto,
    Gemini,
    OpenAiCompatible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub provider: Provider,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub text: String,
    pub provider: Provider,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: Provider,
    pub model: String,
    pub error: String,
}

#[derive(Debug, Error)]
#[error("completion service unavailable: {}", render_attempts(.attempts))]
pub struct ProviderRoutingError {
    pub attempts: Vec<ProviderAttempt>,
}

fn render_attempts(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no provider configured".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}:{} ({})", a.provider, a.model, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single hosted model backend.
pub trait CompletionClient {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String>;
}

/// Provider-agnostic entry point used by the rest of the workspace.
pub trait CompletionService {
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor>;
    fn complete(
        &self,
        selection: ProviderSelection,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse>;
}

/// Returns the body of the first fenced code block, or the trimmed input when
/// the reply carries no fence.
pub fn strip_code_fence(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("completion service returned empty output"));
    }

    if let Some(block) = extract_fenced_code(trimmed) {
        if block.trim().is_empty() {
            return Err(anyhow!("completion service returned an empty code block"));
        }
        return Ok(block.trim_end().to_string());
    }

    Ok(trimmed.to_string())
}

// An unclosed fence (a reply cut off mid-block) keeps everything after the
// opening line; a lone fence on the last line is dropped.
fn extract_fenced_code(input: &str) -> Option<String> {
    let start = input.find("```")?;
    let remainder = &input[start + 3..];
    let Some(newline) = remainder.find('\n') else {
        return Some(input[..start].to_string());
    };
    let body = &remainder[newline + 1..];
    match body.find("```") {
        Some(end) => Some(body[..end].to_string()),
        None => Some(body.to_string()),
    }
}

pub struct ProviderRouter<G, O>
where
    G: CompletionClient,
    O: CompletionClient,
{
    pub gemini: G,
    pub openai: O,
    pub gemini_model: String,
    pub openai_model: String,
}

impl<G, O> ProviderRouter<G, O>
where
    G: CompletionClient,
    O: CompletionClient,
{
    fn call_provider(
        &self,
        entry: &ProviderDescriptor,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse> {
        let model = model_override.unwrap_or(&entry.model);
        let text = match entry.provider {
            Provider::Gemini => self.gemini.complete(req, model)?,
            Provider::OpenAiCompatible => self.openai.complete(req, model)?,
        };
        if text.trim().is_empty() {
            return Err(anyhow!("{} returned empty output", entry.provider));
        }
        Ok(CompletionResponse {
            text,
            provider: entry.provider,
            model: model.to_string(),
        })
    }

    fn gemini_entry(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider: Provider::Gemini,
            model: self.gemini_model.clone(),
        }
    }

    fn openai_entry(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider: Provider::OpenAiCompatible,
            model: self.openai_model.clone(),
        }
    }
}

impl<G, O> CompletionService for ProviderRouter<G, O>
where
    G: CompletionClient,
    O: CompletionClient,
{
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        match selection {
            ProviderSelection::Gemini => vec![self.gemini_entry()],
            ProviderSelection::OpenAiCompatible => vec![self.openai_entry()],
            ProviderSelection::Auto => vec![self.gemini_entry(), self.openai_entry()],
        }
    }

    fn complete(
        &self,
        selection: ProviderSelection,
        req: &CompletionRequest,
        model_override: Option<&str>,
    ) -> Result<CompletionResponse> {
        let mut attempts = Vec::new();

        for entry in self.candidate_chain(selection) {
            debug!(provider = %entry.provider, model = %entry.model, "requesting completion");
            match self.call_provider(&entry, req, model_override) {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let error = format!("{err:#}");
                    warn!(provider = %entry.provider, %error, "provider failed");
                    attempts.push(ProviderAttempt {
                        provider: entry.provider,
                        model: model_override.unwrap_or(&entry.model).to_string(),
                        error,
                    });
                }
            }
        }

        Err(ProviderRoutingError { attempts }.into())
    }
}
