use anyhow::{Context, Result, anyhow};
use mender_llm::{CompletionClient, CompletionRequest};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl OpenAiCompatibleClient {
    pub fn from_parts(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_body(req: &CompletionRequest, model: &str) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &req.system {
        messages.push(Message {
            role: "system",
            content: system.clone(),
        });
    }
    messages.push(Message {
        role: "user",
        content: req.prompt.clone(),
    });

    ChatRequest {
        model: model.to_string(),
        temperature: 0.7,
        messages,
    }
}

impl CompletionClient for OpenAiCompatibleClient {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String> {
        let body = build_body(req, model);
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(%url, model, "calling OpenAI-compatible endpoint");

        let response = client
            .post(url.as_str())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("failed calling OpenAI-compatible endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!(
                "OpenAI-compatible request failed ({status}): {body}"
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .context("failed to decode OpenAI-compatible response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI-compatible response had no content"))
    }
}
