//! Blocking client for the Gemini `generateContent` REST endpoint.

use anyhow::{Context, Result, anyhow};
use mender_llm::{CompletionClient, CompletionRequest};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub generation: GenerationConfig,
}

impl GeminiClient {
    pub fn from_parts(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(90),
            generation: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

fn build_body<'a>(req: &'a CompletionRequest, generation: &GenerationConfig) -> GenerateRequest<'a> {
    GenerateRequest {
        system_instruction: req.system.as_deref().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: &req.prompt }],
        }],
        generation_config: WireGenerationConfig {
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
            max_output_tokens: generation.max_output_tokens,
        },
    }
}

fn first_candidate_text(parsed: GenerateResponse) -> Option<String> {
    let content = parsed.candidates.into_iter().next()?.content?;
    let text: String = content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    Some(text)
}

impl CompletionClient for GeminiClient {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(anyhow!("Gemini API key is empty"));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        debug!(%url, "calling Gemini");

        let response = client
            .post(url.as_str())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&build_body(req, &self.generation))
            .send()
            .context("failed calling Gemini")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!("Gemini request failed ({status}): {body}"));
        }

        let parsed: GenerateResponse = response
            .json()
            .context("failed to decode Gemini response")?;
        first_candidate_text(parsed).ok_or_else(|| anyhow!("Gemini response had no candidates"))
    }
}
