mod credentials;
mod paths;

pub use credentials::{load_api_key, write_api_key};
pub use paths::Paths;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSetting {
    Auto,
    Gemini,
    Openai,
}

/// How `exec` obtains elevated rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationSetting {
    /// The process must already run as root; checked once at startup.
    Root,
    /// Elevated commands are prefixed with `sudo`.
    Sudo,
    /// Elevation is ignored.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<ProviderSetting>,
    pub gemini_base_url: Option<String>,
    pub gemini_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub history_limit: Option<usize>,
    pub elevation: Option<ElevationSetting>,
    pub auto_confirm: Option<bool>,
    pub install_command: Option<String>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub provider: Option<ProviderSetting>,
    pub gemini_base_url: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub history_limit: Option<usize>,
    pub elevation: Option<ElevationSetting>,
    pub auto_confirm: Option<bool>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    pub provider: Option<ProviderSetting>,
    pub model: Option<String>,
    pub command_timeout_secs: Option<u64>,
    pub elevation: Option<ElevationSetting>,
    pub auto_confirm: Option<bool>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub provider: ProviderSetting,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_api_key: Option<String>,
    /// `--model`; replaces the model of whichever provider answers.
    pub model_override: Option<String>,
    pub command_timeout_secs: u64,
    pub history_limit: usize,
    pub elevation: ElevationSetting,
    pub auto_confirm: bool,
    pub install_command: String,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderSetting::Auto,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: "gpt-4.1-mini".to_string(),
            openai_api_key: None,
            model_override: None,
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            elevation: ElevationSetting::Root,
            auto_confirm: false,
            install_command: "apt-get install -y".to_string(),
            verbose: false,
        }
    }
}

/// Process-wide configuration, built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub settings: Settings,
    pub paths: Paths,
}

pub fn load_file_config(explicit_path: Option<&Path>, paths: &Paths) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => {
            let candidate = paths.config_file();
            if !candidate.exists() {
                return Ok(None);
            }
            candidate
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self {
            provider: env::var("MENDER_PROVIDER")
                .ok()
                .and_then(|v| parse_provider(&v)),
            gemini_base_url: env::var("GEMINI_BASE_URL").ok(),
            gemini_model: env::var("MENDER_GEMINI_MODEL").ok(),
            gemini_api_key: non_empty(env::var("GEMINI_API_KEY").ok()),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            openai_model: env::var("MENDER_OPENAI_MODEL").ok(),
            openai_api_key: non_empty(env::var("OPENAI_API_KEY").ok()),
            command_timeout_secs: env::var("MENDER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            history_limit: env::var("MENDER_HISTORY_LIMIT")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            elevation: env::var("MENDER_ELEVATION")
                .ok()
                .and_then(|v| parse_elevation(&v)),
            auto_confirm: env::var("MENDER_AUTO_CONFIRM")
                .ok()
                .and_then(|v| parse_bool(&v)),
            verbose: env::var("MENDER_VERBOSE").ok().and_then(|v| parse_bool(&v)),
        }
    }
}

pub fn resolve_settings(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> Settings {
    let base = Settings::default();

    let provider = cli
        .provider
        .or(env_cfg.provider)
        .or(file_cfg.and_then(|c| c.provider))
        .unwrap_or(base.provider);

    let gemini_base_url = env_cfg
        .gemini_base_url
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.gemini_base_url.clone()))
        .unwrap_or(base.gemini_base_url);

    let gemini_model = env_cfg
        .gemini_model
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.gemini_model.clone()))
        .unwrap_or(base.gemini_model);

    let openai_base_url = env_cfg
        .openai_base_url
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.openai_base_url.clone()))
        .unwrap_or(base.openai_base_url);

    let openai_model = env_cfg
        .openai_model
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.openai_model.clone()))
        .unwrap_or(base.openai_model);

    let openai_api_key = env_cfg
        .openai_api_key
        .clone()
        .or_else(|| non_empty(file_cfg.and_then(|c| c.openai_api_key.clone())));

    let command_timeout_secs = cli
        .command_timeout_secs
        .or(env_cfg.command_timeout_secs)
        .or(file_cfg.and_then(|c| c.command_timeout_secs))
        .filter(|secs| *secs > 0)
        .unwrap_or(base.command_timeout_secs);

    let history_limit = env_cfg
        .history_limit
        .or(file_cfg.and_then(|c| c.history_limit))
        .filter(|limit| *limit > 0)
        .unwrap_or(base.history_limit);

    let elevation = cli
        .elevation
        .or(env_cfg.elevation)
        .or(file_cfg.and_then(|c| c.elevation))
        .unwrap_or(base.elevation);

    let auto_confirm = cli
        .auto_confirm
        .or(env_cfg.auto_confirm)
        .or(file_cfg.and_then(|c| c.auto_confirm))
        .unwrap_or(base.auto_confirm);

    let install_command = file_cfg
        .and_then(|c| c.install_command.clone())
        .unwrap_or(base.install_command);

    let verbose = cli
        .verbose
        .or(env_cfg.verbose)
        .or(file_cfg.and_then(|c| c.verbose))
        .unwrap_or(base.verbose);

    Settings {
        provider,
        gemini_base_url,
        gemini_model,
        gemini_api_key: env_cfg.gemini_api_key.clone(),
        openai_base_url,
        openai_model,
        openai_api_key,
        model_override: non_empty(cli.model.clone()),
        command_timeout_secs,
        history_limit,
        elevation,
        auto_confirm,
        install_command,
        verbose,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_provider(input: &str) -> Option<ProviderSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ProviderSetting::Auto),
        "gemini" => Some(ProviderSetting::Gemini),
        "openai" | "openai-compatible" => Some(ProviderSetting::Openai),
        _ => None,
    }
}

pub fn parse_elevation(input: &str) -> Option<ElevationSetting> {
    match input.trim().to_ascii_lowercase().as_str() {
        "root" => Some(ElevationSetting::Root),
        "sudo" => Some(ElevationSetting::Sudo),
        "none" | "off" => Some(ElevationSetting::None),
        _ => None,
    }
}
