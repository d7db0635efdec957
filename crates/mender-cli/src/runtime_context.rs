use crate::GlobalArgs;
use crate::repl_helpers;
use anyhow::{Result, anyhow};
use mender_config::{
    AppConfig, CliOverrides, ElevationSetting, EnvConfig, Paths, ProviderSetting, Settings,
    load_api_key, load_file_config, resolve_settings,
};
use mender_core::{Assistant, AssistantOptions, Route};
use mender_exec::{Elevation, ShellRunner};
use mender_llm::{CompletionClient, CompletionRequest, ProviderRouter, ProviderSelection};
use mender_llm_gemini::GeminiClient;
use mender_llm_openai::OpenAiCompatibleClient;
use mender_store::{HistoryLog, PatternLog};
use std::time::Duration;
use tracing::debug;

/// A provider whose credentials may be missing; calls fail with `missing`.
pub(crate) struct MaybeClient<C> {
    inner: Option<C>,
    missing: &'static str,
}

impl<C: CompletionClient> CompletionClient for MaybeClient<C> {
    fn complete(&self, req: &CompletionRequest, model: &str) -> Result<String> {
        let client = self.inner.as_ref().ok_or_else(|| anyhow!(self.missing))?;
        client.complete(req, model)
    }
}

pub(crate) type MenderRouter =
    ProviderRouter<MaybeClient<GeminiClient>, MaybeClient<OpenAiCompatibleClient>>;
pub(crate) type MenderAssistant = Assistant<MenderRouter, ShellRunner>;

pub(crate) fn provider_to_selection(provider: ProviderSetting) -> ProviderSelection {
    match provider {
        ProviderSetting::Auto => ProviderSelection::Auto,
        ProviderSetting::Gemini => ProviderSelection::Gemini,
        ProviderSetting::Openai => ProviderSelection::OpenAiCompatible,
    }
}

pub(crate) fn elevation_mode(elevation: ElevationSetting) -> Elevation {
    match elevation {
        ElevationSetting::Root => Elevation::Root,
        ElevationSetting::Sudo => Elevation::Sudo,
        ElevationSetting::None => Elevation::None,
    }
}

pub(crate) fn cli_overrides(global: &GlobalArgs) -> CliOverrides {
    CliOverrides {
        provider: global.provider.map(|p| p.as_setting()),
        model: global.model.clone(),
        command_timeout_secs: global.timeout,
        elevation: global.elevation.map(|e| e.as_setting()),
        auto_confirm: global.yes.then_some(true),
        verbose: global.verbose.then_some(true),
    }
}

pub(crate) fn resolve_app_config(global: &GlobalArgs) -> Result<AppConfig> {
    let paths = Paths::resolve(global.home.clone())?;
    let file_cfg = load_file_config(global.config.as_deref(), &paths)?;
    let env_cfg = EnvConfig::from_current_env();
    let settings = resolve_settings(&cli_overrides(global), &env_cfg, file_cfg.as_ref());
    Ok(AppConfig { settings, paths })
}

pub(crate) fn history_log(app: &AppConfig) -> HistoryLog {
    HistoryLog::new(app.paths.history_db(), app.settings.history_limit)
}

fn gemini_api_key(app: &AppConfig) -> Result<Option<String>> {
    if let Some(key) = &app.settings.gemini_api_key {
        return Ok(Some(key.clone()));
    }
    if app.settings.provider == ProviderSetting::Openai {
        return Ok(None);
    }
    load_api_key(&app.paths, repl_helpers::prompt_for_api_key)
}

fn build_router(settings: &Settings, gemini_key: Option<String>) -> MenderRouter {
    ProviderRouter {
        gemini: MaybeClient {
            inner: gemini_key
                .map(|key| GeminiClient::from_parts(settings.gemini_base_url.clone(), key)),
            missing: "GEMINI_API_KEY is required for the Gemini provider",
        },
        openai: MaybeClient {
            inner: settings.openai_api_key.clone().map(|key| {
                OpenAiCompatibleClient::from_parts(settings.openai_base_url.clone(), key)
            }),
            missing: "OPENAI_API_KEY is required for the OpenAI-compatible provider",
        },
        gemini_model: settings.gemini_model.clone(),
        openai_model: settings.openai_model.clone(),
    }
}

pub(crate) fn build_assistant(app: &AppConfig) -> Result<MenderAssistant> {
    app.paths.ensure()?;
    let settings = &app.settings;
    let router = build_router(settings, gemini_api_key(app)?);
    let runner = ShellRunner::new(
        Duration::from_secs(settings.command_timeout_secs),
        elevation_mode(settings.elevation),
    );
    debug!(
        base_dir = %app.paths.base_dir().display(),
        provider = ?settings.provider,
        timeout_secs = settings.command_timeout_secs,
        "assistant ready"
    );

    Ok(Assistant::new(
        router,
        runner,
        history_log(app),
        PatternLog::new(app.paths.patterns_db()),
        AssistantOptions {
            route: Route {
                selection: provider_to_selection(settings.provider),
                model_override: settings.model_override.clone(),
            },
            backups_dir: app.paths.backups_dir(),
            install_command: settings.install_command.clone(),
        },
    ))
}
