//! Repair orchestration: the advisor, the file repair and decrypt flows, and
//! command execution with a single repair round.

pub mod advisor;
pub mod backup;
mod error;
mod files;
pub mod language;
mod prompts;
mod session;

pub use advisor::{ParsedReply, RepairSuggestion, SuggestedFix, classify_fix, parse_reply};
pub use error::MenderError;
pub use files::{DecryptOutcome, FileRepairReport, OBFUSCATION_MARKERS, looks_obfuscated};
pub use prompts::CHAT_PERSONA;
pub use session::{AppliedPlan, ExecReport, PlanStep, RepairOutcome, StepStatus};

use mender_exec::{CommandRunner, Elevation, running_as_root};
use mender_llm::{CompletionRequest, CompletionResponse, CompletionService, ProviderSelection};
use mender_store::{HistoryLog, PatternLog};
use std::path::PathBuf;

/// Which providers to try and an optional model that overrides each
/// provider's default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub selection: ProviderSelection,
    pub model_override: Option<String>,
}

pub(crate) fn ask<S: CompletionService>(
    service: &S,
    route: &Route,
    request: &CompletionRequest,
) -> Result<CompletionResponse, MenderError> {
    service
        .complete(route.selection, request, route.model_override.as_deref())
        .map_err(|err| MenderError::unavailable(&err))
}

/// Asked before any suggested fix touches the system.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&mut self, _question: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct AssistantOptions {
    pub route: Route,
    pub backups_dir: PathBuf,
    /// Prefix for dependency installs; the package name is appended.
    pub install_command: String,
}

pub struct Assistant<S, R> {
    service: S,
    runner: R,
    history: HistoryLog,
    patterns: PatternLog,
    options: AssistantOptions,
}

impl<S, R> Assistant<S, R>
where
    S: CompletionService,
    R: CommandRunner,
{
    pub fn new(
        service: S,
        runner: R,
        history: HistoryLog,
        patterns: PatternLog,
        options: AssistantOptions,
    ) -> Self {
        Self {
            service,
            runner,
            history,
            patterns,
            options,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn patterns(&self) -> &PatternLog {
        &self.patterns
    }

    /// Free-form prompt wrapped in the assistant persona.
    pub fn chat(&self, text: &str) -> Result<String, MenderError> {
        let request = CompletionRequest::new(text).with_system(CHAT_PERSONA);
        let response = ask(&self.service, &self.options.route, &request)?;
        Ok(response.text.trim().to_string())
    }
}

/// Fails when the configured elevation mode needs a root process and this
/// one is not.
pub fn check_privileges(elevation: Elevation) -> Result<(), MenderError> {
    if elevation == Elevation::Root && !running_as_root() {
        return Err(MenderError::InsufficientPrivilege(
            "elevation mode is 'root' but mender is not running as root; \
             rerun with sudo or set MENDER_ELEVATION=sudo or none"
                .to_string(),
        ));
    }
    Ok(())
}
