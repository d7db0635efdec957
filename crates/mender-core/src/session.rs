use crate::advisor::{RepairSuggestion, SuggestedFix, analyze};
use crate::error::MenderError;
use crate::files::overwrite_with_backup;
use crate::language::infer_command_language;
use crate::{Assistant, Confirm};
use mender_exec::{CommandOutcome, CommandRunner};
use mender_llm::CompletionService;
use mender_store::{CommandRecord, PatternHint};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Applied,
    Failed,
    Declined,
}

/// One confirmed (or declined) action from a repair plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub action: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedPlan {
    pub suggestion: RepairSuggestion,
    pub steps: Vec<PlanStep>,
}

impl AppliedPlan {
    pub fn succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.status != StepStatus::Failed)
    }
}

#[derive(Debug)]
pub enum RepairOutcome {
    Planned(AppliedPlan),
    /// The advisor gave nothing usable; a built-in pattern may still match.
    NoSuggestion {
        error: MenderError,
        hint: Option<PatternHint>,
    },
}

#[derive(Debug)]
pub struct ExecReport {
    pub command: String,
    pub outcome: Option<CommandOutcome>,
    pub error: Option<MenderError>,
    pub repair: Option<RepairOutcome>,
}

impl ExecReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Command output on success; otherwise the original error followed by
    /// whatever the repair round produced.
    pub fn message(&self) -> String {
        let Some(error) = &self.error else {
            return self
                .outcome
                .as_ref()
                .map(CommandOutcome::output)
                .unwrap_or_default();
        };

        let mut message = format!("Error: {}", error.to_string().trim_end());
        match &self.repair {
            Some(RepairOutcome::Planned(plan)) => {
                message.push_str("\n\n");
                message.push_str(&render_plan(plan));
            }
            Some(RepairOutcome::NoSuggestion { error, hint }) => {
                let _ = write!(message, "\n\n{error}");
                if let MenderError::UnparseableSuggestion { raw } = error {
                    let _ = write!(message, "\n{}", raw.trim());
                }
                if let Some(hint) = hint {
                    let _ = write!(
                        message,
                        "\nKnown fix ({}): {}",
                        hint.pattern_type, hint.suggestion
                    );
                }
            }
            None => {}
        }
        message
    }
}

pub fn render_plan(plan: &AppliedPlan) -> String {
    let suggestion = &plan.suggestion;
    let mut out = String::new();
    if !suggestion.root_cause.is_empty() {
        let _ = writeln!(out, "Root cause: {}", suggestion.root_cause);
    }
    let _ = writeln!(out, "Suggested fix: {}", suggestion.immediate_fix);
    if !suggestion.dependencies.is_empty() {
        let _ = writeln!(out, "Dependencies: {}", suggestion.dependencies.join(", "));
    }
    if let Some(prevention) = &suggestion.prevention {
        let _ = writeln!(out, "Prevention: {prevention}");
    }
    if let Some(confidence) = suggestion.confidence {
        let _ = writeln!(out, "Confidence: {confidence:.2}");
    }
    for step in &plan.steps {
        let label = match step.status {
            StepStatus::Applied => "applied",
            StepStatus::Failed => "failed",
            StepStatus::Declined => "skipped",
        };
        let _ = writeln!(out, "[{label}] {}", step.action);
        if !step.output.trim().is_empty() {
            let _ = writeln!(out, "  {}", step.output.trim());
        }
    }
    out.trim_end().to_string()
}

impl<S, R> Assistant<S, R>
where
    S: CompletionService,
    R: CommandRunner,
{
    /// Runs `command` and records it in history. Never triggers a repair.
    fn run_logged(&self, command: &str, elevate: bool) -> anyhow::Result<CommandOutcome> {
        let language = infer_command_language(command);
        let result = self.runner.run(command, elevate);
        let record = match &result {
            Ok(outcome) => {
                CommandRecord::now(command, &outcome.output(), outcome.succeeded(), language)
            }
            Err(err) => CommandRecord::now(command, &format!("{err:#}"), false, language),
        };
        if let Err(err) = self.history.append(&record) {
            let error = format!("{err:#}");
            warn!(%error, "failed writing history");
        }
        result
    }

    /// Runs `command`; a non-zero exit gets exactly one advisor round whose
    /// plan is applied behind `confirm`. Plan commands are never repaired.
    pub fn execute(&self, command: &str, elevate: bool, confirm: &mut dyn Confirm) -> ExecReport {
        let outcome = match self.run_logged(command, elevate) {
            Ok(outcome) => outcome,
            Err(err) => {
                return ExecReport {
                    command: command.to_string(),
                    outcome: None,
                    error: Some(MenderError::SubprocessFailure {
                        command: command.to_string(),
                        output: format!("{err:#}"),
                    }),
                    repair: None,
                };
            }
        };

        if outcome.succeeded() {
            return ExecReport {
                command: command.to_string(),
                outcome: Some(outcome),
                error: None,
                repair: None,
            };
        }

        if outcome.timed_out() {
            info!(command, "command timed out; skipping repair");
            return ExecReport {
                command: command.to_string(),
                error: Some(MenderError::SubprocessTimeout {
                    command: command.to_string(),
                    secs: outcome.duration.as_secs(),
                }),
                outcome: Some(outcome),
                repair: None,
            };
        }

        let error_text = outcome.output();
        debug!(command, "command failed; asking for a repair");
        let repair = match analyze(
            &self.service,
            &self.options.route,
            &error_text,
            None,
            Some(command),
        ) {
            Ok(suggestion) => {
                let plan = self.apply_plan(suggestion, None, confirm);
                self.remember(&error_text, &plan, infer_command_language(command));
                RepairOutcome::Planned(plan)
            }
            Err(error) => RepairOutcome::NoSuggestion {
                hint: self.known_hint(&error_text),
                error,
            },
        };

        ExecReport {
            command: command.to_string(),
            error: Some(MenderError::SubprocessFailure {
                command: command.to_string(),
                output: error_text,
            }),
            outcome: Some(outcome),
            repair: Some(repair),
        }
    }

    /// Advisor round on free-form error text with no file or command context.
    pub fn fix(&self, error_text: &str, confirm: &mut dyn Confirm) -> Result<AppliedPlan, MenderError> {
        let suggestion = analyze(&self.service, &self.options.route, error_text, None, None)?;
        let plan = self.apply_plan(suggestion, None, confirm);
        self.remember(error_text, &plan, crate::language::SYSTEM);
        Ok(plan)
    }

    /// Dependencies first, then the fix itself. `file` is the target for
    /// code replacements.
    pub fn apply_plan(
        &self,
        suggestion: RepairSuggestion,
        file: Option<&Path>,
        confirm: &mut dyn Confirm,
    ) -> AppliedPlan {
        let mut steps = Vec::new();

        for dependency in &suggestion.dependencies {
            let command = format!("{} {dependency}", self.options.install_command.trim());
            steps.push(self.confirmed_command(&command, confirm));
        }

        match (suggestion.classify(file.is_some()), file) {
            (SuggestedFix::Command(command), _) => {
                steps.push(self.confirmed_command(&command, confirm));
            }
            (SuggestedFix::Code(code), Some(path)) => {
                steps.push(self.confirmed_rewrite(path, &code, confirm));
            }
            (SuggestedFix::Code(_), None) | (SuggestedFix::Advice(_), _) => {}
        }

        AppliedPlan { suggestion, steps }
    }

    fn confirmed_command(&self, command: &str, confirm: &mut dyn Confirm) -> PlanStep {
        if !confirm.confirm(&format!("Run `{command}`?")) {
            return PlanStep {
                action: command.to_string(),
                status: StepStatus::Declined,
                output: String::new(),
            };
        }

        match self.run_logged(command, true) {
            Ok(outcome) => PlanStep {
                action: command.to_string(),
                status: if outcome.succeeded() {
                    StepStatus::Applied
                } else {
                    StepStatus::Failed
                },
                output: outcome.output(),
            },
            Err(err) => PlanStep {
                action: command.to_string(),
                status: StepStatus::Failed,
                output: format!("{err:#}"),
            },
        }
    }

    fn confirmed_rewrite(&self, path: &Path, code: &str, confirm: &mut dyn Confirm) -> PlanStep {
        let action = format!("rewrite {}", path.display());
        if !confirm.confirm(&format!("Overwrite {} with the suggested code?", path.display())) {
            return PlanStep {
                action,
                status: StepStatus::Declined,
                output: String::new(),
            };
        }

        match overwrite_with_backup(path, code, &self.options.backups_dir) {
            Ok(backup) => PlanStep {
                action,
                status: StepStatus::Applied,
                output: format!("backup: {}", backup.display()),
            },
            Err(err) => PlanStep {
                action,
                status: StepStatus::Failed,
                output: err.to_string(),
            },
        }
    }

    fn remember(&self, error_text: &str, plan: &AppliedPlan, language: &str) {
        if let Err(err) = self.patterns.record(
            error_text,
            &plan.suggestion.immediate_fix,
            language,
            plan.succeeded(),
        ) {
            let error = format!("{err:#}");
            warn!(%error, "failed recording repair pattern");
        }
    }

    fn known_hint(&self, error_text: &str) -> Option<PatternHint> {
        match self.patterns.hint(error_text) {
            Ok(hint) => hint,
            Err(err) => {
                let error = format!("{err:#}");
                warn!(%error, "failed matching repair patterns");
                None
            }
        }
    }
}
