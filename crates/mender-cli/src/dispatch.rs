use super::{Cli, Commands, init_tracing};
use crate::commands::{self, Action};
use crate::repl_helpers::StdinConfirm;
use crate::runtime_context;
use crate::shell;
use anyhow::Result;
use mender_core::check_privileges;
use std::process::ExitCode;

fn action_for(command: Commands) -> Option<Action> {
    match command {
        Commands::Repair { path } => Some(Action::Repair(path)),
        Commands::Decrypt { path } => Some(Action::Decrypt(path)),
        Commands::Exec { command } => Some(Action::Exec(command.join(" "))),
        Commands::Sudo { command } => Some(Action::Sudo(command.join(" "))),
        Commands::Fix { text } => Some(Action::Fix(text.join(" "))),
        Commands::Chat { text } => Some(Action::Chat(text.join(" "))),
        Commands::History { limit } => Some(Action::History(limit)),
        Commands::Shell => None,
    }
}

fn runs_commands(action: Option<&Action>) -> bool {
    matches!(
        action,
        None | Some(Action::Exec(_)) | Some(Action::Sudo(_)) | Some(Action::Fix(_))
    )
}

pub(crate) fn execute(cli: Cli) -> Result<ExitCode> {
    let app = runtime_context::resolve_app_config(&cli.global)?;
    init_tracing(app.settings.verbose);

    let action = cli.command.and_then(action_for);
    if runs_commands(action.as_ref()) {
        check_privileges(runtime_context::elevation_mode(app.settings.elevation))?;
    }

    // History never needs credentials.
    if let Some(Action::History(limit)) = action {
        let ok = commands::show_history(&runtime_context::history_log(&app), limit);
        return Ok(exit_code(ok));
    }

    let assistant = runtime_context::build_assistant(&app)?;
    let mut confirm = StdinConfirm::new(app.settings.auto_confirm);
    match action {
        Some(action) => Ok(exit_code(commands::run(&assistant, action, &mut confirm))),
        None => {
            shell::run_shell(&assistant, &mut confirm)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
