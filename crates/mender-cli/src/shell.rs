use crate::commands;
use crate::repl_helpers::{self, ShellInput};
use crate::runtime_context::MenderAssistant;
use anyhow::{Context, Result};
use mender_core::Confirm;
use std::io::{self, Write};

/// Line-oriented session; each input completes before the next is read.
/// Only `exit`, `quit`, end of input or a broken stdin end it.
pub(crate) fn run_shell(assistant: &MenderAssistant, confirm: &mut dyn Confirm) -> Result<()> {
    println!("mender shell. Type 'help' for commands, 'exit' to quit.");
    let mut line = String::new();
    loop {
        line.clear();
        print!("mender> ");
        io::stdout().flush().context("failed flushing stdout")?;

        let bytes = io::stdin()
            .read_line(&mut line)
            .context("failed reading shell input")?;
        if bytes == 0 {
            println!();
            break;
        }

        match repl_helpers::parse_shell_line(&line) {
            None => continue,
            Some(ShellInput::Exit) => break,
            Some(ShellInput::Help) => repl_helpers::print_shell_help(),
            Some(ShellInput::Usage(usage)) => println!("usage: {usage}"),
            Some(ShellInput::Run(action)) => {
                commands::run(assistant, action, confirm);
            }
        }
    }
    Ok(())
}
