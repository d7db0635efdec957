use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Already privileged; commands run unchanged.
    Root,
    /// Elevated commands are prefixed with `sudo`.
    Sudo,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Success,
    Failed(Option<i32>),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The command line as handed to the shell, including any `sudo` prefix.
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub state: ExitState,
    pub duration: Duration,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, ExitState::Success)
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.state, ExitState::TimedOut)
    }

    /// Stdout on success, stderr on failure; falls back to whichever stream
    /// has content.
    pub fn output(&self) -> String {
        match self.state {
            ExitState::Success => self.stdout.clone(),
            ExitState::TimedOut => {
                format!("Command timed out after {}s", self.duration.as_secs())
            }
            ExitState::Failed(code) => {
                if !self.stderr.trim().is_empty() {
                    self.stderr.clone()
                } else if !self.stdout.trim().is_empty() {
                    self.stdout.clone()
                } else {
                    match code {
                        Some(code) => format!("command exited with status {code}"),
                        None => "command terminated by signal".to_string(),
                    }
                }
            }
        }
    }
}

pub trait CommandRunner {
    fn run(&self, command: &str, elevate: bool) -> Result<CommandOutcome>;
}

#[derive(Debug, Clone)]
pub struct ShellRunner {
    pub timeout: Duration,
    pub elevation: Elevation,
}

impl ShellRunner {
    pub fn new(timeout: Duration, elevation: Elevation) -> Self {
        Self { timeout, elevation }
    }

    pub fn effective_command(&self, command: &str, elevate: bool) -> String {
        let trimmed = command.trim();
        if elevate
            && self.elevation == Elevation::Sudo
            && !(trimmed == "sudo" || trimmed.starts_with("sudo "))
        {
            return format!("sudo {trimmed}");
        }
        trimmed.to_string()
    }
}

/// Grace period for the output pipes once the shell itself is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new("/bin/sh");
    // Own process group, so a timeout can take down everything the shell started.
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; the group was created at spawn.
        unsafe {
            libc::killpg(pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> Drain {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, done) = mpsc::channel();
    let sink = Arc::clone(&buf);
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
        let _ = tx.send(());
    });
    Drain { buf, done }
}

impl Drain {
    /// A detached grandchild may hold the pipe open forever; stop waiting at
    /// `deadline` and keep what has been read so far.
    fn collect(self, deadline: Instant) -> Vec<u8> {
        let _ = self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()));
        self.buf
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, elevate: bool) -> Result<CommandOutcome> {
        let effective = self.effective_command(command, elevate);
        debug!(command = %effective, timeout_secs = self.timeout.as_secs(), "spawning");
        let started = Instant::now();

        let mut child = shell_command(&effective)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute: {effective}"))?;

        let stdout_handle = child.stdout.take().context("failed to capture stdout")?;
        let stderr_handle = child.stderr.take().context("failed to capture stderr")?;
        let stdout_drain = drain(stdout_handle);
        let stderr_drain = drain(stderr_handle);

        let state = match child
            .wait_timeout(self.timeout)
            .context("failed waiting for command")?
        {
            Some(status) if status.success() => ExitState::Success,
            Some(status) => ExitState::Failed(status.code()),
            None => {
                warn!(command = %effective, "command timed out, killing");
                kill_tree(&mut child);
                ExitState::TimedOut
            }
        };

        let deadline = Instant::now() + DRAIN_GRACE;
        let stdout = stdout_drain.collect(deadline);
        let stderr = stderr_drain.collect(deadline);

        Ok(CommandOutcome {
            command: effective,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            state,
            duration: if matches!(state, ExitState::TimedOut) {
                self.timeout
            } else {
                started.elapsed()
            },
        })
    }
}

#[cfg(unix)]
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

/// Searches `PATH` for an executable named `program`.
pub fn find_on_path(program: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
