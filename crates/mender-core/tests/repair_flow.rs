use anyhow::{Result, anyhow};
use mender_core::{
    Assistant, AssistantOptions, DecryptOutcome, FixedAnswer, MenderError, RepairOutcome,
    RepairSuggestion, Route, StepStatus,
};
use mender_exec::{CommandOutcome, CommandRunner, ExitState};
use mender_llm::{
    CompletionRequest, CompletionResponse, CompletionService, Provider, ProviderDescriptor,
    ProviderSelection,
};
use mender_store::{HistoryLog, PatternLog};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

#[derive(Default)]
struct ScriptedService {
    replies: RefCell<VecDeque<Result<String, String>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedService {
    fn replying(replies: &[Result<&str, &str>]) -> Self {
        let service = Self::default();
        for &reply in replies {
            service
                .replies
                .borrow_mut()
                .push_back(reply.map(str::to_string).map_err(str::to_string));
        }
        service
    }

    fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl CompletionService for ScriptedService {
    fn candidate_chain(&self, _selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        vec![ProviderDescriptor {
            provider: Provider::Gemini,
            model: "stub".to_string(),
        }]
    }

    fn complete(
        &self,
        _selection: ProviderSelection,
        req: &CompletionRequest,
        _model_override: Option<&str>,
    ) -> Result<CompletionResponse> {
        self.requests.borrow_mut().push(req.clone());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(CompletionResponse {
                text,
                provider: Provider::Gemini,
                model: "stub".to_string(),
            }),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

#[derive(Default)]
struct ScriptedRunner {
    results: HashMap<String, (ExitState, String)>,
    calls: RefCell<Vec<(String, bool)>>,
}

impl ScriptedRunner {
    fn with(mut self, command: &str, state: ExitState, text: &str) -> Self {
        self.results
            .insert(command.to_string(), (state, text.to_string()));
        self
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str, elevate: bool) -> Result<CommandOutcome> {
        self.calls
            .borrow_mut()
            .push((command.to_string(), elevate));
        // Anything unscripted fails quietly.
        let (state, text) = self
            .results
            .get(command)
            .cloned()
            .unwrap_or((ExitState::Failed(Some(1)), String::new()));
        let (stdout, stderr) = match state {
            ExitState::Success => (text, String::new()),
            _ => (String::new(), text),
        };
        Ok(CommandOutcome {
            command: command.to_string(),
            stdout,
            stderr,
            state,
            duration: Duration::from_secs(if state == ExitState::TimedOut { 60 } else { 0 }),
        })
    }
}

fn assistant(
    dir: &TempDir,
    service: ScriptedService,
    runner: ScriptedRunner,
) -> Assistant<ScriptedService, ScriptedRunner> {
    assistant_with_backups(dir, &dir.path().join("backups"), service, runner)
}

fn assistant_with_backups(
    dir: &TempDir,
    backups_dir: &Path,
    service: ScriptedService,
    runner: ScriptedRunner,
) -> Assistant<ScriptedService, ScriptedRunner> {
    Assistant::new(
        service,
        runner,
        HistoryLog::new(dir.path().join("history.db"), 10_000),
        PatternLog::new(dir.path().join("repair_patterns.db")),
        AssistantOptions {
            route: Route {
                selection: ProviderSelection::Auto,
                model_override: None,
            },
            backups_dir: backups_dir.to_path_buf(),
            install_command: "apt-get install -y".to_string(),
        },
    )
}

fn backups_in(dir: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .map(|entry| entry.expect("dir entry").path())
        .collect()
}

#[test]
fn successful_command_skips_the_advisor() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::default(),
        ScriptedRunner::default().with("echo hi", ExitState::Success, "hi\n"),
    );

    let report = mender.execute("echo hi", true, &mut FixedAnswer(true));
    assert!(report.succeeded());
    assert_eq!(report.message(), "hi\n");
    assert_eq!(mender.service().calls(), 0);
    assert_eq!(mender.history().count().expect("count"), 1);
}

#[test]
fn failing_fix_is_not_repaired_again() {
    let dir = tempdir().expect("tempdir should work");
    let reply = r#"{"root_cause": "frob is missing", "immediate_fix": "apt-get install -y frob",
                    "dependencies": [], "confidence": 0.8}"#;
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok(reply), Ok(reply)]),
        ScriptedRunner::default().with(
            "frob --start",
            ExitState::Failed(Some(127)),
            "sh: 1: frob: not found",
        ),
    );

    let report = mender.execute("frob --start", true, &mut FixedAnswer(true));

    assert!(!report.succeeded());
    assert_eq!(mender.service().calls(), 1);
    assert_eq!(
        mender.runner().commands(),
        vec!["frob --start", "apt-get install -y frob"]
    );
    let Some(RepairOutcome::Planned(plan)) = &report.repair else {
        panic!("expected a repair plan, got {:?}", report.repair);
    };
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].status, StepStatus::Failed);

    let message = report.message();
    assert!(message.contains("sh: 1: frob: not found"), "{message}");
    assert!(message.contains("Suggested fix: apt-get install -y frob"), "{message}");
    assert_eq!(mender.history().count().expect("count"), 2);
}

#[test]
fn declined_fix_is_not_run() {
    let dir = tempdir().expect("tempdir should work");
    let reply = r#"{"root_cause": "x", "immediate_fix": "chmod +x ./run.sh"}"#;
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok(reply)]),
        ScriptedRunner::default(),
    );

    let report = mender.execute("./run.sh", true, &mut FixedAnswer(false));

    assert_eq!(mender.runner().commands(), vec!["./run.sh"]);
    let Some(RepairOutcome::Planned(plan)) = &report.repair else {
        panic!("expected a repair plan");
    };
    assert_eq!(plan.steps[0].status, StepStatus::Declined);
    assert!(report.message().contains("[skipped] chmod +x ./run.sh"));
}

#[test]
fn unavailable_advisor_falls_back_to_builtin_hint() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Err("connection refused")]),
        ScriptedRunner::default().with(
            "frobnicate",
            ExitState::Failed(Some(127)),
            "bash: frobnicate: command not found",
        ),
    );

    let report = mender.execute("frobnicate", true, &mut FixedAnswer(true));

    assert_eq!(mender.service().calls(), 1);
    assert_eq!(mender.runner().commands(), vec!["frobnicate"]);
    let message = report.message();
    assert!(message.starts_with("Error: command failed: bash: frobnicate"), "{message}");
    assert!(message.contains("repair advisor unavailable"), "{message}");
    assert!(
        message.contains("Known fix (command_not_found): apt-get install frobnicate"),
        "{message}"
    );
}

#[test]
fn silent_failure_still_reaches_the_advisor() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Err("offline")]),
        ScriptedRunner::default(),
    );

    let report = mender.execute("false", true, &mut FixedAnswer(true));

    assert_eq!(mender.service().calls(), 1);
    let prompt = &mender.service().requests.borrow()[0].prompt;
    assert!(prompt.contains("Command: false"), "{prompt}");
    assert!(report.message().contains("command exited with status 1"));
}

#[test]
fn unparseable_reply_is_surfaced() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok("Try turning it off and on again.")]),
        ScriptedRunner::default(),
    );

    let report = mender.execute("false", true, &mut FixedAnswer(true));

    let Some(RepairOutcome::NoSuggestion { error, .. }) = &report.repair else {
        panic!("expected no suggestion");
    };
    assert!(matches!(error, MenderError::UnparseableSuggestion { .. }));
    let message = report.message();
    assert!(message.contains("could not parse AI response"), "{message}");
    assert!(message.contains("Try turning it off and on again."), "{message}");
}

#[test]
fn timeout_is_reported_without_repair() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::default(),
        ScriptedRunner::default().with("sleep 600", ExitState::TimedOut, ""),
    );

    let report = mender.execute("sleep 600", true, &mut FixedAnswer(true));

    assert!(matches!(
        report.error,
        Some(MenderError::SubprocessTimeout { secs: 60, .. })
    ));
    assert!(report.repair.is_none());
    assert_eq!(mender.service().calls(), 0);
    let history = mender.history().recent(1).expect("recent");
    assert!(!history[0].record.success);
}

#[test]
fn history_records_inferred_language() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::default(),
        ScriptedRunner::default().with("python3 app.py", ExitState::Success, "ok"),
    );

    mender.execute("python3 app.py", false, &mut FixedAnswer(true));

    let history = mender.history().recent(1).expect("recent");
    assert_eq!(history[0].record.language, "python");
    assert!(history[0].record.success);
    assert_eq!(mender.runner().calls.borrow()[0], ("python3 app.py".to_string(), false));
}

#[test]
fn fix_installs_dependencies_then_runs_command() {
    let dir = tempdir().expect("tempdir should work");
    let error_text = "error while loading shared libraries: libfoo.so.1: cannot open";
    let reply = r#"{"root_cause": "libfoo missing", "immediate_fix": "chmod +x ./run.sh",
                    "dependencies": ["libfoo1"], "prevention": "package it"}"#;
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok(reply)]),
        ScriptedRunner::default()
            .with("apt-get install -y libfoo1", ExitState::Success, "")
            .with("chmod +x ./run.sh", ExitState::Success, ""),
    );

    let plan = mender
        .fix(error_text, &mut FixedAnswer(true))
        .expect("fix should produce a plan");

    assert!(plan.succeeded());
    assert_eq!(
        mender.runner().calls.borrow().clone(),
        vec![
            ("apt-get install -y libfoo1".to_string(), true),
            ("chmod +x ./run.sh".to_string(), true),
        ]
    );
    let learned = mender
        .patterns()
        .lookup(error_text)
        .expect("lookup")
        .expect("pattern recorded");
    assert_eq!(learned.replacement, "chmod +x ./run.sh");
    assert_eq!(learned.effectiveness, 1.0);
}

#[test]
fn fix_surfaces_advisor_failure() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Err("HTTP 503")]),
        ScriptedRunner::default(),
    );

    let err = mender
        .fix("segfault", &mut FixedAnswer(true))
        .expect_err("advisor is down");
    assert!(matches!(err, MenderError::AdvisorUnavailable(_)));
    assert!(mender.runner().commands().is_empty());
}

#[test]
fn repair_backs_up_then_overwrites_with_unfenced_reply() {
    let dir = tempdir().expect("tempdir should work");
    let script = dir.path().join("script.py");
    let original = b"def main(:\n    print('hi')\n".to_vec();
    fs::write(&script, &original).expect("write should work");

    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok(
            "Here is the fix:\n```python\ndef main():\n    print('hi')\n```\n",
        )]),
        ScriptedRunner::default(),
    );

    let report = mender.repair_file(&script).expect("repair should succeed");

    assert_eq!(report.language, "python");
    assert_ne!(report.backup_path, script);
    assert_eq!(fs::read(&report.backup_path).expect("read backup"), original);
    let name = report
        .backup_path
        .file_name()
        .and_then(|name| name.to_str())
        .expect("utf-8 name");
    assert!(name.starts_with("script.py.backup."), "{name}");
    assert_eq!(
        fs::read_to_string(&script).expect("read script"),
        "def main():\n    print('hi')\n"
    );
    let prompt = &mender.service().requests.borrow()[0].prompt;
    assert!(prompt.contains("def main(:"), "{prompt}");
}

#[test]
fn failed_backup_leaves_target_untouched() {
    let dir = tempdir().expect("tempdir should work");
    let script = dir.path().join("script.sh");
    fs::write(&script, "ech hi\n").expect("write should work");

    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "").expect("write should work");
    let mender = assistant_with_backups(
        &dir,
        &blocker.join("backups"),
        ScriptedService::replying(&[Ok("echo hi")]),
        ScriptedRunner::default(),
    );

    let err = mender.repair_file(&script).expect_err("backup must fail");
    assert!(matches!(err, MenderError::Io { .. }), "{err}");
    assert_eq!(fs::read_to_string(&script).expect("read"), "ech hi\n");
}

#[test]
fn unsupported_language_aborts_before_any_request() {
    let dir = tempdir().expect("tempdir should work");
    let notes = dir.path().join("notes.txt");
    fs::write(&notes, "nothing to run\n").expect("write should work");
    let mender = assistant(&dir, ScriptedService::default(), ScriptedRunner::default());

    let err = mender.repair_file(&notes).expect_err("unknown language");
    assert!(matches!(err, MenderError::UnsupportedLanguage { .. }));
    assert_eq!(mender.service().calls(), 0);
    assert!(backups_in(&dir.path().join("backups")).is_empty());
}

#[test]
fn missing_file_is_reported() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(&dir, ScriptedService::default(), ScriptedRunner::default());

    let err = mender
        .repair_file(&dir.path().join("gone.py"))
        .expect_err("missing file");
    assert!(matches!(err, MenderError::FileNotFound { .. }));
    let err = mender
        .decrypt_file(&dir.path().join("gone.py"))
        .expect_err("missing file");
    assert!(matches!(err, MenderError::FileNotFound { .. }));
}

#[test]
fn decrypt_leaves_clean_file_alone() {
    let dir = tempdir().expect("tempdir should work");
    let clean = dir.path().join("clean.py");
    fs::write(&clean, "print('hello')\n").expect("write should work");
    let mender = assistant(&dir, ScriptedService::default(), ScriptedRunner::default());

    let outcome = mender.decrypt_file(&clean).expect("decrypt");

    assert_eq!(outcome, DecryptOutcome::NotEncrypted);
    assert_eq!(fs::read_to_string(&clean).expect("read"), "print('hello')\n");
    assert_eq!(mender.service().calls(), 0);
    assert!(backups_in(&dir.path().join("backups")).is_empty());
}

#[test]
fn decrypt_rewrites_obfuscated_file() {
    let dir = tempdir().expect("tempdir should work");
    let packed = dir.path().join("packed.py");
    let original = "import base64\nexec(base64.b64decode('cHJpbnQoMSk='))\n";
    fs::write(&packed, original).expect("write should work");
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok("```\nprint(1)\n```")]),
        ScriptedRunner::default(),
    );

    let outcome = mender.decrypt_file(&packed).expect("decrypt");

    let DecryptOutcome::Decrypted {
        language,
        backup_path,
    } = outcome
    else {
        panic!("expected decrypted outcome");
    };
    assert_eq!(language, "python");
    assert_eq!(fs::read_to_string(backup_path).expect("read"), original);
    assert_eq!(fs::read_to_string(&packed).expect("read"), "print(1)\n");
}

#[test]
fn chat_sends_persona_as_system_prompt() {
    let dir = tempdir().expect("tempdir should work");
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok("  Use `df -h`.\n")]),
        ScriptedRunner::default(),
    );

    let reply = mender.chat("how do I check disk space?").expect("chat");

    assert_eq!(reply, "Use `df -h`.");
    let requests = mender.service().requests.borrow();
    assert_eq!(requests[0].prompt, "how do I check disk space?");
    assert_eq!(requests[0].system.as_deref(), Some(mender_core::CHAT_PERSONA));
}

#[test]
fn learned_fix_is_offered_when_advisor_is_down() {
    let dir = tempdir().expect("tempdir should work");
    let reply = r#"{"root_cause": "tool missing", "immediate_fix": "cargo install frobnicate"}"#;
    let mender = assistant(
        &dir,
        ScriptedService::replying(&[Ok(reply), Err("connection refused")]),
        ScriptedRunner::default()
            .with(
                "frobnicate",
                ExitState::Failed(Some(127)),
                "bash: frobnicate: command not found",
            )
            .with("cargo install frobnicate", ExitState::Success, ""),
    );

    let first = mender.execute("frobnicate", true, &mut FixedAnswer(true));
    let Some(RepairOutcome::Planned(plan)) = &first.repair else {
        panic!("expected a repair plan");
    };
    assert!(plan.succeeded());

    let second = mender.execute("frobnicate", true, &mut FixedAnswer(true));
    let message = second.message();
    assert!(message.contains("repair advisor unavailable"), "{message}");
    assert!(
        message.contains("Known fix (ai_learned): cargo install frobnicate"),
        "{message}"
    );
}

fn code_fix() -> RepairSuggestion {
    RepairSuggestion {
        root_cause: "unbalanced parenthesis".to_string(),
        immediate_fix: "def greet():\n    return 'hi'".to_string(),
        dependencies: Vec::new(),
        prevention: None,
        confidence: Some(0.8),
    }
}

#[test]
fn plan_rewrites_known_file_after_backup() {
    let dir = tempdir().expect("tempdir should work");
    let target = dir.path().join("app.py");
    fs::write(&target, "def greet(:\n").expect("write should work");
    let mender = assistant(&dir, ScriptedService::default(), ScriptedRunner::default());

    let plan = mender.apply_plan(code_fix(), Some(&target), &mut FixedAnswer(true));

    assert!(plan.succeeded());
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].status, StepStatus::Applied);
    assert_eq!(
        fs::read_to_string(&target).expect("read should work"),
        "def greet():\n    return 'hi'\n"
    );
    let backups = backups_in(&dir.path().join("backups"));
    assert_eq!(backups.len(), 1);
    assert_eq!(
        fs::read_to_string(&backups[0]).expect("read backup"),
        "def greet(:\n"
    );
    assert!(mender.runner().commands().is_empty());
}

#[test]
fn declined_rewrite_leaves_file_alone() {
    let dir = tempdir().expect("tempdir should work");
    let target = dir.path().join("app.py");
    fs::write(&target, "def greet(:\n").expect("write should work");
    let mender = assistant(&dir, ScriptedService::default(), ScriptedRunner::default());

    let plan = mender.apply_plan(code_fix(), Some(&target), &mut FixedAnswer(false));

    assert_eq!(plan.steps[0].status, StepStatus::Declined);
    assert_eq!(
        fs::read_to_string(&target).expect("read should work"),
        "def greet(:\n"
    );
    assert!(backups_in(&dir.path().join("backups")).is_empty());
}

#[test]
fn rewrite_without_backup_is_a_failed_step() {
    let dir = tempdir().expect("tempdir should work");
    let target = dir.path().join("app.py");
    fs::write(&target, "def greet(:\n").expect("write should work");
    let blocked = dir.path().join("not-a-dir");
    fs::write(&blocked, "").expect("write should work");
    let mender = assistant_with_backups(
        &dir,
        &blocked,
        ScriptedService::default(),
        ScriptedRunner::default(),
    );

    let plan = mender.apply_plan(code_fix(), Some(&target), &mut FixedAnswer(true));

    assert!(!plan.succeeded());
    assert_eq!(plan.steps[0].status, StepStatus::Failed);
    assert_eq!(
        fs::read_to_string(&target).expect("read should work"),
        "def greet(:\n"
    );
}
