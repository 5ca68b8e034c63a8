//! The privileged execution boundary.
//!
//! Every mutating operation in the crate reaches the operating system
//! through [`PrivilegedExecutor`]. Programs come from a closed allow-list and
//! argument vectors are assembled from validated values, so no user string is
//! ever interpreted by a shell.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger};
use crate::config::ExecutorConfig;
use crate::error::{PrivilegeErrorKind, StackError, StackResult};

use super::output::summarize_output;
use super::subprocess::SubprocessBuilder;

/// Marker file present inside a Flatpak sandbox.
const FLATPAK_INFO: &str = "/.flatpak-info";

/// Lines of output kept in a `NonZeroExit` error.
const ERROR_OUTPUT_LINES: usize = 10;

/// Output of a helper or shell that could not start the requested program.
/// The exit code then collides with the helper's own "not authorized" code.
const NOT_RUN_MARKERS: [&str; 2] = ["command not found", "Cannot run program"];

/// Prefix that forwards a command to the host when running inside Flatpak.
pub fn host_command_prefix() -> Vec<String> {
    if Path::new(FLATPAK_INFO).exists() {
        vec!["flatpak-spawn".to_string(), "--host".to_string()]
    } else {
        Vec::new()
    }
}

/// Programs the executor is allowed to run with escalated privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Systemctl,
    Ln,
    Rm,
    Mv,
    Tee,
    Mkdir,
}

impl Program {
    pub fn binary(&self) -> &'static str {
        match self {
            Program::Systemctl => "systemctl",
            Program::Ln => "ln",
            Program::Rm => "rm",
            Program::Mv => "mv",
            Program::Tee => "tee",
            Program::Mkdir => "mkdir",
        }
    }
}

/// A single requested privileged command.
#[derive(Debug, Clone)]
pub struct PrivilegedAction {
    pub id: Uuid,
    pub program: Program,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl PrivilegedAction {
    pub fn new<I, S>(program: Program, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            program,
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// `systemctl <verb> <unit>.service`
    pub fn systemctl(verb: &str, unit: &str) -> Self {
        Self::new(Program::Systemctl, [verb.to_string(), format!("{}.service", unit)])
    }

    /// `ln -s -- <target> <link>`
    pub fn symlink(target: &Path, link: &Path) -> Self {
        Self::new(
            Program::Ln,
            ["-s".to_string(), "--".to_string(), path_arg(target), path_arg(link)],
        )
    }

    /// `rm -f -- <path>`
    pub fn remove(path: &Path) -> Self {
        Self::new(Program::Rm, ["-f".to_string(), "--".to_string(), path_arg(path)])
    }

    /// `mv -- <from> <to>`
    pub fn rename(from: &Path, to: &Path) -> Self {
        Self::new(
            Program::Mv,
            ["--".to_string(), path_arg(from), path_arg(to)],
        )
    }

    /// `tee -- <path>` with the file content on stdin.
    pub fn write_file(path: &Path, content: &str) -> Self {
        Self::new(Program::Tee, ["--".to_string(), path_arg(path)])
            .with_stdin(content.as_bytes().to_vec())
    }

    /// `tee -a -- <path>` with the appended text on stdin.
    pub fn append_file(path: &Path, content: &str) -> Self {
        Self::new(Program::Tee, ["-a".to_string(), "--".to_string(), path_arg(path)])
            .with_stdin(content.as_bytes().to_vec())
    }

    /// `mkdir -p -- <path>`
    pub fn create_dir(path: &Path) -> Self {
        Self::new(Program::Mkdir, ["-p".to_string(), "--".to_string(), path_arg(path)])
    }

    /// Human-readable command line, used in logs and errors.
    pub fn describe(&self) -> String {
        let mut line = self.program.binary().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured output of a successful privileged action.
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one privileged action and classifies its outcome.
///
/// Implementations block until the action finishes or the wait bound
/// elapses, and never retry.
pub trait PrivilegedExecutor: Send + Sync {
    fn run(&self, action: &PrivilegedAction) -> StackResult<ActionOutput>;
}

/// Executor that spawns real processes, escalated through `pkexec` (or the
/// configured helper).
///
/// A single slot serializes privileged actions: they share one
/// authorization channel, and two concurrent prompts would confuse the user.
pub struct SystemExecutor {
    escalation: Option<String>,
    host_prefix: Vec<String>,
    denied_exit_codes: Vec<i32>,
    timeout: Duration,
    slot: Mutex<()>,
    audit: Option<AuditLogger>,
}

impl SystemExecutor {
    /// Build the executor for the current process.
    ///
    /// Escalation is skipped when already running as root; inside Flatpak
    /// every command is forwarded to the host with `flatpak-spawn --host`.
    pub fn from_settings(config: &ExecutorConfig, audit: Option<AuditLogger>) -> Self {
        let is_root = nix::unistd::geteuid().is_root();
        let host_prefix = host_command_prefix();

        let escalation = if is_root {
            None
        } else {
            Some(config.escalation_program.clone())
        };
        info!(
            escalation = escalation.as_deref().unwrap_or("none"),
            flatpak = !host_prefix.is_empty(),
            timeout_secs = config.timeout_seconds,
            "Privileged executor ready"
        );

        Self {
            escalation,
            host_prefix,
            denied_exit_codes: config.denied_exit_codes.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            slot: Mutex::new(()),
            audit,
        }
    }

    /// Executor that runs commands as the current user, without escalation.
    pub fn direct(timeout: Duration) -> Self {
        Self {
            escalation: None,
            host_prefix: Vec::new(),
            denied_exit_codes: Vec::new(),
            timeout,
            slot: Mutex::new(()),
            audit: None,
        }
    }

    /// Program and arguments actually handed to the OS.
    fn command_line(&self, action: &PrivilegedAction) -> (String, Vec<String>) {
        let mut argv: Vec<String> = self.host_prefix.clone();
        if let Some(helper) = &self.escalation {
            argv.push(helper.clone());
        }
        argv.push(action.program.binary().to_string());
        argv.extend(action.args.iter().cloned());

        let program = argv.remove(0);
        (program, argv)
    }

    fn classify(&self, action: &PrivilegedAction, exit_code: Option<i32>, output: String) -> StackError {
        let exit_code = exit_code.unwrap_or(-1);
        let not_run = NOT_RUN_MARKERS.iter().any(|marker| output.contains(marker));
        let kind = if self.escalation.is_some()
            && self.denied_exit_codes.contains(&exit_code)
            && !not_run
        {
            debug!(action_id = %action.id, exit_code, output = %output.trim(), "Escalation refused");
            PrivilegeErrorKind::Denied
        } else {
            PrivilegeErrorKind::NonZeroExit {
                exit_code,
                output: summarize_output(&output, ERROR_OUTPUT_LINES),
            }
        };
        StackError::privilege(action.describe(), kind)
    }

    fn record(&self, action: &PrivilegedAction, result: &StackResult<ActionOutput>, elapsed: Duration) {
        let Some(audit) = &self.audit else {
            return;
        };
        let entry = AuditEntry::from_result(
            Utc::now().to_rfc3339(),
            action,
            self.escalation.is_some(),
            result,
            elapsed.as_millis() as u64,
        );
        if let Err(e) = audit.log(&entry) {
            warn!(action_id = %action.id, error = %e, "Failed to write audit entry");
        }
    }
}

impl PrivilegedExecutor for SystemExecutor {
    fn run(&self, action: &PrivilegedAction) -> StackResult<ActionOutput> {
        let _slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        let (program, args) = self.command_line(action);
        debug!(action_id = %action.id, command = %action.describe(), "Running privileged action");

        let mut builder = SubprocessBuilder::new(&program)
            .args(&args)
            .timeout(self.timeout)
            .detach_on_timeout();
        if let Some(payload) = &action.stdin {
            builder = builder.stdin(payload.clone());
        }

        let start = Instant::now();
        let result = match builder.run() {
            Ok(output) if output.success => Ok(ActionOutput {
                exit_code: output.exit_code.unwrap_or(0),
                stdout: output.stdout,
                stderr: output.stderr,
            }),
            Ok(output) => {
                let combined = output.combined_output();
                Err(self.classify(action, output.exit_code, combined))
            }
            // Re-label spawn/timeout errors with the requested command
            Err(StackError::Privilege { kind, .. }) => {
                Err(StackError::privilege(action.describe(), kind))
            }
            Err(other) => Err(other),
        };

        match &result {
            Ok(_) => info!(action_id = %action.id, command = %action.describe(), "Privileged action succeeded"),
            Err(e) => warn!(action_id = %action.id, error = %e, "Privileged action failed"),
        }
        self.record(action, &result, start.elapsed());

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc};
    use std::thread;

    use super::*;

    fn escalating(helper: &str, denied: Vec<i32>) -> SystemExecutor {
        SystemExecutor {
            escalation: Some(helper.to_string()),
            host_prefix: Vec::new(),
            denied_exit_codes: denied,
            timeout: Duration::from_secs(5),
            slot: Mutex::new(()),
            audit: None,
        }
    }

    #[test]
    fn test_action_builders() {
        let action = PrivilegedAction::systemctl("restart", "nginx");
        assert_eq!(action.describe(), "systemctl restart nginx.service");

        let action = PrivilegedAction::symlink(
            Path::new("/etc/nginx/sites-available/blog.test"),
            Path::new("/etc/nginx/sites-enabled/blog.test"),
        );
        assert_eq!(action.program, Program::Ln);
        assert_eq!(action.args[0], "-s");
        assert_eq!(action.args[1], "--");

        let action = PrivilegedAction::write_file(Path::new("/etc/hosts"), "127.0.0.1 a.test\n");
        assert_eq!(action.program, Program::Tee);
        assert_eq!(action.stdin.as_deref(), Some(&b"127.0.0.1 a.test\n"[..]));
    }

    #[test]
    fn test_command_line_with_prefixes() {
        let mut executor = escalating("pkexec", vec![126, 127]);
        executor.host_prefix = vec!["flatpak-spawn".to_string(), "--host".to_string()];
        let (program, args) = executor.command_line(&PrivilegedAction::systemctl("stop", "redis"));
        assert_eq!(program, "flatpak-spawn");
        assert_eq!(args, vec!["--host", "pkexec", "systemctl", "stop", "redis.service"]);
    }

    #[test]
    fn test_direct_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("site.conf");
        let executor = SystemExecutor::direct(Duration::from_secs(5));

        executor
            .run(&PrivilegedAction::write_file(&target, "server {}\n"))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "server {}\n");

        executor
            .run(&PrivilegedAction::append_file(&target, "# tail\n"))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "server {}\n# tail\n");

        executor.run(&PrivilegedAction::remove(&target)).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_denied_exit_code_classification() {
        // `env` stands in for the helper: it runs `mkdir`, which fails with 1
        let executor = escalating("env", vec![1]);
        let err = executor
            .run(&PrivilegedAction::create_dir(Path::new("/proc/lumo-denied")))
            .unwrap_err();
        assert!(err.is_denied(), "unexpected error: {}", err);
    }

    #[test]
    fn test_program_not_found_is_not_denial() {
        let executor = escalating("pkexec", vec![126, 127]);
        let action = PrivilegedAction::systemctl("start", "nginx");

        let err = executor.classify(
            &action,
            Some(127),
            "pkexec: systemctl: command not found\n".to_string(),
        );
        match err {
            StackError::Privilege {
                kind: PrivilegeErrorKind::NonZeroExit { exit_code, output },
                ..
            } => {
                assert_eq!(exit_code, 127);
                assert!(output.contains("command not found"));
            }
            other => panic!("unexpected error: {}", other),
        }

        let err = executor.classify(
            &action,
            Some(127),
            "Cannot run program systemctl: No such file or directory\n".to_string(),
        );
        assert!(!err.is_denied());

        assert!(executor.classify(&action, Some(126), String::new()).is_denied());
        let refused = "Error executing command as another user: Not authorized\n";
        assert!(executor
            .classify(&action, Some(127), refused.to_string())
            .is_denied());
    }

    #[test]
    fn test_large_write_completes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("hosts");
        let content = "127.0.0.1\tblocked.example.com\n".repeat(10_000);
        let action = PrivilegedAction::write_file(&target, &content);

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let executor = SystemExecutor::direct(Duration::from_secs(3));
            let _ = done_tx.send(executor.run(&action).map(|_| ()));
        });

        let result = done_rx
            .recv_timeout(Duration::from_secs(15))
            .expect("write_file did not return");
        result.unwrap();
        assert!(std::fs::read_to_string(&target).unwrap() == content);
    }

    #[test]
    fn test_slot_serializes_concurrent_actions() {
        // The helper logs around each command it forwards
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("helper.log");
        let helper = dir.path().join("helper.sh");
        std::fs::write(
            &helper,
            format!(
                "echo start >> {log}\nsleep 0.3\necho end >> {log}\nexec \"$@\"\n",
                log = log.display()
            ),
        )
        .unwrap();

        let mut executor = SystemExecutor::direct(Duration::from_secs(10));
        executor.host_prefix = vec!["sh".to_string(), helper.display().to_string()];
        let executor = Arc::new(executor);

        let handles: Vec<_> = ["first", "second"]
            .into_iter()
            .map(|name| {
                let executor = Arc::clone(&executor);
                let target = dir.path().join(name);
                thread::spawn(move || executor.run(&PrivilegedAction::create_dir(&target)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let lines: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines, vec!["start", "end", "start", "end"]);
        assert!(dir.path().join("first").is_dir());
        assert!(dir.path().join("second").is_dir());
    }

    #[test]
    fn test_non_zero_exit_keeps_output() {
        let executor = SystemExecutor::direct(Duration::from_secs(5));
        let err = executor
            .run(&PrivilegedAction::rename(
                Path::new("/nonexistent/lumo/a"),
                Path::new("/nonexistent/lumo/b"),
            ))
            .unwrap_err();
        match err {
            StackError::Privilege {
                action,
                kind: PrivilegeErrorKind::NonZeroExit { exit_code, output },
            } => {
                assert!(action.starts_with("mv"));
                assert_ne!(exit_code, 0);
                assert!(!output.is_empty());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_helper_is_execution_failure() {
        let executor = escalating("lumo-no-such-helper", vec![126, 127]);
        let err = executor
            .run(&PrivilegedAction::systemctl("start", "nginx"))
            .unwrap_err();
        assert!(matches!(
            err,
            StackError::Privilege {
                kind: PrivilegeErrorKind::ExecutionFailed { .. },
                ..
            }
        ));
    }
}
