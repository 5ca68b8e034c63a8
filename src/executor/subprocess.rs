//! Safe subprocess execution.
//!
//! Provides utilities for running external commands safely with:
//! - No shell interpretation (direct exec)
//! - Configurable timeouts
//! - Captured stdout/stderr
//! - Optional stdin payload

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{PrivilegeErrorKind, StackError};

/// Result of a subprocess execution.
#[derive(Debug, Clone)]
pub struct SubprocessResult {
    /// Whether the command exited successfully (exit code 0).
    pub success: bool,
    /// The exit code, if available.
    pub exit_code: Option<i32>,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl SubprocessResult {
    fn from_parts(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        }
    }

    /// Stdout followed by stderr, the way a terminal would show them.
    pub fn combined_output(&self) -> String {
        let mut combined = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        combined
    }
}

/// Builder for subprocess execution.
pub struct SubprocessBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
    kill_on_timeout: bool,
}

impl SubprocessBuilder {
    /// Create a new subprocess builder.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            stdin: None,
            timeout: Duration::from_secs(60),
            kill_on_timeout: true,
        }
    }

    /// Add arguments to the command.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Feed these bytes to the process on stdin, then close it.
    pub fn stdin(mut self, payload: Vec<u8>) -> Self {
        self.stdin = Some(payload);
        self
    }

    /// Set the timeout for the command.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stop waiting on timeout but leave the process running.
    ///
    /// Used for escalated commands: once dispatched they cannot be taken
    /// back, so the caller only gives up waiting.
    pub fn detach_on_timeout(mut self) -> Self {
        self.kill_on_timeout = false;
        self
    }

    /// Execute the command and wait for completion with timeout enforcement.
    ///
    /// The stdin payload is written and both output pipes are drained on
    /// their own threads, so a child that echoes its input cannot stall on
    /// a full pipe. If the process exceeds the configured timeout a timeout
    /// error is returned; the process is killed unless `detach_on_timeout`
    /// was set.
    pub fn run(mut self) -> Result<SubprocessResult, StackError> {
        debug!(
            program = %self.program,
            args = ?self.args,
            stdin_bytes = self.stdin.as_ref().map(Vec::len),
            timeout_secs = self.timeout.as_secs(),
            "Executing subprocess"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            StackError::privilege(
                &self.program,
                PrivilegeErrorKind::ExecutionFailed {
                    message: format!("Failed to spawn {}: {}", self.program, e),
                },
            )
        })?;

        // The pipe is dropped when the writer finishes, closing stdin
        let writer = match (self.stdin.take(), child.stdin.take()) {
            (Some(payload), Some(mut pipe)) => {
                Some(thread::spawn(move || pipe.write_all(&payload)))
            }
            _ => None,
        };
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        // Poll for completion with timeout enforcement
        let start = Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let result = SubprocessResult::from_parts(
                        status,
                        collect(stdout),
                        collect(stderr),
                    );
                    if let Some(Err(e)) = writer.map(finish_write) {
                        // A failing process may exit without reading its input
                        if result.success {
                            return Err(StackError::privilege(
                                &self.program,
                                PrivilegeErrorKind::ExecutionFailed {
                                    message: format!(
                                        "Failed to write stdin of {}: {}",
                                        self.program, e
                                    ),
                                },
                            ));
                        }
                        debug!(program = %self.program, error = %e, "Stdin not fully read");
                    }
                    debug!(
                        success = result.success,
                        exit_code = ?result.exit_code,
                        duration_ms = start.elapsed().as_millis(),
                        "Subprocess completed"
                    );
                    return Ok(result);
                }
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        if self.kill_on_timeout {
                            warn!(
                                program = %self.program,
                                timeout_secs = self.timeout.as_secs(),
                                "Process timed out, killing"
                            );
                            if let Err(e) = child.kill() {
                                warn!(error = %e, "Failed to kill timed-out process");
                            }
                            // Reap the zombie process
                            let _ = child.wait();
                        } else {
                            warn!(
                                program = %self.program,
                                pid = child.id(),
                                timeout_secs = self.timeout.as_secs(),
                                "Stopped waiting for process; it may still complete"
                            );
                        }
                        return Err(StackError::privilege(
                            &self.program,
                            PrivilegeErrorKind::Timeout {
                                timeout_secs: self.timeout.as_secs(),
                            },
                        ));
                    }
                    thread::sleep(poll_interval);
                }
                Err(e) => {
                    return Err(StackError::privilege(
                        &self.program,
                        PrivilegeErrorKind::ExecutionFailed {
                            message: format!("Failed to check process status: {}", e),
                        },
                    ));
                }
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn finish_write(writer: JoinHandle<io::Result<()>>) -> io::Result<()> {
    writer
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")))
}

/// Run an unprivileged command with the given arguments and timeout.
///
/// Read-only queries go through here; the locale is pinned so that tools
/// such as `systemctl` print their untranslated state words.
pub fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<SubprocessResult, StackError> {
    SubprocessBuilder::new(program)
        .args(args.iter().copied())
        .env("LC_ALL", "C")
        .timeout(timeout)
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_echo() {
        let result = run_command("echo", &["hello", "world"], Duration::from_secs(5)).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_run_false_command() {
        let result = run_command("false", &[], Duration::from_secs(5)).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_subprocess_builder() {
        let result = SubprocessBuilder::new("echo")
            .arg("test")
            .arg("builder")
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.trim(), "test builder");
    }

    #[test]
    fn test_stdin_payload() {
        let result = SubprocessBuilder::new("cat")
            .stdin(b"server {}\n".to_vec())
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout, "server {}\n");
    }

    #[test]
    fn test_large_stdin_payload_is_echoed() {
        let payload = "127.0.0.1\tblocked.example.com\n".repeat(40_000);
        let result = SubprocessBuilder::new("cat")
            .stdin(payload.clone().into_bytes())
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stdout.len(), payload.len());
        assert!(result.stdout == payload);
    }

    #[test]
    fn test_unread_stdin_is_execution_failure() {
        // `true` exits without reading, so the writer hits a closed pipe
        let result = SubprocessBuilder::new("true")
            .stdin(vec![b'x'; 1 << 20])
            .timeout(Duration::from_secs(5))
            .run();
        match result {
            Err(StackError::Privilege {
                kind: PrivilegeErrorKind::ExecutionFailed { message },
                ..
            }) => assert!(message.contains("Failed to write stdin")),
            other => panic!("expected a stdin write failure, got {other:?}"),
        }
    }

    #[test]
    fn test_nonexistent_command() {
        let result = run_command("nonexistent_command_12345", &[], Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(StackError::Privilege {
                kind: PrivilegeErrorKind::ExecutionFailed { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_timeout_kills() {
        let result = SubprocessBuilder::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(200))
            .run();
        assert!(matches!(
            result,
            Err(StackError::Privilege {
                kind: PrivilegeErrorKind::Timeout { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_timeout_detached_process_keeps_running() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 0.5; touch {}", marker.display());

        let result = SubprocessBuilder::new("sh")
            .args(["-c", script.as_str()])
            .timeout(Duration::from_millis(100))
            .detach_on_timeout()
            .run();
        assert!(matches!(
            result,
            Err(StackError::Privilege {
                kind: PrivilegeErrorKind::Timeout { .. },
                ..
            })
        ));
        assert!(!marker.exists());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(marker.exists(), "detached process did not run to completion");
    }

    #[test]
    fn test_combined_output() {
        let result = run_command("sh", &["-c", "echo out; echo err >&2"], Duration::from_secs(5))
            .unwrap();

        assert!(result.success);
        assert_eq!(result.stderr.trim(), "err");
        assert_eq!(result.combined_output(), "out\nerr\n");
    }
}
