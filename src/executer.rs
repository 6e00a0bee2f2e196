//! Execution managers: run an artifact and record its transcript
//!
//! One execution is one isolated child process plus the coordinating task
//! in this module. The lifecycle is a fixed state machine:
//!
//! 1. **Launch** — spawn the artifact's entry point through the isolation
//!    boundary with piped standard streams.
//! 2. **Interact** — read output until the process goes quiet, then feed it
//!    the next scripted input. "Awaiting input" is detected heuristically:
//!    no stdout bytes within [`DEFAULT_IDLE_WINDOW_MS`] while the process
//!    is still alive. When inputs run out, stdin is closed.
//! 3. **Bound** — every read and write is capped by the remaining
//!    wall-clock budget; on expiry the child is killed.
//! 4. **Collect** — exit status and resource usage are captured.
//! 5. **Normalize** — stream events become a [`Transcript`], with the
//!    output chunk preceding each input recorded as its prompt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::compiler::BuildArtifact;
use crate::errors::JudgeError;
use crate::interaction::{Transcript, TranscriptBuilder};
use crate::sandbox::{Isolation, IsolatedChild, Limits, LocalIsolation, ResourceUsage};

/// Idle window after which a quiet, still-running process is considered to
/// be blocked waiting for input. Deliberately small against typical
/// time limits; raise it for very slow interpreters.
pub const DEFAULT_IDLE_WINDOW_MS: u64 = 100;

/// How one execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Clean exit with status zero
    Completed,
    /// Wall-clock budget expired; the process was killed
    TimedOut,
    /// Nonzero exit status
    Crashed,
    /// Terminated by a signal
    Killed,
}

/// Everything observed from one execution
#[derive(Debug)]
pub struct ExecutionResult {
    pub transcript: Transcript,
    pub exit_code: Option<i32>,
    pub wall_time_ms: u64,
    pub usage: ResourceUsage,
    pub reason: TerminationReason,
    /// Captured stderr, for diagnostics only; never part of the transcript
    pub stderr: String,
}

impl ExecutionResult {
    pub fn is_clean(&self) -> bool {
        self.reason == TerminationReason::Completed
    }
}

/// Per-execution configuration
#[derive(Clone)]
pub struct ExecutionConfig {
    pub limits: Limits,
    /// Quiet-period threshold for the awaiting-input heuristic
    pub idle_window_ms: u64,
    /// Interpreter command override; when set, interpreted executions run
    /// `interpreter_command <entry_point>` instead of the artifact's own
    /// run command
    pub interpreter_command: Option<Vec<String>>,
    /// Isolation backend; defaults to the local rlimit sandbox
    pub isolation: Arc<dyn Isolation>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            idle_window_ms: DEFAULT_IDLE_WINDOW_MS,
            interpreter_command: None,
            isolation: Arc::new(LocalIsolation),
        }
    }
}

impl std::fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("limits", &self.limits)
            .field("idle_window_ms", &self.idle_window_ms)
            .field("interpreter_command", &self.interpreter_command)
            .finish()
    }
}

/// Runs a built artifact against one scripted input sequence
#[async_trait]
pub trait ExecutionManager: Send + Sync {
    async fn execute(&self, inputs: &[String]) -> Result<ExecutionResult, JudgeError>;
}

/// Execution manager for compiled artifacts: runs the built binary
pub struct CompiledExecutionManager {
    artifact: BuildArtifact,
    config: ExecutionConfig,
}

impl CompiledExecutionManager {
    pub fn new(artifact: BuildArtifact, config: ExecutionConfig) -> Self {
        Self { artifact, config }
    }
}

#[async_trait]
impl ExecutionManager for CompiledExecutionManager {
    async fn execute(&self, inputs: &[String]) -> Result<ExecutionResult, JudgeError> {
        run_artifact(
            &self.artifact.run_command,
            &self.artifact,
            &self.config,
            inputs,
        )
        .await
    }
}

/// Execution manager for interpreted artifacts: runs
/// `interpreter entry_point` (or the artifact's run command when no
/// interpreter override is configured)
pub struct InterpretedExecutionManager {
    artifact: BuildArtifact,
    config: ExecutionConfig,
}

impl InterpretedExecutionManager {
    pub fn new(artifact: BuildArtifact, config: ExecutionConfig) -> Self {
        Self { artifact, config }
    }

    fn command(&self) -> Vec<String> {
        match &self.config.interpreter_command {
            Some(interpreter) => {
                let mut cmd = interpreter.clone();
                cmd.push(self.artifact.entry_point.to_string_lossy().into_owned());
                cmd
            }
            None => self.artifact.run_command.clone(),
        }
    }
}

#[async_trait]
impl ExecutionManager for InterpretedExecutionManager {
    async fn execute(&self, inputs: &[String]) -> Result<ExecutionResult, JudgeError> {
        run_artifact(&self.command(), &self.artifact, &self.config, inputs).await
    }
}

/// Shared Launch/Interact/Bound/Collect/Normalize implementation.
async fn run_artifact(
    command: &[String],
    artifact: &BuildArtifact,
    config: &ExecutionConfig,
    inputs: &[String],
) -> Result<ExecutionResult, JudgeError> {
    // Launch
    let mut child = config
        .isolation
        .spawn(command, &artifact.workspace, &config.limits)
        .await?;

    let mut stdin = child.take_stdin();
    let mut stdout = child
        .take_stdout()
        .ok_or_else(|| JudgeError::Internal("child stdout not piped".into()))?;
    let stderr = child
        .take_stderr()
        .ok_or_else(|| JudgeError::Internal("child stderr not piped".into()))?;

    // Drain stderr concurrently so a chatty program cannot deadlock on a
    // full pipe.
    let stderr_task = tokio::spawn(async move {
        let mut stderr = stderr;
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let deadline = Instant::now() + Duration::from_millis(config.limits.wall_time_ms);
    let idle_window = Duration::from_millis(config.idle_window_ms);

    let mut builder = TranscriptBuilder::new();
    let mut cursor = 0usize;
    let mut buf = [0u8; 4096];
    let mut timed_out = false;
    let mut stream_closed = false;

    // Interact, bounded by the wall-clock deadline
    while !timed_out && !stream_closed {
        let now = Instant::now();
        if now >= deadline {
            timed_out = true;
            break;
        }
        let window = idle_window.min(deadline - now);

        match timeout(window, stdout.read(&mut buf)).await {
            Ok(Ok(0)) => stream_closed = true,
            Ok(Ok(n)) => builder.push_output(&String::from_utf8_lossy(&buf[..n])),
            Ok(Err(e)) => {
                warn!("stdout read failed: {}", e);
                stream_closed = true;
            }
            Err(_) => {
                // Quiet period: the process either exited or is blocked on
                // a read.
                if child.try_wait()?.is_some() {
                    // Exited; pick up any final buffered output below.
                    let _ = drain_remaining(&mut stdout, &mut builder, deadline).await?;
                    break;
                }
                if cursor < inputs.len() {
                    match stdin.as_mut() {
                        Some(writer) => {
                            let value = &inputs[cursor];
                            let line = format!("{}\n", value);
                            let remaining = deadline.saturating_duration_since(Instant::now());
                            match timeout(remaining, async {
                                writer.write_all(line.as_bytes()).await?;
                                writer.flush().await
                            })
                            .await
                            {
                                Ok(Ok(())) => {
                                    builder.push_input(value.clone());
                                    cursor += 1;
                                }
                                Ok(Err(e)) => {
                                    // Broken pipe: the process stopped reading.
                                    // The remaining inputs are undeliverable;
                                    // stdout must still be drained until the
                                    // program finishes.
                                    debug!("stdin write failed: {}", e);
                                    stdin = None;
                                    cursor = inputs.len();
                                }
                                Err(_) => timed_out = true,
                            }
                        }
                        None => cursor = inputs.len(),
                    }
                } else {
                    // Inputs exhausted: signal end-of-input by closing the
                    // channel instead of blocking the program forever.
                    stdin = None;
                }
            }
        }
    }

    // Bound: hard kill on expiry, never cooperative
    drop(stdin);
    let reason;
    let exit_code;
    if timed_out {
        child.terminate().await?;
        reason = TerminationReason::TimedOut;
        exit_code = None;
    } else {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, child.wait()).await {
            Ok(Ok(status)) => {
                exit_code = status.code();
                reason = match status.code() {
                    Some(0) => TerminationReason::Completed,
                    Some(_) => TerminationReason::Crashed,
                    // No exit code on Unix means a signal ended it
                    None => TerminationReason::Killed,
                };
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                child.terminate().await?;
                reason = TerminationReason::TimedOut;
                exit_code = None;
            }
        }
    }

    // Collect
    let wall_time_ms = child.elapsed_ms();
    let usage = child.resource_usage();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

    debug!(
        "execution finished: reason={:?} exit={:?} wall={}ms cpu={}ms",
        reason, exit_code, wall_time_ms, usage.cpu_time_ms
    );

    // Normalize
    Ok(ExecutionResult {
        transcript: builder.finish(),
        exit_code,
        wall_time_ms,
        usage,
        reason,
        stderr,
    })
}

/// Read whatever output is still buffered after the process exited.
/// Returns true when end-of-stream was reached.
async fn drain_remaining(
    stdout: &mut (impl AsyncReadExt + Unpin),
    builder: &mut TranscriptBuilder,
    deadline: Instant,
) -> Result<bool, JudgeError> {
    let mut buf = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        match timeout(remaining, stdout.read(&mut buf)).await {
            Ok(Ok(0)) => return Ok(true),
            Ok(Ok(n)) => builder.push_output(&String::from_utf8_lossy(&buf[..n])),
            Ok(Err(_)) => return Ok(true),
            Err(_) => return Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::Interaction;
    use std::path::PathBuf;
    use std::time::Instant as StdInstant;

    fn sh_artifact(dir: &tempfile::TempDir, script: &str) -> BuildArtifact {
        let path = dir.path().join("main.sh");
        std::fs::write(&path, script).unwrap();
        BuildArtifact {
            workspace: dir.path().to_path_buf(),
            entry_point: path,
            run_command: vec!["sh".into(), "main.sh".into()],
            syntax_checked: false,
        }
    }

    fn config_with_wall(wall_ms: u64) -> ExecutionConfig {
        ExecutionConfig {
            limits: Limits {
                wall_time_ms: wall_ms,
                ..Limits::default()
            },
            ..ExecutionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_echo_program_alternates_input_output() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(&dir, "while read line; do echo \"$line\"; done\n");
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(10_000));

        let result = mgr.execute(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::Completed);

        // Every output equals the immediately preceding input.
        let events = result.transcript.events();
        for pair in events.windows(2) {
            if let [Interaction::Input(input), Interaction::Output(output)] = pair {
                assert_eq!(input, output);
            }
        }
        assert_eq!(result.transcript.inputs(), vec!["a", "b"]);
        assert!(events.contains(&Interaction::Output("a".into())));
        assert!(events.contains(&Interaction::Output("b".into())));
    }

    #[tokio::test]
    async fn test_prompts_recorded_before_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(
            &dir,
            "printf 'x: '; read a; printf 'y: '; read b; echo \"result: $a$b\"\n",
        );
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(10_000));

        let result = mgr.execute(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(
            result.transcript.events(),
            &[
                Interaction::Prompt("x: ".into()),
                Interaction::Input("a".into()),
                Interaction::Prompt("y: ".into()),
                Interaction::Input("b".into()),
                Interaction::Output("result: ab".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(&dir, "while :; do :; done\n");
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(400));

        let t0 = StdInstant::now();
        let result = mgr.execute(&[]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::TimedOut);
        // Bounded: well under the 5s guard even with kill overhead.
        assert!(t0.elapsed() < Duration::from_secs(5));
        assert!(result.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_crashed() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(&dir, "echo oops >&2; exit 3\n");
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(10_000));

        let result = mgr.execute(&[]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::Crashed);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_unconsumed_inputs_close_stdin() {
        // Program exits without reading; remaining inputs must not hang the
        // judge and must not appear in the transcript.
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(&dir, "echo done\n");
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(10_000));

        let result = mgr.execute(&["unused".into()]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::Completed);
        assert!(result
            .transcript
            .events()
            .contains(&Interaction::Output("done".into())));
    }

    #[tokio::test]
    async fn test_output_after_stdin_close_is_recorded() {
        // Program closes its stdin with inputs still pending, then keeps
        // writing; the late output must land in the transcript and the run
        // must not report a timeout.
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(&dir, "exec 0<&-\nsleep 0.4\necho late\n");
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(10_000));

        let result = mgr.execute(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::Completed);
        assert!(result
            .transcript
            .events()
            .contains(&Interaction::Output("late".into())));
    }

    #[tokio::test]
    async fn test_exhausted_inputs_send_eof() {
        // `cat` only terminates on end-of-input; the judge must close stdin
        // once the script runs out rather than block forever.
        let dir = tempfile::tempdir().unwrap();
        let artifact = sh_artifact(&dir, "cat\n");
        let mgr = InterpretedExecutionManager::new(artifact, config_with_wall(10_000));

        let result = mgr.execute(&["only".into()]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::Completed);
        assert!(result
            .transcript
            .events()
            .contains(&Interaction::Output("only".into())));
    }

    #[tokio::test]
    async fn test_compiled_manager_runs_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main");
        std::fs::write(&path, "#!/bin/sh\necho compiled\n").unwrap();
        std::process::Command::new("chmod")
            .args(["+x", path.to_str().unwrap()])
            .status()
            .unwrap();
        let artifact = BuildArtifact {
            workspace: dir.path().to_path_buf(),
            entry_point: path,
            run_command: vec!["./main".into()],
            syntax_checked: false,
        };
        let mgr = CompiledExecutionManager::new(artifact, config_with_wall(10_000));
        let result = mgr.execute(&[]).await.unwrap();
        assert_eq!(result.reason, TerminationReason::Completed);
        assert_eq!(
            result.transcript.events(),
            &[Interaction::Output("compiled".into())]
        );
    }

    #[test]
    fn test_interpreter_override_builds_command() {
        let artifact = BuildArtifact {
            workspace: PathBuf::from("/tmp/ws"),
            entry_point: PathBuf::from("/tmp/ws/main.py"),
            run_command: vec!["python3".into(), "main.py".into()],
            syntax_checked: false,
        };
        let config = ExecutionConfig {
            interpreter_command: Some(vec!["python3".into(), "-I".into()]),
            ..ExecutionConfig::default()
        };
        let mgr = InterpretedExecutionManager::new(artifact, config);
        assert_eq!(mgr.command(), vec!["python3", "-I", "/tmp/ws/main.py"]);
    }
}
