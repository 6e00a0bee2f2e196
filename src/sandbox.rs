//! Process isolation boundary
//!
//! The judge consumes isolation through a narrow contract: spawn a command
//! in a working directory under resource limits, talk to it over pipes,
//! terminate it on demand and read a resource-usage report after exit.
//! [`LocalIsolation`] is the built-in backend: rlimit-based, no namespace or
//! filesystem isolation. Deployments with stronger requirements plug in
//! their own [`Isolation`] implementation.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use nix::sys::resource::{getrusage, setrlimit, Resource, UsageWho};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::errors::JudgeError;

/// Resource limits applied to one isolated execution
#[derive(Debug, Clone)]
pub struct Limits {
    /// Wall-clock budget for the whole execution in milliseconds
    pub wall_time_ms: u64,
    /// CPU time limit in milliseconds (rounded up to whole seconds for
    /// `RLIMIT_CPU`)
    pub cpu_time_ms: u64,
    /// Address-space limit in MB; 0 disables the memory limit
    pub memory_mb: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            wall_time_ms: 10_000,
            cpu_time_ms: 5_000,
            memory_mb: 512,
        }
    }
}

/// Resource usage snapshot reported after an execution exits
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    /// User + system CPU time in milliseconds
    pub cpu_time_ms: u64,
    /// Peak resident set size in KB
    pub max_rss_kb: u64,
}

/// Handle to a spawned isolated process.
///
/// The underlying child is configured with `kill_on_drop`, so dropping the
/// handle on any exit path (including cancellation) reaps the process.
#[derive(Debug)]
pub struct IsolatedChild {
    child: Child,
    started: Instant,
    usage_baseline: ResourceUsage,
}

impl IsolatedChild {
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Check for exit without blocking.
    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    /// Forcibly terminate the process (SIGKILL) and reap it. A no-op when
    /// the process already exited.
    pub async fn terminate(&mut self) -> std::io::Result<()> {
        // start_kill errors when the child was already reaped; either way
        // the process is gone after the wait.
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        Ok(())
    }

    /// Post-exit resource report. Only meaningful after the child has been
    /// reaped; counts CPU time as the delta against the snapshot taken at
    /// spawn time.
    pub fn resource_usage(&self) -> ResourceUsage {
        let now = rusage_children();
        ResourceUsage {
            cpu_time_ms: now
                .cpu_time_ms
                .saturating_sub(self.usage_baseline.cpu_time_ms),
            max_rss_kb: now.max_rss_kb,
        }
    }
}

/// The isolation contract the execution manager consumes
#[async_trait]
pub trait Isolation: Send + Sync {
    async fn spawn(
        &self,
        command: &[String],
        workdir: &Path,
        limits: &Limits,
    ) -> Result<IsolatedChild, JudgeError>;
}

/// rlimit-based local isolation backend
#[derive(Debug, Default, Clone)]
pub struct LocalIsolation;

#[async_trait]
impl Isolation for LocalIsolation {
    async fn spawn(
        &self,
        command: &[String],
        workdir: &Path,
        limits: &Limits,
    ) -> Result<IsolatedChild, JudgeError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| JudgeError::Internal("empty command".into()))?;

        debug!("spawning {:?} in {:?} under {:?}", command, workdir, limits);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let cpu_secs = limits.cpu_time_ms.div_ceil(1000).max(1);
        let memory_bytes = limits.memory_mb.saturating_mul(1024 * 1024);
        unsafe {
            cmd.pre_exec(move || {
                setrlimit(Resource::RLIMIT_CPU, cpu_secs, cpu_secs)
                    .map_err(std::io::Error::from)?;
                if memory_bytes > 0 {
                    setrlimit(Resource::RLIMIT_AS, memory_bytes, memory_bytes)
                        .map_err(std::io::Error::from)?;
                }
                Ok(())
            });
        }

        let usage_baseline = rusage_children();
        let child = cmd.spawn()?;

        Ok(IsolatedChild {
            child,
            started: Instant::now(),
            usage_baseline,
        })
    }
}

fn rusage_children() -> ResourceUsage {
    match getrusage(UsageWho::RUSAGE_CHILDREN) {
        Ok(usage) => {
            let user = usage.user_time();
            let system = usage.system_time();
            let cpu_ms = (user.tv_sec() + system.tv_sec()) as u64 * 1000
                + (user.tv_usec() + system.tv_usec()) as u64 / 1000;
            ResourceUsage {
                cpu_time_ms: cpu_ms,
                max_rss_kb: usage.max_rss() as u64,
            }
        }
        Err(_) => ResourceUsage::default(),
    }
}
