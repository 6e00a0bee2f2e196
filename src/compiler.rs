//! Build managers: source text in, runnable artifact out
//!
//! A build manager owns a scoped temporary workspace for one submission.
//! The workspace is created lazily, written with the source file, and
//! removed when the manager is dropped, on every exit path. The artifact it
//! produces stays valid only as long as the manager is alive.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::errors::JudgeError;
use crate::languages::LanguageConfig;

/// Time budget for one compiler or syntax-checker invocation
pub const COMPILE_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Description of a built, runnable program
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// Path to the scoped workspace holding source and build outputs
    pub workspace: PathBuf,
    /// Path to the runnable entry point (binary for compiled languages,
    /// the source file itself for interpreted ones)
    pub entry_point: PathBuf,
    /// Command that runs the entry point, relative to the workspace
    pub run_command: Vec<String>,
    /// Whether a static syntax check ran before the build
    pub syntax_checked: bool,
}

/// Turns raw source text into a runnable artifact
#[async_trait]
pub trait BuildManager: Send + Sync {
    /// Validate the source without executing it. `Err(JudgeError::Syntax)`
    /// carries the checker's diagnostic text.
    async fn check_syntax(&mut self) -> Result<(), JudgeError>;

    /// Produce the runnable artifact. `Err(JudgeError::Build)` carries the
    /// captured compiler output.
    async fn build(&mut self) -> Result<BuildArtifact, JudgeError>;
}

/// Shared workspace handling for both manager variants
struct Workspace {
    source: String,
    config: LanguageConfig,
    dir: Option<TempDir>,
    syntax_checked: bool,
}

impl Workspace {
    fn new(source: String, config: LanguageConfig) -> Self {
        Self {
            source,
            config,
            dir: None,
            syntax_checked: false,
        }
    }

    /// Create the temporary workspace and write the source file into it.
    /// Subsequent calls reuse the existing directory.
    async fn prepare(&mut self) -> Result<&TempDir, JudgeError> {
        if self.dir.is_none() {
            let dir = tempfile::tempdir()?;
            let source_path = dir.path().join(&self.config.source_file);
            tokio::fs::write(&source_path, &self.source).await?;
            debug!("workspace prepared at {:?}", dir.path());
            self.dir = Some(dir);
        }
        Ok(self.dir.as_ref().unwrap())
    }

    /// Run a build-phase command (compiler or syntax checker) inside the
    /// workspace, bounded by [`COMPILE_TIME_LIMIT`]. Returns the combined
    /// diagnostic text on failure.
    async fn run_tool(&mut self, command: &[String]) -> Result<(), String> {
        let dir = self
            .prepare()
            .await
            .map_err(|e| format!("failed to prepare workspace: {}", e))?;

        let (program, args) = match command.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };

        let output = timeout(
            COMPILE_TIME_LIMIT,
            Command::new(program)
                .args(args)
                .current_dir(dir.path())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stdout = String::from_utf8_lossy(&output.stdout);
                let message = if !stderr.trim().is_empty() {
                    stderr.into_owned()
                } else if !stdout.trim().is_empty() {
                    stdout.into_owned()
                } else {
                    format!("command {:?} failed with {}", command, output.status)
                };
                Err(message)
            }
            Ok(Err(e)) => Err(format!("failed to run {:?}: {}", program, e)),
            Err(_) => Err("compilation is taking too long".to_string()),
        }
    }

    fn artifact(&self, entry_point: PathBuf) -> BuildArtifact {
        let workspace = self
            .dir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap_or_default();
        BuildArtifact {
            workspace,
            entry_point,
            run_command: self.config.run_command.clone(),
            syntax_checked: self.syntax_checked,
        }
    }
}

/// Build manager for languages with a separate compile step
pub struct CompiledBuildManager {
    ws: Workspace,
}

impl CompiledBuildManager {
    pub fn new(source: String, config: LanguageConfig) -> Self {
        Self {
            ws: Workspace::new(source, config),
        }
    }
}

#[async_trait]
impl BuildManager for CompiledBuildManager {
    async fn check_syntax(&mut self) -> Result<(), JudgeError> {
        let command = match self.ws.config.syntax_check_command.clone() {
            Some(cmd) => cmd,
            // Fall back to a full compile at build time
            None => return Ok(()),
        };
        self.ws
            .run_tool(&command)
            .await
            .map_err(JudgeError::Syntax)?;
        self.ws.syntax_checked = true;
        Ok(())
    }

    async fn build(&mut self) -> Result<BuildArtifact, JudgeError> {
        let command = self
            .ws
            .config
            .compile_command
            .clone()
            .ok_or_else(|| JudgeError::Internal("compiled language without compile command".into()))?;

        info!("building: {}", command.join(" "));
        self.ws.run_tool(&command).await.map_err(JudgeError::Build)?;

        // By convention the compiled binary is the first component of the
        // run command, relative to the workspace.
        let binary = self
            .ws
            .config
            .run_command
            .first()
            .map(|s| s.trim_start_matches("./").to_string())
            .unwrap_or_else(|| "main".to_string());
        let dir = self.ws.prepare().await?;
        let entry_point = dir.path().join(binary);
        Ok(self.ws.artifact(entry_point))
    }
}

/// Build manager for interpreted languages: building only materializes the
/// workspace, the entry point is the source file itself.
pub struct InterpretedBuildManager {
    ws: Workspace,
}

impl InterpretedBuildManager {
    pub fn new(source: String, config: LanguageConfig) -> Self {
        Self {
            ws: Workspace::new(source, config),
        }
    }
}

#[async_trait]
impl BuildManager for InterpretedBuildManager {
    async fn check_syntax(&mut self) -> Result<(), JudgeError> {
        let command = match self.ws.config.syntax_check_command.clone() {
            Some(cmd) => cmd,
            None => return Ok(()),
        };
        self.ws
            .run_tool(&command)
            .await
            .map_err(JudgeError::Syntax)?;
        self.ws.syntax_checked = true;
        Ok(())
    }

    async fn build(&mut self) -> Result<BuildArtifact, JudgeError> {
        let source_file = self.ws.config.source_file.clone();
        let dir = self.ws.prepare().await?;
        let entry_point = dir.path().join(source_file);
        Ok(self.ws.artifact(entry_point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_config() -> LanguageConfig {
        LanguageConfig {
            source_file: "main.sh".into(),
            compile_command: None,
            syntax_check_command: Some(vec!["sh".into(), "-n".into(), "main.sh".into()]),
            run_command: vec!["sh".into(), "main.sh".into()],
        }
    }

    fn fake_compiled_config(compile: &[&str]) -> LanguageConfig {
        LanguageConfig {
            source_file: "main.sh".into(),
            compile_command: Some(compile.iter().map(|s| s.to_string()).collect()),
            syntax_check_command: Some(vec!["sh".into(), "-n".into(), "main.sh".into()]),
            run_command: vec!["./main".into()],
        }
    }

    #[tokio::test]
    async fn test_interpreted_build_points_at_source() {
        let mut mgr = InterpretedBuildManager::new("echo hi\n".into(), sh_config());
        let artifact = mgr.build().await.unwrap();
        assert!(artifact.entry_point.ends_with("main.sh"));
        assert!(artifact.entry_point.exists());
        assert_eq!(artifact.run_command, vec!["sh", "main.sh"]);
    }

    #[tokio::test]
    async fn test_interpreted_syntax_check_passes() {
        let mut mgr = InterpretedBuildManager::new("echo hi\n".into(), sh_config());
        mgr.check_syntax().await.unwrap();
        let artifact = mgr.build().await.unwrap();
        assert!(artifact.syntax_checked);
    }

    #[tokio::test]
    async fn test_interpreted_syntax_check_fails() {
        let mut mgr = InterpretedBuildManager::new("if then fi\n".into(), sh_config());
        let err = mgr.check_syntax().await.unwrap_err();
        assert!(matches!(err, JudgeError::Syntax(_)));
    }

    #[tokio::test]
    async fn test_compiled_build_runs_compiler() {
        // Stand-in compiler: copies the script to the binary name.
        let config = fake_compiled_config(&["/bin/sh", "-c", "cp main.sh main && chmod +x main"]);
        let mut mgr = CompiledBuildManager::new("#!/bin/sh\necho built\n".into(), config);
        let artifact = mgr.build().await.unwrap();
        assert!(artifact.entry_point.ends_with("main"));
        assert!(artifact.entry_point.exists());
    }

    #[tokio::test]
    async fn test_compiled_build_failure_captures_output() {
        let config = fake_compiled_config(&["/bin/sh", "-c", "echo boom >&2; exit 1"]);
        let mut mgr = CompiledBuildManager::new("whatever\n".into(), config);
        let err = mgr.build().await.unwrap_err();
        match err {
            JudgeError::Build(msg) => assert!(msg.contains("boom")),
            other => panic!("expected Build error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let mut mgr = InterpretedBuildManager::new("echo hi\n".into(), sh_config());
        let artifact = mgr.build().await.unwrap();
        let workspace = artifact.workspace.clone();
        assert!(workspace.exists());
        drop(mgr);
        assert!(!workspace.exists());
    }
}
