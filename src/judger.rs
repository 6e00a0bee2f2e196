//! Pipeline facade: resolve, build once, execute per test case, grade
//!
//! Build-time failures (syntax or compile) are shared by every test case:
//! the pipeline fails fast and reports the same build error for each.
//! Execution and grading failures are isolated per test case; one crash or
//! timeout never aborts siblings, and every test case always gets a
//! verdict. Internal invariant violations are the only fatal path.

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::compiler::BuildArtifact;
use crate::errors::JudgeError;
use crate::executer::ExecutionConfig;
use crate::grader;
use crate::interaction::{TestCase, Transcript};
use crate::registry::{self, ExecFactory};
use crate::sandbox::Limits;
use crate::verdict::{GradeReport, Verdict};

/// Per-submission judging options
#[derive(Debug, Clone)]
pub struct JudgeOptions {
    pub limits: Limits,
    pub idle_window_ms: u64,
}

impl Default for JudgeOptions {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            idle_window_ms: crate::executer::DEFAULT_IDLE_WINDOW_MS,
        }
    }
}

impl JudgeOptions {
    fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            limits: self.limits.clone(),
            idle_window_ms: self.idle_window_ms,
            ..ExecutionConfig::default()
        }
    }
}

/// Run a program against each input sequence and return one transcript per
/// sequence. Build failures abort the whole run.
pub async fn run(
    source: &str,
    inputs: &[Vec<String>],
    lang: &str,
) -> Result<Vec<Transcript>, JudgeError> {
    run_with_options(source, inputs, lang, &JudgeOptions::default()).await
}

pub async fn run_with_options(
    source: &str,
    inputs: &[Vec<String>],
    lang: &str,
    options: &JudgeOptions,
) -> Result<Vec<Transcript>, JudgeError> {
    let registration = registry::resolve(lang)?;
    let mut build_manager =
        (registration.build_factory)(source.to_string(), registration.config.clone());

    build_manager.check_syntax().await?;
    let artifact = build_manager.build().await?;

    let mut set = JoinSet::new();
    for (index, input_set) in inputs.iter().enumerate() {
        spawn_execution(
            &mut set,
            index,
            registration.exec_factory.clone(),
            artifact.clone(),
            options.execution_config(),
            input_set.clone(),
        );
    }

    let mut transcripts: Vec<Option<Transcript>> = vec![None; inputs.len()];
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(|e| JudgeError::Internal(e.to_string()))?;
        transcripts[index] = Some(result?.transcript);
    }

    // The build manager owns the workspace; it must outlive every execution.
    drop(build_manager);

    Ok(transcripts.into_iter().map(|t| t.unwrap_or_default()).collect())
}

/// Grade a program against each test case. Always yields one report per
/// test case; only internal defects and unknown languages error out.
pub async fn grade(
    source: &str,
    cases: &[TestCase],
    lang: &str,
) -> Result<Vec<GradeReport>, JudgeError> {
    grade_with_options(source, cases, lang, &JudgeOptions::default()).await
}

pub async fn grade_with_options(
    source: &str,
    cases: &[TestCase],
    lang: &str,
    options: &JudgeOptions,
) -> Result<Vec<GradeReport>, JudgeError> {
    let registration = registry::resolve(lang)?;
    let mut build_manager =
        (registration.build_factory)(source.to_string(), registration.config.clone());

    // Syntax-check and build once; every test case shares the outcome.
    let built = async {
        build_manager.check_syntax().await?;
        build_manager.build().await
    }
    .await;

    let artifact = match built {
        Ok(artifact) => artifact,
        Err(JudgeError::Syntax(message)) | Err(JudgeError::Build(message)) => {
            info!("build failed, reporting build_error for {} cases", cases.len());
            return Ok(cases
                .iter()
                .map(|_| GradeReport::of(Verdict::BuildError).with_message(message.clone()))
                .collect());
        }
        Err(other) => return Err(other),
    };

    let mut set = JoinSet::new();
    for (index, case) in cases.iter().enumerate() {
        let case = case.clone();
        let exec_factory = registration.exec_factory.clone();
        let artifact = artifact.clone();
        let config = options.execution_config();
        set.spawn(async move {
            let inputs = case.inputs();
            let manager = (exec_factory)(artifact, config);
            let report = match manager.execute(&inputs).await {
                Ok(result) => {
                    let mut report = grader::grade(&result, &case)?;
                    report.time_ms = Some(result.wall_time_ms);
                    report.memory_kb = Some(result.usage.max_rss_kb);
                    report
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // Isolated failure: this test case still gets a verdict.
                    warn!("execution failed for test case {}: {}", index, e);
                    GradeReport::of(Verdict::RuntimeError)
                        .with_message(format!("execution failed: {}", e))
                }
            };
            Ok((index, report))
        });
    }

    let mut reports: Vec<Option<GradeReport>> = vec![None; cases.len()];
    while let Some(joined) = set.join_next().await {
        let (index, report) = joined.map_err(|e| JudgeError::Internal(e.to_string()))??;
        reports[index] = Some(report);
    }

    drop(build_manager);

    Ok(reports
        .into_iter()
        .map(|r| r.unwrap_or_else(|| GradeReport::of(Verdict::RuntimeError)))
        .collect())
}

fn spawn_execution(
    set: &mut JoinSet<(usize, Result<crate::executer::ExecutionResult, JudgeError>)>,
    index: usize,
    exec_factory: ExecFactory,
    artifact: BuildArtifact,
    config: ExecutionConfig,
    inputs: Vec<String>,
) {
    set.spawn(async move {
        let manager = (exec_factory)(artifact, config);
        let result = manager.execute(&inputs).await;
        (index, result)
    });
}
