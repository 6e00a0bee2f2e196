//! Automatic judge for interactive console programs.
//!
//! Submissions are built in a throwaway workspace, executed under resource
//! limits while the judge feeds scripted inputs, and the resulting
//! prompt/input/output transcript is graded against an expected transcript
//! with tolerant comparison (numeric tolerance, whitespace as presentation
//! errors). Languages plug in through a process-wide registry; the built-in
//! set covers compiled and interpreted languages through two generic
//! manager pairs configured from a TOML table.

pub mod compiler;
pub mod errors;
pub mod executer;
pub mod grader;
pub mod interaction;
pub mod iospec;
pub mod judger;
pub mod languages;
pub mod registry;
pub mod sandbox;
pub mod verdict;

pub use compiler::{BuildArtifact, BuildManager};
pub use errors::JudgeError;
pub use executer::{ExecutionConfig, ExecutionManager, ExecutionResult, TerminationReason};
pub use interaction::{CompareHints, Interaction, TestCase, Transcript, TranscriptBuilder};
pub use judger::{grade, grade_with_options, run, run_with_options, JudgeOptions};
pub use languages::{register_builtin_languages, register_languages_from_toml, LanguageConfig};
pub use registry::{register, register_strict, resolve, resolve_by_filename, Registration};
pub use sandbox::{Isolation, Limits, LocalIsolation, ResourceUsage};
pub use verdict::{GradeReport, Mismatch, Verdict};
