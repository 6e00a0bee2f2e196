//! Verdicts and grading reports

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final classification of a graded execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    WrongAnswer,
    PresentationError,
    RuntimeError,
    Timeout,
    BuildError,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Correct => "correct",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::PresentationError => "presentation_error",
            Verdict::RuntimeError => "runtime_error",
            Verdict::Timeout => "timeout",
            Verdict::BuildError => "build_error",
        };
        write!(f, "{}", s)
    }
}

/// First point where observed and expected transcripts diverge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Index of the first mismatching interaction
    pub index: usize,
    pub expected: String,
    pub observed: String,
}

/// One graded test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<Mismatch>,
    /// Diagnostic text: compiler output, stderr excerpt, or a human
    /// explanation of the mismatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_kb: Option<u64>,
}

impl GradeReport {
    pub fn correct() -> Self {
        Self {
            verdict: Verdict::Correct,
            mismatch: None,
            message: None,
            time_ms: None,
            memory_kb: None,
        }
    }

    pub fn of(verdict: Verdict) -> Self {
        Self {
            verdict,
            mismatch: None,
            message: None,
            time_ms: None,
            memory_kb: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_mismatch(mut self, mismatch: Mismatch) -> Self {
        self.mismatch = Some(mismatch);
        self
    }

    pub fn is_correct(&self) -> bool {
        self.verdict == Verdict::Correct
    }
}
