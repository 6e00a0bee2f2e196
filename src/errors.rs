//! Error taxonomy for the judge pipeline
//!
//! Failures of the judged program (crashes, timeouts) are not errors: they
//! are expected outcomes and surface as verdicts. Everything here is either
//! a caller mistake (unknown language, bad template), a build-time failure
//! shared by all test cases, or an internal defect.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    /// Identifier did not match any registered key, alias or extension
    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    /// Strict-mode registration collided with an existing entry
    #[error("language registration conflict: {0}")]
    Conflict(String),

    /// Static syntax check failed; no execution was attempted
    #[error("syntax error:\n{0}")]
    Syntax(String),

    /// Compiler invocation failed (nonzero exit, crash or compile timeout)
    #[error("build failed:\n{0}")]
    Build(String),

    /// Interaction-spec template could not be parsed
    #[error("invalid io template at line {line}: {message}")]
    Template { line: usize, message: String },

    /// Programming-defect condition (e.g. input cursor mismatch while
    /// grading). Never caused by the judged program.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JudgeError {
    /// Whether this error aborts the whole submission rather than a single
    /// test case.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JudgeError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = JudgeError::UnknownLanguage("cobol".into());
        assert_eq!(err.to_string(), "unknown language: cobol");

        let err = JudgeError::Template {
            line: 3,
            message: "missing value".into(),
        };
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_only_internal_is_fatal() {
        assert!(JudgeError::Internal("cursor mismatch".into()).is_fatal());
        assert!(!JudgeError::Build("gcc exploded".into()).is_fatal());
        assert!(!JudgeError::UnknownLanguage("x".into()).is_fatal());
    }
}
