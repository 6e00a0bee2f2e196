//! Grading engine: observed transcript vs expected test case
//!
//! Comparison is tolerant in exactly three ways: numeric outputs are
//! compared within a relative tolerance, whitespace/newline-only
//! differences are downgraded to presentation errors, and a step with
//! declared alternatives passes if any alternative matches. Everything
//! else is an exact textual comparison.

use tracing::debug;

use crate::errors::JudgeError;
use crate::executer::{ExecutionResult, TerminationReason};
use crate::interaction::{CompareHints, Interaction, TestCase};
use crate::verdict::{GradeReport, Mismatch, Verdict};

/// Outcome of one tolerant text comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Match,
    /// Only leading/trailing whitespace or newline style differs
    Presentation,
    Mismatch,
}

/// Grade one execution against its expected test case.
///
/// Always produces a report for crashes and timeouts; the only error path
/// is an internal defect (the observed inputs differ from the ones the
/// judge itself supplied).
pub fn grade(result: &ExecutionResult, expected: &TestCase) -> Result<GradeReport, JudgeError> {
    // Abnormal terminations short-circuit: no comparison is meaningful.
    match result.reason {
        TerminationReason::TimedOut => {
            return Ok(GradeReport::of(Verdict::Timeout)
                .with_message("wall-clock time limit exceeded"));
        }
        TerminationReason::Crashed | TerminationReason::Killed => {
            let mut report = GradeReport::of(Verdict::RuntimeError);
            let detail = stderr_excerpt(&result.stderr);
            report.message = Some(match (&detail, result.exit_code) {
                (Some(text), _) => text.clone(),
                (None, Some(code)) => format!("process exited with code {}", code),
                (None, None) => "process killed by signal".to_string(),
            });
            return Ok(report);
        }
        TerminationReason::Completed => {}
    }

    let observed = result.transcript.events();
    let wanted = expected.expected.events();
    let hints = &expected.hints;

    let common = observed.len().min(wanted.len());
    for index in 0..common {
        let obs = &observed[index];
        let want = &wanted[index];

        match (obs.is_input(), want.is_input()) {
            (true, true) => {
                // The judge supplied these values itself; divergence here is
                // a defect in the pipeline, not a grading outcome.
                if obs.text() != want.text() {
                    return Err(JudgeError::Internal(format!(
                        "input cursor mismatch at index {}: fed {:?}, expected {:?}",
                        index,
                        obs.text(),
                        want.text()
                    )));
                }
            }
            (false, false) => {
                let outcome = compare_step(obs.text(), want, index, expected, hints);
                if outcome != Comparison::Match {
                    let verdict = match outcome {
                        Comparison::Presentation => Verdict::PresentationError,
                        _ => Verdict::WrongAnswer,
                    };
                    debug!("mismatch at index {}: {:?} vs {:?}", index, obs, want);
                    return Ok(GradeReport::of(verdict).with_mismatch(Mismatch {
                        index,
                        expected: want.text().to_string(),
                        observed: obs.text().to_string(),
                    }));
                }
            }
            // Shape mismatch: e.g. the program printed where an input was
            // expected, or consumed input where output was expected.
            _ => {
                return Ok(GradeReport::of(Verdict::WrongAnswer).with_mismatch(Mismatch {
                    index,
                    expected: want.text().to_string(),
                    observed: obs.text().to_string(),
                }));
            }
        }
    }

    // Trailing events on either side: unconsumed expectations (program
    // terminated early) or unexpected extra output. Whitespace-only extras
    // are a presentation problem, anything else is wrong.
    if observed.len() != wanted.len() {
        let (longer, side_expected) = if wanted.len() > common {
            (&wanted[common..], true)
        } else {
            (&observed[common..], false)
        };
        let all_blank = longer
            .iter()
            .all(|ev| !ev.is_input() && ev.text().trim().is_empty());
        let verdict = if all_blank {
            Verdict::PresentationError
        } else {
            Verdict::WrongAnswer
        };
        let text = longer[0].text().to_string();
        let (expected_text, observed_text) = if side_expected {
            (text, String::new())
        } else {
            (String::new(), text)
        };
        return Ok(GradeReport::of(verdict).with_mismatch(Mismatch {
            index: common,
            expected: expected_text,
            observed: observed_text,
        }));
    }

    Ok(GradeReport::correct())
}

/// Compare one observed text event against the expected event, trying the
/// declared alternatives as well.
fn compare_step(
    observed: &str,
    want: &Interaction,
    index: usize,
    case: &TestCase,
    hints: &CompareHints,
) -> Comparison {
    let mut best = compare_text(observed, want.text(), hints);
    if best == Comparison::Match {
        return best;
    }
    if let Some(alternatives) = case.alternatives.get(&index) {
        for alternative in alternatives {
            match compare_text(observed, alternative, hints) {
                Comparison::Match => return Comparison::Match,
                Comparison::Presentation => best = Comparison::Presentation,
                Comparison::Mismatch => {}
            }
        }
    }
    best
}

/// Tolerant text equality for program output.
fn compare_text(observed: &str, expected: &str, hints: &CompareHints) -> Comparison {
    let (obs, want) = if hints.case_insensitive {
        (observed.to_lowercase(), expected.to_lowercase())
    } else {
        (observed.to_string(), expected.to_string())
    };

    if obs == want {
        return Comparison::Match;
    }

    // Numeric comparison covers formatting differences like "3" vs "3.0".
    // The parse trims first, so two numeric values differing only in
    // surrounding whitespace compare as numbers rather than as a
    // presentation difference.
    if let (Ok(a), Ok(b)) = (obs.trim().parse::<f64>(), want.trim().parse::<f64>()) {
        if numbers_match(a, b, hints.numeric_tolerance) {
            return Comparison::Match;
        }
        return Comparison::Mismatch;
    }

    if obs.trim() == want.trim() {
        return Comparison::Presentation;
    }

    Comparison::Mismatch
}

/// Relative-tolerance comparison: `|a - b| <= tol * max(1, |b|)`.
fn numbers_match(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= tolerance * b.abs().max(1.0)
}

fn stderr_excerpt(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(2048).collect())
    }
}
