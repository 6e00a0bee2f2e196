//! Interaction model: what was written to and read from a program
//!
//! A [`Transcript`] is the ordered record of one program execution as seen
//! through its standard streams. Program text is recorded line by line as
//! [`Interaction::Output`]; a partial line immediately followed by a consumed
//! input is a [`Interaction::Prompt`]. The distinction is purely positional:
//! both are text the program wrote.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default relative tolerance used when comparing numeric outputs.
///
/// Two values `a` and `b` are considered equal when
/// `|a - b| <= tolerance * max(1, |b|)`.
pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 1e-9;

/// A single exchange on the program's standard streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum Interaction {
    /// Text written by the program immediately before it consumed an input
    Prompt(String),
    /// A value supplied to the program's standard input
    Input(String),
    /// A line (or final partial line) written by the program
    Output(String),
}

impl Interaction {
    pub fn text(&self) -> &str {
        match self {
            Interaction::Prompt(s) | Interaction::Input(s) | Interaction::Output(s) => s,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Interaction::Input(_))
    }
}

/// Ordered record of prompt/input/output events from one execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript(Vec<Interaction>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_events(events: Vec<Interaction>) -> Self {
        Self(events)
    }

    pub fn events(&self) -> &[Interaction] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, event: Interaction) {
        self.0.push(event);
    }

    /// The input values in order, as the judge supplied them.
    pub fn inputs(&self) -> Vec<String> {
        self.0
            .iter()
            .filter_map(|ev| match ev {
                Interaction::Input(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interaction> {
        self.0.iter()
    }
}

impl IntoIterator for Transcript {
    type Item = Interaction;
    type IntoIter = std::vec::IntoIter<Interaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Incremental transcript construction from raw stream events.
///
/// Keeps the current unterminated output line out of the event list until it
/// is either completed by a newline (becoming an `Output`), followed by a
/// consumed input (becoming a `Prompt`), or the stream ends (flushed as a
/// final partial `Output`).
#[derive(Debug, Default)]
pub struct TranscriptBuilder {
    events: Vec<Interaction>,
    partial: String,
}

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record raw program output, splitting it into line-grained events.
    pub fn push_output(&mut self, chunk: &str) {
        self.partial.push_str(chunk);
        while let Some(pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=pos).collect();
            line.pop(); // terminating '\n'
            // A '\r' left before the newline is kept: carriage returns are a
            // presentation difference the grader must be able to see.
            self.events.push(Interaction::Output(line));
        }
    }

    /// Record a consumed input value. Any pending partial output line is the
    /// prompt for this input.
    pub fn push_input(&mut self, value: impl Into<String>) {
        if !self.partial.is_empty() {
            let prompt = std::mem::take(&mut self.partial);
            self.events.push(Interaction::Prompt(prompt));
        }
        self.events.push(Interaction::Input(value.into()));
    }

    pub fn finish(mut self) -> Transcript {
        if !self.partial.is_empty() {
            self.events.push(Interaction::Output(self.partial));
        }
        Transcript(self.events)
    }
}

/// Per-value comparison hints inherited from the interaction spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareHints {
    /// Relative tolerance for outputs that parse as numbers
    pub numeric_tolerance: f64,
    /// Compare program text case-insensitively
    pub case_insensitive: bool,
}

impl Default for CompareHints {
    fn default() -> Self {
        Self {
            numeric_tolerance: DEFAULT_NUMERIC_TOLERANCE,
            case_insensitive: false,
        }
    }
}

/// One expected transcript plus comparison hints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    pub expected: Transcript,
    #[serde(default)]
    pub hints: CompareHints,
    /// Alternative accepted texts per event index. A step graded against an
    /// expected `Output`/`Prompt` passes if it matches the primary text or
    /// any alternative.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub alternatives: HashMap<usize, Vec<String>>,
}

impl TestCase {
    pub fn new(expected: Transcript) -> Self {
        Self {
            expected,
            hints: CompareHints::default(),
            alternatives: HashMap::new(),
        }
    }

    /// The stdin values this test case feeds to the program.
    pub fn inputs(&self) -> Vec<String> {
        self.expected.inputs()
    }
}
