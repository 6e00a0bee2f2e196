//! Interaction-spec template parser and writer
//!
//! Template grammar:
//!
//! ```text
//! # comments run to the end of the line
//! "x: ": "a"          # prompt "x: ", input "a"
//! y:: b               # shorthand, prompt rendered "y: ", input "b"
//! --> "result: ab"    # expected output line
//!
//! x:: 1; y:: 2 --> "result: 3"   # one-line test case
//! ```
//!
//! Blank-line-separated blocks are independent test cases. Double quotes are
//! only needed for precise whitespace control; unquoted values are trimmed.

use crate::errors::JudgeError;
use crate::interaction::{Interaction, TestCase, Transcript};

/// Parse a template document into its ordered test cases.
pub fn parse(text: &str) -> Result<Vec<TestCase>, JudgeError> {
    let mut cases = Vec::new();
    let mut current = Vec::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw_line);
        let line = line.trim();

        if line.is_empty() {
            if !current.is_empty() {
                cases.push(TestCase::new(Transcript::from_events(std::mem::take(
                    &mut current,
                ))));
            }
            continue;
        }

        parse_line(line, line_no, &mut current)?;
    }
    if !current.is_empty() {
        cases.push(TestCase::new(Transcript::from_events(current)));
    }
    Ok(cases)
}

/// Render a transcript back into template text. Values are always quoted so
/// the result round-trips through [`parse`] exactly.
pub fn format(transcript: &Transcript) -> String {
    let mut out = String::new();
    let mut events = transcript.iter().peekable();
    while let Some(event) = events.next() {
        match event {
            Interaction::Prompt(p) => {
                // A prompt is always immediately followed by its input.
                let input = match events.peek() {
                    Some(Interaction::Input(v)) => {
                        events.next();
                        v.as_str()
                    }
                    _ => "",
                };
                out.push_str(&format!("{}: {}\n", quote(p), quote(input)));
            }
            Interaction::Input(v) => {
                out.push_str(&format!("\"\": {}\n", quote(v)));
            }
            Interaction::Output(text) => {
                out.push_str(&format!("--> {}\n", quote(text)));
            }
        }
    }
    out
}

/// Render a sequence of transcripts as blank-line-separated blocks.
pub fn format_all(transcripts: &[Transcript]) -> String {
    transcripts
        .iter()
        .map(format)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse one logical line, which may hold several `;`-separated input
/// segments and an inline `--> output` tail.
fn parse_line(line: &str, line_no: usize, events: &mut Vec<Interaction>) -> Result<(), JudgeError> {
    let (head, output) = split_top_level(line, "-->");

    for segment in split_segments(head) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (prompt, value) = parse_input_segment(segment, line_no)?;
        if !prompt.is_empty() {
            events.push(Interaction::Prompt(prompt));
        }
        events.push(Interaction::Input(value));
    }

    if let Some(output) = output {
        let output = output.trim();
        if output.is_empty() {
            return Err(JudgeError::Template {
                line: line_no,
                message: "expected a value after '-->'".into(),
            });
        }
        events.push(Interaction::Output(unquote(output)));
    }
    Ok(())
}

/// Parse `"prompt": value` or `key:: value` into (prompt, input value).
fn parse_input_segment(segment: &str, line_no: usize) -> Result<(String, String), JudgeError> {
    if let Some(rest) = segment.strip_prefix('"') {
        // Quoted prompt: "x: ": value
        let end = find_closing_quote(rest).ok_or_else(|| JudgeError::Template {
            line: line_no,
            message: "unterminated quoted prompt".into(),
        })?;
        let prompt = rest[..end].to_string();
        let tail = rest[end + 1..].trim_start();
        let value = tail
            .strip_prefix(':')
            .ok_or_else(|| JudgeError::Template {
                line: line_no,
                message: "expected ':' after quoted prompt".into(),
            })?
            .trim();
        return Ok((prompt, unquote(value)));
    }

    // Shorthand: key:: value, prompt rendered as "key: "
    if let Some((key, value)) = segment.split_once("::") {
        let key = key.trim();
        if key.is_empty() {
            return Err(JudgeError::Template {
                line: line_no,
                message: "missing key before '::'".into(),
            });
        }
        return Ok((format!("{}: ", key), unquote(value.trim())));
    }

    Err(JudgeError::Template {
        line: line_no,
        message: format!("cannot parse input segment: {:?}", segment),
    })
}

/// Split on the first occurrence of `sep` that falls outside double quotes.
fn split_top_level<'a>(line: &'a str, sep: &str) -> (&'a str, Option<&'a str>) {
    let bytes = line.as_bytes();
    let mut in_quotes = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            _ if !in_quotes && line[i..].starts_with(sep) => {
                return (&line[..i], Some(&line[i + sep.len()..]));
            }
            _ => {}
        }
        i += 1;
    }
    (line, None)
}

/// Split the input portion on `;` separators outside quotes.
fn split_segments(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Drop an unquoted `#` comment tail.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

fn find_closing_quote(text: &str) -> Option<usize> {
    text.find('"')
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_prompts() {
        let cases = parse("\"x: \": \"a\"\n\"y: \": \"b\"\n--> \"result: ab\"\n").unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(
            cases[0].expected.events(),
            &[
                Interaction::Prompt("x: ".into()),
                Interaction::Input("a".into()),
                Interaction::Prompt("y: ".into()),
                Interaction::Input("b".into()),
                Interaction::Output("result: ab".into()),
            ]
        );
    }

    #[test]
    fn test_parse_double_colon_shorthand() {
        let cases = parse("x:: foo\ny:: bar\n--> \"result: foobar\"\n").unwrap();
        assert_eq!(
            cases[0].expected.events(),
            &[
                Interaction::Prompt("x: ".into()),
                Interaction::Input("foo".into()),
                Interaction::Prompt("y: ".into()),
                Interaction::Input("bar".into()),
                Interaction::Output("result: foobar".into()),
            ]
        );
    }

    #[test]
    fn test_parse_single_line_case() {
        let cases = parse("x:: 1; y:: 2 --> \"result: 3\"\n").unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].inputs(), vec!["1", "2"]);
        assert_eq!(
            cases[0].expected.events().last(),
            Some(&Interaction::Output("result: 3".into()))
        );
    }

    #[test]
    fn test_blank_lines_separate_cases() {
        let text = "x:: 1 --> \"1\"\n\nx:: 2 --> \"2\"\n";
        let cases = parse(text).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].inputs(), vec!["1"]);
        assert_eq!(cases[1].inputs(), vec!["2"]);
    }

    #[test]
    fn test_comments_ignored() {
        let text = "# header comment\nx:: 1 --> \"1\" # trailing comment\n";
        let cases = parse(text).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected.len(), 3);
    }

    #[test]
    fn test_hash_inside_quotes_is_kept() {
        let cases = parse("--> \"#1 winner\"\n").unwrap();
        assert_eq!(
            cases[0].expected.events(),
            &[Interaction::Output("#1 winner".into())]
        );
    }

    #[test]
    fn test_unquoted_values_are_trimmed() {
        let cases = parse("\"x: \":   spaced   \n").unwrap();
        assert_eq!(
            cases[0].expected.events(),
            &[
                Interaction::Prompt("x: ".into()),
                Interaction::Input("spaced".into()),
            ]
        );
    }

    #[test]
    fn test_quoted_values_keep_whitespace() {
        let cases = parse("--> \"out  \"\n").unwrap();
        assert_eq!(
            cases[0].expected.events(),
            &[Interaction::Output("out  ".into())]
        );
    }

    #[test]
    fn test_malformed_segment_errors() {
        let err = parse("not an input line\n").unwrap_err();
        assert!(matches!(err, JudgeError::Template { line: 1, .. }));
    }

    #[test]
    fn test_format_round_trip() {
        let mut t = Transcript::new();
        t.push(Interaction::Prompt("x: ".into()));
        t.push(Interaction::Input("a".into()));
        t.push(Interaction::Output("result: a".into()));

        let text = format(&t);
        let reparsed = parse(&text).unwrap();
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].expected, t);
    }

    #[test]
    fn test_format_input_without_prompt() {
        let mut t = Transcript::new();
        t.push(Interaction::Input("a".into()));
        t.push(Interaction::Output("a".into()));

        let reparsed = parse(&format(&t)).unwrap();
        assert_eq!(
            reparsed[0].expected.events(),
            &[
                Interaction::Input("a".into()),
                Interaction::Output("a".into()),
            ]
        );
    }
}
