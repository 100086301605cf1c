//! Quiz Document Parser
//!
//! Turns a loosely structured quiz document into an ordered list of
//! [`Question`]s. Parsing never fails: a document matching neither grammar
//! yields an empty list, which callers must treat as "reject the quiz".
//!
//! The primary grammar is a repeating block:
//!
//! ```text
//! 1. Question text
//! A. Option
//! B. Option
//! C. Option
//! D. Option
//! Answer: 2
//! Negative: 1/3
//! Time: 30
//! ```
//!
//! `Answer`, `Negative` and `Time` are optional. A document matching zero
//! blocks is re-parsed with a lenient paragraph fallback (see
//! [`parse`]).

use super::Question;
use regex::Regex;
use std::sync::LazyLock;

/// Per-field values applied when a question block omits the key line
#[derive(Debug, Clone, Copy)]
pub struct ParseDefaults {
    /// Fallback wrong-answer penalty
    pub negative: f64,
    /// Fallback poll duration in seconds
    pub duration_secs: u64,
}

static QUESTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ms)^\s*(?P<id>\d+)\.\s*(?P<question>.*?)\nA\.\s*(?P<a>.*?)\nB\.\s*(?P<b>.*?)\nC\.\s*(?P<c>.*?)\nD\.\s*(?P<d>.*?)\n(?:Answer:\s*(?P<answer>\d+)\n)?(?:Negative:\s*(?P<negative>[-+0-9./]+)\n)?(?:Time:\s*(?P<time>\d+)\n)?",
    )
    .expect("question block regex")
});

/// Parse a quiz document into questions.
///
/// Tries the strict block grammar first; when it matches nothing, falls
/// back to splitting the document on blank lines and treating any paragraph
/// with at least five non-empty lines as question + four options, with
/// `answer:`/`negative:`/`time:` key lines scanned case-insensitively.
///
/// A block with no `Answer:` line (or an `Answer:` value outside 1–4)
/// scores against option A, index 0. This silent default is intentional
/// and matches the published document format; authors who omit the line get
/// the first option marked correct.
pub fn parse(document: &str, defaults: &ParseDefaults) -> Vec<Question> {
    let mut text = document.replace("\r\n", "\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }

    let mut questions = Vec::new();
    for caps in QUESTION_BLOCK.captures_iter(&text) {
        let options = [
            caps["a"].trim().to_string(),
            caps["b"].trim().to_string(),
            caps["c"].trim().to_string(),
            caps["d"].trim().to_string(),
        ];
        questions.push(Question {
            id: caps["id"].parse().unwrap_or_default(),
            text: caps["question"].trim().to_string(),
            options,
            correct_option: caps
                .name("answer")
                .and_then(|m| parse_answer(m.as_str()))
                .unwrap_or(0),
            negative: caps
                .name("negative")
                .and_then(|m| parse_number(m.as_str()))
                .unwrap_or(defaults.negative),
            duration_secs: caps
                .name("time")
                .and_then(|m| m.as_str().parse().ok())
                .filter(|t| *t > 0)
                .unwrap_or(defaults.duration_secs),
        });
    }

    if questions.is_empty() {
        parse_fallback(&text, defaults)
    } else {
        questions
    }
}

/// Lenient paragraph parser, used only when the block grammar matched
/// nothing. Sequential ids are assigned starting at 1.
fn parse_fallback(text: &str, defaults: &ParseDefaults) -> Vec<Question> {
    let mut questions = Vec::new();

    for block in text.split("\n\n") {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.len() < 5 {
            continue;
        }

        let options = [
            strip_option_prefix(lines[1], b'A'),
            strip_option_prefix(lines[2], b'B'),
            strip_option_prefix(lines[3], b'C'),
            strip_option_prefix(lines[4], b'D'),
        ];

        let mut correct_option = None;
        let mut negative = None;
        let mut duration_secs = None;
        for line in &lines[5..] {
            let lower = line.to_ascii_lowercase();
            if let Some(rest) = lower.strip_prefix("answer:") {
                correct_option = parse_answer(rest.trim());
            } else if let Some(rest) = lower.strip_prefix("negative:") {
                negative = parse_number(rest.trim());
            } else if let Some(rest) = lower.strip_prefix("time:") {
                duration_secs = rest.trim().parse().ok().filter(|t| *t > 0);
            }
        }

        questions.push(Question {
            id: questions.len() as u32 + 1,
            text: lines[0].to_string(),
            options,
            correct_option: correct_option.unwrap_or(0),
            negative: negative.unwrap_or(defaults.negative),
            duration_secs: duration_secs.unwrap_or(defaults.duration_secs),
        });
    }

    questions
}

/// Strip a recognized `A.` / `A)` style prefix from an option line.
fn strip_option_prefix(line: &str, letter: u8) -> String {
    let bytes = line.as_bytes();
    if bytes.len() >= 2 && bytes[0] == letter && (bytes[1] == b'.' || bytes[1] == b')') {
        line[2..].trim().to_string()
    } else {
        line.to_string()
    }
}

/// 1-based answer number → 0-based option index. Out-of-range values are
/// rejected so the caller falls through to the documented default.
fn parse_answer(raw: &str) -> Option<usize> {
    let n: usize = raw.parse().ok()?;
    (1..=4).contains(&n).then(|| n - 1)
}

/// Parse a decimal literal or an `a/b` rational. Values that would invert
/// the penalty (negative, or division by zero) are rejected.
fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value = if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        raw.parse().ok()?
    };
    (value >= 0.0).then_some(value)
}
