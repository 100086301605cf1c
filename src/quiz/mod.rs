//! Quiz Model
//!
//! Question records parsed from operator-submitted quiz documents, the
//! parser that produces them, and the runner that plays them out as polls.

pub mod parser;
pub mod runner;

pub use parser::{parse, ParseDefaults};
pub use runner::QuizRunner;

use serde::{Deserialize, Serialize};

/// One multiple-choice quiz round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Question number taken from the document (primary grammar) or
    /// assigned sequentially (fallback grammar)
    pub id: u32,
    /// Question text
    pub text: String,
    /// The four options, in A, B, C, D order
    pub options: [String; 4],
    /// 0-based index of the correct option
    pub correct_option: usize,
    /// Score subtracted for a wrong answer
    pub negative: f64,
    /// Seconds the poll for this question stays open
    pub duration_secs: u64,
}
