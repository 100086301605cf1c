//! Poll Lifecycle
//!
//! Tracks quiz polls between posting and scoring: the registry holds every
//! currently-open poll's accumulated answers, and the reducer folds a
//! closed poll's answers into the score ledger exactly once.

pub mod reducer;
pub mod registry;

pub use reducer::AnswerReducer;
pub use registry::{LivePoll, PollRegistry};
