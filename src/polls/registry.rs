//! Poll Registry
//!
//! In-memory map from platform poll id to that poll's live state. The
//! registry is the single source of truth while a poll is open: an id
//! absent from it means "not open" (either never posted or already
//! reduced), and events for absent ids are dropped without a trace.

use crate::channels::{ChatId, MessageId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// State of one open poll, mutated concurrently by incoming answer events
#[derive(Debug, Clone)]
pub struct LivePoll {
    /// Chat the poll was posted to
    pub chat_id: ChatId,
    /// Message carrying the poll
    pub message_id: MessageId,
    /// Index of the question within its quiz
    pub question_index: usize,
    /// 0-based index of the correct option
    pub correct_option: usize,
    /// Penalty for a wrong answer
    pub negative: f64,
    /// user id → selected option index, latest write wins
    pub answers: HashMap<String, usize>,
}

impl LivePoll {
    /// Create a live poll with no recorded answers.
    pub fn new(
        chat_id: ChatId,
        message_id: MessageId,
        question_index: usize,
        correct_option: usize,
        negative: f64,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            question_index,
            correct_option,
            negative,
            answers: HashMap::new(),
        }
    }
}

/// Registry of all currently-open polls
#[derive(Debug, Default)]
pub struct PollRegistry {
    polls: RwLock<HashMap<String, LivePoll>>,
}

impl PollRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly posted poll. A duplicate id is a no-op: the
    /// existing entry (and its answers) stays untouched.
    pub fn register(&self, poll_id: &str, poll: LivePoll) -> bool {
        let mut polls = self.polls.write();
        if polls.contains_key(poll_id) {
            tracing::warn!(poll_id = %poll_id, "Poll already registered, ignoring duplicate");
            return false;
        }
        polls.insert(poll_id.to_string(), poll);
        true
    }

    /// Record a user's selection for an open poll, overwriting any earlier
    /// selection. Events for unknown ids are dropped silently.
    pub fn record_answer(&self, poll_id: &str, user_id: &str, option: usize) -> bool {
        let mut polls = self.polls.write();
        match polls.get_mut(poll_id) {
            Some(poll) => {
                poll.answers.insert(user_id.to_string(), option);
                tracing::debug!(poll_id = %poll_id, user_id = %user_id, option, "Recorded answer");
                true
            }
            None => {
                tracing::trace!(poll_id = %poll_id, user_id = %user_id, "Answer for unknown poll dropped");
                false
            }
        }
    }

    /// Atomically remove and return a poll's state. Answers arriving after
    /// the detach see an absent id and are dropped, so a poll is only ever
    /// scored from one snapshot.
    pub fn detach(&self, poll_id: &str) -> Option<LivePoll> {
        self.polls.write().remove(poll_id)
    }

    /// Whether a poll is currently open.
    pub fn is_open(&self, poll_id: &str) -> bool {
        self.polls.read().contains_key(poll_id)
    }

    /// Number of currently-open polls.
    pub fn open_count(&self) -> usize {
        self.polls.read().len()
    }
}
