//! Answer Reducer
//!
//! Folds a closed poll's recorded answers into the score ledger. Reduction
//! is idempotent per poll id: the detach step removes the live state, so a
//! second reduce (the runner's own close racing a transport-pushed closed
//! notification) finds nothing and does nothing.

use crate::channels::DynTransport;
use crate::polls::PollRegistry;
use crate::scores::ScoreLedger;
use std::collections::HashMap;
use std::sync::Arc;

/// Scores closed polls into the ledger
pub struct AnswerReducer {
    registry: Arc<PollRegistry>,
    ledger: Arc<ScoreLedger>,
    transport: DynTransport,
}

impl AnswerReducer {
    /// Create a reducer over the shared registry and ledger.
    pub fn new(registry: Arc<PollRegistry>, ledger: Arc<ScoreLedger>, transport: DynTransport) -> Self {
        Self {
            registry,
            ledger,
            transport,
        }
    }

    /// Detach the poll's live state and fold every recorded answer into the
    /// ledger: +1 for the correct option, -negative for any other. The full
    /// ledger is persisted once per poll, after all answers are applied.
    pub async fn reduce(&self, poll_id: &str) {
        let Some(poll) = self.registry.detach(poll_id) else {
            tracing::debug!(poll_id = %poll_id, "Nothing to reduce");
            return;
        };

        if poll.answers.is_empty() {
            tracing::info!(
                poll_id = %poll_id,
                question_index = poll.question_index,
                "Poll closed with no answers"
            );
            return;
        }

        // Display-name lookups happen before the ledger lock is taken.
        let mut names: HashMap<&str, String> = HashMap::new();
        for user_id in poll.answers.keys() {
            if let Some(name) = self.transport.lookup_display_name(user_id).await {
                names.insert(user_id.as_str(), name);
            }
        }

        let answered = poll.answers.len();
        self.ledger.apply(|entries| {
            for (user_id, selected) in &poll.answers {
                let entry = entries.entry(user_id.clone()).or_default();
                entry.attempted += 1;
                if *selected == poll.correct_option {
                    entry.correct += 1;
                    entry.score += 1.0;
                } else {
                    entry.wrong += 1;
                    entry.score -= poll.negative;
                }
                if let Some(name) = names.get(user_id.as_str()) {
                    entry.display_name = Some(name.clone());
                }
            }
        });

        tracing::info!(
            poll_id = %poll_id,
            question_index = poll.question_index,
            answered,
            "Reduced poll into score ledger"
        );
    }
}
