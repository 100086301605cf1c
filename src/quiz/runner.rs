//! Quiz Runner
//!
//! Plays one fired quiz job to completion: for each question in order,
//! posts a poll, leaves it open for the question's duration, closes it and
//! reduces its answers. Transport failures are contained per step: a
//! question that cannot be posted contributes no answers, and a poll that
//! cannot be closed is still scored from whatever answers were captured.

use crate::channels::{ChatId, MessageId};
use crate::engine::{Engine, JobStatus};
use crate::polls::LivePoll;
use crate::scheduler::QuizJob;
use std::sync::Arc;
use std::time::Duration;

/// Drives one scheduled quiz end-to-end
pub struct QuizRunner {
    engine: Arc<Engine>,
}

impl QuizRunner {
    /// Create a runner bound to the engine.
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Run every question in order, then clean the quiz out of the group
    /// and archive the source document. Failures never unwind across
    /// question boundaries.
    pub async fn run(&self, job: QuizJob) {
        let engine = &self.engine;
        let transport = engine.transport();
        let chat_id = engine.quiz_chat();
        let mut posted: Vec<(ChatId, MessageId)> = Vec::new();

        for (index, question) in job.questions.iter().enumerate() {
            engine.set_job_status(&job.job_id, JobStatus::Running { question: index });

            let poll = match transport
                .post_poll(chat_id, &question.text, &question.options, question.correct_option)
                .await
            {
                Ok(poll) => poll,
                Err(err) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        question_index = index,
                        error = %err,
                        "Failed to post poll, skipping question"
                    );
                    continue;
                }
            };
            posted.push((chat_id, poll.message_id));
            engine.registry().register(
                &poll.poll_id,
                LivePoll::new(
                    chat_id,
                    poll.message_id,
                    index,
                    question.correct_option,
                    question.negative,
                ),
            );

            tracing::info!(
                job_id = %job.job_id,
                poll_id = %poll.poll_id,
                question_index = index,
                duration_secs = question.duration_secs,
                "Poll open"
            );
            tokio::time::sleep(Duration::from_secs(question.duration_secs)).await;

            if let Err(err) = transport.close_poll(chat_id, poll.message_id).await {
                tracing::warn!(
                    job_id = %job.job_id,
                    poll_id = %poll.poll_id,
                    error = %err,
                    "Failed to close poll, reducing captured answers anyway"
                );
            }
            engine.reduce(&poll.poll_id).await;
        }

        // Clear the quiz out of the group and archive the source document,
        // both best-effort.
        for (chat, message) in posted {
            if let Err(err) = transport.delete_message(chat, message).await {
                tracing::warn!(
                    job_id = %job.job_id,
                    message_id = message,
                    error = %err,
                    "Failed to delete poll message"
                );
            }
        }
        if let Err(err) = transport
            .forward_message(engine.archive_chat(), job.source.chat_id, job.source.message_id)
            .await
        {
            tracing::warn!(job_id = %job.job_id, error = %err, "Failed to archive quiz document");
        }

        engine.retire_job(&job.job_id, JobStatus::Finished);
    }
}
