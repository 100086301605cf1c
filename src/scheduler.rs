//! Quiz Scheduler
//!
//! Time-ordered set of pending quiz jobs, driven by a single worker task.
//! Each job fires at most once, at its due instant; jobs sharing a due
//! instant fire in submission order. There is no cancel or reschedule, and
//! a crash before the due time loses the job, since only the score ledger
//! is durable.

use crate::channels::DocumentRef;
use crate::engine::{Engine, JobStatus};
use crate::quiz::{Question, QuizRunner};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One scheduled future execution of an entire quiz
#[derive(Debug, Clone)]
pub struct QuizJob {
    /// Unique job id
    pub job_id: String,
    /// Questions to play, in order
    pub questions: Vec<Question>,
    /// Message the quiz document arrived in, forwarded to the archive chat
    /// once the quiz finishes
    pub source: DocumentRef,
    /// Instant the quiz starts
    pub due_at: DateTime<Utc>,
}

/// Spawn the scheduler worker. Jobs arrive on the channel the engine
/// holds the sending half of; the worker runs until that channel closes.
///
/// Fired jobs run to completion inside the worker, so quizzes never overlap:
/// a job coming due while another quiz is playing starts late, right after
/// the running quiz finishes.
pub fn spawn(engine: Arc<Engine>, mut jobs_rx: mpsc::UnboundedReceiver<QuizJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut pending: Vec<QuizJob> = Vec::new();
        loop {
            let wait = pending
                .first()
                .map(|job| (job.due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO));

            tokio::select! {
                received = jobs_rx.recv() => match received {
                    Some(job) => {
                        // Stable insertion keeps submission order for equal
                        // due times.
                        let at = pending.partition_point(|queued| queued.due_at <= job.due_at);
                        tracing::info!(
                            job_id = %job.job_id,
                            due_at = %job.due_at,
                            queued = pending.len() + 1,
                            "Quiz job queued"
                        );
                        pending.insert(at, job);
                    }
                    None => {
                        tracing::info!(dropped = pending.len(), "Scheduler shutting down");
                        break;
                    }
                },
                _ = tokio::time::sleep(wait.unwrap_or(Duration::ZERO)), if wait.is_some() => {
                    let job = pending.remove(0);
                    fire(&engine, job).await;
                }
            }
        }
    })
}

/// Dispatch one due job into its runner, exactly once. A panicking run is
/// contained here: the job is retired as aborted and the worker keeps
/// serving later jobs.
async fn fire(engine: &Arc<Engine>, job: QuizJob) {
    let job_id = job.job_id.clone();
    let behind = (Utc::now() - job.due_at).num_seconds();
    if behind > 1 {
        tracing::warn!(job_id = %job_id, behind_secs = behind, "Firing quiz job late");
    } else {
        tracing::info!(job_id = %job_id, questions = job.questions.len(), "Firing quiz job");
    }

    let runner = QuizRunner::new(engine.clone());
    if AssertUnwindSafe(runner.run(job)).catch_unwind().await.is_err() {
        tracing::error!(job_id = %job_id, "Quiz run panicked");
        engine.retire_job(&job_id, JobStatus::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{
        ChatId, MessageId, PostedPoll, Transport, TransportError, TransportResult,
    };
    use crate::config::Config;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records forwarded source messages so tests can observe firing order.
    #[derive(Default)]
    struct RecordingTransport {
        forwarded: Mutex<Vec<MessageId>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post_poll(
            &self,
            _chat_id: ChatId,
            _question: &str,
            _options: &[String],
            _correct_option: usize,
        ) -> TransportResult<PostedPoll> {
            Err(TransportError::Api("no polls in this test".to_string()))
        }

        async fn close_poll(&self, _chat_id: ChatId, _message_id: MessageId) -> TransportResult<()> {
            Ok(())
        }

        async fn delete_message(
            &self,
            _chat_id: ChatId,
            _message_id: MessageId,
        ) -> TransportResult<()> {
            Ok(())
        }

        async fn forward_message(
            &self,
            _dest_chat_id: ChatId,
            _src_chat_id: ChatId,
            message_id: MessageId,
        ) -> TransportResult<()> {
            self.forwarded.lock().push(message_id);
            Ok(())
        }

        async fn send_text(&self, _chat_id: ChatId, _text: &str) -> TransportResult<MessageId> {
            Ok(0)
        }

        async fn lookup_display_name(&self, _user_id: &str) -> Option<String> {
            None
        }
    }

    fn create_test_setup() -> (
        Arc<Engine>,
        Arc<RecordingTransport>,
        mpsc::UnboundedSender<QuizJob>,
        JoinHandle<()>,
        tempfile::TempDir,
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            bot_token: "token".to_string(),
            admin_id: 1,
            quiz_group_id: -100,
            storage_group_id: -200,
            default_negative: 0.25,
            default_timer_secs: 30,
            data_dir: tmp.path().to_path_buf(),
        };
        let transport = Arc::new(RecordingTransport::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(config, transport.clone(), tx.clone());
        let worker = spawn(engine.clone(), rx);
        (engine, transport, tx, worker, tmp)
    }

    fn empty_job(job_id: &str, source_message: MessageId, due_at: DateTime<Utc>) -> QuizJob {
        QuizJob {
            job_id: job_id.to_string(),
            questions: Vec::new(),
            source: DocumentRef {
                chat_id: 10,
                message_id: source_message,
            },
            due_at,
        }
    }

    #[tokio::test]
    async fn test_fires_due_job_once() {
        let (engine, transport, tx, worker, _tmp) = create_test_setup();

        let due = Utc::now() + chrono::Duration::milliseconds(50);
        engine.set_job_status("j1", JobStatus::Pending);
        tx.send(empty_job("j1", 1, due)).unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(transport.forwarded.lock().as_slice(), &[1]);
        assert_eq!(engine.pending_jobs(), 0);

        // Long after the due time, the job has still fired exactly once.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.forwarded.lock().len(), 1);

        drop(tx);
        worker.abort();
    }

    #[tokio::test]
    async fn test_equal_due_times_fire_in_submission_order() {
        let (_engine, transport, tx, worker, _tmp) = create_test_setup();

        let due = Utc::now() + chrono::Duration::milliseconds(80);
        for message in 1..=3 {
            tx.send(empty_job(&format!("j{message}"), message, due)).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.forwarded.lock().as_slice(), &[1, 2, 3]);

        drop(tx);
        worker.abort();
    }

    #[tokio::test]
    async fn test_earlier_due_time_fires_first() {
        let (_engine, transport, tx, worker, _tmp) = create_test_setup();

        let now = Utc::now();
        tx.send(empty_job("later", 2, now + chrono::Duration::milliseconds(150)))
            .unwrap();
        tx.send(empty_job("sooner", 1, now + chrono::Duration::milliseconds(50)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(transport.forwarded.lock().as_slice(), &[1, 2]);

        drop(tx);
        worker.abort();
    }
}
