//! Quiz Engine
//!
//! Single owned instance holding every piece of mutable state: the open
//! poll registry, the score ledger, the pending-jobs index and the draft
//! document slot. Created once at startup and handed (as an `Arc`) to the
//! scheduler worker and to whatever receives transport events; nothing in
//! this crate keeps ambient global state.

use crate::channels::{ChatId, DocumentRef, DynTransport};
use crate::config::Config;
use crate::polls::{AnswerReducer, PollRegistry};
use crate::quiz::{parser, ParseDefaults};
use crate::scheduler::QuizJob;
use crate::scores::ScoreLedger;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress of a scheduled quiz job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for its due time
    Pending,
    /// Playing out the question at this index
    Running { question: usize },
    /// Ran to completion and was cleaned up
    Finished,
    /// Abandoned after an unrecoverable failure
    Aborted,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running { question } => write!(f, "running question {}", question + 1),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Most recently submitted quiz document, awaiting a schedule request
#[derive(Debug, Clone)]
struct Draft {
    text: String,
    source: DocumentRef,
}

/// Rejections for document submission
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("empty document")]
    EmptyDocument,
}

/// Rejections for schedule requests
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("no document submitted")]
    NoDocument,

    #[error("bad datetime")]
    BadDatetime,

    #[error("unparsable document")]
    UnparsableDocument,

    #[error("scheduler is not running")]
    SchedulerStopped,
}

/// The quiz orchestration engine
pub struct Engine {
    config: Config,
    transport: DynTransport,
    registry: Arc<PollRegistry>,
    ledger: Arc<ScoreLedger>,
    reducer: AnswerReducer,
    draft: Mutex<Option<Draft>>,
    pending: RwLock<HashMap<String, JobStatus>>,
    jobs_tx: mpsc::UnboundedSender<QuizJob>,
}

impl Engine {
    /// Create the engine. `jobs_tx` feeds the scheduler worker spawned by
    /// [`crate::scheduler::spawn`].
    pub fn new(
        config: Config,
        transport: DynTransport,
        jobs_tx: mpsc::UnboundedSender<QuizJob>,
    ) -> Arc<Self> {
        let registry = Arc::new(PollRegistry::new());
        let ledger = Arc::new(ScoreLedger::new(config.data_dir.join("scores.json")));
        let reducer = AnswerReducer::new(registry.clone(), ledger.clone(), transport.clone());
        Arc::new(Self {
            config,
            transport,
            registry,
            ledger,
            reducer,
            draft: Mutex::new(None),
            pending: RwLock::new(HashMap::new()),
            jobs_tx,
        })
    }

    /// The chat quiz polls are posted to.
    pub fn quiz_chat(&self) -> ChatId {
        self.config.quiz_group_id
    }

    /// The chat finished quiz documents are archived to.
    pub fn archive_chat(&self) -> ChatId {
        self.config.storage_group_id
    }

    /// The messaging transport.
    pub fn transport(&self) -> &DynTransport {
        &self.transport
    }

    /// The open-poll registry.
    pub fn registry(&self) -> &PollRegistry {
        &self.registry
    }

    /// The persistent score ledger.
    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    /// Store a quiz document as the current draft, replacing any previous
    /// one. The draft is parsed at schedule time, not here.
    pub fn submit_document(&self, text: &str, source: DocumentRef) -> Result<(), SubmitError> {
        if text.trim().is_empty() {
            return Err(SubmitError::EmptyDocument);
        }
        *self.draft.lock() = Some(Draft {
            text: text.to_string(),
            source,
        });
        tracing::info!(
            chat_id = source.chat_id,
            message_id = source.message_id,
            "Quiz document stored"
        );
        Ok(())
    }

    /// Parse the current draft and hand it to the scheduler as a job due at
    /// `due_at`. The draft is kept, so the same document can be scheduled
    /// again.
    pub fn schedule_at(&self, due_at: DateTime<Utc>) -> Result<String, ScheduleError> {
        if due_at < Utc::now() {
            return Err(ScheduleError::BadDatetime);
        }

        let draft = self
            .draft
            .lock()
            .clone()
            .ok_or(ScheduleError::NoDocument)?;

        let defaults = ParseDefaults {
            negative: self.config.default_negative,
            duration_secs: self.config.default_timer_secs,
        };
        let questions = parser::parse(&draft.text, &defaults);
        if questions.is_empty() {
            return Err(ScheduleError::UnparsableDocument);
        }

        let job_id = format!("quiz-{}", uuid::Uuid::new_v4());
        let job = QuizJob {
            job_id: job_id.clone(),
            questions,
            source: draft.source,
            due_at,
        };

        self.pending.write().insert(job_id.clone(), JobStatus::Pending);
        if self.jobs_tx.send(job).is_err() {
            self.pending.write().remove(&job_id);
            return Err(ScheduleError::SchedulerStopped);
        }

        tracing::info!(job_id = %job_id, due_at = %due_at, "Quiz scheduled");
        Ok(job_id)
    }

    /// Record an answer event for an open poll. Events for unknown (never
    /// opened, or already reduced) polls are dropped.
    pub fn record_answer(&self, poll_id: &str, user_id: &str, option: usize) {
        self.registry.record_answer(poll_id, user_id, option);
    }

    /// Fold a closed poll into the score ledger. Safe to call from both
    /// close paths (the runner's own close and a transport-pushed closed
    /// notification); whichever arrives second is a no-op.
    pub async fn reduce(&self, poll_id: &str) {
        self.reducer.reduce(poll_id).await;
    }

    /// Status of a job still in the pending index.
    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.pending.read().get(job_id).copied()
    }

    /// Number of jobs in the pending index (scheduled or running).
    pub fn pending_jobs(&self) -> usize {
        self.pending.read().len()
    }

    pub(crate) fn set_job_status(&self, job_id: &str, status: JobStatus) {
        self.pending.write().insert(job_id.to_string(), status);
    }

    /// Drop a job from the pending index with its terminal status.
    pub(crate) fn retire_job(&self, job_id: &str, status: JobStatus) {
        self.pending.write().remove(job_id);
        tracing::info!(job_id = %job_id, status = %status, "Quiz job retired");
    }
}
