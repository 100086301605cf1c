//! End-to-end flow: submit a document, schedule it, let the polls play out
//! against a fake transport, and check the resulting score ledger and group
//! cleanup.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use quizcast::channels::{
    ChatId, DocumentRef, MessageId, PostedPoll, Transport, TransportResult,
};
use quizcast::config::Config;
use quizcast::engine::Engine;
use quizcast::scheduler;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct PostedRecord {
    poll_id: String,
    message_id: MessageId,
    question: String,
}

/// In-memory stand-in for the Telegram transport. Poll ids are assigned
/// sequentially as `poll-1`, `poll-2`, …
struct FakeTransport {
    next_id: AtomicI64,
    posted: Mutex<Vec<PostedRecord>>,
    closed: Mutex<Vec<MessageId>>,
    deleted: Mutex<Vec<MessageId>>,
    forwarded: Mutex<Vec<(ChatId, ChatId, MessageId)>>,
}

impl FakeTransport {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            posted: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            forwarded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post_poll(
        &self,
        _chat_id: ChatId,
        question: &str,
        _options: &[String],
        _correct_option: usize,
    ) -> TransportResult<PostedPoll> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let poll = PostedPoll {
            poll_id: format!("poll-{id}"),
            message_id: id,
        };
        self.posted.lock().push(PostedRecord {
            poll_id: poll.poll_id.clone(),
            message_id: id,
            question: question.to_string(),
        });
        Ok(poll)
    }

    async fn close_poll(&self, _chat_id: ChatId, message_id: MessageId) -> TransportResult<()> {
        self.closed.lock().push(message_id);
        Ok(())
    }

    async fn delete_message(&self, _chat_id: ChatId, message_id: MessageId) -> TransportResult<()> {
        self.deleted.lock().push(message_id);
        Ok(())
    }

    async fn forward_message(
        &self,
        dest_chat_id: ChatId,
        src_chat_id: ChatId,
        message_id: MessageId,
    ) -> TransportResult<()> {
        self.forwarded.lock().push((dest_chat_id, src_chat_id, message_id));
        Ok(())
    }

    async fn send_text(&self, _chat_id: ChatId, _text: &str) -> TransportResult<MessageId> {
        Ok(0)
    }

    async fn lookup_display_name(&self, user_id: &str) -> Option<String> {
        Some(format!("User {user_id}"))
    }
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

const QUIZ_DOC: &str = "\
1. First question?
A. Apple
B. Banana
C. Cherry
D. Date
Answer: 2
Negative: 1
Time: 1

2. Second question?
A. Ant
B. Bee
C. Cat
D. Dog
Answer: 1
Time: 1
";

#[tokio::test]
async fn test_scheduled_quiz_scores_answers_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bot_token: "token".to_string(),
        admin_id: 1,
        quiz_group_id: -100,
        storage_group_id: -200,
        default_negative: 0.5,
        default_timer_secs: 30,
        data_dir: tmp.path().to_path_buf(),
    };
    let transport = Arc::new(FakeTransport::new());
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, transport.clone(), jobs_tx);
    let _worker = scheduler::spawn(engine.clone(), jobs_rx);

    let source = DocumentRef {
        chat_id: 7,
        message_id: 70,
    };
    engine.submit_document(QUIZ_DOC, source).unwrap();
    engine
        .schedule_at(Utc::now() + chrono::Duration::seconds(1))
        .unwrap();
    assert_eq!(engine.pending_jobs(), 1);

    // First poll opens at the due time; answer it while it is open.
    // Answer: 2 makes option index 1 correct.
    wait_until("first poll", || engine.registry().is_open("poll-1")).await;
    engine.record_answer("poll-1", "alice", 1); // correct
    engine.record_answer("poll-1", "bob", 3); // wrong, Negative: 1

    // Second poll: correct index 0, default penalty 0.5.
    wait_until("second poll", || engine.registry().is_open("poll-2")).await;
    engine.record_answer("poll-2", "alice", 2); // wrong
    engine.record_answer("poll-2", "bob", 0); // correct

    wait_until("quiz completion", || engine.pending_jobs() == 0).await;

    // A duplicate closed notification from the transport after the runner
    // already reduced is a no-op.
    engine.reduce("poll-1").await;
    engine.reduce("poll-2").await;

    let entries = engine.ledger().load();
    assert_eq!(entries.len(), 2);

    let alice = &entries["alice"];
    assert_eq!((alice.attempted, alice.correct, alice.wrong), (2, 1, 1));
    assert!((alice.score - 0.5).abs() < 1e-9); // +1.0 - 0.5
    assert_eq!(alice.display_name.as_deref(), Some("User alice"));

    let bob = &entries["bob"];
    assert_eq!((bob.attempted, bob.correct, bob.wrong), (2, 1, 1));
    assert!(bob.score.abs() < 1e-9); // -1.0 + 1.0

    // Both questions were posted and closed in order.
    {
        let posted = transport.posted.lock();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].poll_id, "poll-1");
        assert_eq!(posted[0].message_id, 1);
        assert_eq!(posted[0].question, "First question?");
        assert_eq!(posted[1].question, "Second question?");
        assert_eq!(transport.closed.lock().as_slice(), &[1, 2]);
    }

    // Group cleanup: poll messages deleted, source archived.
    {
        let mut deleted = transport.deleted.lock().clone();
        deleted.sort_unstable();
        assert_eq!(deleted, vec![1, 2]);
        assert_eq!(transport.forwarded.lock().as_slice(), &[(-200, 7, 70)]);
    }

    // A straggler answer for a reduced poll never resurrects state.
    engine.record_answer("poll-1", "mallory", 1);
    assert_eq!(engine.registry().open_count(), 0);
    assert_eq!(engine.ledger().load().len(), 2);
}

#[tokio::test]
async fn test_vote_change_counts_only_final_selection() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bot_token: "token".to_string(),
        admin_id: 1,
        quiz_group_id: -100,
        storage_group_id: -200,
        default_negative: 1.0,
        default_timer_secs: 30,
        data_dir: tmp.path().to_path_buf(),
    };
    let transport = Arc::new(FakeTransport::new());
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, transport.clone(), jobs_tx);
    let _worker = scheduler::spawn(engine.clone(), jobs_rx);

    let doc = "1. Q?\nA. a\nB. b\nC. c\nD. d\nAnswer: 1\nTime: 1\n";
    engine
        .submit_document(doc, DocumentRef { chat_id: 7, message_id: 71 })
        .unwrap();
    engine
        .schedule_at(Utc::now() + chrono::Duration::milliseconds(100))
        .unwrap();

    wait_until("poll", || engine.registry().is_open("poll-1")).await;
    engine.record_answer("poll-1", "carol", 3);
    engine.record_answer("poll-1", "carol", 0); // changed mind, now correct

    wait_until("completion", || engine.pending_jobs() == 0).await;

    let entries = engine.ledger().load();
    let carol = &entries["carol"];
    assert_eq!((carol.attempted, carol.correct, carol.wrong), (1, 1, 0));
    assert_eq!(carol.score, 1.0);
}
