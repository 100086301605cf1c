//! Telegram Channel
//!
//! Telegram Bot API integration: the outbound calls the engine needs
//! (polls, deletes, forwards, display names) and the long-poll update loop
//! that feeds answer events and operator commands back into it.

use super::{
    ChatId, DocumentRef, MessageId, PostedPoll, Transport, TransportError, TransportResult,
};
use crate::engine::Engine;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Seconds a `getUpdates` call blocks server-side waiting for events
const LONG_POLL_SECS: u64 = 50;

/// Telegram channel configuration
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from BotFather
    pub bot_token: String,
    /// The only user allowed to submit and schedule quizzes
    pub admin_id: i64,
}

/// Telegram Bot API client
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(config: TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            // Must outlive the server-side long-poll window.
            .timeout(Duration::from_secs(LONG_POLL_SECS + 20))
            .build()
            .expect("Failed to build reqwest client");

        Self { config, client }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.config.bot_token, method)
    }

    /// Send a request to the Bot API and unwrap its `{ok, result}` envelope.
    async fn api_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: Value,
    ) -> TransportResult<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(e.to_string()))?;

        if !envelope.ok {
            let description = envelope
                .description
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(TransportError::Api(description));
        }
        envelope
            .result
            .ok_or_else(|| TransportError::Parse("missing result".to_string()))
    }

    /// Long-poll `getUpdates` forever, dispatching every update into the
    /// engine. Transport errors are logged and retried after a short pause.
    pub async fn run_update_loop(&self, engine: Arc<Engine>) {
        tracing::info!("Telegram update loop started");
        let mut offset: i64 = 0;
        loop {
            let body = json!({
                "offset": offset,
                "timeout": LONG_POLL_SECS,
                "allowed_updates": ["message", "poll", "poll_answer"],
            });
            let updates: Vec<Update> = match self.api_request("getUpdates", body).await {
                Ok(updates) => updates,
                Err(err) => {
                    tracing::warn!(error = %err, "getUpdates failed, retrying");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.dispatch(update, &engine).await;
            }
        }
    }

    /// Route one update to the matching engine entry point.
    async fn dispatch(&self, update: Update, engine: &Arc<Engine>) {
        if let Some(answer) = update.poll_answer {
            // A retracted vote arrives with no option ids; the user's
            // previous selection stands.
            if let Some(&option) = answer.option_ids.first() {
                engine.record_answer(&answer.poll_id, &answer.user.id.to_string(), option);
            }
        } else if let Some(poll) = update.poll {
            // Telegram pushes a poll update with is_closed once voting
            // stops; this may duplicate the runner's own close.
            if poll.is_closed {
                engine.reduce(&poll.id).await;
            }
        } else if let Some(message) = update.message {
            self.handle_message(message, engine).await;
        }
    }

    /// Handle an operator-facing chat message.
    async fn handle_message(&self, message: Message, engine: &Arc<Engine>) {
        let chat_id = message.chat.id;
        let Some(from) = &message.from else { return };
        if from.id != self.config.admin_id {
            self.reply(chat_id, "You are not authorized to use this bot.").await;
            return;
        }

        let source = DocumentRef {
            chat_id,
            message_id: message.message_id,
        };

        if let Some(document) = &message.document {
            self.handle_document(chat_id, source, document, engine).await;
        } else if let Some(text) = message.text.as_deref().map(str::trim) {
            if text.starts_with("/start") {
                self.reply(
                    chat_id,
                    "Quiz bot is online. Send a .txt file or paste quiz text, \
                     then use /schedule YYYY-MM-DD HH:MM to run it in the quiz group.",
                )
                .await;
            } else if text.starts_with("/schedule") {
                self.handle_schedule(chat_id, text, engine).await;
            } else {
                match engine.submit_document(text, source) {
                    Ok(()) => {
                        self.reply(
                            chat_id,
                            "Quiz text received. Use /schedule YYYY-MM-DD HH:MM to schedule it.",
                        )
                        .await
                    }
                    Err(err) => self.reply(chat_id, &format!("Rejected: {err}")).await,
                }
            }
        }
    }

    /// Accept a `.txt` quiz document upload.
    async fn handle_document(
        &self,
        chat_id: ChatId,
        source: DocumentRef,
        document: &Document,
        engine: &Arc<Engine>,
    ) {
        let is_txt = document
            .file_name
            .as_deref()
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(".txt"));
        if !is_txt {
            self.reply(chat_id, "Please upload a .txt file containing the quiz.").await;
            return;
        }

        let bytes = match self.download_file(&document.file_id).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(file_id = %document.file_id, error = %err, "Failed to download quiz document");
                self.reply(chat_id, "Could not download the file, please resend it.").await;
                return;
            }
        };
        let Ok(text) = String::from_utf8(bytes) else {
            self.reply(chat_id, "The file is not valid UTF-8 text.").await;
            return;
        };

        match engine.submit_document(&text, source) {
            Ok(()) => {
                self.reply(
                    chat_id,
                    "Quiz file received. Use /schedule YYYY-MM-DD HH:MM to schedule it.",
                )
                .await
            }
            Err(err) => self.reply(chat_id, &format!("Rejected: {err}")).await,
        }
    }

    /// Handle `/schedule YYYY-MM-DD HH:MM`.
    async fn handle_schedule(&self, chat_id: ChatId, text: &str, engine: &Arc<Engine>) {
        let Some(due_at) = parse_schedule_command(text) else {
            self.reply(chat_id, "Usage: /schedule YYYY-MM-DD HH:MM").await;
            return;
        };
        match engine.schedule_at(due_at) {
            Ok(job_id) => {
                let local = due_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
                self.reply(chat_id, &format!("Quiz scheduled for {local}. Job id: {job_id}"))
                    .await;
            }
            Err(err) => self.reply(chat_id, &format!("Rejected: {err}")).await,
        }
    }

    /// Best-effort operator reply.
    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(err) = self.send_text(chat_id, text).await {
            tracing::warn!(chat_id, error = %err, "Failed to send reply");
        }
    }

    /// Resolve a file id and download its content.
    async fn download_file(&self, file_id: &str) -> TransportResult<Vec<u8>> {
        let info: FileInfo = self.api_request("getFile", json!({ "file_id": file_id })).await?;
        let path = info
            .file_path
            .ok_or_else(|| TransportError::Parse("missing file_path".to_string()))?;
        let url = format!("https://api.telegram.org/file/bot{}/{}", self.config.bot_token, path);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transport for TelegramChannel {
    async fn post_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        options: &[String],
        correct_option: usize,
    ) -> TransportResult<PostedPoll> {
        let message: Message = self
            .api_request(
                "sendPoll",
                json!({
                    "chat_id": chat_id,
                    "question": question,
                    "options": options,
                    "type": "quiz",
                    "is_anonymous": false,
                    "correct_option_id": correct_option,
                }),
            )
            .await?;
        let poll = message
            .poll
            .ok_or_else(|| TransportError::Parse("sendPoll result has no poll".to_string()))?;
        Ok(PostedPoll {
            poll_id: poll.id,
            message_id: message.message_id,
        })
    }

    async fn close_poll(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()> {
        self.api_request::<Poll>(
            "stopPoll",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
        .map(|_| ())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()> {
        self.api_request::<bool>(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
        .map(|_| ())
    }

    async fn forward_message(
        &self,
        dest_chat_id: ChatId,
        src_chat_id: ChatId,
        message_id: MessageId,
    ) -> TransportResult<()> {
        self.api_request::<Message>(
            "forwardMessage",
            json!({
                "chat_id": dest_chat_id,
                "from_chat_id": src_chat_id,
                "message_id": message_id,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> TransportResult<MessageId> {
        let message: Message = self
            .api_request("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(message.message_id)
    }

    async fn lookup_display_name(&self, user_id: &str) -> Option<String> {
        let id: i64 = user_id.parse().ok()?;
        match self.api_request::<Chat>("getChat", json!({ "chat_id": id })).await {
            Ok(chat) => display_name(&chat),
            Err(err) => {
                tracing::debug!(user_id = %user_id, error = %err, "Display-name lookup failed");
                None
            }
        }
    }
}

/// Username if set, otherwise "first last".
fn display_name(chat: &Chat) -> Option<String> {
    if let Some(username) = chat.username.as_deref() {
        if !username.is_empty() {
            return Some(username.to_string());
        }
    }
    let full = format!(
        "{} {}",
        chat.first_name.as_deref().unwrap_or(""),
        chat.last_name.as_deref().unwrap_or("")
    );
    let full = full.trim();
    (!full.is_empty()).then(|| full.to_string())
}

/// Parse `/schedule YYYY-MM-DD HH:MM`, interpreted in the host's local
/// timezone. A datetime that does not exist locally (DST gap) is rejected.
fn parse_schedule_command(text: &str) -> Option<DateTime<Utc>> {
    let mut parts = text.split_whitespace();
    parts.next()?; // the command itself
    let date = parts.next()?;
    let time = parts.next()?;
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// One incoming update
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub poll_answer: Option<PollAnswer>,
}

/// Chat message
#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub poll: Option<Poll>,
}

/// Chat (also returned by getChat for users)
#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Message sender
#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

/// Poll state as pushed in updates
#[derive(Debug, Deserialize)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub is_closed: bool,
}

/// A user's (possibly retracted) poll vote
#[derive(Debug, Deserialize)]
pub struct PollAnswer {
    pub poll_id: String,
    pub user: User,
    #[serde(default)]
    pub option_ids: Vec<usize>,
}

/// Uploaded document attachment
#[derive(Debug, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// getFile result
#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: Option<String>,
}
