//! Messaging Transport
//!
//! Defines the interface to the chat platform: posting and closing quiz
//! polls, deleting and forwarding messages, and display-name lookup. The
//! engine only ever sees this trait; the Telegram implementation lives in
//! [`telegram`].

pub mod telegram;

use async_trait::async_trait;
use std::sync::Arc;

/// Chat identifier on the messaging platform
pub type ChatId = i64;

/// Message identifier within a chat
pub type MessageId = i64;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur in transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A quiz poll freshly posted to a chat
#[derive(Debug, Clone)]
pub struct PostedPoll {
    /// Platform-assigned poll id; answer events arrive keyed by this
    pub poll_id: String,
    /// Message carrying the poll, used to close and later delete it
    pub message_id: MessageId,
}

/// Handle to the message a quiz document arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Core transport trait
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a non-anonymous quiz poll with four options.
    async fn post_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        options: &[String],
        correct_option: usize,
    ) -> TransportResult<PostedPoll>;

    /// Stop accepting votes on a posted poll.
    async fn close_poll(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()>;

    /// Delete a message from a chat.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()>;

    /// Forward a message to another chat.
    async fn forward_message(
        &self,
        dest_chat_id: ChatId,
        src_chat_id: ChatId,
        message_id: MessageId,
    ) -> TransportResult<()>;

    /// Send a plain text message; returns the id of the sent message.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> TransportResult<MessageId>;

    /// Best-effort display-name lookup for a user. `None` when the platform
    /// has nothing usable.
    async fn lookup_display_name(&self, user_id: &str) -> Option<String>;
}

/// Type-erased transport for storage
pub type DynTransport = Arc<dyn Transport>;
