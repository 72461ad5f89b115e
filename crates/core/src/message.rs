//! Message and Conversation domain types.
//!
//! A conversation is owned by exactly one user and holds an append-only,
//! strictly ordered sequence of messages. Ordering is by [`MessageId`], which
//! the store hands out in increasing order; timestamps are informational.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::user::UserId;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier and sequence position of a message.
///
/// Ids grow strictly with creation order, so sorting by id is sorting by
/// creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
///
/// Only `User` and `Assistant` are ever persisted; `System` appears in
/// assembled model context (framing and profile facts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Instructions prepended to a model call
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an assistant reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    /// A real completion from the model provider.
    Model,
    /// Placeholder produced because no provider credential is configured.
    Demo,
    /// Placeholder produced because the provider call failed or timed out.
    Fallback,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Demo => "demo",
            Self::Fallback => "fallback",
        }
    }
}

impl FromStr for ReplySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(Self::Model),
            "demo" => Ok(Self::Demo),
            "fallback" => Ok(Self::Fallback),
            other => Err(format!("unknown reply source '{other}'")),
        }
    }
}

/// A single persisted message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sequence position, unique across the store
    pub id: MessageId,

    /// The conversation this message belongs to
    pub conversation_id: ConversationId,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Provenance of assistant replies; `None` for user messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ReplySource>,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this is an assistant message that did not come from the model.
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, Some(ReplySource::Demo | ReplySource::Fallback))
    }
}

/// A conversation thread belonging to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Owning user
    pub user_id: UserId,

    /// Title (derived from the first message or user-set)
    pub title: String,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}

/// A conversation together with its full transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,

    /// All messages in creation order
    pub messages: Vec<Message>,
}
