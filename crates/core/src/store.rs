//! Store traits: the record-access contract the rest of the system relies on.
//!
//! Implementations: SQLite (durable) and in-memory (tests, ephemeral runs).
//! Stores do not check ownership; callers do.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Message, MessageId, ReplySource, Role};
use crate::user::{User, UserId, UserProfile};

/// A message about to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub source: Option<ReplySource>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            source: None,
        }
    }

    pub fn assistant(content: impl Into<String>, source: ReplySource) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            source: Some(source),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user. The email must already be normalised.
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;

    /// Insert an empty profile, or return the existing one.
    async fn create_profile(&self, user_id: UserId) -> Result<UserProfile, StoreError>;

    /// Replace the stored profile with `profile` (insert when absent).
    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    async fn create_conversation(
        &self,
        user_id: UserId,
        title: &str,
    ) -> Result<Conversation, StoreError>;

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// A user's conversations, most recently updated first.
    async fn list_conversations(&self, user_id: UserId) -> Result<Vec<Conversation>, StoreError>;

    /// Up to `limit` most recent messages, returned in creation order.
    ///
    /// With `before`, only messages with a smaller id are considered.
    async fn list_recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, StoreError>;

    /// The whole transcript in creation order.
    async fn list_messages(&self, conversation_id: ConversationId)
    -> Result<Vec<Message>, StoreError>;

    /// Append a message and advance the conversation's `updated_at`.
    /// Fails with [`StoreError::Missing`] when the conversation is gone.
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError>;

    async fn touch_conversation(&self, id: ConversationId) -> Result<(), StoreError>;

    /// Delete a conversation and all of its messages in one transaction.
    /// Returns `false` when nothing was deleted.
    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError>;
}
