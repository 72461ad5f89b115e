//! In-memory store, for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use emberchat_core::error::StoreError;
use emberchat_core::message::{Conversation, ConversationId, Message, MessageId};
use emberchat_core::store::{ConversationStore, NewMessage, ProfileStore, UserStore};
use emberchat_core::user::{User, UserId, UserProfile};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    profiles: BTreeMap<UserId, UserProfile>,
    conversations: BTreeMap<ConversationId, Conversation>,
    messages: Vec<Message>,
    next_user: i64,
    next_conversation: i64,
    next_message: i64,
}

/// A store that keeps every record in process memory.
/// Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::Duplicate(format!("email {email}")));
        }
        t.next_user += 1;
        let user = User {
            id: UserId(t.next_user),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.tables.read().await.profiles.get(&user_id).cloned())
    }

    async fn create_profile(&self, user_id: UserId) -> Result<UserProfile, StoreError> {
        let mut t = self.tables.write().await;
        Ok(t.profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::empty(user_id))
            .clone())
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError> {
        let mut t = self.tables.write().await;
        t.profiles.insert(profile.user_id, profile.clone());
        Ok(profile.clone())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(
        &self,
        user_id: UserId,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let mut t = self.tables.write().await;
        t.next_conversation += 1;
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId(t.next_conversation),
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(self.tables.read().await.conversations.get(&id).cloned())
    }

    async fn list_conversations(&self, user_id: UserId) -> Result<Vec<Conversation>, StoreError> {
        let t = self.tables.read().await;
        let mut list: Vec<Conversation> = t
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, StoreError> {
        let t = self.tables.read().await;
        let eligible: Vec<&Message> = t
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| before.is_none_or(|b| m.id < b))
            .collect();
        let skip = eligible.len().saturating_sub(limit);
        Ok(eligible.into_iter().skip(skip).cloned().collect())
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let conversation = t
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| StoreError::Missing(format!("conversation {conversation_id}")))?;
        conversation.updated_at = now;

        t.next_message += 1;
        let stored = Message {
            id: MessageId(t.next_message),
            conversation_id,
            role: message.role,
            content: message.content,
            source: message.source,
            created_at: now,
        };
        t.messages.push(stored.clone());
        Ok(stored)
    }

    async fn touch_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let conversation = t
            .conversations
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("conversation {id}")))?;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.conversations.remove(&id).is_none() {
            return Ok(false);
        }
        t.messages.retain(|m| m.conversation_id != id);
        Ok(true)
    }
}
