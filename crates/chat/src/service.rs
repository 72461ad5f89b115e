//! The chat surface the HTTP layer talks to.

use std::sync::Arc;

use emberchat_config::ChatConfig;
use emberchat_core::message::{Conversation, ConversationDetail, ConversationId};
use emberchat_core::store::{ConversationStore, ProfileStore};
use emberchat_core::{Error, ProfileUpdate, Result, UserId, UserProfile};
use tracing::info;

use crate::gateway::ReplyGateway;
use crate::orchestrator::{TurnOrchestrator, TurnOutcome, load_owned};

pub const DEFAULT_TITLE: &str = "New Conversation";

pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    profiles: Arc<dyn ProfileStore>,
    orchestrator: TurnOrchestrator,
}

impl ChatService {
    pub fn new(
        config: &ChatConfig,
        conversations: Arc<dyn ConversationStore>,
        profiles: Arc<dyn ProfileStore>,
        gateway: Arc<dyn ReplyGateway>,
    ) -> Self {
        let orchestrator =
            TurnOrchestrator::new(config, conversations.clone(), profiles.clone(), gateway);
        Self {
            conversations,
            profiles,
            orchestrator,
        }
    }

    pub async fn list_conversations(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        Ok(self.conversations.list_conversations(user_id).await?)
    }

    pub async fn create_conversation(
        &self,
        user_id: UserId,
        title: Option<&str>,
    ) -> Result<Conversation> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let conversation = self
            .conversations
            .create_conversation(user_id, title)
            .await?;
        info!(conversation_id = %conversation.id, user_id = %user_id, "Created conversation");
        Ok(conversation)
    }

    /// A conversation with its full transcript.
    pub async fn get_conversation(
        &self,
        user_id: UserId,
        id: ConversationId,
    ) -> Result<ConversationDetail> {
        let conversation = load_owned(self.conversations.as_ref(), user_id, id).await?;
        let messages = self.conversations.list_messages(id).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    pub async fn delete_conversation(&self, user_id: UserId, id: ConversationId) -> Result<()> {
        load_owned(self.conversations.as_ref(), user_id, id).await?;
        if !self.conversations.delete_conversation(id).await? {
            return Err(Error::not_found(format!("conversation {id}")));
        }
        info!(conversation_id = %id, user_id = %user_id, "Deleted conversation");
        Ok(())
    }

    pub async fn send_message(
        &self,
        user_id: UserId,
        conversation_id: Option<ConversationId>,
        text: &str,
    ) -> Result<TurnOutcome> {
        self.orchestrator
            .handle_turn(user_id, conversation_id, text)
            .await
    }

    /// The caller's profile, created empty on first access.
    pub async fn get_profile(&self, user_id: UserId) -> Result<UserProfile> {
        match self.profiles.get_profile(user_id).await? {
            Some(profile) => Ok(profile),
            None => Ok(self.profiles.create_profile(user_id).await?),
        }
    }

    /// Apply only the fields present in `update`.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile> {
        let mut profile = self.get_profile(user_id).await?;
        profile.apply(update);
        Ok(self.profiles.update_profile(&profile).await?)
    }
}
