//! Turn orchestration: one user message in, one assistant message out.
//!
//! Sequence for a turn:
//!
//! 1. Validate the text; nothing is written on failure
//! 2. Resolve the conversation (ownership-checked) or create one
//! 3. Persist the user message
//! 4. Load profile and history strictly older than that message; assemble
//! 5. Ask the gateway for a reply
//! 6. Persist the assistant message with its source
//! 7. Touch the conversation
//!
//! Steps 3-7 run under the conversation's turn lock when serialization is
//! enabled. The user message stays committed even if a later step fails.

use std::sync::Arc;

use emberchat_config::ChatConfig;
use emberchat_core::message::{Conversation, ConversationId, Message};
use emberchat_core::store::{ConversationStore, NewMessage, ProfileStore};
use emberchat_core::{Error, Result, StoreError, UserId};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{AssemblyInput, ContextAssembler};
use crate::gateway::ReplyGateway;
use crate::locks::ConversationLocks;

const TITLE_CHARS: usize = 50;

/// The result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: ConversationId,
    pub user_message: Message,
    pub assistant_message: Message,
    /// True when this turn created the conversation.
    pub created_conversation: bool,
}

pub struct TurnOrchestrator {
    conversations: Arc<dyn ConversationStore>,
    profiles: Arc<dyn ProfileStore>,
    assembler: ContextAssembler,
    gateway: Arc<dyn ReplyGateway>,
    locks: Option<ConversationLocks>,
    max_message_chars: usize,
}

impl TurnOrchestrator {
    pub fn new(
        config: &ChatConfig,
        conversations: Arc<dyn ConversationStore>,
        profiles: Arc<dyn ProfileStore>,
        gateway: Arc<dyn ReplyGateway>,
    ) -> Self {
        Self {
            conversations,
            profiles,
            assembler: ContextAssembler::from_config(config),
            gateway,
            locks: config.serialize_turns.then(ConversationLocks::new),
            max_message_chars: config.max_message_chars,
        }
    }

    /// Run one turn. Not idempotent: every call appends two messages.
    pub async fn handle_turn(
        &self,
        user_id: UserId,
        conversation_id: Option<ConversationId>,
        text: &str,
    ) -> Result<TurnOutcome> {
        self.validate(text)?;

        let (conversation, created_conversation) = match conversation_id {
            Some(id) => (
                load_owned(self.conversations.as_ref(), user_id, id).await?,
                false,
            ),
            None => {
                let title = derive_title(text);
                let conversation = self
                    .conversations
                    .create_conversation(user_id, &title)
                    .await?;
                info!(conversation_id = %conversation.id, user_id = %user_id, "Created conversation");
                (conversation, true)
            }
        };

        let _turn = match &self.locks {
            Some(locks) => Some(locks.acquire(conversation.id).await),
            None => None,
        };

        let user_message = self
            .append(conversation.id, NewMessage::user(text))
            .await?;

        let profile = self.profiles.get_profile(user_id).await?;
        let history = self
            .conversations
            .list_recent_messages(conversation.id, self.assembler.window(), Some(user_message.id))
            .await?;

        let context = self.assembler.assemble(&AssemblyInput {
            conversation_id: conversation.id,
            user_id,
            profile: profile.as_ref(),
            history: &history,
            user_message: text,
        });
        debug!(
            conversation_id = %conversation.id,
            history_available = context.metadata.history_available,
            history_included = context.metadata.history_included,
            profile_facts = context.metadata.profile_facts,
            "Context assembled"
        );

        let reply = self.gateway.reply(&context).await;
        let source = reply.source;

        let assistant_message = self
            .append(conversation.id, NewMessage::assistant(reply.text, source))
            .await?;
        self.conversations
            .touch_conversation(conversation.id)
            .await
            .map_err(|e| missing_as_not_found(e, conversation.id))?;

        info!(
            conversation_id = %conversation.id,
            source = source.as_str(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            conversation_id: conversation.id,
            user_message,
            assistant_message,
            created_conversation,
        })
    }

    fn validate(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::validation("message must not be empty"));
        }
        let chars = text.chars().count();
        if chars > self.max_message_chars {
            return Err(Error::validation(format!(
                "message is {chars} characters, limit is {}",
                self.max_message_chars
            )));
        }
        Ok(())
    }

    async fn append(&self, id: ConversationId, message: NewMessage) -> Result<Message> {
        self.conversations
            .append_message(id, message)
            .await
            .map_err(|e| missing_as_not_found(e, id))
    }
}

/// Fetch a conversation the caller owns.
///
/// Absent → `NotFound`; owned by someone else → `Forbidden`.
pub async fn load_owned(
    store: &dyn ConversationStore,
    user_id: UserId,
    id: ConversationId,
) -> Result<Conversation> {
    let conversation = store
        .get_conversation(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("conversation {id}")))?;
    if !conversation.is_owned_by(user_id) {
        return Err(Error::Forbidden(format!(
            "conversation {id} belongs to another user"
        )));
    }
    Ok(conversation)
}

/// Title for a conversation opened by its first message.
pub fn derive_title(text: &str) -> String {
    let text = text.trim();
    let mut title: String = text.chars().take(TITLE_CHARS).collect();
    if text.chars().count() > TITLE_CHARS {
        title.push_str("...");
    }
    title
}

// The conversation was deleted mid-turn.
fn missing_as_not_found(e: StoreError, id: ConversationId) -> Error {
    match e {
        StoreError::Missing(_) => Error::not_found(format!("conversation {id}")),
        other => Error::Store(other),
    }
}
