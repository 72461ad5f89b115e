//! Context assembly: framing, customer facts, windowed history, new message.
//!
//! # Determinism
//!
//! Identical inputs always produce identical outputs. Nothing here reads
//! the clock, the environment, or the store; the caller loads the profile
//! and history and passes them in.

use emberchat_config::ChatConfig;
use emberchat_core::message::{ConversationId, Message, Role};
use emberchat_core::provider::ChatTurn;
use emberchat_core::user::{UserId, UserProfile};
use serde::{Deserialize, Serialize};

/// Heading of the customer-facts system turn.
pub const PROFILE_HEADER: &str = "Known information about this customer:";

// ── Types ─────────────────────────────────────────────────────────────────

/// Assembler settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct ContextSettings {
    /// Framing instructions, always the first turn.
    pub framing: String,
    /// Maximum prior messages included. `<= 0` means none.
    pub history_limit: i64,
}

impl From<&ChatConfig> for ContextSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            framing: config.framing.clone(),
            history_limit: config.history_limit,
        }
    }
}

/// Everything the assembler needs for one turn.
pub struct AssemblyInput<'a> {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    /// The caller's profile, if one exists.
    pub profile: Option<&'a UserProfile>,
    /// Prior messages, ascending by id. Must not contain the new message.
    pub history: &'a [Message],
    /// The message being answered.
    pub user_message: &'a str,
}

/// The assembled context, ready for a model call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    /// System turns first, then history, then the new user turn.
    pub turns: Vec<ChatTurn>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    /// The text of the final user turn.
    pub fn latest_user_message(&self) -> &str {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default()
    }
}

/// What went into the context, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Messages handed to the assembler.
    pub history_available: usize,
    /// Messages that made it into the window.
    pub history_included: usize,
    /// Non-empty profile attributes rendered.
    pub profile_facts: usize,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    settings: ContextSettings,
}

impl ContextAssembler {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(ContextSettings::from(config))
    }

    /// Size of the history window.
    pub fn window(&self) -> usize {
        usize::try_from(self.settings.history_limit).unwrap_or(0)
    }

    /// Assemble the turn list.
    ///
    /// 1. Framing system turn
    /// 2. Customer-facts system turn, when the profile has any facts
    /// 3. The newest `history_limit` messages of `history`, oldest first
    /// 4. The new user message
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> AssembledContext {
        let window = self.window();
        let mut turns = Vec::with_capacity(window.min(input.history.len()) + 3);

        turns.push(ChatTurn::system(self.settings.framing.clone()));

        let facts = input.profile.map(UserProfile::facts).unwrap_or_default();
        if !facts.is_empty() {
            turns.push(ChatTurn::system(Self::render_facts(&facts)));
        }

        let skip = input.history.len().saturating_sub(window);
        let included = &input.history[skip..];
        turns.extend(included.iter().filter_map(Self::history_turn));

        turns.push(ChatTurn::user(input.user_message));

        AssembledContext {
            conversation_id: input.conversation_id,
            user_id: input.user_id,
            turns,
            metadata: AssemblyMetadata {
                history_available: input.history.len(),
                history_included: included.len(),
                profile_facts: facts.len(),
            },
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn render_facts(facts: &[(&str, &str)]) -> String {
        let mut block = String::from(PROFILE_HEADER);
        for (label, value) in facts {
            block.push('\n');
            block.push_str(label);
            block.push_str(": ");
            block.push_str(value);
        }
        block
    }

    fn history_turn(message: &Message) -> Option<ChatTurn> {
        match message.role {
            Role::User => Some(ChatTurn::user(message.content.clone())),
            Role::Assistant => Some(ChatTurn::assistant(message.content.clone())),
            // Only the assembler emits system turns
            Role::System => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use emberchat_core::message::MessageId;

    // ── Helpers ────────────────────────────────────────────────────────

    const FRAMING: &str = "You are a helpful assistant for a fire safety supplier.";

    fn assembler(history_limit: i64) -> ContextAssembler {
        ContextAssembler::new(ContextSettings {
            framing: FRAMING.into(),
            history_limit,
        })
    }

    fn history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message {
                id: MessageId(i as i64 + 1),
                conversation_id: ConversationId(1),
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!("m{i}"),
                source: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    fn input<'a>(history: &'a [Message], profile: Option<&'a UserProfile>) -> AssemblyInput<'a> {
        AssemblyInput {
            conversation_id: ConversationId(1),
            user_id: UserId(7),
            profile,
            history,
            user_message: "Do you service kitchen suppression systems?",
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn framing_first_and_user_message_last() {
        let h = history(3);
        let ctx = assembler(20).assemble(&input(&h, None));

        assert_eq!(ctx.turns.first().unwrap(), &ChatTurn::system(FRAMING));
        assert_eq!(
            ctx.turns.last().unwrap(),
            &ChatTurn::user("Do you service kitchen suppression systems?")
        );
        assert_eq!(ctx.latest_user_message(), "Do you service kitchen suppression systems?");
    }

    #[test]
    fn window_bound_holds_for_every_size() {
        for limit in [0_i64, 1, 5, 20] {
            let n = limit as usize;
            for len in [0, n.saturating_sub(1), n, n + 50] {
                let h = history(len);
                let ctx = assembler(limit).assemble(&input(&h, None));
                let included = ctx.metadata.history_included;

                assert_eq!(included, len.min(n), "limit={limit} len={len}");
                assert_eq!(ctx.turns.len(), included + 2);
                assert!(ctx.turns.len() <= n + 3);

                // The included messages are the newest ones, oldest first
                let middle: Vec<&str> = ctx.turns[1..ctx.turns.len() - 1]
                    .iter()
                    .map(|t| t.content.as_str())
                    .collect();
                let expected: Vec<String> = (len - included..len).map(|i| format!("m{i}")).collect();
                assert_eq!(middle, expected);
            }
        }
    }

    #[test]
    fn negative_limit_means_no_history() {
        let h = history(4);
        let ctx = assembler(-5).assemble(&input(&h, None));
        assert_eq!(ctx.turns.len(), 2);
        assert_eq!(ctx.metadata.history_available, 4);
        assert_eq!(ctx.metadata.history_included, 0);
    }

    #[test]
    fn roles_follow_stored_messages() {
        let h = history(2);
        let ctx = assembler(20).assemble(&input(&h, None));
        assert_eq!(ctx.turns[1].role, Role::User);
        assert_eq!(ctx.turns[2].role, Role::Assistant);
    }

    #[test]
    fn profile_facts_follow_framing() {
        let mut profile = UserProfile::empty(UserId(7));
        profile.display_name = Some("Dana Whitfield".into());
        profile.company_name = Some("Harbor Logistics".into());
        profile.notes = Some("   ".into());

        let h = history(2);
        let ctx = assembler(20).assemble(&input(&h, Some(&profile)));

        assert_eq!(ctx.turns.len(), 5);
        assert_eq!(ctx.turns[1].role, Role::System);
        assert_eq!(
            ctx.turns[1].content,
            "Known information about this customer:\nCustomer name: Dana Whitfield\nCompany: Harbor Logistics"
        );
        assert_eq!(ctx.turns[2].content, "m0");
        assert_eq!(ctx.metadata.profile_facts, 2);
    }

    #[test]
    fn empty_profile_adds_no_turn() {
        let profile = UserProfile::empty(UserId(7));
        let ctx = assembler(20).assemble(&input(&[], Some(&profile)));
        assert_eq!(ctx.turns.len(), 2);
        assert_eq!(ctx.metadata.profile_facts, 0);
    }

    #[test]
    fn full_length_bound_with_profile() {
        let mut profile = UserProfile::empty(UserId(7));
        profile.phone = Some("555-0100".into());
        let h = history(30);
        let ctx = assembler(5).assemble(&input(&h, Some(&profile)));
        assert_eq!(ctx.turns.len(), 5 + 3);
    }

    #[test]
    fn stray_system_messages_in_history_are_skipped() {
        let mut h = history(2);
        h[0].role = Role::System;
        let ctx = assembler(20).assemble(&input(&h, None));
        let systems = ctx.turns.iter().filter(|t| t.role == Role::System).count();
        assert_eq!(systems, 1);
    }

    #[test]
    fn deterministic_assembly() {
        let mut profile = UserProfile::empty(UserId(7));
        profile.preferences = Some("Prefers email".into());
        let h = history(12);

        let a = assembler(6).assemble(&input(&h, Some(&profile)));
        let b = assembler(6).assemble(&input(&h, Some(&profile)));
        assert_eq!(a.turns, b.turns);
        assert_eq!(a.metadata, b.metadata);
    }
}
