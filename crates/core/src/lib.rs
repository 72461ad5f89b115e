//! # Emberchat Core
//!
//! Domain types, traits, and error definitions for the Emberchat assistant
//! backend. This crate has **no framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! Every collaborator (storage, model provider, identity) is a trait here.
//! Implementations live in their respective crates, which keeps the chat core
//! testable against in-memory and mock implementations.

pub mod error;
pub mod identity;
pub mod message;
pub mod provider;
pub mod store;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError};
pub use identity::IdentityProvider;
pub use message::{Conversation, ConversationDetail, ConversationId, Message, MessageId, ReplySource, Role};
pub use provider::{ChatTurn, Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{ConversationStore, NewMessage, ProfileStore, UserStore};
pub use user::{ProfileUpdate, User, UserId, UserProfile};
