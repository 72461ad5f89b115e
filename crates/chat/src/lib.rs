//! # Emberchat Chat
//!
//! The conversation core: what goes to the model on each turn, how the
//! model is called, and how a turn is sequenced and persisted.
//!
//! - [`context`]: builds the turn list from framing, profile facts and a
//!   fixed-size history window
//! - [`gateway`]: live or demo reply generation; failures become fallback
//!   replies instead of errors
//! - [`orchestrator`]: validates, resolves ownership, persists, calls the
//!   gateway
//! - [`service`]: conversation and profile operations for the HTTP layer

pub mod context;
pub mod gateway;
pub mod locks;
pub mod orchestrator;
pub mod service;

#[cfg(test)]
mod test_helpers;

pub use context::{AssembledContext, AssemblyInput, ContextAssembler, ContextSettings};
pub use gateway::{DemoGateway, LiveGateway, ModelGateway, Reply, ReplyGateway};
pub use locks::ConversationLocks;
pub use orchestrator::{TurnOrchestrator, TurnOutcome};
pub use service::ChatService;
