//! Model provider implementations for Emberchat.
//!
//! All providers implement the `emberchat_core::Provider` trait.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
