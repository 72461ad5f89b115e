//! Record stores for Emberchat.
//!
//! Both backends implement the `UserStore`, `ProfileStore` and
//! `ConversationStore` traits from `emberchat-core`.

pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
