//! Per-turn context assembly.
//!
//! Builds the ordered, role-tagged turn list sent to the model:
//!
//! | Position | Source | Trim Strategy |
//! |----------|--------|---------------|
//! | 1. Framing | `chat.framing` config | Never trimmed |
//! | 2. Customer facts | User profile | Omitted when the profile is empty |
//! | 3. History | Stored messages | Oldest dropped first |
//! | 4. New message | The request | Never trimmed |

pub mod assembler;

pub use assembler::{
    AssembledContext, AssemblyInput, AssemblyMetadata, ContextAssembler, ContextSettings,
    PROFILE_HEADER,
};
