// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod history;
pub mod observability;
pub mod render;
pub mod sse;
pub mod tokens;
pub mod types;

// Re-exports
pub use client::{ChatBackend, ChatClient, ChunkStream};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use tokens::TokenCounter;
pub use types::*;
