// Public modules
pub mod chat_completion;
pub mod message;

// Re-exports
pub use chat_completion::{ChatCompletionChunk, ChatCompletionParams, ChunkChoice, ChunkDelta};
pub use message::{Message, Role};
