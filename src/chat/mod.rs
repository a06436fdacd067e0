//! Interactive chat REPL built on the streaming client.
//!
//! # Architecture
//!
//! - [`config`]: command-line arguments and the JSON config file
//! - [`commands`]: meta-command parsing
//! - [`interrupt`]: Ctrl-C forwarding to the in-flight turn
//! - [`session`]: the transcript and the turn evaluator
//! - [`repl`]: the line-editor loop and history persistence

pub mod commands;
pub mod config;
pub mod interrupt;
pub mod repl;
pub mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{MetaCommand, help_text, parse_command};
pub use config::{ChatArgs, Config};
pub use interrupt::{InterruptHandle, InterruptOutcome};
pub use repl::Repl;
pub use session::{ChatSession, LineOutcome, TurnOutcome, TurnState};
