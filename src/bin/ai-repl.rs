//! Interactive REPL for streaming chat completions.
//!
//! # Usage
//!
//! ```bash
//! # Use ~/.config/ai-repl/config.json
//! ai-repl
//!
//! # Use another config and history file
//! ai-repl --config ./config.json --history ./history
//!
//! # Disable colors (useful for piping output)
//! ai-repl --no-color
//!
//! # Append biometrics readings to a file every 10s
//! ai-repl --metrics ./ai-repl.metrics
//! ```
//!
//! # Commands
//!
//! - `.help` - Show available commands
//! - `.clear` - Clear the conversation
//! - `.history` - Print the conversation as JSON
//! - `.config` - Print the active configuration
//! - `.exit` - Exit the application

use std::sync::Arc;
use std::time::Duration;

use arrrg::CommandLine;
use biometrics::Collector;
use tracing_subscriber::EnvFilter;

use ai_repl::chat::{
    ChatArgs, ChatSession, Config, InterruptHandle, PlainTextRenderer, Repl, help_text,
};
use ai_repl::observability::{
    emit_biometrics, open_emitter, register_biometrics, spawn_biometrics_emitter,
};

const METRICS_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let (args, _) = ChatArgs::from_command_line_relaxed("ai-repl [OPTIONS]");

    let collector = Arc::new(Collector::new());
    register_biometrics(&collector);
    let metrics = match args.metrics.as_deref() {
        Some(path) => Some(spawn_biometrics_emitter(
            Arc::clone(&collector),
            path,
            METRICS_INTERVAL,
        )?),
        None => None,
    };
    let mut config = match args.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(history) = args.history {
        config.history_path = Some(history.into());
    }
    let history_path = config.resolve_history_path().to_path_buf();

    let session = ChatSession::from_config(config, InterruptHandle::new())?;
    let renderer = PlainTextRenderer::with_color(!args.no_color);
    let mut repl = Repl::new(session, Box::new(renderer), history_path)?;
    repl.install_interrupt_handler()?;
    repl.load_history().await;

    println!("{}", help_text());
    let result = repl.run().await;

    if let (Some(task), Some(path)) = (metrics, args.metrics.as_deref()) {
        task.abort();
        open_emitter(path).and_then(|mut emitter| emit_biometrics(&collector, &mut emitter))?;
    }
    result?;
    Ok(())
}
