//! The interactive read-eval-print loop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustyline::error::ReadlineError;
use rustyline::history::History;
use rustyline::DefaultEditor;

use crate::chat::interrupt::{InterruptHandle, InterruptOutcome};
use crate::chat::session::{ChatSession, LineOutcome};
use crate::client::{ChatBackend, ChatClient};
use crate::error::{Error, Result};
use crate::history::{self, HistoryWriter, MAX_HISTORY_ENTRIES};
use crate::render::Renderer;

const PROMPT: &str = "> ";

/// Drives a [`ChatSession`] from a line editor.
pub struct Repl<B: ChatBackend = ChatClient> {
    session: ChatSession<B>,
    editor: DefaultEditor,
    renderer: Box<dyn Renderer>,
    history_path: PathBuf,
    writer: HistoryWriter,
}

impl<B: ChatBackend> Repl<B> {
    /// Creates a REPL whose line history is persisted to `history_path`.
    ///
    /// Must be called inside a tokio runtime; the history writer task starts
    /// here.
    pub fn new(
        session: ChatSession<B>,
        renderer: Box<dyn Renderer>,
        history_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let config = rustyline::Config::builder()
            .max_history_size(MAX_HISTORY_ENTRIES)
            .map_err(editor_error)?
            .auto_add_history(false)
            .build();
        let editor = DefaultEditor::with_config(config).map_err(editor_error)?;
        let history_path = history_path.into();
        let writer = HistoryWriter::spawn(history_path.clone());
        Ok(Self {
            session,
            editor,
            renderer,
            history_path,
            writer,
        })
    }

    /// The session this REPL evaluates lines with.
    pub fn session(&self) -> &ChatSession<B> {
        &self.session
    }

    /// Where line history is saved.
    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Loads saved line history into the editor and returns how many entries
    /// it now holds. An unreadable file leaves the history empty.
    pub async fn load_history(&mut self) -> usize {
        match history::load(&self.history_path).await {
            Ok(entries) => {
                for entry in &entries {
                    if let Err(err) = self.editor.add_history_entry(entry.as_str()) {
                        tracing::debug!(error = %err, "skipping history entry");
                    }
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "starting with empty history");
            }
        }
        self.editor.history().len()
    }

    /// Entries currently held by the editor, oldest first.
    pub fn history_entries(&self) -> Vec<String> {
        self.editor.history().iter().cloned().collect()
    }

    /// Installs the process Ctrl-C handler.
    ///
    /// An interrupt during evaluation cancels the in-flight turn. An interrupt
    /// while idle exits the process with status 0.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let interrupts = Arc::clone(self.session.interrupts());
        ctrlc::set_handler(move || {
            if interrupts.interrupt() == InterruptOutcome::Idle {
                println!("^C");
                std::process::exit(0);
            }
        })
        .map_err(|err| {
            Error::io(
                "failed to install Ctrl-C handler",
                io::Error::other(err.to_string()),
            )
        })
    }

    /// Adds `line` to the editor history and, if the history changed, queues
    /// a save. Returns whether the history changed.
    pub fn record_history(&mut self, line: &str) -> bool {
        match self.editor.add_history_entry(line) {
            Ok(true) => {
                self.writer.submit(self.history_entries());
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!(error = %err, "failed to add history entry");
                false
            }
        }
    }

    /// Waits for queued history saves to finish.
    pub async fn flush_history(&mut self) {
        self.writer.close().await;
    }

    /// Runs until `.exit`, end of input, or Ctrl-C at the prompt.
    ///
    /// Queued history saves are written before this returns.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.read_eval_loop().await;
        self.flush_history().await;
        result
    }

    async fn read_eval_loop(&mut self) -> Result<()> {
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    self.record_history(&line);
                    let interrupts = Arc::clone(self.session.interrupts());
                    let evaluation = interrupts.begin_evaluation();
                    let outcome = self
                        .session
                        .evaluate_line(&line, self.renderer.as_mut())
                        .await;
                    drop(evaluation);
                    if outcome == LineOutcome::Exit {
                        return Ok(());
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    return Ok(());
                }
                Err(ReadlineError::Eof) => {
                    println!("\nBye!");
                    return Ok(());
                }
                Err(err) => {
                    return Err(Error::io(
                        "failed to read input",
                        io::Error::other(err.to_string()),
                    ));
                }
            }
        }
    }
}

fn editor_error(err: ReadlineError) -> Error {
    Error::io(
        "failed to initialize line editor",
        io::Error::other(err.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::chat::config::Config;
    use crate::client::ChunkStream;
    use crate::render::PlainTextRenderer;
    use crate::types::ChatCompletionParams;

    struct SilentBackend;

    #[async_trait::async_trait]
    impl ChatBackend for SilentBackend {
        async fn stream(&self, _: ChatCompletionParams) -> Result<ChunkStream> {
            Ok(Box::pin(stream::empty()))
        }
    }

    fn repl(history_path: &Path) -> Repl<SilentBackend> {
        let session = ChatSession::new(SilentBackend, Config::new("x"), InterruptHandle::new());
        Repl::new(
            session,
            Box::new(PlainTextRenderer::with_color(false)),
            history_path,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_history_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut repl = repl(&dir.path().join("absent"));
        assert_eq!(repl.load_history().await, 0);
    }

    #[tokio::test]
    async fn history_loaded_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history");
        history::save(&path, &["first".to_string(), ".help".to_string()])
            .await
            .unwrap();
        let mut repl = repl(&path);
        assert_eq!(repl.load_history().await, 2);
        assert_eq!(repl.history_entries(), vec!["first", ".help"]);
    }

    #[tokio::test]
    async fn recorded_lines_are_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history");
        let mut repl = repl(&path);
        assert!(repl.record_history("hello"));
        assert!(repl.record_history("world"));
        repl.flush_history().await;
        assert_eq!(history::load(&path).await.unwrap(), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn unchanged_history_skips_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut repl = repl(&dir.path().join("history"));
        assert!(!repl.record_history(""));
        assert!(repl.record_history("same"));
        assert!(!repl.record_history("same"));
    }

    #[tokio::test]
    async fn history_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut repl = repl(&dir.path().join("history"));
        for i in 0..MAX_HISTORY_ENTRIES + 5 {
            let _ = repl.editor.add_history_entry(format!("line {i}"));
        }
        let entries = repl.history_entries();
        assert_eq!(entries.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(entries[0], "line 5");
    }
}
