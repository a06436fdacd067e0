//! Line-history persistence for the prompt.
//!
//! The file is plain text with one entry per line, oldest first. Every save
//! rewrites the whole file. Entries are not escaped, so an entry containing a
//! newline is read back as two entries.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::observability::{HISTORY_SAVES, HISTORY_SAVE_ERRORS};

/// Maximum number of entries the line editor retains.
pub const MAX_HISTORY_ENTRIES: usize = 1000;

/// Load history entries from `path`.
///
/// A missing or unreadable file is an [`Error::Io`]; callers treat that as
/// an empty history.
pub async fn load(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await.map_err(|err| {
        Error::io(
            format!("failed to read history file {}", path.display()),
            err,
        )
    })?;
    Ok(parse(&contents))
}

/// Overwrite `path` with `entries`, creating parent directories as needed.
pub async fn save(path: impl AsRef<Path>, entries: &[String]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            Error::io(
                format!("failed to create history directory {}", parent.display()),
                err,
            )
        })?;
    }
    tokio::fs::write(path, entries.join("\n"))
        .await
        .map_err(|err| {
            Error::io(
                format!("failed to write history file {}", path.display()),
                err,
            )
        })
}

/// Background writer that saves history snapshots one at a time, in order.
///
/// Snapshots queued while a save is running are coalesced so only the newest
/// one is written next. Save failures are logged and printed to stderr.
#[derive(Debug)]
pub struct HistoryWriter {
    tx: Option<mpsc::UnboundedSender<Vec<String>>>,
    task: Option<JoinHandle<()>>,
}

impl HistoryWriter {
    /// Starts the writer task. Must be called inside a tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<String>>();
        let task = tokio::spawn(async move {
            while let Some(mut entries) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    entries = newer;
                }
                match save(&path, &entries).await {
                    Ok(()) => {
                        HISTORY_SAVES.click();
                        tracing::debug!(path = %path.display(), entries = entries.len(), "saved history");
                    }
                    Err(err) => {
                        HISTORY_SAVE_ERRORS.click();
                        tracing::warn!(error = %err, "failed to save history");
                        eprintln!("Error saving history: {err}");
                    }
                }
            }
        });
        Self {
            tx: Some(tx),
            task: Some(task),
        }
    }

    /// Queues a full snapshot of the history without waiting for the write.
    pub fn submit(&self, entries: Vec<String>) {
        if let Some(tx) = &self.tx {
            if tx.send(entries).is_err() {
                tracing::warn!("history writer has stopped");
            }
        }
    }

    /// Waits for every queued snapshot to be written, then stops the writer.
    pub async fn close(&mut self) {
        self.tx.take();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "history writer failed");
            }
        }
    }
}

fn parse(contents: &str) -> Vec<String> {
    let mut entries: Vec<String> = contents.split('\n').map(str::to_string).collect();
    while entries.last().is_some_and(|line| line.is_empty()) {
        entries.pop();
    }
    entries
}
