use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use biometrics::{Collector, Counter, Moments, PlainTextEmitter};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("ai_repl.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("ai_repl.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("ai_repl.client.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("ai_repl.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("ai_repl.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("ai_repl.stream.bytes");
pub(crate) static STREAM_CANCELLATIONS: Counter = Counter::new("ai_repl.stream.cancellations");
pub(crate) static STREAM_DURATION: Moments = Moments::new("ai_repl.stream.duration_seconds");

pub(crate) static SESSION_TURNS: Counter = Counter::new("ai_repl.session.turns");
pub(crate) static SESSION_COMMANDS: Counter = Counter::new("ai_repl.session.commands");

pub(crate) static HISTORY_SAVES: Counter = Counter::new("ai_repl.history.saves");
pub(crate) static HISTORY_SAVE_ERRORS: Counter = Counter::new("ai_repl.history.save_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_CANCELLATIONS);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_COMMANDS);

    collector.register_counter(&HISTORY_SAVES);
    collector.register_counter(&HISTORY_SAVE_ERRORS);
}

/// Open `path` for appending plain-text readings.
pub fn open_emitter(path: impl AsRef<Path>) -> Result<PlainTextEmitter> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| {
            Error::io(
                format!("failed to open metrics file {}", path.display()),
                err,
            )
        })?;
    Ok(PlainTextEmitter::new(file))
}

/// Write one reading of every registered sensor.
pub fn emit_biometrics(collector: &Collector, emitter: &mut PlainTextEmitter) -> Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    collector
        .emit(emitter, now)
        .map_err(|err| Error::io("failed to emit biometrics", err))
}

/// Emit readings to `path` every `interval` until the task is aborted.
pub fn spawn_biometrics_emitter(
    collector: Arc<Collector>,
    path: impl AsRef<Path>,
    interval: Duration,
) -> Result<JoinHandle<()>> {
    let mut emitter = open_emitter(path)?;
    Ok(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = emit_biometrics(&collector, &mut emitter) {
                tracing::warn!(error = %err, "biometrics emit failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_sensors_are_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics");
        let collector = Collector::new();
        register_biometrics(&collector);
        SESSION_TURNS.click();

        let mut emitter = open_emitter(&path).unwrap();
        emit_biometrics(&collector, &mut emitter).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().any(|l| l.starts_with("ai_repl.session.turns ")));
        assert!(text.lines().any(|l| l.starts_with("ai_repl.stream.duration_seconds ")));
    }

    #[tokio::test]
    async fn background_emitter_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics");
        let collector = Arc::new(Collector::new());
        register_biometrics(&collector);
        let task =
            spawn_biometrics_emitter(Arc::clone(&collector), &path, Duration::from_millis(10))
                .unwrap();
        tokio::time::timeout(Duration::from_secs(10), async {
            while !std::fs::read_to_string(&path)
                .unwrap_or_default()
                .contains("ai_repl.history.save_errors")
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        task.abort();
    }
}
