//! Snapshot sinks for the cold path.
//!
//! The cold-path worker hands every dequeued [`Snapshot`] to a
//! [`SnapshotSink`]. Sinks run outside the hot path and may block on I/O;
//! their failures are counted by the pipeline and swallowed — they never
//! propagate into the hot loops.
//!
//! The provided implementations are debugging collaborators. Real outbound
//! surfaces (gateways, persistence, metrics) live outside the core and
//! implement this trait at the process boundary.

use crate::types::Snapshot;
use std::io::Write;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Error types for snapshot delivery.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Consumer of top-of-book snapshots.
pub trait SnapshotSink: Send {
    /// Delivers one snapshot. May block; must not panic.
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<(), SinkError>;

    /// Sink name for diagnostics.
    fn name(&self) -> &str;
}

/// Discards everything. Useful for load tests of the hot path alone.
#[derive(Debug, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn deliver(&mut self, _snapshot: &Snapshot) -> Result<(), SinkError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Prints one JSON line per snapshot to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl SnapshotSink for StdoutSink {
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let line = serde_json::to_string(snapshot)?;
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        writeln!(lock, "{line}")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Appends one JSON line per snapshot to a writer (typically a file opened
/// by the embedding process).
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> SnapshotSink for JsonLinesSink<W> {
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let line = serde_json::to_string(snapshot)?;
        writeln!(self.writer, "{line}")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}

/// Collects snapshots into shared memory for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    collected: Arc<Mutex<Vec<Snapshot>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle the test side keeps while the pipeline owns the sink.
    pub fn handle(&self) -> Arc<Mutex<Vec<Snapshot>>> {
        Arc::clone(&self.collected)
    }
}

impl SnapshotSink for CollectingSink {
    fn deliver(&mut self, snapshot: &Snapshot) -> Result<(), SinkError> {
        let mut collected = self
            .collected
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        collected.push(*snapshot);
        Ok(())
    }

    fn name(&self) -> &str {
        "collecting"
    }
}
