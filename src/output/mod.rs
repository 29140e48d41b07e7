//! Event sinks

use crate::ActivityEvent;

pub mod csv;
pub mod path;

pub use self::csv::CsvEventSink;
pub use path::ReportFileName;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Durable, append-only destination for retrieved events.
///
/// The report driver hands over one hour's events at a time, in retrieval
/// order. A failed write aborts the run.
pub trait EventSink {
    /// Append a batch of events and make them durable
    fn write_events(&mut self, events: &[ActivityEvent]) -> OutputResult<()>;

    /// Events written so far by this sink
    fn events_written(&self) -> u64;
}

/// Collects events in memory; useful for previews and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<ActivityEvent>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> &[ActivityEvent] {
        &self.events
    }
}

impl EventSink for MemorySink {
    fn write_events(&mut self, events: &[ActivityEvent]) -> OutputResult<()> {
        self.events.extend_from_slice(events);
        Ok(())
    }

    fn events_written(&self) -> u64 {
        self.events.len() as u64
    }
}
