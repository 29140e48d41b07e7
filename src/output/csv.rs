//! CSV event sink
//!
//! One summary row per event plus the full raw payload in the last column.
//! The file is opened in append mode so repeated runs (or a run resumed by
//! hand) extend the same report; the header is written only to a new or
//! empty file.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, SecondsFormat, Timelike};
use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{EventSink, OutputError, OutputResult};
use crate::ActivityEvent;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Column order of the report
pub const CSV_HEADER: [&str; 18] = [
    "year",
    "month",
    "day",
    "hour",
    "timestamp",
    "eventTime",
    "identityLabel",
    "internalIp",
    "externalIp",
    "destination",
    "action",
    "categories",
    "eventType",
    "protocol",
    "queryType",
    "responseCode",
    "url",
    "fullEvent",
];

/// Fixed formats tried after RFC 3339; naive values are read as UTC
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

fn parse_datetime_text(text: &str) -> Option<DateTime<FixedOffset>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    let utc = FixedOffset::east_opt(0)?;
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .map(|naive| naive.and_utc().with_timezone(&utc))
    })
}

fn parse_datetime_value(value: &serde_json::Value) -> Option<DateTime<FixedOffset>> {
    match value {
        serde_json::Value::String(s) => parse_datetime_text(s),
        serde_json::Value::Number(n) => {
            let millis = n.as_i64()?;
            let utc = FixedOffset::east_opt(0)?;
            DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&utc))
        }
        _ => None,
    }
}

/// Instant an event happened: `timestamp` first, then `eventTime`.
///
/// Returns `None` when neither field holds a recognizable date, in which case
/// the date columns of the row stay blank.
pub fn parse_event_datetime(event: &ActivityEvent) -> Option<DateTime<FixedOffset>> {
    ["timestamp", "eventTime"]
        .iter()
        .filter_map(|name| event.field(name))
        .find_map(parse_datetime_value)
}

fn summary_row(event: &ActivityEvent) -> [String; 18] {
    let parsed = parse_event_datetime(event);
    let date_part =
        |f: fn(&DateTime<FixedOffset>) -> String| parsed.as_ref().map(f).unwrap_or_default();
    let categories = event
        .categories()
        .into_iter()
        .map(|c| c.label)
        .collect::<Vec<_>>()
        .join(", ");

    [
        date_part(|dt| dt.year().to_string()),
        date_part(|dt| dt.month().to_string()),
        date_part(|dt| dt.day().to_string()),
        date_part(|dt| dt.hour().to_string()),
        date_part(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        event.event_time().unwrap_or_default(),
        event.identity_label().unwrap_or_default(),
        event.internal_ip().unwrap_or_default(),
        event.external_ip().unwrap_or_default(),
        event.destination().unwrap_or_default(),
        event.action().unwrap_or_default(),
        categories,
        event.event_type().unwrap_or_default(),
        event.protocol().unwrap_or_default(),
        event.query_type().unwrap_or_default(),
        event.response_code().unwrap_or_default(),
        event.url().unwrap_or_default(),
        event.to_json(),
    ]
}

/// Append-mode CSV sink
pub struct CsvEventSink {
    writer: Writer<BufWriter<File>>,
    path: PathBuf,
    events_written: u64,
}

impl CsvEventSink {
    /// Open (or create) the report at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Self::open_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Open with a custom write buffer size
    pub fn open_with_buffer_size<P: AsRef<Path>>(
        path: P,
        buffer_size: usize,
    ) -> OutputResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {}", e)))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| OutputError::IoError(format!("Failed to open file: {}", e)))?;
        let is_empty = file
            .metadata()
            .map_err(|e| OutputError::IoError(format!("Failed to stat file: {}", e)))?
            .len()
            == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::with_capacity(buffer_size, file));

        if is_empty {
            writer
                .write_record(CSV_HEADER)
                .map_err(|e| OutputError::CsvError(format!("Failed to write header: {}", e)))?;
            writer
                .flush()
                .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))?;
            info!("Created report file: {}", path.display());
        } else {
            info!("Appending to existing report file: {}", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            events_written: 0,
        })
    }

    /// Report path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for CsvEventSink {
    fn write_events(&mut self, events: &[ActivityEvent]) -> OutputResult<()> {
        for event in events {
            let row = summary_row(event);
            self.writer
                .write_record(&row)
                .map_err(|e| OutputError::CsvError(format!("Failed to write event: {}", e)))?;
        }
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))?;

        self.events_written += events.len() as u64;
        debug!(
            batch = events.len(),
            total = self.events_written,
            "Events appended to {}",
            self.path.display()
        );
        Ok(())
    }

    fn events_written(&self) -> u64 {
        self.events_written
    }
}
