//! Append-only CSV event log.
//!
//! One row per observed face per frame, plus synthetic group-alert rows.
//! The header is written only when the file is created; rows are escaped,
//! appended in order, never rewritten. The feed thread is the only writer;
//! the HTTP layer only reads, so a reader may see a torn final line under
//! extreme timing and `read_all` simply drops it.

use chrono::Local;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CSV_HEADER: &str = "timestamp,identity,role,activity";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ROLE_CRIMINAL: &str = "CRIMINAL";
const ROLE_CIVILIAN: &str = "CIVILIAN";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("log file: {0}")]
    Io(#[from] std::io::Error),
}

/// One retrieved log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub identity: String,
    pub role: String,
    pub activity: String,
}

/// Handle to the CSV log file. Cheap to clone.
#[derive(Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped row. The role column follows the match: a
    /// gallery hit logs CRIMINAL, anything else CIVILIAN.
    pub fn append(&self, identity: &str, activity: &str, is_criminal: bool) -> Result<(), LogError> {
        let role = if is_criminal {
            ROLE_CRIMINAL
        } else {
            ROLE_CIVILIAN
        };
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();

        let existed = self.path.exists();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if !existed {
            writeln!(file, "{CSV_HEADER}")?;
        }
        writeln!(
            file,
            "{},{},{},{}",
            csv_escape(&timestamp),
            csv_escape(identity),
            csv_escape(role),
            csv_escape(activity)
        )?;

        Ok(())
    }

    /// Read every complete row back, oldest first.
    ///
    /// A missing file is an empty log, and a final line with fewer than
    /// four fields (torn write) is dropped rather than erroring.
    pub fn read_all(&self) -> Result<Vec<LogEvent>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let text = std::fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for line in text.lines() {
            if line.is_empty() || line == CSV_HEADER {
                continue;
            }
            let fields = split_csv_line(line);
            if fields.len() != 4 {
                tracing::debug!(line, "skipping malformed log row");
                continue;
            }
            let mut it = fields.into_iter();
            events.push(LogEvent {
                timestamp: it.next().unwrap_or_default(),
                identity: it.next().unwrap_or_default(),
                role: it.next().unwrap_or_default(),
                activity: it.next().unwrap_or_default(),
            });
        }
        Ok(events)
    }
}

/// Escape a value for CSV: wrap in quotes if it contains comma, quote, or
/// newline.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split one CSV line into fields, honoring double-quoted values.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
