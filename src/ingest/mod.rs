//! Visitor-tracking log ingestion.
//!
//! Turns raw log files into normalized [`EventRecord`]s. Each tracking
//! line looks like:
//!
//! ```text
//! [2024-01-01T10:00:00.123456+00:00] production.INFO: visitor_tracking load {"visitor_token":"..."} []
//! ```
//!
//! Lines that do not match are counted in the [`IngestSummary`] and
//! skipped; they never abort ingestion.

use crate::models::EventRecord;
use chrono::DateTime;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Errors that make an input unreadable as a whole.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list directory {}: {source}", .path.display())]
    ListDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Settings for reading log files.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Extension (without dot) of files read from a directory.
    pub extension: String,
    /// Text that precedes the JSON payload on a tracking line.
    pub marker: String,
    /// Number of files read at once.
    pub concurrency: usize,
    /// Show a progress bar while reading a directory.
    pub show_progress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extension: "log".to_string(),
            marker: "load ".to_string(),
            concurrency: 4,
            show_progress: false,
        }
    }
}

impl From<&crate::config::Config> for IngestConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            extension: config.ingest.extension.clone(),
            marker: config.ingest.marker.clone(),
            concurrency: config.general.concurrency.max(1),
            show_progress: false,
        }
    }
}

/// Counters describing what ingestion did with its input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub lines_parsed: usize,
    pub no_timestamp: usize,
    pub json_errors: usize,
    /// JSON payloads without a usable visitor token.
    pub invalid_records: usize,
}

impl IngestSummary {
    fn absorb(&mut self, other: &IngestSummary) {
        self.files_processed += other.files_processed;
        self.files_skipped += other.files_skipped;
        self.lines_parsed += other.lines_parsed;
        self.no_timestamp += other.no_timestamp;
        self.json_errors += other.json_errors;
        self.invalid_records += other.invalid_records;
    }

    fn log(&self) {
        info!(
            files_processed = self.files_processed,
            files_skipped = self.files_skipped,
            lines_parsed = self.lines_parsed,
            no_timestamp = self.no_timestamp,
            json_errors = self.json_errors,
            invalid_records = self.invalid_records,
            "Log processing completed"
        );
    }
}

/// Events read from an input together with the ingestion counters.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub events: Vec<EventRecord>,
    pub summary: IngestSummary,
}

/// What a single log line turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Event(EventRecord),
    NoTimestamp,
    JsonError,
    InvalidRecord,
}

/// Parse one log line.
///
/// The record's `timestamp` is replaced by the `YYYY-MM-DD` date of the
/// bracketed line timestamp, as written in its own offset.
pub fn parse_line(line: &str, marker: &str) -> LineOutcome {
    let Some((stamp, rest)) = line
        .strip_prefix('[')
        .and_then(|body| body.split_once(']'))
    else {
        return LineOutcome::NoTimestamp;
    };

    let Ok(timestamp) = DateTime::parse_from_rfc3339(stamp) else {
        return LineOutcome::NoTimestamp;
    };

    let Some(start) = rest.find(marker) else {
        return LineOutcome::JsonError;
    };

    let payload = rest[start + marker.len()..].trim();
    let payload = payload.strip_suffix("[]").unwrap_or(payload).trim_end();

    let mut value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return LineOutcome::JsonError,
    };

    if let Some(object) = value.as_object_mut() {
        object.insert(
            "timestamp".to_string(),
            Value::String(timestamp.format("%Y-%m-%d").to_string()),
        );
    }

    match EventRecord::from_json(&value) {
        Some(record) => LineOutcome::Event(record),
        None => LineOutcome::InvalidRecord,
    }
}

/// Parse the full contents of one log file.
pub fn parse_content(content: &str, marker: &str) -> Ingested {
    let mut ingested = Ingested::default();

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match parse_line(line, marker) {
            LineOutcome::Event(record) => {
                ingested.events.push(record);
                ingested.summary.lines_parsed += 1;
            }
            LineOutcome::NoTimestamp => ingested.summary.no_timestamp += 1,
            LineOutcome::JsonError => ingested.summary.json_errors += 1,
            LineOutcome::InvalidRecord => ingested.summary.invalid_records += 1,
        }
    }

    if !ingested.events.is_empty() {
        ingested.summary.files_processed = 1;
    }

    ingested
}

/// Reads tracking logs from a file or a directory of files.
pub struct LogIngestor {
    config: IngestConfig,
}

impl LogIngestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Ingest a single file, or every matching file in a directory.
    ///
    /// Events are returned in file-name order, then line order. A missing
    /// path is skipped with a warning. Unreadable files inside a directory
    /// are logged and skipped; an unreadable single file or directory
    /// listing is an error.
    pub async fn ingest(&self, path: &Path) -> Result<Ingested, IngestError> {
        if !path.exists() {
            warn!(path = %path.display(), "Input not found, nothing to ingest");
            let mut ingested = Ingested::default();
            ingested.summary.files_skipped = 1;
            ingested.summary.log();
            return Ok(ingested);
        }

        let ingested = if path.is_dir() {
            self.ingest_dir(path).await?
        } else {
            read_log_file(path.to_path_buf(), self.config.marker.clone()).await?
        };

        ingested.summary.log();
        Ok(ingested)
    }

    async fn ingest_dir(&self, dir: &Path) -> Result<Ingested, IngestError> {
        let files = self.list_log_files(dir)?;
        let mut ingested = Ingested::default();

        if files.is_empty() {
            warn!(directory = %dir.display(), "No log files found in the directory");
            return Ok(ingested);
        }

        let progress = if self.config.show_progress {
            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let marker = self.config.marker.clone();
        let results: Vec<_> = stream::iter(files)
            .map(|file| {
                let marker = marker.clone();
                async move {
                    let result = read_log_file(file.clone(), marker).await;
                    (file, result)
                }
            })
            .buffered(self.config.concurrency.max(1))
            .inspect(|_| progress.inc(1))
            .collect()
            .await;

        progress.finish_and_clear();

        for (file, result) in results {
            match result {
                Ok(parsed) => {
                    debug!(
                        file = %file.display(),
                        events = parsed.events.len(),
                        "Parsed log file"
                    );
                    ingested.summary.absorb(&parsed.summary);
                    ingested.events.extend(parsed.events);
                }
                Err(e) => {
                    error!(file = %file.display(), error = %e, "Failed to process file");
                    ingested.summary.files_skipped += 1;
                }
            }
        }

        Ok(ingested)
    }

    /// List matching files directly inside `dir`, sorted by name.
    fn list_log_files(&self, dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| IngestError::ListDir {
                path: dir.to_path_buf(),
                source,
            })?;

            let matches = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == self.config.extension);

            if matches {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}

async fn read_log_file(path: PathBuf, marker: String) -> Result<Ingested, IngestError> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| IngestError::Read {
            path: path.clone(),
            source,
        })?;

    let content = String::from_utf8_lossy(&bytes);
    Ok(parse_content(&content, &marker))
}
