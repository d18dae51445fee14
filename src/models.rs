//! Data models for the traffic analyzer.
//!
//! This module contains the core data structures used throughout the
//! application: the normalized event record consumed by the aggregation
//! engine, the snapshot it produces, and the report wrapper around it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::ingest::IngestSummary;

/// Reserved riding key for events that carry no riding.
///
/// Only the flat riding counter uses it; day-partitioned riding
/// breakdowns omit such events.
pub const NO_RIDING_KEY: &str = "(no riding)";

/// A single observed visitor action, normalized from a tracking log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Opaque visitor identifier, stable across events. Never empty.
    pub visitor_token: String,
    /// Date-bearing timestamp; only the `YYYY-MM-DD` prefix is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Page that was viewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Authenticated session indicator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signedin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub riding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    /// Progress marker within the guided-flow page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

impl EventRecord {
    /// Creates a record with only the visitor token and timestamp set.
    #[cfg(test)]
    pub fn new(visitor_token: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            visitor_token: visitor_token.into(),
            timestamp: Some(timestamp.into()),
            ..Self::default()
        }
    }

    /// Builds a record from a raw JSON tracking payload.
    ///
    /// Returns `None` when the payload is not an object or has no usable
    /// `visitor_token`. Every other field is optional; values of the wrong
    /// shape are treated as absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(scalar_text);

        Some(Self {
            visitor_token: text("visitor_token")?,
            timestamp: text("timestamp"),
            page: text("page"),
            signedin: object.get("signedin").map(truthy),
            election: text("election"),
            riding: text("riding"),
            candidate: text("candidate"),
            checkpoint: text("checkpoint"),
        })
    }

    pub fn page(&self) -> Option<&str> {
        present(&self.page)
    }

    pub fn election(&self) -> Option<&str> {
        present(&self.election)
    }

    pub fn riding(&self) -> Option<&str> {
        present(&self.riding)
    }

    pub fn candidate(&self) -> Option<&str> {
        present(&self.candidate)
    }

    pub fn checkpoint(&self) -> Option<&str> {
        present(&self.checkpoint)
    }

    pub fn is_signed_in(&self) -> bool {
        self.signedin.unwrap_or(false)
    }

    /// Returns the `YYYY-MM-DD` date component of the timestamp, if it has one.
    pub fn day(&self) -> Option<&str> {
        let date = present(&self.timestamp)?.get(..10)?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        Some(date)
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// Immutable result of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Number of events folded.
    pub total_events: usize,
    /// Distinct visitor tokens seen.
    pub unique_visitors: usize,
    /// Distinct visitors with at least one non-bot event.
    pub non_bot_count: usize,
    /// Mean action count over visitors with more than one action.
    pub average_visit_length: f64,
    /// Day → distinct visitors.
    pub visitors_by_day: BTreeMap<String, usize>,
    /// Day → distinct non-bot visitors.
    pub non_bot_visitors_by_day: BTreeMap<String, usize>,
    /// Election → event count.
    pub election_events: BTreeMap<String, usize>,
    /// Day → election → distinct visitors.
    pub election_visitors_by_day: BTreeMap<String, BTreeMap<String, usize>>,
    /// Riding (or [`NO_RIDING_KEY`]) → event count.
    pub riding_events: BTreeMap<String, usize>,
    /// Day → riding → distinct visitors. Events without a riding are absent.
    pub riding_visitors_by_day: BTreeMap<String, BTreeMap<String, usize>>,
    /// Checkpoint → event count on the guided-flow page.
    pub checkpoint_events: BTreeMap<String, usize>,
    /// Visitor → checkpoints in arrival order.
    pub visitor_checkpoints: BTreeMap<String, Vec<String>>,
    /// Page → view count.
    pub page_views: BTreeMap<String, usize>,
}

impl Snapshot {
    /// Visitors that never produced non-bot evidence.
    pub fn bot_count(&self) -> usize {
        self.unique_visitors.saturating_sub(self.non_bot_count)
    }

    /// Derives the checkpoint funnel from the per-visitor sequences.
    pub fn checkpoint_funnel(&self) -> CheckpointFunnel {
        let mut funnel = CheckpointFunnel::default();

        for checkpoints in self.visitor_checkpoints.values() {
            let mut seen: Vec<&str> = checkpoints.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for checkpoint in seen {
                *funnel.reached.entry(checkpoint.to_string()).or_default() += 1;
            }

            if let Some(last) = checkpoints.last() {
                *funnel.last_reached.entry(last.clone()).or_default() += 1;
            }
        }

        funnel
    }
}

/// Per-checkpoint visitor counts reconstructed from checkpoint sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointFunnel {
    /// Checkpoint → distinct visitors that reached it at least once.
    pub reached: BTreeMap<String, usize>,
    /// Checkpoint → visitors whose most recent checkpoint it was.
    pub last_reached: BTreeMap<String, usize>,
}

/// Returns the `n` largest entries, ties broken by key.
pub fn top_n(counts: &BTreeMap<String, usize>, n: usize) -> Vec<(&str, usize)> {
    let mut entries: Vec<(&str, usize)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.truncate(n);
    entries
}

/// A flat count mapping of the snapshot that can be charted or tabulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Checkpoints,
    DailyVisitors,
    Elections,
    Ridings,
    Pages,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Checkpoints,
        Dimension::DailyVisitors,
        Dimension::Elections,
        Dimension::Ridings,
        Dimension::Pages,
    ];

    /// Returns this dimension's label → count mapping.
    pub fn counts<'a>(&self, snapshot: &'a Snapshot) -> &'a BTreeMap<String, usize> {
        match self {
            Dimension::Checkpoints => &snapshot.checkpoint_events,
            Dimension::DailyVisitors => &snapshot.visitors_by_day,
            Dimension::Elections => &snapshot.election_events,
            Dimension::Ridings => &snapshot.riding_events,
            Dimension::Pages => &snapshot.page_views,
        }
    }

    /// File stem used when the dimension is written to disk.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Dimension::Checkpoints => "checkpoints",
            Dimension::DailyVisitors => "daily-visitors",
            Dimension::Elections => "elections",
            Dimension::Ridings => "ridings",
            Dimension::Pages => "pages",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Checkpoints => write!(f, "Checkpoint Events"),
            Dimension::DailyVisitors => write!(f, "Daily Visitors"),
            Dimension::Elections => write!(f, "Election Events"),
            Dimension::Ridings => write!(f, "Riding Events"),
            Dimension::Pages => write!(f, "Page Views"),
        }
    }
}

/// Metadata about an analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// File or directory the events were read from.
    pub input: String,
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Page identifier treated as the guided flow.
    pub guided_flow_page: String,
    /// Ingestion counters.
    pub ingest: IngestSummary,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete traffic report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub snapshot: Snapshot,
}
