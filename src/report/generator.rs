//! Markdown and JSON report generation.
//!
//! This module turns a [`Report`] into the document written to disk.

use crate::models::{top_n, Report, ReportMetadata, Snapshot, NO_RIDING_KEY};
use anyhow::Result;
use std::collections::BTreeMap;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, top: usize) -> String {
    let snapshot = &report.snapshot;
    let mut output = String::new();

    output.push_str("# TrafficLens Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_overview_section(snapshot));
    output.push_str(&generate_daily_section(snapshot));

    output.push_str(&generate_top_section(
        "Top Pages",
        "Page",
        "Views",
        &snapshot.page_views,
        top,
    ));
    output.push_str(&generate_top_section(
        "Top Elections",
        "Election",
        "Events",
        &snapshot.election_events,
        top,
    ));
    output.push_str(&generate_top_section(
        "Top Ridings",
        "Riding",
        "Events",
        &snapshot.riding_events,
        top,
    ));

    output.push_str(&generate_by_day_section(
        "Election Visitors by Day",
        "Election",
        &snapshot.election_visitors_by_day,
        top,
    ));
    output.push_str(&generate_by_day_section(
        "Riding Visitors by Day",
        "Riding",
        &snapshot.riding_visitors_by_day,
        top,
    ));

    output.push_str(&generate_funnel_section(snapshot));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();
    let ingest = &metadata.ingest;

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", metadata.input));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Guided Flow Page:** `{}`\n",
        metadata.guided_flow_page
    ));
    section.push_str(&format!(
        "- **Files Processed:** {}\n",
        ingest.files_processed
    ));
    if ingest.files_skipped > 0 {
        section.push_str(&format!("- **Files Skipped:** {}\n", ingest.files_skipped));
    }
    section.push_str(&format!("- **Lines Parsed:** {}\n", ingest.lines_parsed));

    let rejected = ingest.no_timestamp + ingest.json_errors + ingest.invalid_records;
    if rejected > 0 {
        section.push_str(&format!(
            "- **Lines Rejected:** {} (no timestamp: {}, bad JSON: {}, no visitor: {})\n",
            rejected, ingest.no_timestamp, ingest.json_errors, ingest.invalid_records
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the headline numbers.
fn generate_overview_section(snapshot: &Snapshot) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str("| Events | Unique Visitors | Non-bot | Bots | Avg Visit Length |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {:.2} |\n\n",
        snapshot.total_events,
        snapshot.unique_visitors,
        snapshot.non_bot_count,
        snapshot.bot_count(),
        snapshot.average_visit_length
    ));
    section.push_str(
        "*Average visit length counts only visitors with more than one recorded action.*\n\n",
    );

    section
}

/// Generate the per-day visitor table.
fn generate_daily_section(snapshot: &Snapshot) -> String {
    if snapshot.visitors_by_day.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Daily Visitors\n\n");
    section.push_str("| Day | Visitors | Non-bot |\n");
    section.push_str("|:---|:---:|:---:|\n");

    for (day, visitors) in &snapshot.visitors_by_day {
        let non_bot = snapshot
            .non_bot_visitors_by_day
            .get(day)
            .copied()
            .unwrap_or(0);
        section.push_str(&format!("| {} | {} | {} |\n", day, visitors, non_bot));
    }
    section.push('\n');

    section
}

/// Generate a top-N table for one flat dimension.
fn generate_top_section(
    title: &str,
    key_header: &str,
    count_header: &str,
    counts: &BTreeMap<String, usize>,
    top: usize,
) -> String {
    if counts.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str(&format!("## {}\n\n", title));
    section.push_str(&format!("| {} | {} |\n", key_header, count_header));
    section.push_str("|:---|:---:|\n");

    for (key, count) in top_n(counts, top) {
        let label = if key == NO_RIDING_KEY {
            "*(none)*".to_string()
        } else {
            format!("`{}`", key)
        };
        section.push_str(&format!("| {} | {} |\n", label, count));
    }
    section.push('\n');

    section
}

/// Generate a day-partitioned visitor table, top entries per day.
fn generate_by_day_section(
    title: &str,
    key_header: &str,
    by_day: &BTreeMap<String, BTreeMap<String, usize>>,
    top: usize,
) -> String {
    if by_day.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str(&format!("## {}\n\n", title));
    section.push_str(&format!("| Day | {} | Visitors |\n", key_header));
    section.push_str("|:---|:---|:---:|\n");

    for (day, counts) in by_day {
        for (key, visitors) in top_n(counts, top) {
            section.push_str(&format!("| {} | `{}` | {} |\n", day, key, visitors));
        }
    }
    section.push('\n');

    section
}

/// Generate the checkpoint funnel table.
fn generate_funnel_section(snapshot: &Snapshot) -> String {
    if snapshot.checkpoint_events.is_empty() {
        return String::new();
    }

    let funnel = snapshot.checkpoint_funnel();
    let mut section = String::new();

    section.push_str("## Checkpoint Funnel\n\n");
    section.push_str("| Checkpoint | Events | Visitors Reached | Stopped Here |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");

    for (checkpoint, events) in &snapshot.checkpoint_events {
        let reached = funnel.reached.get(checkpoint).copied().unwrap_or(0);
        let stopped = funnel.last_reached.get(checkpoint).copied().unwrap_or(0);
        section.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            checkpoint, events, reached, stopped
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by TrafficLens*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
