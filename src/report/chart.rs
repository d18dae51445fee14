//! Text bar charts.
//!
//! Renders one flat count mapping of a snapshot (label → count) as a
//! horizontal bar chart. A failing chart never affects the others or the
//! analysis that produced the data.

use crate::models::{top_n, Dimension, Snapshot};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors produced while rendering or writing a chart.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no {0} data to chart")]
    EmptyData(Dimension),
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Render labelled counts as a bar chart.
///
/// The largest count spans `width` characters; any non-zero count gets at
/// least one.
pub fn render_bar_chart(title: &str, entries: &[(&str, usize)], width: usize) -> String {
    let mut chart = String::new();
    let _ = writeln!(chart, "{}", title);
    let _ = writeln!(chart, "{}", "=".repeat(title.chars().count()));

    let max = entries.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let label_width = entries
        .iter()
        .map(|(label, _)| label.chars().count())
        .max()
        .unwrap_or(0);

    for (label, count) in entries {
        let bar_len = if max == 0 || *count == 0 {
            0
        } else {
            (count * width / max).max(1)
        };
        let _ = writeln!(
            chart,
            "{:<label_width$} | {} {}",
            label,
            "#".repeat(bar_len),
            count,
            label_width = label_width
        );
    }

    chart
}

/// Entries of a dimension in chart order: chronological for days,
/// largest first otherwise.
fn chart_entries(dimension: Dimension, snapshot: &Snapshot) -> Vec<(&str, usize)> {
    let counts = dimension.counts(snapshot);
    match dimension {
        Dimension::DailyVisitors => counts.iter().map(|(k, v)| (k.as_str(), *v)).collect(),
        _ => top_n(counts, counts.len()),
    }
}

/// Render and write the chart of one dimension into `dir`.
pub fn write_chart(
    dimension: Dimension,
    snapshot: &Snapshot,
    dir: &Path,
    width: usize,
) -> Result<PathBuf, ReportError> {
    let entries = chart_entries(dimension, snapshot);
    if entries.is_empty() {
        return Err(ReportError::EmptyData(dimension));
    }

    let chart = render_bar_chart(&dimension.to_string(), &entries, width);
    let path = dir.join(format!("{}.txt", dimension.file_stem()));

    std::fs::write(&path, chart).map_err(|source| ReportError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

/// Write a chart for every dimension, returning the files written.
pub fn write_charts(snapshot: &Snapshot, dir: &Path, width: usize) -> Vec<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        error!(directory = %dir.display(), error = %e, "Failed to create charts directory");
        return Vec::new();
    }

    let mut written = Vec::new();
    for dimension in Dimension::ALL {
        match write_chart(dimension, snapshot, dir, width) {
            Ok(path) => {
                info!(chart = %dimension, path = %path.display(), "Generated chart");
                written.push(path);
            }
            Err(e @ ReportError::EmptyData(_)) => warn!("{}", e),
            Err(e) => error!(chart = %dimension, error = %e, "Failed to generate chart"),
        }
    }

    written
}
