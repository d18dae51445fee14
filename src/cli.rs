//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// TrafficLens - visitor-tracking log analyzer
///
/// Reads visitor-tracking logs and reports unique visitors, bot/non-bot
/// split, per-day, per-election and per-riding breakdowns, the guided-flow
/// checkpoint funnel and average visit length.
///
/// Examples:
///   trafficlens ./data/vm-logs
///   trafficlens ./data/vm-logs/visitor_tracking.log --format json -o stats.json
///   trafficlens ./data/vm-logs --charts-dir charts --top 5
///   trafficlens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Log file or directory of log files to analyze
    ///
    /// Defaults to the `[ingest] input` setting (./data/vm-logs).
    #[arg(value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .trafficlens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Log line format (compact, json)
    #[arg(long, default_value = "compact", value_name = "FORMAT", env = "TRAFFICLENS_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Extension of log files read from a directory
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Text that precedes the JSON payload on each tracking line
    #[arg(long, value_name = "TEXT")]
    pub marker: Option<String>,

    /// Number of log files read concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Page identifier of the guided flow whose checkpoints form the funnel
    #[arg(long, value_name = "PAGE", env = "TRAFFICLENS_GUIDED_FLOW_PAGE")]
    pub guided_flow_page: Option<String>,

    /// Number of entries shown per dimension
    #[arg(long, value_name = "COUNT")]
    pub top: Option<usize>,

    /// Write a text bar chart per dimension into this directory
    #[arg(long, value_name = "DIR")]
    pub charts_dir: Option<PathBuf>,

    /// Width of the longest chart bar, in characters
    #[arg(long, value_name = "COLS")]
    pub chart_width: Option<usize>,

    /// Generate a default .trafficlens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Format of emitted log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line output (default)
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.top == Some(0) {
            return Err("Top must be at least 1".to_string());
        }

        if self.chart_width == Some(0) {
            return Err("Chart width must be at least 1".to_string());
        }

        if let Some(ref page) = self.guided_flow_page {
            if page.trim().is_empty() {
                return Err("Guided flow page must not be empty".to_string());
            }
        }

        if let Some(ref marker) = self.marker {
            if marker.is_empty() {
                return Err("Marker must not be empty".to_string());
            }
        }

        Ok(())
    }
}
