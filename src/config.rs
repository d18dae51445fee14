//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.trafficlens.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::DEFAULT_GUIDED_FLOW_PAGE;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".trafficlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Log ingestion settings.
    #[serde(default)]
    pub ingest: IngestSettings,

    /// Aggregation settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of log files read concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "trafficlens_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Where and how tracking logs are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Log file, or directory of log files.
    #[serde(default = "default_input")]
    pub input: String,

    /// Extension of log files inside a directory.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Text preceding the JSON payload on each tracking line.
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            input: default_input(),
            extension: default_extension(),
            marker: default_marker(),
        }
    }
}

fn default_input() -> String {
    "./data/vm-logs".to_string()
}

fn default_extension() -> String {
    "log".to_string()
}

fn default_marker() -> String {
    "load ".to_string()
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Page whose checkpoints form the funnel.
    #[serde(default = "default_guided_flow_page")]
    pub guided_flow_page: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            guided_flow_page: default_guided_flow_page(),
        }
    }
}

fn default_guided_flow_page() -> String {
    DEFAULT_GUIDED_FLOW_PAGE.to_string()
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Entries shown per dimension.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Directory for text charts; no charts when unset.
    #[serde(default)]
    pub charts_dir: Option<PathBuf>,

    /// Width of the longest bar in a chart, in characters.
    #[serde(default = "default_chart_width")]
    pub chart_width: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            charts_dir: None,
            chart_width: default_chart_width(),
        }
    }
}

fn default_top_n() -> usize {
    10
}

fn default_chart_width() -> usize {
    40
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref input) = args.input {
            self.ingest.input = input.display().to_string();
        }
        if let Some(ref extension) = args.extension {
            self.ingest.extension = extension.clone();
        }
        if let Some(ref marker) = args.marker {
            self.ingest.marker = marker.clone();
        }

        if let Some(ref page) = args.guided_flow_page {
            self.analysis.guided_flow_page = page.clone();
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(top) = args.top {
            self.report.top_n = top;
        }
        if let Some(ref charts_dir) = args.charts_dir {
            self.report.charts_dir = Some(charts_dir.clone());
        }
        if let Some(width) = args.chart_width {
            self.report.chart_width = width;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Log level for this run. `--quiet` wins over a verbose config.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, LogFormat, OutputFormat};
    use tempfile::TempDir;

    fn bare_args() -> Args {
        Args {
            input: None,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            verbose: false,
            quiet: false,
            log_format: LogFormat::Compact,
            extension: None,
            marker: None,
            concurrency: None,
            guided_flow_page: None,
            top: None,
            charts_dir: None,
            chart_width: None,
            init_config: false,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analysis.guided_flow_page, "howto");
        assert_eq!(config.ingest.extension, "log");
        assert_eq!(config.ingest.marker, "load ");
        assert_eq!(config.report.top_n, 10);
        assert!(config.report.charts_dir.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "traffic.json"
verbose = true

[ingest]
input = "/var/log/tracking"
extension = "txt"

[analysis]
guided_flow_page = "walkthrough"

[report]
top_n = 3
charts_dir = "charts"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "traffic.json");
        assert!(config.general.verbose);
        assert_eq!(config.general.concurrency, 4);
        assert_eq!(config.ingest.input, "/var/log/tracking");
        assert_eq!(config.ingest.extension, "txt");
        assert_eq!(config.ingest.marker, "load ");
        assert_eq!(config.analysis.guided_flow_page, "walkthrough");
        assert_eq!(config.report.top_n, 3);
        assert_eq!(config.report.charts_dir, Some(PathBuf::from("charts")));
        assert_eq!(config.report.chart_width, 40);
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[report]\ntop_n = 7\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.report.top_n, 7);

        std::fs::write(&path, "[report\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_merge_keeps_file_values_without_flags() {
        let mut config = Config::default();
        config.report.top_n = 3;
        config.analysis.guided_flow_page = "guide".to_string();

        config.merge_with_args(&bare_args());
        assert_eq!(config.report.top_n, 3);
        assert_eq!(config.analysis.guided_flow_page, "guide");
    }

    #[test]
    fn test_merge_flags_override() {
        let mut args = bare_args();
        args.input = Some(PathBuf::from("logs/today.log"));
        args.top = Some(5);
        args.guided_flow_page = Some("tour".to_string());
        args.verbose = true;

        let mut config = Config::default();
        config.merge_with_args(&args);
        assert_eq!(config.ingest.input, "logs/today.log");
        assert_eq!(config.report.top_n, 5);
        assert_eq!(config.analysis.guided_flow_page, "tour");
        assert!(config.general.verbose);
    }

    #[test]
    fn test_verbose_config_sets_debug_level() {
        let config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        assert_eq!(config.log_level(false), tracing::Level::DEBUG);
        assert_eq!(config.log_level(true), tracing::Level::ERROR);

        let mut config = Config::default();
        assert_eq!(config.log_level(false), tracing::Level::INFO);

        let mut args = bare_args();
        args.verbose = true;
        config.merge_with_args(&args);
        assert_eq!(config.log_level(false), tracing::Level::DEBUG);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[ingest]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[report]"));
    }
}
