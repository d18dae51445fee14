//! TrafficLens - visitor-tracking log analyzer
//!
//! A CLI tool that reads visitor-tracking logs, folds them into a traffic
//! snapshot (unique and non-bot visitors, daily, election and riding
//! breakdowns, checkpoint funnel, visit length) and writes a report.
//!
//! Exit codes:
//!   0 - Success (including "nothing to analyze")
//!   1 - Runtime error (bad config, unreadable input, failed analysis, etc.)

mod analysis;
mod cli;
mod config;
mod ingest;
mod models;
mod report;

use analysis::AggregateOptions;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, LogFormat, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use ingest::{IngestConfig, IngestSummary, LogIngestor};
use models::{top_n, Report, ReportMetadata, Snapshot};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so `[general] verbose` applies
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("TrafficLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_analysis(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .trafficlens.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the input, guided flow page, and report.");
    Ok(())
}

/// Initialize logging based on verbosity and format settings.
fn init_logging(args: &Args, config: &Config) {
    let builder = FmtSubscriber::builder()
        .with_max_level(config.log_level(args.quiet))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match args.log_format {
        LogFormat::Compact => {
            let subscriber = builder.compact().finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
        LogFormat::Json => {
            let subscriber = builder.json().flatten_event(true).finish();
            tracing::subscriber::set_global_default(subscriber)
                .expect("Failed to set tracing subscriber");
        }
    }
}

/// Run the complete ingest → aggregate → report workflow. Returns the exit code.
async fn run_analysis(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let input = PathBuf::from(&config.ingest.input);
    let options = AggregateOptions {
        guided_flow_page: config.analysis.guided_flow_page.clone(),
    };

    // Step 1: Read the tracking logs
    if !args.quiet {
        println!("📥 Reading logs: {}", input.display());
    }
    info!(path = %input.display(), "Starting log analysis");

    let mut ingest_config = IngestConfig::from(&config);
    ingest_config.show_progress = !args.quiet;
    let ingestor = LogIngestor::new(ingest_config);

    let (events, ingest_summary) = match ingestor.ingest(&input).await {
        Ok(ingested) if ingested.events.is_empty() => {
            warn!(path = %input.display(), "No logs found to analyze");
            if !args.quiet {
                println!("\n⚠️  No tracking events found. Nothing to analyze.");
            }
            return Ok(0);
        }
        Ok(ingested) => (Ok(ingested.events), ingested.summary),
        Err(e) => (Err(e), IngestSummary::default()),
    };

    // Step 2: Aggregate
    let Some(snapshot) = analysis::analyze_events(events, &options) else {
        anyhow::bail!("Log analysis failed for {}", input.display());
    };

    if !args.quiet {
        print_summary(&snapshot, config.report.top_n);
    }

    // Step 3: Build and write the report
    let report = Report {
        metadata: ReportMetadata {
            input: input.display().to_string(),
            generated_at: Utc::now(),
            guided_flow_page: options.guided_flow_page.clone(),
            ingest: ingest_summary,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        snapshot,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, config.report.top_n),
    };

    let output_path = PathBuf::from(&config.general.output);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Step 4: Charts (failures are logged, never fatal)
    if let Some(ref charts_dir) = config.report.charts_dir {
        let written =
            report::write_charts(&report.snapshot, charts_dir, config.report.chart_width);
        if !args.quiet {
            println!(
                "   Charts written: {} (in {})",
                written.len(),
                charts_dir.display()
            );
        }
    }

    info!(report = %output_path.display(), "Log analysis & report generation successful");
    if !args.quiet {
        println!(
            "\n✅ Analysis complete! Report saved to: {}",
            output_path.display()
        );
    }

    Ok(0)
}

/// Print the headline numbers and top entries to the console.
fn print_summary(snapshot: &Snapshot, top: usize) {
    println!("\n📊 Analysis Summary:");
    println!("   Events: {}", snapshot.total_events);
    println!("   Unique visitors: {}", snapshot.unique_visitors);
    println!(
        "   Non-bot visitors: {} (bots: {})",
        snapshot.non_bot_count,
        snapshot.bot_count()
    );
    println!(
        "   Average visit length: {:.2}",
        snapshot.average_visit_length
    );

    let sections = [
        ("Pages", &snapshot.page_views),
        ("Elections", &snapshot.election_events),
        ("Ridings", &snapshot.riding_events),
    ];
    for (title, counts) in sections {
        if counts.is_empty() {
            continue;
        }
        let entries: Vec<String> = top_n(counts, top)
            .into_iter()
            .map(|(key, count)| format!("{} ({})", key, count))
            .collect();
        println!("   Top {}: {}", title.to_lowercase(), entries.join(", "));
    }
}

/// Load configuration from file or use defaults.
///
/// Runs before the subscriber is installed, so problems go to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(config) => Ok(config.unwrap_or_default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}. Using defaults.", e);
            Ok(Config::default())
        }
    }
}
