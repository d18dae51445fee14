//! Report output.
//!
//! The generator writes the full markdown or JSON report; the chart
//! renderer draws individual dimensions.

pub mod chart;
pub mod generator;

pub use chart::write_charts;
pub use generator::{generate_json_report, generate_markdown_report};
