//! End-of-run summary.

use crate::OutputFormat;
use anyhow::{Context, Result};
use std::time::Duration;
use reindex_core::RunReport;
use tracing::{debug, info};

/// Prints the summary of a finished run.
pub fn print(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(report).context("Failed to serialize to JSON")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            info!("Reindex Concurrently run completed.");
            info!("Took {}", took(report.elapsed_secs));
            info!("Total index bloat reduced: {}", report.totals.summary());
            info!("{}", report.end_message());
            for line in report.counter_lines() {
                debug!("{}", line);
            }
            if report.dry_run {
                debug!("This was a dry run; no index was changed.");
            }
        }
    }
    Ok(())
}

/// Elapsed time rounded to milliseconds, as `2m 5s 500ms`.
fn took(elapsed_secs: f64) -> String {
    let rounded = Duration::from_millis((elapsed_secs * 1000.0).round() as u64);
    humantime::format_duration(rounded).to_string()
}
