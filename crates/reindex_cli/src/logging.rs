//! Log output setup.
//!
//! Progress goes through `tracing`: `info` is always shown, `--verbose`
//! adds `debug` and `--debug` adds `trace` (every statement). `RUST_LOG`
//! overrides all of them.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

pub struct LogOptions<'a> {
    pub verbose: bool,
    pub debug: bool,
    pub print_timestamps: bool,
    pub log_file: Option<&'a Path>,
}

impl LogOptions<'_> {
    fn default_level(&self) -> &'static str {
        if self.debug {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    fn directive(&self) -> String {
        // Dependencies stay at warn; only this tool's own crates get chatty.
        let level = self.default_level();
        format!("warn,reindex_core={level},reindex_concurrently={level}")
    }
}

/// Installs the global subscriber.
///
/// Fails if the log file cannot be opened.
pub fn init(opts: &LogOptions<'_>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(opts.directive()));

    let (writer, ansi) = match opts.log_file {
        Some(path) => {
            let file = open_log(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false);

    if opts.print_timestamps {
        builder.init();
    } else {
        builder.without_time().init();
    }
    Ok(())
}

fn open_log(path: &Path) -> Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    writeln!(
        file,
        "--- reindex concurrently started {} ---",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
    .with_context(|| format!("failed to write log file {}", path.display()))?;
    Ok(file)
}
