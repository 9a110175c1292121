//! Command-line front end: stream stdin records into a durable log file.
//!
//! Reads lines from stdin, appends each (newline included) through the
//! writer, and on EOF stops the log, waits for the drain to finish, and
//! shuts the thread down. Dropped records are counted and reported.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use blackbox_writer::{config::WriterConfig, metrics::TraceMetrics, writer::BlackboxWriter};

#[derive(Parser, Debug)]
#[command(name = "blackbox-writer", about = "Durable background log writer")]
struct Cli {
    /// Output log file
    output: PathBuf,

    /// Optional TOML configuration file (BLACKBOX_* env vars override)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WriterConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => WriterConfig::default(),
    };

    let mut writer = BlackboxWriter::with_metrics(config, TraceMetrics)?;
    writer.init();
    writer.start().context("spawning writer thread")?;
    writer
        .start_log(&cli.output)
        .with_context(|| format!("opening log file {}", cli.output.display()))?;

    let stdin = std::io::stdin();
    let mut dropped: u64 = 0;
    for line in stdin.lock().lines() {
        let mut record = line.context("reading stdin")?;
        record.push('\n');
        if !writer.write(record.as_bytes()) {
            dropped += 1;
        }
    }

    if dropped > 0 {
        warn!(dropped, "records lost to buffer overflow");
    }

    writer.stop_log();
    while writer.is_running() {
        std::thread::sleep(Duration::from_millis(10));
    }
    writer.shutdown()?;

    info!(path = %cli.output.display(), "log session complete");
    Ok(())
}
