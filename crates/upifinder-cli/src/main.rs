//! upifinder - completeness reports for acquisition archives
//!
//! Counts the files of every UPI found in the archive trees and reports
//! holes in their sequence counters.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "upifinder")]
#[command(about = "Count files and find missing sequences in acquisition archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./upifinder.toml or ~/.config/upifinder/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Count total, unique and corrupted files per UPI
    Walk(cmd::walk::WalkArgs),
    /// Report missing files per UPI
    Check(cmd::check::CheckArgs),
    /// Show seen ranges and holes per UPI
    Inspect(cmd::inspect::InspectArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress = Arc::new(upifinder_core::ProgressContext::new());

    // TTY: warn unless --debug, the spinner shows activity
    // non-TTY: info unless --debug
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    upifinder_core::init_logging(upifinder_core::Verbosity::from_flags(quiet, cli.debug), multi)
        .context("Failed to init logger")?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Walk(args) => cmd::walk::run(args, &config, &progress),
        Command::Check(args) => cmd::check::run(args, &config, &progress),
        Command::Inspect(args) => cmd::inspect::run(args, &config, &progress),
        Command::Config => {
            let mut table = cmd::table(&["Setting", "Value"]);
            let archives = if config.archives.is_empty() {
                "not set".to_string()
            } else {
                config.archives.join("\n")
            };
            table.add_row(vec!["Archives".to_string(), archives]);
            table.add_row(vec![
                "Workers".to_string(),
                format!("walk: {}, check: {}", config.workers.walk, config.workers.check),
            ]);
            table.add_row(vec![
                "Channel capacity".to_string(),
                config.scan.channel_capacity.to_string(),
            ]);
            table.add_row(vec![
                "Min gap duration".to_string(),
                cmd::fmt_duration(config.check.min_duration),
            ]);
            table.add_row(vec![
                "Keep invalid".to_string(),
                config.check.keep_invalid.to_string(),
            ]);
            table.add_row(vec!["All gaps".to_string(), config.check.all_gaps.to_string()]);
            table.add_row(vec!["Output format".to_string(), config.output.format.to_string()]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
