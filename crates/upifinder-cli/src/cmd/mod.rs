//! Subcommands and the scan flags they share

pub mod check;
pub mod inspect;
pub mod walk;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Deserialize;

use upifinder_core::{
    GroupBy, Record, ScanFailure, ScanOptions, ScanStats, Scanner, SharedProgress, Window,
    expand_roots, fmt_num,
};

use crate::config::Config;

/// Timestamp layout used in tables and text output.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table followed by a summary line
    #[default]
    Column,
    /// One row per partition or gap
    Csv,
    /// Single JSON document
    Json,
    /// Summary line only
    Summary,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Column => "column",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Summary => "summary",
        };
        f.write_str(name)
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Archive roots (default: `archives` from the config file)
    pub paths: Vec<PathBuf>,

    /// First day to scan (YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,

    /// Day after the last one to scan (YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,

    /// Period in days, combined with --start, --end or today
    #[arg(short, long, default_value_t = 0)]
    pub days: u32,

    /// Only consider files of this UPI
    #[arg(short, long)]
    pub upi: Option<String>,

    /// Number of roots walked in parallel
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Partition records by "upi" (source/upi) or "source"
    #[arg(short, long, default_value = "upi")]
    pub group_by: GroupBy,

    /// Output format (default: `output.format` from the config file)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl ScanArgs {
    pub fn window(&self) -> Window {
        Window {
            start: self.start,
            end: self.end,
            days: self.days,
        }
    }

    /// Paths to hand to the scanner: CLI paths or config archives, expanded
    /// into day directories when a window is set.
    pub fn roots(&self, config: &Config) -> Result<Vec<PathBuf>> {
        let base = if self.paths.is_empty() {
            config.archive_roots()?
        } else {
            self.paths.clone()
        };
        if base.is_empty() {
            anyhow::bail!("no archive given (pass paths or set `archives` in the config file)");
        }
        let today = Local::now().date_naive();
        let roots = expand_roots(&base, &self.window(), today).context("invalid date window")?;
        Ok(roots)
    }

    pub fn scan_options(&self, default_workers: usize, config: &Config) -> ScanOptions {
        ScanOptions {
            workers: self.workers.unwrap_or(default_workers).max(1),
            upi: self.upi.clone(),
            channel_capacity: config.scan.channel_capacity,
        }
    }

    pub fn output_format(&self, config: &Config) -> OutputFormat {
        self.format.unwrap_or(config.output.format)
    }
}

/// Run a scan and feed its records to `consume`, counting them on the stage spinner.
///
/// The scan outcome is returned next to the consumer's result so partial
/// reports can still be printed.
pub fn scan_with<T>(
    stage: &str,
    roots: Vec<PathBuf>,
    options: ScanOptions,
    progress: &SharedProgress,
    consume: impl FnOnce(&mut dyn Iterator<Item = Record>) -> T,
) -> (T, Result<ScanStats, ScanFailure>) {
    let started = Instant::now();
    let mut line = progress.stage_line(stage);
    line.set_message(format!("{} paths", fmt_num(roots.len() as u64)));

    let mut stream = Scanner::new(options).scan(roots);
    let output = {
        let mut counted = stream.by_ref().inspect(|_| line.tick());
        consume(&mut counted)
    };
    let consumed = line.finish();
    let result = stream.finish();

    if let Ok(stats) = &result {
        log::info!(
            "{stage}: {} records from {} roots ({} files, {} archives, {} lists, {} rejected) in {:.1}s",
            fmt_num(consumed),
            fmt_num(stats.roots as u64),
            fmt_num(stats.files as u64),
            stats.archives,
            stats.lists,
            fmt_num(stats.rejected as u64),
            started.elapsed().as_secs_f64()
        );
    }
    (output, result)
}

/// Turn root-local failures into the command's exit status, after output.
pub fn finish_scan(result: Result<ScanStats, ScanFailure>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(failure) => {
            let n = failure.errors().len();
            for e in failure.errors() {
                log::error!("{e}");
            }
            Err(failure).with_context(|| format!("scan incomplete: {n} root(s) failed"))
        }
    }
}

/// Table with the shared look: rounded UTF-8 borders, cyan header.
pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

pub fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Compact duration: `1d2h3m4s`, `0s` when empty.
pub fn fmt_duration(d: TimeDelta) -> String {
    let secs = d.num_seconds();
    if secs == 0 {
        return "0s".to_string();
    }
    let sign = if secs < 0 { "-" } else { "" };
    let mut rest = secs.unsigned_abs();
    let mut out = String::from(sign);
    for (unit, len) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        let n = rest / len;
        rest %= len;
        if n > 0 {
            out.push_str(&format!("{n}{unit}"));
        }
    }
    out
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date format: {e}"))
}

/// `90s`, `15m`, `2h`, `1d`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<TimeDelta, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: i64 = digits
        .parse()
        .map_err(|_| format!("Invalid duration: {s:?}"))?;
    let delta = match unit {
        "" | "s" => TimeDelta::try_seconds(n),
        "m" => TimeDelta::try_minutes(n),
        "h" => TimeDelta::try_hours(n),
        "d" => TimeDelta::try_days(n),
        _ => return Err(format!("Invalid duration unit {unit:?} (expected s, m, h or d)")),
    };
    delta.ok_or_else(|| format!("Duration out of range: {s:?}"))
}
