//! Check subcommand - missing sequence numbers per partition

use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use clap::Args;
use serde::Serialize;

use upifinder_core::{CheckOptions, Gap, GapDetector, GapSummary, SharedProgress};

use super::{OutputFormat, ScanArgs, TIME_FORMAT, fmt_duration, parse_duration};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// Only report gaps lasting at least this long (90s, 15m, 2h, 1d)
    #[arg(short = 'i', long, value_parser = parse_duration)]
    pub min_duration: Option<TimeDelta>,

    /// Feed corrupted (.bad) files into gap detection
    #[arg(short, long)]
    pub keep_invalid: bool,

    /// Report every gap observed, ignoring later refills
    #[arg(short, long)]
    pub all_gaps: bool,
}

impl CheckArgs {
    fn check_options(&self, config: &Config) -> CheckOptions {
        CheckOptions {
            keep_invalid: self.keep_invalid || config.check.keep_invalid,
            all_gaps: self.all_gaps || config.check.all_gaps,
            min_duration: self.min_duration.unwrap_or(config.check.min_duration),
            group_by: self.scan.group_by,
        }
    }
}

pub fn run(args: CheckArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let roots = args.scan.roots(config)?;
    let dirs: Vec<String> = roots.iter().map(|p| p.display().to_string()).collect();
    let options = args.scan.scan_options(config.workers.check, config);
    let check = args.check_options(config);
    log::debug!(
        "check: keep_invalid={} all_gaps={} min_duration={}",
        check.keep_invalid,
        check.all_gaps,
        fmt_duration(check.min_duration)
    );

    let (gaps, result) = super::scan_with("check", roots, options, progress, |records| {
        GapDetector::detect(check, records)
    });

    if !gaps.is_empty() {
        let mut out = io::stdout().lock();
        match args.scan.output_format(config) {
            OutputFormat::Column => {
                writeln!(out, "{}", render_table(&gaps))?;
                writeln!(out, "{}", summary(&GapSummary::of(&gaps)))?;
            }
            OutputFormat::Summary => writeln!(out, "{}", summary(&GapSummary::of(&gaps)))?,
            OutputFormat::Csv => write_csv(&mut out, &gaps)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut out, &CheckDocument::new(dirs, &gaps))?;
                writeln!(out)?;
            }
        }
    }
    super::finish_scan(result)
}

/// JSON report: gaps grouped by partition.
#[derive(Serialize)]
struct CheckDocument<'a> {
    dtstamp: DateTime<Utc>,
    dirs: Vec<String>,
    count: usize,
    gaps: BTreeMap<&'a str, Vec<&'a Gap>>,
    missing: u64,
    /// Summed gap duration in seconds
    duration: i64,
}

impl<'a> CheckDocument<'a> {
    fn new(dirs: Vec<String>, gaps: &'a [Gap]) -> Self {
        let summary = GapSummary::of(gaps);
        let mut grouped: BTreeMap<&str, Vec<&Gap>> = BTreeMap::new();
        for g in gaps {
            grouped.entry(g.upi.as_str()).or_default().push(g);
        }
        Self {
            dtstamp: Utc::now(),
            dirs,
            count: summary.gaps,
            gaps: grouped,
            missing: summary.missing,
            duration: summary.duration.num_seconds(),
        }
    }
}

fn render_table(gaps: &[Gap]) -> comfy_table::Table {
    let mut table = super::table(&[
        "UPI", "Starts", "Ends", "Duration", "Before", "After", "Missing",
    ]);
    for g in gaps {
        table.add_row(vec![
            g.upi.clone(),
            g.starts.format(TIME_FORMAT).to_string(),
            g.ends.format(TIME_FORMAT).to_string(),
            fmt_duration(g.duration()),
            g.before.to_string(),
            g.after.to_string(),
            g.count().to_string(),
        ]);
    }
    table
}

fn summary(s: &GapSummary) -> String {
    format!(
        "{} missing files in {} gaps ({})",
        s.missing,
        s.gaps,
        fmt_duration(s.duration)
    )
}

fn write_csv(out: impl Write, gaps: &[Gap]) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(["upi", "dtstart", "dtend", "duration", "last", "first", "missing"])?;
    for g in gaps {
        w.write_record([
            g.upi.clone(),
            g.starts.to_rfc3339(),
            g.ends.to_rfc3339(),
            g.duration().num_seconds().to_string(),
            g.before.to_string(),
            g.after.to_string(),
            g.count().to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}
