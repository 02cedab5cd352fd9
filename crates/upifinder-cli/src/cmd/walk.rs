//! Walk subcommand - per partition file counts

use std::io::{self, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use indicatif::HumanBytes;
use serde::Serialize;

use upifinder_core::{Aggregator, Coze, Report, SharedProgress, Totals};

use super::{OutputFormat, ScanArgs, fmt_time};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct WalkArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
}

pub fn run(args: WalkArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let roots = args.scan.roots(config)?;
    let dirs: Vec<String> = roots.iter().map(|p| p.display().to_string()).collect();
    let options = args.scan.scan_options(config.workers.walk, config);
    let group_by = args.scan.group_by;

    let (report, result) = super::scan_with("walk", roots, options, progress, |records| {
        Aggregator::collect(group_by, records)
    });

    if !report.is_empty() {
        let mut out = io::stdout().lock();
        match args.scan.output_format(config) {
            OutputFormat::Column => {
                writeln!(out, "{}", render_table(&report))?;
                writeln!(out, "{}", summary(&report.totals()))?;
            }
            OutputFormat::Summary => writeln!(out, "{}", summary(&report.totals()))?,
            OutputFormat::Csv => write_csv(&mut out, &report)?,
            OutputFormat::Json => {
                let doc = WalkDocument {
                    dtstamp: Utc::now(),
                    dirs,
                    totals: report.totals(),
                    report: &report,
                };
                serde_json::to_writer_pretty(&mut out, &doc)?;
                writeln!(out)?;
            }
        }
    }
    super::finish_scan(result)
}

#[derive(Serialize)]
struct WalkDocument<'a> {
    dtstamp: DateTime<Utc>,
    dirs: Vec<String>,
    totals: Totals,
    report: &'a Report,
}

fn row(c: &Coze) -> Vec<String> {
    let (first, last) = c.range().unwrap_or((c.first, c.last));
    vec![
        c.upi.clone(),
        c.count.to_string(),
        c.uniq.to_string(),
        HumanBytes(c.size).to_string(),
        c.invalid.to_string(),
        format!("{:.2}%", 100.0 * c.corrupted()),
        fmt_time(c.starts),
        fmt_time(c.ends),
        first.to_string(),
        last.to_string(),
        c.missing().to_string(),
    ]
}

fn render_table(report: &Report) -> comfy_table::Table {
    let mut table = super::table(&[
        "UPI",
        "Total",
        "Uniq",
        "Size",
        "Invalid",
        "Ratio",
        "Acq start",
        "Acq end",
        "Seq start",
        "Seq end",
        "Missing",
    ]);
    for c in report.partitions() {
        table.add_row(row(c));
    }
    table
}

fn summary(t: &Totals) -> String {
    format!(
        "{} files found ({}) - uniq: {} - corrupted: {} ({:.2}%) - missing: {}",
        t.count,
        HumanBytes(t.size),
        t.uniq,
        t.invalid,
        100.0 * t.corrupted(),
        t.missing
    )
}

fn write_csv(out: impl Write, report: &Report) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record([
        "upi", "total", "uniq", "size", "invalid", "ratio", "dtstart", "dtend", "first", "last",
        "missing",
    ])?;
    for c in report.partitions() {
        let (first, last) = c.range().unwrap_or((c.first, c.last));
        w.write_record([
            c.upi.clone(),
            c.count.to_string(),
            c.uniq.to_string(),
            c.size.to_string(),
            c.invalid.to_string(),
            format!("{:.4}", 100.0 * c.corrupted()),
            c.starts.map(|t| t.to_rfc3339()).unwrap_or_default(),
            c.ends.map(|t| t.to_rfc3339()).unwrap_or_default(),
            first.to_string(),
            last.to_string(),
            c.missing().to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}
