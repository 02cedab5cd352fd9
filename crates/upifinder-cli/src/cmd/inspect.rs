//! Inspect subcommand - sequence ranges and holes per partition

use std::fmt::Write as _;
use std::io::{self, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use indicatif::HumanBytes;
use serde::Serialize;

use upifinder_core::{Aggregator, Coze, Range, RangeSet, SharedProgress};

use super::{OutputFormat, ScanArgs, fmt_time};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub scan: ScanArgs,
}

pub fn run(args: InspectArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let roots = args.scan.roots(config)?;
    let options = args.scan.scan_options(config.workers.walk, config);
    let group_by = args.scan.group_by;

    let (report, result) = super::scan_with("inspect", roots, options, progress, |records| {
        Aggregator::collect(group_by, records)
    });

    let mut out = io::stdout().lock();
    if args.scan.output_format(config) == OutputFormat::Json {
        let details: Vec<Detail> = report.partitions().iter().map(Detail::from).collect();
        serde_json::to_writer_pretty(&mut out, &details)?;
        writeln!(out)?;
    } else {
        let blocks: Vec<String> = report.partitions().iter().map(describe).collect();
        if !blocks.is_empty() {
            writeln!(out, "{}", blocks.join("\n===\n"))?;
        }
    }
    super::finish_scan(result)
}

#[derive(Serialize)]
struct Detail<'a> {
    upi: &'a str,
    size: u64,
    total: u64,
    first: Option<u32>,
    last: Option<u32>,
    dtstart: Option<DateTime<Utc>>,
    dtend: Option<DateTime<Utc>>,
    ranges: &'a RangeSet,
    gaps: Vec<Range>,
}

impl<'a> From<&'a Coze> for Detail<'a> {
    fn from(c: &'a Coze) -> Self {
        let range = c.range();
        Self {
            upi: &c.upi,
            size: c.size,
            total: c.count,
            first: range.map(|r| r.0),
            last: range.map(|r| r.1),
            dtstart: c.starts,
            dtend: c.ends,
            ranges: c.ranges(),
            gaps: c.missing_ranges(),
        }
    }
}

/// Replace anything outside `[A-Za-z0-9_/-]` so odd UPIs stay readable.
fn printable(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '/') {
                c
            } else {
                '*'
            }
        })
        .collect()
}

fn describe(c: &Coze) -> String {
    let mut s = String::new();
    let (first, last) = c.range().map_or(("-".to_string(), "-".to_string()), |(a, b)| {
        (a.to_string(), b.to_string())
    });
    let _ = writeln!(
        s,
        "{} ({} - {})\n",
        printable(&c.upi),
        fmt_time(c.starts),
        fmt_time(c.ends)
    );
    let _ = writeln!(s, "- Size  : {}", HumanBytes(c.size));
    let _ = writeln!(s, "- Total : {}", c.count);
    let _ = writeln!(s, "- First : {first}");
    let _ = write!(s, "- Last  : {last}");

    let ranges = c.ranges().ranges();
    if !ranges.is_empty() {
        let _ = write!(s, "\n- Ranges: {}", ranges.len());
        for (ix, r) in ranges.iter().enumerate() {
            let _ = write!(s, "\n-- {}: {} -> {} (total: {})", ix + 1, r.first, r.last, r.len());
        }
    }
    let gaps = c.missing_ranges();
    if !gaps.is_empty() {
        let _ = write!(s, "\n- Gaps  : {}", gaps.len());
        for (ix, g) in gaps.iter().enumerate() {
            let _ = write!(
                s,
                "\n-- {}: {} -> {} (missing: {})",
                ix + 1,
                g.first,
                g.last,
                g.len() - 2
            );
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use upifinder_core::Record;

    fn coze(seqs: &[u32]) -> Coze {
        let mut c = Coze::new("38/XYZ");
        for (i, seq) in seqs.iter().enumerate() {
            c.update(&Record {
                path: format!("0038_XYZ_1_{seq:07}_20180604_120000_00.dat"),
                source: "38".to_string(),
                upi: "XYZ".to_string(),
                size: 512,
                sequence: *seq,
                acq_time: Utc.with_ymd_and_hms(2018, 6, 4, 12, i as u32, 0).unwrap(),
            });
        }
        c
    }

    #[test]
    fn describe_lists_ranges_and_gaps() {
        let text = describe(&coze(&[1, 2, 3, 7, 8, 10]));
        assert!(text.starts_with("38/XYZ (2018-06-04 12:00:00 - 2018-06-04 12:05:00)"));
        assert!(text.contains("- Total : 6"));
        assert!(text.contains("- First : 1"));
        assert!(text.contains("- Last  : 10"));
        assert!(text.contains("- Ranges: 3"));
        assert!(text.contains("-- 1: 1 -> 3 (total: 3)"));
        assert!(text.contains("- Gaps  : 2"));
        assert!(text.contains("-- 1: 3 -> 7 (missing: 3)"));
        assert!(text.contains("-- 2: 8 -> 10 (missing: 1)"));
    }

    #[test]
    fn describe_without_gaps() {
        let text = describe(&coze(&[4, 5]));
        assert!(text.contains("- Ranges: 1"));
        assert!(!text.contains("Gaps"));
    }

    #[test]
    fn printable_masks_odd_characters() {
        assert_eq!(printable("38/AB CD"), "38/AB*CD");
        assert_eq!(printable("38/X-Y_Z"), "38/X-Y_Z");
    }

    #[test]
    fn detail_json_shape() {
        let c = coze(&[1, 3]);
        let json = serde_json::to_value(Detail::from(&c)).unwrap();
        assert_eq!(json["first"], 1);
        assert_eq!(json["last"], 3);
        assert_eq!(json["ranges"].as_array().unwrap().len(), 2);
        assert_eq!(json["ranges"][1]["first"], 3);
        assert_eq!(json["gaps"][0]["last"], 3);
    }
}
