//! Incremental gap detection over an unordered record stream.
//!
//! Each partition keeps the chronologically newest record, the sorted list of
//! gaps still open, and a [`RangeSet`] of the sequences already integrated so
//! that repeats are dropped before any gap logic runs.
//!
//! A record landing inside an open gap is a refill:
//!
//! - right above the lower bound, or acquired outside the gap's time window
//!   (a late playback), it shrinks the gap from below;
//! - acquired inside the gap's time window, it splits the gap in two.
//!
//! Gaps whose count drops to zero are removed. With `all_gaps` set refills are
//! ignored and every gap ever observed is reported.

use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::range::RangeSet;
use crate::record::{GroupBy, Record};

/// Hole in the sequence counter of one partition.
///
/// `before` and `after` were both seen; everything strictly between is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub upi: String,
    #[serde(rename = "last")]
    pub before: u32,
    #[serde(rename = "first")]
    pub after: u32,
    #[serde(rename = "dtstart")]
    pub starts: DateTime<Utc>,
    #[serde(rename = "dtend")]
    pub ends: DateTime<Utc>,
}

impl Gap {
    /// Number of missing sequence values, bounds excluded.
    pub fn count(&self) -> u32 {
        (self.after - self.before).saturating_sub(1)
    }

    pub fn duration(&self) -> TimeDelta {
        self.ends - self.starts
    }

    fn within(&self, t: DateTime<Utc>) -> bool {
        self.starts <= t && t <= self.ends
    }
}

/// Gap detector policies.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Feed `.bad` records into the computation too.
    pub keep_invalid: bool,
    /// Report every gap ever observed instead of what is still outstanding.
    pub all_gaps: bool,
    /// Drop gaps spanning less than this; zero keeps everything.
    pub min_duration: TimeDelta,
    pub group_by: GroupBy,
}

#[derive(Debug, Default)]
struct Track {
    last: Option<Record>,
    /// Sorted by `after`.
    gaps: Vec<Gap>,
    seen: RangeSet,
}

impl Track {
    /// Keep `r` as the newest record unless a later one is stored already.
    fn remember(&mut self, r: Record) {
        if self.last.as_ref().is_none_or(|p| p.acq_time <= r.acq_time) {
            self.last = Some(r);
        }
    }

    fn open(&mut self, gap: Gap) {
        let ix = self.gaps.partition_point(|g| g.after <= gap.after);
        self.gaps.insert(ix, gap);
    }

    /// Narrow or split the open gap containing `r`. Returns whether one did.
    fn refill(&mut self, r: &Record) -> bool {
        let seq = r.sequence;
        let ix = self.gaps.partition_point(|g| g.after < seq);
        let Some(g) = self.gaps.get_mut(ix) else {
            return false;
        };
        if seq <= g.before || seq >= g.after {
            return false;
        }
        if seq == g.before + 1 || !g.within(r.acq_time) {
            g.before = seq;
            g.starts = r.acq_time;
            if g.count() == 0 {
                self.gaps.remove(ix);
            }
            return true;
        }
        let upper = Gap {
            upi: g.upi.clone(),
            before: seq,
            after: g.after,
            starts: r.acq_time,
            ends: g.ends,
        };
        g.after = seq;
        g.ends = r.acq_time;
        if upper.count() > 0 {
            self.gaps.insert(ix + 1, upper);
        }
        true
    }
}

/// Per-partition gap state owned by the single consumer of a record stream.
#[derive(Debug, Default)]
pub struct GapDetector {
    options: CheckOptions,
    tracks: FxHashMap<String, Track>,
}

impl GapDetector {
    pub fn new(options: CheckOptions) -> Self {
        Self {
            options,
            tracks: FxHashMap::default(),
        }
    }

    pub fn push(&mut self, r: Record) {
        if !r.valid() && !self.options.keep_invalid {
            return;
        }
        let key = r.partition(self.options.group_by);
        let track = self.tracks.entry(key.clone()).or_default();

        if track.seen.insert(r.sequence) {
            track.remember(r);
            return;
        }
        let handled = !self.options.all_gaps && track.refill(&r);
        if !handled {
            if let Some(prev) = track.last.as_ref().filter(|p| r.sequence > p.sequence) {
                // time bounds follow acquisition order even when sequences don't
                let gap = Gap {
                    upi: key,
                    before: prev.sequence,
                    after: r.sequence,
                    starts: prev.acq_time.min(r.acq_time),
                    ends: prev.acq_time.max(r.acq_time),
                };
                let min = self.options.min_duration;
                if gap.count() > 0 && (min.is_zero() || gap.duration() >= min) {
                    track.open(gap);
                }
            }
        }
        track.remember(r);
    }

    /// Gaps of every partition, sorted by partition then sequence.
    pub fn finish(self) -> Vec<Gap> {
        let mut gaps: Vec<Gap> = self
            .tracks
            .into_values()
            .flat_map(|t| t.gaps)
            .collect();
        gaps.sort_by(|a, b| {
            a.upi
                .cmp(&b.upi)
                .then(a.before.cmp(&b.before))
                .then(a.after.cmp(&b.after))
        });
        gaps
    }

    /// Consume a whole record stream.
    pub fn detect(options: CheckOptions, records: impl IntoIterator<Item = Record>) -> Vec<Gap> {
        let mut det = Self::new(options);
        for r in records {
            det.push(r);
        }
        det.finish()
    }
}

/// Totals over a list of gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GapSummary {
    pub gaps: usize,
    pub missing: u64,
    #[serde(skip)]
    pub duration: TimeDelta,
}

impl GapSummary {
    pub fn of(gaps: &[Gap]) -> Self {
        gaps.iter().fold(
            Self {
                gaps: gaps.len(),
                ..Default::default()
            },
            |mut s, g| {
                s.missing += u64::from(g.count());
                s.duration += g.duration();
                s
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 6, 4, 12, minute, 0).unwrap()
    }

    fn rec_in(source: &str, upi: &str, seq: u32, minute: u32, ext: &str) -> Record {
        Record {
            path: format!("00{source}_{upi}_1_{seq}_20180604_12{minute:02}00_00.{ext}"),
            source: source.to_string(),
            upi: upi.to_string(),
            size: 0,
            sequence: seq,
            acq_time: at(minute),
        }
    }

    fn rec(seq: u32, minute: u32) -> Record {
        rec_in("38", "XYZ", seq, minute, "dat")
    }

    fn bounds(gaps: &[Gap]) -> Vec<(u32, u32)> {
        gaps.iter().map(|g| (g.before, g.after)).collect()
    }

    #[test]
    fn single_gap_between_neighbours() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(10, 0), rec(11, 1), rec(13, 2)],
        );
        assert_eq!(
            gaps,
            vec![Gap {
                upi: "38/XYZ".to_string(),
                before: 11,
                after: 13,
                starts: at(1),
                ends: at(2),
            }]
        );
        assert_eq!(gaps[0].count(), 1);
    }

    #[test]
    fn contiguous_stream_has_no_gap() {
        let gaps =
            GapDetector::detect(CheckOptions::default(), (1..=50).map(|s| rec(s, s % 60)));
        assert!(gaps.is_empty());
    }

    #[test]
    fn late_refill_shrinks_gap() {
        // 3 acquired after 5: outside the gap window
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(1, 1), rec(5, 5), rec(3, 9)],
        );
        assert_eq!(bounds(&gaps), vec![(3, 5)]);
        assert_eq!(gaps[0].count(), 1);
        assert_eq!(gaps[0].starts, at(9));
    }

    #[test]
    fn all_gaps_keeps_first_observed_gap() {
        let options = CheckOptions {
            all_gaps: true,
            ..Default::default()
        };
        let gaps = GapDetector::detect(options, vec![rec(1, 1), rec(5, 5), rec(3, 9)]);
        assert_eq!(bounds(&gaps), vec![(1, 5)]);
        assert_eq!(gaps[0].count(), 3);
    }

    #[test]
    fn in_window_refill_splits_gap() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(1, 1), rec(10, 10), rec(4, 4)],
        );
        assert_eq!(bounds(&gaps), vec![(1, 4), (4, 10)]);
        assert_eq!(gaps[0].ends, at(4));
        assert_eq!(gaps[1].starts, at(4));
        assert_eq!(gaps[1].ends, at(10));
    }

    #[test]
    fn split_right_below_upper_bound_leaves_one_gap() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(1, 1), rec(10, 10), rec(9, 9)],
        );
        assert_eq!(bounds(&gaps), vec![(1, 9)]);
    }

    #[test]
    fn adjacent_refills_close_gap() {
        let det_input = vec![rec(1, 1), rec(5, 5), rec(2, 6)];
        let gaps = GapDetector::detect(CheckOptions::default(), det_input);
        assert_eq!(bounds(&gaps), vec![(2, 5)]);

        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(1, 1), rec(5, 5), rec(2, 6), rec(3, 7), rec(4, 8)],
        );
        assert!(gaps.is_empty());
    }

    #[test]
    fn duplicates_are_ignored() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(1, 1), rec(5, 5), rec(5, 5), rec(5, 6)],
        );
        assert_eq!(bounds(&gaps), vec![(1, 5)]);
    }

    #[test]
    fn duplicate_newer_record_moves_last_seen() {
        // second 5 is newer, so 8 opens a gap from 5 not from 7
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(5, 1), rec(7, 2), rec(5, 3), rec(8, 4)],
        );
        assert_eq!(bounds(&gaps), vec![(5, 7), (5, 8)]);
    }

    #[test]
    fn inverted_times_keep_positive_duration() {
        let gaps = GapDetector::detect(CheckOptions::default(), vec![rec(1, 5), rec(3, 2)]);
        assert_eq!(bounds(&gaps), vec![(1, 3)]);
        assert_eq!(gaps[0].starts, at(2));
        assert_eq!(gaps[0].ends, at(5));
        assert_eq!(gaps[0].duration(), TimeDelta::minutes(3));
    }

    #[test]
    fn lower_sequence_does_not_open_gap() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(10, 1), rec(3, 2)],
        );
        assert!(gaps.is_empty());
    }

    #[test]
    fn invalid_records_skipped_unless_kept() {
        let input = || {
            vec![
                rec(1, 1),
                rec_in("38", "XYZ", 2, 2, "bad"),
                rec(3, 3),
            ]
        };
        let gaps = GapDetector::detect(CheckOptions::default(), input());
        assert_eq!(bounds(&gaps), vec![(1, 3)]);

        let options = CheckOptions {
            keep_invalid: true,
            ..Default::default()
        };
        assert!(GapDetector::detect(options, input()).is_empty());
    }

    #[test]
    fn min_duration_filters_short_gaps() {
        let options = CheckOptions {
            min_duration: TimeDelta::minutes(5),
            ..Default::default()
        };
        let gaps = GapDetector::detect(options, vec![rec(1, 0), rec(3, 1), rec(6, 10)]);
        assert_eq!(bounds(&gaps), vec![(3, 6)]);
    }

    #[test]
    fn partitions_follow_group_by() {
        let input = || {
            vec![
                rec_in("38", "XYZ", 1, 1, "dat"),
                rec_in("37", "XYZ", 3, 2, "dat"),
                rec_in("38", "XYZ", 2, 3, "dat"),
                rec_in("37", "XYZ", 4, 4, "dat"),
            ]
        };
        let gaps = GapDetector::detect(CheckOptions::default(), input());
        assert!(gaps.is_empty());

        let options = CheckOptions {
            group_by: GroupBy::Source,
            ..Default::default()
        };
        let input = vec![
            rec_in("38", "AAA", 1, 1, "dat"),
            rec_in("38", "BBB", 4, 2, "dat"),
        ];
        let gaps = GapDetector::detect(options, input);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].upi, "38");
        assert_eq!(gaps[0].count(), 2);
    }

    #[test]
    fn output_sorted_by_partition() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![
                rec_in("38", "ZZZ", 1, 1, "dat"),
                rec_in("38", "ZZZ", 5, 2, "dat"),
                rec_in("38", "AAA", 1, 1, "dat"),
                rec_in("38", "AAA", 3, 2, "dat"),
            ],
        );
        let keys: Vec<&str> = gaps.iter().map(|g| g.upi.as_str()).collect();
        assert_eq!(keys, vec!["38/AAA", "38/ZZZ"]);
    }

    #[test]
    fn summary_totals() {
        let gaps = GapDetector::detect(
            CheckOptions::default(),
            vec![rec(1, 0), rec(3, 1), rec(10, 5)],
        );
        let s = GapSummary::of(&gaps);
        assert_eq!(s.gaps, 2);
        assert_eq!(s.missing, 1 + 6);
        assert_eq!(s.duration, TimeDelta::minutes(5));
    }

    #[test]
    fn serializes_with_report_field_names() {
        let gaps = GapDetector::detect(CheckOptions::default(), vec![rec(1, 0), rec(3, 1)]);
        let json = serde_json::to_value(&gaps[0]).unwrap();
        assert_eq!(json["upi"], "38/XYZ");
        assert_eq!(json["last"], 1);
        assert_eq!(json["first"], 3);
    }
}
