//! Per-partition running counts for the walk report.

use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::range::{Range, RangeSet};
use crate::record::{GroupBy, Record};

/// Aggregate state of one partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Coze {
    pub upi: String,
    #[serde(rename = "total")]
    pub count: u64,
    pub size: u64,
    pub invalid: u64,
    pub uniq: u64,
    #[serde(rename = "dtstart")]
    pub starts: Option<DateTime<Utc>>,
    #[serde(rename = "dtend")]
    pub ends: Option<DateTime<Utc>>,
    /// Sequence of the earliest acquired record.
    pub first: u32,
    /// Sequence of the latest acquired record.
    pub last: u32,
    #[serde(skip)]
    seen: RangeSet,
}

impl Coze {
    pub fn new(upi: impl Into<String>) -> Self {
        Self {
            upi: upi.into(),
            ..Default::default()
        }
    }

    /// Fold one record into the partition. Ties on time go to the newest arrival.
    pub fn update(&mut self, r: &Record) {
        self.count += 1;
        self.size += r.size;
        if self.starts.is_none_or(|t| r.acq_time <= t) {
            self.starts = Some(r.acq_time);
            self.first = r.sequence;
        }
        if self.ends.is_none_or(|t| r.acq_time >= t) {
            self.ends = Some(r.acq_time);
            self.last = r.sequence;
        }
        if r.valid() {
            if !self.seen.insert(r.sequence) {
                self.uniq += 1;
            }
        } else {
            self.invalid += 1;
        }
    }

    /// Fraction of invalid records, 0 when nothing was counted.
    pub fn corrupted(&self) -> f64 {
        if self.count == 0 || self.invalid == 0 {
            return 0.0;
        }
        self.invalid as f64 / self.count as f64
    }

    pub fn duration(&self) -> TimeDelta {
        match (self.starts, self.ends) {
            (Some(s), Some(e)) => e - s,
            _ => TimeDelta::zero(),
        }
    }

    pub fn ranges(&self) -> &RangeSet {
        &self.seen
    }

    pub fn missing(&self) -> u64 {
        self.seen.missing()
    }

    pub fn missing_ranges(&self) -> Vec<Range> {
        self.seen.missing_ranges()
    }

    /// Expected number of sequence values between the lowest and highest seen.
    pub fn span(&self) -> u64 {
        self.seen.total()
    }

    /// Lowest and highest valid sequence seen.
    pub fn range(&self) -> Option<(u32, u32)> {
        self.seen.range()
    }
}

/// Sorted output of an [`Aggregator`] run.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Report {
    partitions: Vec<Coze>,
}

impl Report {
    pub fn partitions(&self) -> &[Coze] {
        &self.partitions
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Coze> {
        self.partitions
            .binary_search_by(|c| c.upi.as_str().cmp(key))
            .ok()
            .map(|ix| &self.partitions[ix])
    }

    /// All partitions summed into one [`Coze`] (time bounds widened).
    pub fn totals(&self) -> Totals {
        let mut t = Totals::default();
        for c in &self.partitions {
            t.count += c.count;
            t.size += c.size;
            t.invalid += c.invalid;
            t.uniq += c.uniq;
            t.missing += c.missing();
            t.starts = match (t.starts, c.starts) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            t.ends = match (t.ends, c.ends) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        t
    }
}

impl IntoIterator for Report {
    type Item = Coze;
    type IntoIter = std::vec::IntoIter<Coze>;

    fn into_iter(self) -> Self::IntoIter {
        self.partitions.into_iter()
    }
}

/// Sum of every partition in a [`Report`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub count: u64,
    pub size: u64,
    pub invalid: u64,
    pub uniq: u64,
    pub missing: u64,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
}

impl Totals {
    pub fn corrupted(&self) -> f64 {
        if self.count == 0 || self.invalid == 0 {
            return 0.0;
        }
        self.invalid as f64 / self.count as f64
    }
}

/// Partition map owned by the single consumer of a record stream.
#[derive(Debug, Default)]
pub struct Aggregator {
    group_by: GroupBy,
    partitions: FxHashMap<String, Coze>,
}

impl Aggregator {
    pub fn new(group_by: GroupBy) -> Self {
        Self {
            group_by,
            partitions: FxHashMap::default(),
        }
    }

    pub fn push(&mut self, r: &Record) {
        let key = r.partition(self.group_by);
        self.partitions
            .entry(key)
            .or_insert_with_key(|k| Coze::new(k.clone()))
            .update(r);
    }

    /// Consume a whole record stream.
    pub fn collect(group_by: GroupBy, records: impl IntoIterator<Item = Record>) -> Report {
        let mut agg = Self::new(group_by);
        for r in records {
            agg.push(&r);
        }
        agg.into_report()
    }

    pub fn into_report(self) -> Report {
        let mut partitions: Vec<Coze> = self.partitions.into_values().collect();
        partitions.sort_by(|a, b| a.upi.cmp(&b.upi));
        Report { partitions }
    }
}
