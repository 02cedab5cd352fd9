//! Disjoint sequence-number ranges observed for one partition.
//!
//! Ranges are closed intervals kept strictly sorted and never touching:
//! inserting a value adjacent to a range extends it, and a range that grows
//! into its neighbour is merged with it.

use std::fmt;

use serde::Serialize;

/// Closed interval `[first, last]` of sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub first: u32,
    pub last: u32,
}

impl Range {
    pub const fn single(v: u32) -> Self {
        Self { first: v, last: v }
    }

    /// Number of values covered, bounds included.
    pub fn len(&self) -> u64 {
        u64::from(self.last - self.first) + 1
    }

    pub fn contains(&self, v: u32) -> bool {
        self.first <= v && v <= self.last
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.first, self.last)
    }
}

/// Sorted, non-adjacent set of [`Range`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `v` as seen. Returns `true` if it was already present.
    pub fn insert(&mut self, v: u32) -> bool {
        let ix = self.ranges.partition_point(|r| r.last < v);
        if self.ranges.get(ix).is_some_and(|r| r.contains(v)) {
            return true;
        }
        // ranges[ix - 1].last < v < ranges[ix].first
        let joins_prev = ix > 0 && self.ranges[ix - 1].last + 1 == v;
        let joins_next = ix < self.ranges.len() && v + 1 == self.ranges[ix].first;
        match (joins_prev, joins_next) {
            (true, true) => {
                self.ranges[ix - 1].last = self.ranges[ix].last;
                self.ranges.remove(ix);
            }
            (true, false) => self.ranges[ix - 1].last = v,
            (false, true) => self.ranges[ix].first = v,
            (false, false) => self.ranges.insert(ix, Range::single(v)),
        }
        false
    }

    pub fn contains(&self, v: u32) -> bool {
        let ix = self.ranges.partition_point(|r| r.last < v);
        self.ranges.get(ix).is_some_and(|r| r.contains(v))
    }

    /// Expected span from the lowest to the highest value seen, holes included.
    pub fn total(&self) -> u64 {
        match self.range() {
            Some((first, last)) => u64::from(last - first) + 1,
            None => 0,
        }
    }

    /// Count of values missing between the lowest and highest value seen.
    pub fn missing(&self) -> u64 {
        self.ranges
            .windows(2)
            .map(|w| u64::from(w[1].first - w[0].last - 1))
            .sum()
    }

    /// Holes between consecutive ranges as `[prev.last, next.first]`.
    ///
    /// Both bounds were seen; only the interior is missing.
    pub fn missing_ranges(&self) -> Vec<Range> {
        self.ranges
            .windows(2)
            .map(|w| Range {
                first: w[0].last,
                last: w[1].first,
            })
            .collect()
    }

    /// Lowest and highest value seen.
    pub fn range(&self) -> Option<(u32, u32)> {
        let first = self.ranges.first()?;
        let last = self.ranges.last()?;
        Some((first.first, last.last))
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Number of disjoint ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[u32]) -> RangeSet {
        let mut s = RangeSet::new();
        for &v in values {
            s.insert(v);
        }
        s
    }

    fn pairs(s: &RangeSet) -> Vec<(u32, u32)> {
        s.ranges().iter().map(|r| (r.first, r.last)).collect()
    }

    #[test]
    fn empty_set() {
        let s = RangeSet::new();
        assert!(s.is_empty());
        assert_eq!(s.total(), 0);
        assert_eq!(s.missing(), 0);
        assert!(s.missing_ranges().is_empty());
        assert_eq!(s.range(), None);
    }

    #[test]
    fn insert_reports_presence() {
        let mut s = RangeSet::new();
        assert!(!s.insert(5));
        assert!(s.insert(5));
        assert!(!s.insert(6));
        assert!(s.insert(5));
        assert!(s.contains(6));
        assert!(!s.contains(7));
    }

    #[test]
    fn gap_count() {
        let s = set(&[1, 2, 3, 7, 8, 10]);
        assert_eq!(pairs(&s), vec![(1, 3), (7, 8), (10, 10)]);
        assert_eq!(s.missing(), 4);
        assert_eq!(
            s.missing_ranges(),
            vec![
                Range { first: 3, last: 7 },
                Range { first: 8, last: 10 }
            ]
        );
        assert_eq!(s.total(), 10);
        assert_eq!(s.range(), Some((1, 10)));
    }

    #[test]
    fn extend_below_and_above() {
        let s = set(&[10, 9, 11]);
        assert_eq!(pairs(&s), vec![(9, 11)]);
    }

    #[test]
    fn merge_neighbours() {
        let s = set(&[1, 3]);
        assert_eq!(pairs(&s), vec![(1, 1), (3, 3)]);
        let s = set(&[1, 3, 2]);
        assert_eq!(pairs(&s), vec![(1, 3)]);
        let s = set(&[1, 2, 6, 7, 4, 3, 5]);
        assert_eq!(pairs(&s), vec![(1, 7)]);
    }

    #[test]
    fn insert_before_first_and_between() {
        let s = set(&[10, 20, 1, 15]);
        assert_eq!(pairs(&s), vec![(1, 1), (10, 10), (15, 15), (20, 20)]);
        assert_eq!(s.missing(), 16);
    }

    #[test]
    fn bounds_of_u32() {
        let s = set(&[0, u32::MAX, u32::MAX - 1, 1]);
        assert_eq!(pairs(&s), vec![(0, 1), (u32::MAX - 1, u32::MAX)]);
        assert_eq!(s.total(), u64::from(u32::MAX) + 1);
        assert_eq!(s.missing(), u64::from(u32::MAX) - 3);
    }

    #[test]
    fn range_len_and_display() {
        let r = Range { first: 3, last: 7 };
        assert_eq!(r.len(), 5);
        assert_eq!(r.to_string(), "[3, 7]");
        assert_eq!(Range::single(4).len(), 1);
    }
}
