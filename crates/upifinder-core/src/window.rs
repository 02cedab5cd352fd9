//! Date-window expansion of archive roots into `YYYY/DDD` day directories.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Days, NaiveDate};

/// Days scanned per root when sizing the expanded path list.
pub const DEFAULT_PERIOD: u32 = 7;

/// Requested scan window. All fields optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Period in days; 0 means unset.
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Start, end and a period were all given.
    Conflicting,
    /// End before start.
    Inverted { start: NaiveDate, end: NaiveDate },
    /// Period moves the window outside the calendar.
    OutOfRange,
}

impl fmt::Display for WindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflicting => {
                f.write_str("period can't be set if start and end dates are provided")
            }
            Self::Inverted { start, end } => write!(f, "end {end} is before start {start}"),
            Self::OutOfRange => f.write_str("period out of calendar range"),
        }
    }
}

impl std::error::Error for WindowError {}

impl Window {
    /// Resolve to a half-open `[start, end)` day range, or `None` to scan roots as-is.
    ///
    /// - start + end: as given
    /// - start + days: `[start, start + days)`
    /// - end + days: `[end - days, end)`
    /// - days only: `[today - days, today)`
    pub fn bounds(&self, today: NaiveDate) -> Result<Option<(NaiveDate, NaiveDate)>, WindowError> {
        let days = Days::new(u64::from(self.days));
        let (start, end) = match (self.start, self.end, self.days) {
            (Some(_), Some(_), d) if d > 0 => return Err(WindowError::Conflicting),
            (Some(s), Some(e), _) => (s, e),
            (Some(s), None, d) if d > 0 => (s, s.checked_add_days(days).ok_or(WindowError::OutOfRange)?),
            (None, Some(e), d) if d > 0 => (e.checked_sub_days(days).ok_or(WindowError::OutOfRange)?, e),
            (None, None, d) if d > 0 => {
                (today.checked_sub_days(days).ok_or(WindowError::OutOfRange)?, today)
            }
            _ => return Ok(None),
        };
        if end < start {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Some((start, end)))
    }
}

/// `root/YYYY/DDD` for a given day (day of year, zero padded).
pub fn day_dir(root: &Path, day: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", day.year()))
        .join(format!("{:03}", day.ordinal()))
}

/// Expand every root into one path per day of the window, day-major.
///
/// Without a window the roots are returned unchanged and scanned recursively.
pub fn expand_roots(
    roots: &[PathBuf],
    window: &Window,
    today: NaiveDate,
) -> Result<Vec<PathBuf>, WindowError> {
    let Some((start, end)) = window.bounds(today)? else {
        return Ok(roots.to_vec());
    };
    let mut paths = Vec::with_capacity(roots.len() * DEFAULT_PERIOD as usize);
    for day in start.iter_days().take_while(|d| *d < end) {
        paths.extend(roots.iter().map(|r| day_dir(r, day)));
    }
    log::debug!(
        "window {start} .. {end}: {} paths from {} roots",
        paths.len(),
        roots.len()
    );
    Ok(paths)
}
