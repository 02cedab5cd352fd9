//! Filename decoding into typed archive records.
//!
//! Archive file names carry everything the audit needs:
//!
//! ```text
//! SOURCE_UPI[_UPI...]_CLASS_SEQUENCE_YYYYMMDD_HHMMSS_OFFSET.EXT
//! 0038_XYZ_1_0000010_20180604_120000_00.dat
//! ```
//!
//! File contents are never read.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// Origin codes accepted for image-class products (class `1` or `2`). Sorted.
pub const IMAGE_ORIGINS: &[u8] = &[0x33, 0x34, 0x37, 0x38, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47];

/// Origin codes accepted for science-class products (class `3`). Sorted.
pub const SCIENCE_ORIGINS: &[u8] = &[0x35, 0x36, 0x39, 0x40, 0x41, 0x51];

/// Date and time fields joined with `_`: fifteen characters.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source, class, sequence, date, time and offset fields; the UPI may be empty.
const MIN_FIELDS: usize = 6;

/// A decoded archive entry. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Filesystem path, or member name inside a container.
    pub path: String,
    /// Source identifier with leading zeros stripped (`"38"`).
    pub source: String,
    pub upi: String,
    /// Declared byte length (0 when unknown, e.g. list files).
    pub size: u64,
    pub sequence: u32,
    #[serde(rename = "dtstamp")]
    pub acq_time: DateTime<Utc>,
}

impl Record {
    /// Files marked `.bad` are corrupted but still counted.
    pub fn valid(&self) -> bool {
        extension(&self.path) != Some("bad")
    }

    /// Base name without the timestamp and offset fields.
    pub fn name(&self) -> String {
        let fields: Vec<&str> = base_name(&self.path).split('_').collect();
        let keep = fields.len().saturating_sub(3);
        fields[..keep].join("_")
    }

    /// Partition key of this record under the given grouping.
    pub fn partition(&self, group_by: GroupBy) -> String {
        match group_by {
            GroupBy::Upi => self.to_string(),
            GroupBy::Source => self.source.clone(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.upi)
    }
}

/// Partitioning policy shared by the aggregator and the gap detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GroupBy {
    /// `source/upi`
    #[default]
    Upi,
    /// `source` alone
    Source,
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upi => f.write_str("upi"),
            Self::Source => f.write_str("source"),
        }
    }
}

/// Unknown group-by selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGroupByError(pub String);

impl fmt::Display for ParseGroupByError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid group-by {:?} (expected \"upi\" or \"source\")", self.0)
    }
}

impl std::error::Error for ParseGroupByError {}

impl FromStr for GroupBy {
    type Err = ParseGroupByError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upi" => Ok(Self::Upi),
            "source" => Ok(Self::Source),
            _ => Err(ParseGroupByError(s.to_string())),
        }
    }
}

/// A name that passed the rejection checks but carries a malformed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Source { name: String, field: String },
    Sequence { name: String, field: String },
    Timestamp { name: String, field: String },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source { name, field } => write!(f, "{name}: invalid source {field:?}"),
            Self::Sequence { name, field } => write!(f, "{name}: invalid sequence {field:?}"),
            Self::Timestamp { name, field } => write!(f, "{name}: invalid timestamp {field:?}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a path into a [`Record`].
///
/// Returns `Ok(None)` when the name is rejected: characters outside
/// `[A-Za-z0-9._-]`, an `.xml` extension, too few fields, or an origin code
/// outside the accepted sets. Malformed source, sequence or timestamp fields
/// are errors.
///
/// When `upi` is given the decoded UPI is forced to it.
pub fn decode(path: &str, upi: Option<&str>, size: u64) -> Result<Option<Record>, DecodeError> {
    let name = base_name(path);
    if !is_clean_name(name) || extension(name) == Some("xml") {
        return Ok(None);
    }
    let fields: Vec<&str> = name.split('_').collect();
    let n = fields.len();
    if n < MIN_FIELDS {
        return Ok(None);
    }

    let source = fields[0].trim_start_matches('0');
    let code = i8::from_str_radix(source, 16).map_err(|_| DecodeError::Source {
        name: name.to_string(),
        field: fields[0].to_string(),
    })?;
    let origins = match fields[n - 5] {
        "1" | "2" => IMAGE_ORIGINS,
        "3" => SCIENCE_ORIGINS,
        _ => return Ok(None),
    };
    if !accept_origin(code, origins) {
        return Ok(None);
    }

    let upi = match upi {
        Some(u) => u.to_string(),
        None => fields[1..n - 5].join("_"),
    };

    let sequence = fields[n - 4]
        .parse::<u32>()
        .map_err(|_| DecodeError::Sequence {
            name: name.to_string(),
            field: fields[n - 4].to_string(),
        })?;

    let (date, time) = (fields[n - 3], fields[n - 2]);
    let stamp = format!("{date}_{time}");
    let parsed = if date.len() == 8 && time.len() == 6 {
        NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).ok()
    } else {
        None
    };
    let acq_time = parsed
        .ok_or_else(|| DecodeError::Timestamp {
            name: name.to_string(),
            field: stamp.clone(),
        })?
        .and_utc();

    Ok(Some(Record {
        path: path.to_string(),
        source: source.to_string(),
        upi,
        size,
        sequence,
        acq_time,
    }))
}

fn accept_origin(code: i8, origins: &[u8]) -> bool {
    u8::try_from(code).is_ok_and(|c| origins.binary_search(&c).is_ok())
}

/// Only `[A-Za-z0-9._-]` is allowed in archive names.
pub fn is_clean_name(name: &str) -> bool {
    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Last path component, or the input itself when it has none.
pub fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(path)
}

/// Extension of the last path component, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(OsStr::to_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const NAME: &str = "0038_XYZ_1_0000010_20180604_120000_00.dat";

    #[test]
    fn decode_full_name() {
        let r = decode(&format!("/data/38/2018/155/{NAME}"), None, 42)
            .unwrap()
            .unwrap();
        assert_eq!(r.source, "38");
        assert_eq!(r.upi, "XYZ");
        assert_eq!(r.size, 42);
        assert_eq!(r.sequence, 10);
        assert_eq!(
            r.acq_time,
            Utc.with_ymd_and_hms(2018, 6, 4, 12, 0, 0).unwrap()
        );
        assert!(r.valid());
        assert_eq!(r.to_string(), "38/XYZ");
        assert_eq!(r.name(), "0038_XYZ_1_0000010");
    }

    #[test]
    fn decode_multi_part_upi() {
        let r = decode("0038_ABC_DEF_2_0000001_20180604_120000_00.dat", None, 0)
            .unwrap()
            .unwrap();
        assert_eq!(r.upi, "ABC_DEF");
    }

    #[test]
    fn decode_science_class() {
        let r = decode("0051_SCI_3_7_20190101_000000_00.dat", None, 0).unwrap();
        assert_eq!(r.unwrap().source, "51");
        // 0x38 is image-class only
        assert_eq!(decode("0038_SCI_3_7_20190101_000000_00.dat", None, 0), Ok(None));
    }

    #[test]
    fn upi_filter_forces_upi() {
        let r = decode(NAME, Some("FORCED"), 0).unwrap().unwrap();
        assert_eq!(r.upi, "FORCED");
    }

    #[test]
    fn reject_bad_characters() {
        assert_eq!(decode("0038_X YZ_1_10_20180604_120000_00.dat", None, 0), Ok(None));
        assert_eq!(decode("0038_XYZ~_1_10_20180604_120000_00.dat", None, 0), Ok(None));
    }

    #[test]
    fn reject_xml() {
        assert_eq!(decode("0038_XYZ_1_10_20180604_120000_00.xml", None, 0), Ok(None));
    }

    #[test]
    fn reject_unknown_origin_and_class() {
        assert_eq!(decode("0010_XYZ_1_10_20180604_120000_00.dat", None, 0), Ok(None));
        assert_eq!(decode("0038_XYZ_9_10_20180604_120000_00.dat", None, 0), Ok(None));
    }

    #[test]
    fn reject_short_names() {
        assert_eq!(decode("README.md", None, 0), Ok(None));
        assert_eq!(decode("0038_1_10_20180604_00.dat", None, 0), Ok(None));
    }

    #[test]
    fn malformed_sequence_is_error() {
        let err = decode("0038_XYZ_1_abc_20180604_120000_00.dat", None, 0).unwrap_err();
        assert!(matches!(err, DecodeError::Sequence { .. }));
        assert!(err.to_string().contains("invalid sequence"));
    }

    #[test]
    fn malformed_timestamp_is_error() {
        let err = decode("0038_XYZ_1_10_20181304_120000_00.dat", None, 0).unwrap_err();
        assert!(matches!(err, DecodeError::Timestamp { .. }));
        let err = decode("0038_XYZ_1_10_2018064_120000_00.dat", None, 0).unwrap_err();
        assert!(matches!(err, DecodeError::Timestamp { .. }));
    }

    #[test]
    fn malformed_source_is_error() {
        let err = decode("00zz_XYZ_1_10_20180604_120000_00.dat", None, 0).unwrap_err();
        assert!(matches!(err, DecodeError::Source { .. }));
    }

    #[test]
    fn bad_extension_marks_invalid() {
        let r = decode("0038_XYZ_1_10_20180604_120000_00.bad", None, 0)
            .unwrap()
            .unwrap();
        assert!(!r.valid());
    }

    #[test]
    fn partition_keys() {
        let a = decode(NAME, None, 0).unwrap().unwrap();
        let b = decode("0037_XYZ_1_0000010_20180604_120000_00.dat", None, 0)
            .unwrap()
            .unwrap();
        assert_ne!(a.partition(GroupBy::Upi), b.partition(GroupBy::Upi));
        assert_eq!(a.partition(GroupBy::Source), "38");
        assert_eq!(b.partition(GroupBy::Source), "37");
    }

    #[test]
    fn group_by_from_str() {
        assert_eq!("upi".parse::<GroupBy>(), Ok(GroupBy::Upi));
        assert_eq!("Source".parse::<GroupBy>(), Ok(GroupBy::Source));
        assert!("channel".parse::<GroupBy>().is_err());
    }

    #[test]
    fn origin_sets_sorted_and_disjoint() {
        assert!(IMAGE_ORIGINS.windows(2).all(|w| w[0] < w[1]));
        assert!(SCIENCE_ORIGINS.windows(2).all(|w| w[0] < w[1]));
        assert!(
            IMAGE_ORIGINS
                .iter()
                .all(|c| SCIENCE_ORIGINS.binary_search(c).is_err())
        );
    }
}
