//! upifinder core - walking acquisition archives for counts and sequence gaps
//!
//! Archive trees hold files named `SOURCE_UPI_CLASS_SEQ_DATE_TIME_OFFSET.EXT`,
//! loose, packed in tar archives or referenced from `.lst` files. This crate
//! decodes those names into [`Record`]s, streams them out of a concurrent
//! [`Scanner`], and folds them into per-partition reports ([`Aggregator`])
//! or missing-sequence reports ([`GapDetector`]).

pub mod coze;
pub mod error;
pub mod gap;
pub mod logging;
pub mod progress;
pub mod range;
pub mod record;
pub mod scan;
pub mod window;

pub use coze::{Aggregator, Coze, Report, Totals};
pub use error::{ScanError, ScanFailure};
pub use gap::{CheckOptions, Gap, GapDetector, GapSummary};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::{ProgressContext, SharedProgress, StageLine, fmt_num};
pub use range::{Range, RangeSet};
pub use record::{DecodeError, GroupBy, ParseGroupByError, Record, decode};
pub use scan::{RecordStream, ScanOptions, ScanStats, Scanner};
pub use window::{Window, WindowError, expand_roots};
