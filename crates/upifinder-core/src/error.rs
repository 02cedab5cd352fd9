//! Error types for archive traversal

use std::fmt;
use std::path::{Path, PathBuf};

use crate::record::DecodeError;

/// Failure local to one root (or one container inside it).
///
/// Never stops sibling roots; collected into a [`ScanFailure`] once every
/// worker is done.
#[derive(Debug)]
pub enum ScanError {
    /// Directory traversal failed.
    Walk(walkdir::Error),
    /// Opening or reading a tar archive or list file failed.
    Io { path: PathBuf, source: std::io::Error },
    /// A plain file or archive member carries a malformed name.
    Decode { path: PathBuf, source: DecodeError },
    /// The worker pool could not be built.
    Pool(String),
    /// The producer thread panicked.
    Panicked,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Walk(e) => write!(f, "walk: {e}"),
            Self::Io { path, source } => write!(f, "{}: IO: {source}", path.display()),
            Self::Decode { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Pool(msg) => write!(f, "worker pool: {msg}"),
            Self::Panicked => f.write_str("scan worker panicked"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Walk(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::Decode { source, .. } => Some(source),
            Self::Pool(_) | Self::Panicked => None,
        }
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(e: walkdir::Error) -> Self {
        Self::Walk(e)
    }
}

impl ScanError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Path the failure is attached to, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Walk(e) => e.path(),
            Self::Io { path, .. } | Self::Decode { path, .. } => Some(path),
            Self::Pool(_) | Self::Panicked => None,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Every root-local error of one scan.
#[derive(Debug)]
pub struct ScanFailure {
    errors: Vec<ScanError>,
}

impl ScanFailure {
    pub fn new(errors: Vec<ScanError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ScanError> {
        self.errors
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("scan failed"),
            [e] => write!(f, "{e}"),
            [e, rest @ ..] => write!(f, "{e} (and {} more errors)", rest.len()),
        }
    }
}

impl std::error::Error for ScanFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
