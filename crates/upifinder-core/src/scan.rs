//! Concurrent archive traversal feeding a single record stream.
//!
//! Every root is walked by one worker of a bounded rayon pool; workers push
//! decoded records into a bounded channel drained by exactly one consumer
//! (an [`Aggregator`](crate::Aggregator) or a [`GapDetector`](crate::GapDetector)).
//! Containers are expanded in place by the worker that finds them:
//!
//! - `.xml` files are ignored
//! - `.tar` archives yield one record per member
//! - `.lst` files yield one record per listed path (size unknown)
//! - anything else is decoded from its own name and size
//!
//! Each root is walked in lexical order, so a single worker yields records in
//! a stable order.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use rayon::prelude::*;
use walkdir::{DirEntry, WalkDir};

use crate::error::{ScanError, ScanFailure};
use crate::record::{Record, base_name, decode, extension};

/// Default pool size for listing and counting.
pub const DEFAULT_WALK_WORKERS: usize = 8;

/// Default pool size for gap detection (keeps traversal order).
pub const DEFAULT_CHECK_WORKERS: usize = 1;

/// Records buffered between workers and the consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Roots walked concurrently.
    pub workers: usize,
    /// Keep only names containing this UPI, and force it as the decoded UPI.
    pub upi: Option<String>,
    pub channel_capacity: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WALK_WORKERS,
            upi: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Traversal counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Roots that existed and were walked
    pub roots: usize,
    /// Regular files visited, containers included
    pub files: usize,
    pub archives: usize,
    pub lists: usize,
    /// Records handed to the consumer
    pub records: usize,
    /// Names rejected by the decoder
    pub rejected: usize,
}

#[derive(Default)]
struct Counters {
    roots: AtomicUsize,
    files: AtomicUsize,
    archives: AtomicUsize,
    lists: AtomicUsize,
    records: AtomicUsize,
    rejected: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ScanStats {
        ScanStats {
            roots: self.roots.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            archives: self.archives.load(Ordering::Relaxed),
            lists: self.lists.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Entry point: fans roots out to workers, returns the merged stream.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Start walking `roots` in the background.
    ///
    /// The returned stream yields records in no particular order and ends
    /// once every root is done.
    pub fn scan(&self, roots: Vec<PathBuf>) -> RecordStream {
        let (tx, rx) = mpsc::sync_channel(self.options.channel_capacity.max(1));
        let options = self.options.clone();
        log::debug!(
            "scanning {} roots with {} workers",
            roots.len(),
            options.workers
        );
        let producer = thread::Builder::new()
            .name("scan".to_string())
            .spawn(move || produce(&roots, &options, tx))
            .map_err(|e| ScanError::Pool(e.to_string()));
        RecordStream { rx, producer }
    }
}

type Produced = (Vec<ScanError>, ScanStats);

fn produce(roots: &[PathBuf], options: &ScanOptions, tx: SyncSender<Record>) -> Produced {
    let counters = Counters::default();
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .thread_name(|i| format!("scan-{i}"))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => return (vec![ScanError::Pool(e.to_string())], counters.snapshot()),
    };
    let errors = pool.install(|| {
        roots
            .par_iter()
            .map_with(tx, |tx, root| {
                let mut walker = RootWalker {
                    upi: options.upi.as_deref(),
                    tx,
                    counters: &counters,
                    errors: Vec::new(),
                    closed: false,
                };
                walker.run(root);
                walker.errors
            })
            .flatten()
            .collect::<Vec<_>>()
    });
    (errors, counters.snapshot())
}

/// Consumer side of a scan.
pub struct RecordStream {
    rx: Receiver<Record>,
    producer: Result<JoinHandle<Produced>, ScanError>,
}

impl Iterator for RecordStream {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.rx.recv().ok()
    }
}

impl RecordStream {
    /// Hang up and wait for every worker.
    ///
    /// Records not consumed yet are dropped; workers still running stop at
    /// their next send. Root-local errors are returned together.
    pub fn finish(self) -> Result<ScanStats, ScanFailure> {
        let Self { rx, producer } = self;
        drop(rx);
        let (errors, stats) = match producer {
            Ok(handle) => handle
                .join()
                .unwrap_or_else(|_| (vec![ScanError::Panicked], ScanStats::default())),
            Err(e) => (vec![e], ScanStats::default()),
        };
        log::debug!(
            "scan done: {} roots, {} files, {} records, {} rejected, {} errors",
            stats.roots,
            stats.files,
            stats.records,
            stats.rejected,
            errors.len()
        );
        if errors.is_empty() {
            Ok(stats)
        } else {
            Err(ScanFailure::new(errors))
        }
    }
}

/// Walks one root on one worker.
struct RootWalker<'a> {
    upi: Option<&'a str>,
    tx: &'a SyncSender<Record>,
    counters: &'a Counters,
    errors: Vec<ScanError>,
    /// Consumer hung up.
    closed: bool,
}

impl RootWalker<'_> {
    fn run(&mut self, root: &Path) {
        match std::fs::metadata(root) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("{}: not found, skipped", root.display());
                return;
            }
            Err(e) => {
                self.fail(ScanError::io(root, e));
                return;
            }
        }
        Counters::bump(&self.counters.roots);
        if let Err(e) = self.walk(root) {
            self.fail(e);
        }
    }

    fn fail(&mut self, e: ScanError) {
        log::warn!("{e}");
        self.errors.push(e);
    }

    fn walk(&mut self, root: &Path) -> Result<(), ScanError> {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            Counters::bump(&self.counters.files);
            let path = entry.path();
            match extension(&path.to_string_lossy()) {
                Some("xml") => {}
                Some("tar") => self.scan_tar(path)?,
                Some("lst") => self.scan_list(path)?,
                _ => self.scan_file(&entry)?,
            }
            if self.closed {
                break;
            }
        }
        Ok(())
    }

    /// Cheap substring test on the name before decoding.
    fn keep(&self, name: &str) -> bool {
        self.upi.is_none_or(|u| name.contains(u))
    }

    fn emit(&mut self, record: Record) {
        if self.tx.send(record).is_ok() {
            Counters::bump(&self.counters.records);
        } else {
            self.closed = true;
        }
    }

    fn scan_file(&mut self, entry: &DirEntry) -> Result<(), ScanError> {
        if !self.keep(&entry.file_name().to_string_lossy()) {
            return Ok(());
        }
        let size = entry.metadata()?.len();
        let path = entry.path().to_string_lossy();
        match decode(&path, self.upi, size) {
            Ok(Some(r)) => self.emit(r),
            Ok(None) => Counters::bump(&self.counters.rejected),
            Err(source) => {
                return Err(ScanError::Decode {
                    path: entry.path().to_path_buf(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// A malformed member aborts the archive only; the walk goes on.
    fn scan_tar(&mut self, path: &Path) -> Result<(), ScanError> {
        Counters::bump(&self.counters.archives);
        let io_err = |e| ScanError::io(path, e);
        let file = File::open(path).map_err(io_err)?;
        let mut archive = tar::Archive::new(BufReader::new(file));
        for entry in archive.entries().map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let member = entry.path().map_err(io_err)?.to_string_lossy().into_owned();
            if extension(&member) == Some("xml") || !self.keep(base_name(&member)) {
                continue;
            }
            let size = entry.header().size().map_err(io_err)?;
            match decode(&member, self.upi, size) {
                Ok(Some(r)) => self.emit(r),
                Ok(None) => Counters::bump(&self.counters.rejected),
                Err(source) => {
                    self.fail(ScanError::Decode {
                        path: path.to_path_buf(),
                        source,
                    });
                    return Ok(());
                }
            }
            if self.closed {
                break;
            }
        }
        Ok(())
    }

    /// Malformed lines are skipped.
    fn scan_list(&mut self, path: &Path) -> Result<(), ScanError> {
        Counters::bump(&self.counters.lists);
        let file = File::open(path).map_err(|e| ScanError::io(path, e))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ScanError::io(path, e))?;
            let line = line.trim();
            if line.is_empty() || extension(line) == Some("xml") || !self.keep(base_name(line)) {
                continue;
            }
            match decode(line, self.upi, 0) {
                Ok(Some(r)) => self.emit(r),
                Ok(None) => Counters::bump(&self.counters.rejected),
                Err(e) => log::debug!("{}: {e}", path.display()),
            }
            if self.closed {
                break;
            }
        }
        Ok(())
    }
}
