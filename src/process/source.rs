//! The scan interface consumed by the tracker.
//!
//! A scan is a finite sequence of per-process results followed by a `close`.
//! A single process failing to read is an item-level error; failing to finish
//! the scan is reported by `close` and invalidates the whole cycle.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::model::ProcessObservation;

/// Why a single process could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadErrorKind {
    /// The process exited between listing and reading.
    Vanished,
    PermissionDenied,
    Io,
    Parse,
}

impl ReadErrorKind {
    pub const ALL: [ReadErrorKind; 4] = [
        ReadErrorKind::Vanished,
        ReadErrorKind::PermissionDenied,
        ReadErrorKind::Io,
        ReadErrorKind::Parse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadErrorKind::Vanished => "vanished",
            ReadErrorKind::PermissionDenied => "permission_denied",
            ReadErrorKind::Io => "io",
            ReadErrorKind::Parse => "parse",
        }
    }
}

impl fmt::Display for ReadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to read one process during a scan.
#[derive(Debug, Clone, Error)]
#[error("pid {pid}: {kind}: {message}")]
pub struct ProcReadError {
    pub pid: u32,
    pub kind: ReadErrorKind,
    pub message: String,
}

impl ProcReadError {
    pub fn new(pid: u32, kind: ReadErrorKind, message: impl Into<String>) -> Self {
        Self {
            pid,
            kind,
            message: message.into(),
        }
    }

    /// Maps an I/O error while reading `/proc/<pid>/...` to a read error.
    pub fn from_io(pid: u32, err: &io::Error) -> Self {
        // ESRCH shows up when the task is torn down mid-read.
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ReadErrorKind::Vanished,
            io::ErrorKind::PermissionDenied => ReadErrorKind::PermissionDenied,
            _ if err.raw_os_error() == Some(libc::ESRCH) => ReadErrorKind::Vanished,
            _ => ReadErrorKind::Io,
        };
        Self::new(pid, kind, err.to_string())
    }

    pub fn parse(pid: u32, message: impl Into<String>) -> Self {
        Self::new(pid, ReadErrorKind::Parse, message)
    }
}

/// A scan that could not be completed. The cycle's results must be discarded.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to list processes under {}: {source}", .root.display())]
    List {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to load process data from {}: {message}", .path.display())]
    Load { path: PathBuf, message: String },
    #[error("scan did not complete: {0}")]
    Incomplete(String),
}

/// Per-process errors collected over one cycle. Never fatal.
#[derive(Debug, Clone, Default)]
pub struct CollectErrors {
    pub errors: Vec<ProcReadError>,
}

impl CollectErrors {
    pub fn record(&mut self, err: ProcReadError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn count(&self, kind: ReadErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    /// Errors other than processes that simply exited mid-scan.
    pub fn failures(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.kind != ReadErrorKind::Vanished)
            .count()
    }
}

/// One cycle's sequence of process observations.
pub trait ProcIter {
    /// Next process, or a read error for one process. `None` ends the scan.
    fn next_proc(&mut self) -> Option<Result<ProcessObservation, ProcReadError>>;

    /// Finishes the scan. An error here means the sequence was incomplete.
    fn close(&mut self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// A scan over an in-memory list of results.
pub struct StaticIter {
    items: std::vec::IntoIter<Result<ProcessObservation, ProcReadError>>,
}

impl StaticIter {
    pub fn new(observations: Vec<ProcessObservation>) -> Self {
        Self::with_results(observations.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ProcessObservation, ProcReadError>>) -> Self {
        Self {
            items: results.into_iter(),
        }
    }
}

impl ProcIter for StaticIter {
    fn next_proc(&mut self) -> Option<Result<ProcessObservation, ProcReadError>> {
        self.items.next()
    }
}

/// Loads a JSON array of observations (synthetic data instead of /proc).
pub fn load_observations(path: &Path) -> Result<Vec<ProcessObservation>, ScanError> {
    let content = fs::read_to_string(path).map_err(|e| ScanError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ScanError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
