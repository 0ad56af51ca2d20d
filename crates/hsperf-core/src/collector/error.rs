//! Per-process collection errors and their per-fetch aggregate.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::perfdata::PerfDataError;

/// Error type for collection failures of a single JVM.
#[derive(Debug, Error)]
pub enum CollectError {
    /// No perfdata file for the pid: the JVM has exited (or never ran).
    #[error("no hsperfdata file found for pid {pid}")]
    NotFound { pid: String },

    /// Cross-user lookup matched more than one file for the pid.
    #[error("more than one hsperfdata file found for pid {pid}: {matches:?}")]
    Ambiguous { pid: String, matches: Vec<PathBuf> },

    /// The file exists but the current user may not read it.
    #[error("permission denied reading {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file could not be decoded.
    #[error("pid {pid}: {source}")]
    PerfData {
        pid: String,
        #[source]
        source: PerfDataError,
    },
}

impl CollectError {
    /// Classifies an I/O error from reading `path` for `pid`.
    pub fn from_io(pid: &str, path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => CollectError::NotFound {
                pid: pid.to_string(),
            },
            io::ErrorKind::PermissionDenied => CollectError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            },
            _ => CollectError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub fn perf_data(pid: &str, source: PerfDataError) -> Self {
        CollectError::PerfData {
            pid: pid.to_string(),
            source,
        }
    }

    /// True when the process is simply gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CollectError::NotFound { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CollectError::PermissionDenied { .. })
    }

    /// True for corrupt or incompatible files.
    pub fn is_format(&self) -> bool {
        matches!(self, CollectError::PerfData { source, .. } if source.is_format())
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, CollectError::PerfData { source, .. } if source.is_truncated())
    }

    /// True when the file was recreated under the same pid since the first scan.
    pub fn is_layout_changed(&self) -> bool {
        matches!(
            self,
            CollectError::PerfData {
                source: PerfDataError::LayoutChanged,
                ..
            }
        )
    }
}

/// Errors from one fetch over several JVMs.
///
/// Returned only when no event at all could be collected.
#[derive(Debug, Default, Error)]
#[error("{}", render(.errors))]
pub struct FetchError {
    errors: Vec<CollectError>,
}

impl FetchError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: CollectError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CollectError] {
        &self.errors
    }
}

/// One error as-is, several as "multiple errors:" and one per line.
fn render(errors: &[CollectError]) -> String {
    match errors {
        [] => "no errors".to_string(),
        [only] => only.to_string(),
        many => many.iter().fold("multiple errors:".to_string(), |mut out, err| {
            out.push('\n');
            out.push_str(&err.to_string());
            out
        }),
    }
}
