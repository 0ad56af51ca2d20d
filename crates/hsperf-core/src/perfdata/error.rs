//! Decode-stage errors for hsperfdata parsing.

use thiserror::Error;

/// Error raised while decoding the prologue or the counter directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerfDataError {
    /// The first four bytes are not the hsperfdata magic.
    #[error("invalid hsperfdata magic {0:#010x} (expected 0xcafec0c0)")]
    InvalidMagic(u32),

    /// A header field holds a value no valid file can carry.
    #[error("invalid header field {field}: {value}")]
    InvalidHeader { field: &'static str, value: i64 },

    /// A counter entry whose offsets contradict each other.
    #[error("malformed counter entry #{index}: {reason}")]
    MalformedEntry { index: usize, reason: String },

    /// A read ran past the end of the available bytes.
    #[error("truncated {what}: need {needed} bytes at offset {offset}, only {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The file no longer matches the first scan: different byte order,
    /// directory offset, cached entry shape, or JVM start time.
    #[error("hsperfdata file was recreated since the first scan")]
    LayoutChanged,
}

impl PerfDataError {
    /// Returns true for errors that mean the file is not valid hsperfdata
    /// (as opposed to being cut short).
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            PerfDataError::InvalidMagic(_)
                | PerfDataError::InvalidHeader { .. }
                | PerfDataError::MalformedEntry { .. }
        )
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, PerfDataError::Truncated { .. })
    }
}
