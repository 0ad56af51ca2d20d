//! Decoder for the HotSpot performance-counter file (`hsperfdata`).
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ PROLOGUE (32 bytes)                          │
//! │   magic: u32 (big endian) = 0xCAFEC0C0       │
//! │   byte_order: u8 (0 = big, else little)      │
//! │   major, minor, accessible: u8               │
//! │   used, overflow: i32                        │
//! │   mod_time_stamp: i64                        │
//! │   entry_offset, num_entries: i32             │
//! ├──────────────────────────────────────────────┤
//! │ ENTRY DIRECTORY (at entry_offset)            │
//! │   entry_length, name_offset,                 │
//! │   vector_length: i32                         │
//! │   data_type, flags, units, variability: u8   │
//! │   data_offset: i32                           │
//! │   name bytes ... NUL                         │
//! │   value bytes ...                            │
//! │   (next entry at start + entry_length)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Multi-byte fields after the magic use the prologue's byte order.

pub mod decode;
pub mod directory;
pub mod error;
pub mod header;
pub mod refresh;

use std::collections::HashSet;

pub use decode::{CounterValue, DataKind, Endian};
pub use directory::{
    CachedCounter, CounterDescriptor, DirectoryScan, Units, Variability, VolatileSet,
    scan_directory,
};
pub use error::PerfDataError;
pub use header::{Header, MAGIC, PROLOGUE_SIZE};
pub use refresh::{RefreshedCounter, check_slot, refresh_values};

/// Parses a whole perfdata file: prologue, then the full entry directory.
pub fn parse_file(
    bytes: &[u8],
    force_collect: &HashSet<String>,
) -> Result<(Header, DirectoryScan), PerfDataError> {
    let header = Header::parse(bytes)?;
    let region = header.data_region(bytes)?;
    let scan = scan_directory(
        region,
        header.byte_order,
        header.entry_count()?,
        force_collect,
    )?;
    Ok((header, scan))
}
