//! Full walk of the counter entry directory.
//!
//! Entries are contiguous: each one starts where the previous one ends
//! (`start + entry_length`). The fixed part of an entry is 20 bytes, followed
//! by the NUL-terminated name at `start + name_offset` and the value at
//! `start + data_offset`.
//!
//! Besides decoding every counter, the walk picks the counters worth
//! re-reading on later polls (the [`VolatileSet`]): anything whose
//! variability is not constant, plus names from the force-collect list.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::decode::{
    CounterValue, DataKind, Endian, ValueSlot, decode_value, read_c_string, slice_at,
};
use super::error::PerfDataError;

/// Size of the fixed part of a counter entry.
pub const ENTRY_HEADER_SIZE: usize = 20;

/// Whether a counter can change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Variability {
    Constant,
    Monotonic,
    Variable,
    Other(u8),
}

impl Variability {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Variability::Constant,
            2 => Variability::Monotonic,
            3 => Variability::Variable,
            other => Variability::Other(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Variability::Constant => 1,
            Variability::Monotonic => 2,
            Variability::Variable => 3,
            Variability::Other(raw) => raw,
        }
    }
}

/// Unit of a counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Units {
    None,
    Bytes,
    Ticks,
    Events,
    String,
    Hertz,
    Other(u8),
}

impl Units {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Units::None,
            2 => Units::Bytes,
            3 => Units::Ticks,
            4 => Units::Events,
            5 => Units::String,
            6 => Units::Hertz,
            other => Units::Other(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Units::None => 1,
            Units::Bytes => 2,
            Units::Ticks => 3,
            Units::Events => 4,
            Units::String => 5,
            Units::Hertz => 6,
            Units::Other(raw) => raw,
        }
    }
}

/// One decoded counter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDescriptor {
    /// Offset of the entry within the data region.
    pub start: usize,
    pub entry_length: usize,
    pub name_offset: usize,
    pub vector_length: usize,
    pub data_kind: DataKind,
    pub flags: u8,
    pub units: Units,
    pub variability: Variability,
    pub data_offset: usize,
    /// Hierarchical name, `.` replaced by `/`.
    pub name: String,
    pub value: CounterValue,
}

impl CounterDescriptor {
    pub fn slot(&self) -> ValueSlot {
        ValueSlot {
            start: self.start,
            data_offset: self.data_offset,
            entry_length: self.entry_length,
            vector_length: self.vector_length,
            kind: self.data_kind,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.variability == Variability::Constant
    }
}

/// Handle to a counter that is re-read on every poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCounter {
    pub name: String,
    pub slot: ValueSlot,
}

/// Counters selected by the first scan for re-reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolatileSet {
    counters: Vec<CachedCounter>,
}

impl VolatileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, counter: CachedCounter) {
        self.counters.push(counter);
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CachedCounter> {
        self.counters.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counters.iter().any(|c| c.name == name)
    }
}

impl<'a> IntoIterator for &'a VolatileSet {
    type Item = &'a CachedCounter;
    type IntoIter = std::slice::Iter<'a, CachedCounter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Result of a full directory walk.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScan {
    /// Every entry, in file order.
    pub counters: Vec<CounterDescriptor>,
    pub volatile: VolatileSet,
}

impl DirectoryScan {
    /// Number of entries whose value could not be decoded (vectors, unknown kinds).
    pub fn unsupported_count(&self) -> usize {
        self.counters
            .iter()
            .filter(|c| c.value == CounterValue::Unsupported)
            .count()
    }
}

/// Converts a dotted perfdata name into its hierarchical form.
pub fn hierarchical_name(raw: &str) -> String {
    raw.replace('.', "/")
}

/// Walks `num_entries` entries of `region` in `endian` order.
///
/// `force_collect` holds hierarchical names that join the volatile set even
/// when their variability is constant. Any failure aborts the whole walk.
pub fn scan_directory(
    region: &[u8],
    endian: Endian,
    num_entries: usize,
    force_collect: &HashSet<String>,
) -> Result<DirectoryScan, PerfDataError> {
    let mut scan = DirectoryScan {
        counters: Vec::with_capacity(num_entries.min(region.len() / ENTRY_HEADER_SIZE)),
        volatile: VolatileSet::new(),
    };

    let mut pos = 0usize;
    for index in 0..num_entries {
        let descriptor = read_entry(region, endian, pos, index)?;

        if !descriptor.is_constant() || force_collect.contains(&descriptor.name) {
            scan.volatile.push(CachedCounter {
                name: descriptor.name.clone(),
                slot: descriptor.slot(),
            });
        }

        pos = pos.saturating_add(descriptor.entry_length);
        scan.counters.push(descriptor);
    }

    let unsupported = scan.unsupported_count();
    if unsupported > 0 {
        debug!("{} counters with unsupported (vector) values skipped", unsupported);
    }

    Ok(scan)
}

fn read_entry(
    region: &[u8],
    endian: Endian,
    start: usize,
    index: usize,
) -> Result<CounterDescriptor, PerfDataError> {
    let fixed = slice_at(region, start, ENTRY_HEADER_SIZE, "counter entry header")?;

    let malformed = |reason: String| PerfDataError::MalformedEntry { index, reason };
    let field = |raw: i32, name: &str| -> Result<usize, PerfDataError> {
        usize::try_from(raw).map_err(|_| malformed(format!("negative {}: {}", name, raw)))
    };

    let entry_length = field(endian.read_i32(&fixed[0..4]), "entry_length")?;
    let name_offset = field(endian.read_i32(&fixed[4..8]), "name_offset")?;
    let vector_length = field(endian.read_i32(&fixed[8..12]), "vector_length")?;
    let data_kind = DataKind::from_tag(fixed[12]);
    let flags = fixed[13];
    let units = Units::from_raw(fixed[14]);
    let variability = Variability::from_raw(fixed[15]);
    let data_offset = field(endian.read_i32(&fixed[16..20]), "data_offset")?;

    if entry_length < ENTRY_HEADER_SIZE {
        return Err(malformed(format!(
            "entry_length {} shorter than the fixed header",
            entry_length
        )));
    }
    if data_offset < name_offset {
        return Err(malformed(format!(
            "data_offset {} before name_offset {}",
            data_offset, name_offset
        )));
    }
    if data_kind == DataKind::Text && entry_length < data_offset {
        return Err(malformed(format!(
            "data_offset {} beyond entry_length {}",
            data_offset, entry_length
        )));
    }

    let raw_name = read_c_string(
        region,
        start.saturating_add(name_offset),
        data_offset - name_offset,
        "counter name",
    )?;
    let name = std::str::from_utf8(raw_name)
        .map(hierarchical_name)
        .map_err(|e| malformed(format!("name is not UTF-8: {}", e)))?;

    let mut descriptor = CounterDescriptor {
        start,
        entry_length,
        name_offset,
        vector_length,
        data_kind,
        flags,
        units,
        variability,
        data_offset,
        name,
        value: CounterValue::Unsupported,
    };
    descriptor.value = decode_value(region, endian, &descriptor.slot())?;

    Ok(descriptor)
}
