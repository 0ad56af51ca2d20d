//! Re-decoding of cached counters from a fresh snapshot.
//!
//! Names, flags and variability never change for a live JVM, so later polls
//! only revisit the values of the counters kept in the [`VolatileSet`].
//! Each cached entry's fixed header is still compared with what the first
//! scan saw, so a file recreated by another JVM under the same pid is caught
//! instead of being decoded at stale offsets.

use super::decode::{CounterValue, DataKind, Endian, ValueSlot, decode_value, slice_at};
use super::directory::{CachedCounter, ENTRY_HEADER_SIZE, VolatileSet};
use super::error::PerfDataError;

/// A cached counter paired with its freshly read value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedCounter<'a> {
    pub counter: &'a CachedCounter,
    pub value: CounterValue,
}

impl RefreshedCounter<'_> {
    pub fn name(&self) -> &str {
        &self.counter.name
    }
}

/// Fails with `LayoutChanged` unless the entry at `slot.start` still has the
/// length, offsets and kind recorded for `slot`.
pub fn check_slot(region: &[u8], endian: Endian, slot: &ValueSlot) -> Result<(), PerfDataError> {
    let fixed = slice_at(region, slot.start, ENTRY_HEADER_SIZE, "counter entry header")?;
    let unchanged = usize::try_from(endian.read_i32(&fixed[0..4])) == Ok(slot.entry_length)
        && usize::try_from(endian.read_i32(&fixed[8..12])) == Ok(slot.vector_length)
        && DataKind::from_tag(fixed[12]) == slot.kind
        && usize::try_from(endian.read_i32(&fixed[16..20])) == Ok(slot.data_offset);
    if unchanged {
        Ok(())
    } else {
        Err(PerfDataError::LayoutChanged)
    }
}

/// Reads the current value of every member of `volatile` from `region`.
///
/// Values come back in cached order. One out-of-range offset or moved entry
/// fails the whole refresh, so callers never see a partial result.
pub fn refresh_values<'a>(
    region: &[u8],
    endian: Endian,
    volatile: &'a VolatileSet,
) -> Result<Vec<RefreshedCounter<'a>>, PerfDataError> {
    volatile
        .iter()
        .map(|counter| {
            check_slot(region, endian, &counter.slot)?;
            decode_value(region, endian, &counter.slot)
                .map(|value| RefreshedCounter { counter, value })
        })
        .collect()
}
