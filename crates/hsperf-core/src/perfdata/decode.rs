//! Primitive decoders shared by the directory scan and the cached refresh.
//!
//! Every multi-byte field after the magic is stored in the byte order named
//! by the prologue, so the order travels as an explicit [`Endian`] value into
//! each read. All reads are bounds-checked and fail with
//! [`PerfDataError::Truncated`] instead of panicking.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::Serialize;

use super::error::PerfDataError;

/// Byte order of a perfdata file, selected by the prologue flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// Maps the prologue byte-order flag: 0 is big endian, anything else little.
    pub fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// Flag value that selects this order.
    pub fn flag(self) -> u8 {
        match self {
            Endian::Big => 0,
            Endian::Little => 1,
        }
    }

    /// Native order of the host, as written by a JVM running here.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        match self {
            Endian::Big => BigEndian::read_i32(buf),
            Endian::Little => LittleEndian::read_i32(buf),
        }
    }

    pub fn read_i64(self, buf: &[u8]) -> i64 {
        match self {
            Endian::Big => BigEndian::read_i64(buf),
            Endian::Little => LittleEndian::read_i64(buf),
        }
    }

    pub fn write_i32(self, buf: &mut [u8], value: i32) {
        match self {
            Endian::Big => BigEndian::write_i32(buf, value),
            Endian::Little => LittleEndian::write_i32(buf, value),
        }
    }

    pub fn write_i64(self, buf: &mut [u8], value: i64) {
        match self {
            Endian::Big => BigEndian::write_i64(buf, value),
            Endian::Little => LittleEndian::write_i64(buf, value),
        }
    }
}

/// Encoding of a counter's value, from the descriptor's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataKind {
    /// `B`: byte array holding a NUL-terminated string.
    Text,
    /// `J`: signed 64-bit integer.
    Long,
    /// Any other tag. The value is left undecoded.
    Other(u8),
}

impl DataKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            b'B' => DataKind::Text,
            b'J' => DataKind::Long,
            other => DataKind::Other(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            DataKind::Text => b'B',
            DataKind::Long => b'J',
            DataKind::Other(tag) => tag,
        }
    }
}

/// Decoded counter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CounterValue {
    Text(String),
    Long(i64),
    /// Vector counters and unknown kinds: the descriptor is kept, the value is not.
    Unsupported,
}

/// Where a value lives inside the data region, and how to decode it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValueSlot {
    /// Offset of the owning entry within the data region.
    pub start: usize,
    /// Data offset relative to `start`.
    pub data_offset: usize,
    /// Full entry length; bounds text values.
    pub entry_length: usize,
    pub vector_length: usize,
    pub kind: DataKind,
}

impl ValueSlot {
    /// Absolute offset of the value within the data region.
    pub fn value_offset(&self) -> usize {
        self.start.saturating_add(self.data_offset)
    }
}

/// Returns `len` bytes at `offset`, or `Truncated` naming `what`.
pub fn slice_at<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], PerfDataError> {
    let truncated = || PerfDataError::Truncated {
        what,
        offset,
        needed: len,
        available: buf.len().saturating_sub(offset),
    };
    let end = offset.checked_add(len).ok_or_else(truncated)?;
    buf.get(offset..end).ok_or_else(truncated)
}

pub fn read_i32_at(
    buf: &[u8],
    offset: usize,
    endian: Endian,
    what: &'static str,
) -> Result<i32, PerfDataError> {
    slice_at(buf, offset, 4, what).map(|b| endian.read_i32(b))
}

pub fn read_i64_at(
    buf: &[u8],
    offset: usize,
    endian: Endian,
    what: &'static str,
) -> Result<i64, PerfDataError> {
    slice_at(buf, offset, 8, what).map(|b| endian.read_i64(b))
}

/// Cuts a byte field at its first NUL. Fields without one are kept whole.
pub fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Reads a `len`-byte NUL-terminated field and returns the bytes before the NUL.
pub fn read_c_string<'a>(
    buf: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8], PerfDataError> {
    slice_at(buf, offset, len, what).map(until_nul)
}

/// Decodes the value in `slot` from `region`.
pub fn decode_value(
    region: &[u8],
    endian: Endian,
    slot: &ValueSlot,
) -> Result<CounterValue, PerfDataError> {
    let offset = slot.value_offset();
    match slot.kind {
        DataKind::Text => {
            let len = slot.entry_length.saturating_sub(slot.data_offset);
            let bytes = read_c_string(region, offset, len, "counter value")?;
            Ok(CounterValue::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        DataKind::Long if slot.vector_length == 0 => {
            read_i64_at(region, offset, endian, "counter value").map(CounterValue::Long)
        }
        DataKind::Long | DataKind::Other(_) => Ok(CounterValue::Unsupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endian_from_flag() {
        assert_eq!(Endian::from_flag(0), Endian::Big);
        assert_eq!(Endian::from_flag(1), Endian::Little);
        assert_eq!(Endian::from_flag(7), Endian::Little);
    }

    #[test]
    fn test_read_i64_both_orders() {
        let be = 0x0102_0304_0506_0708i64.to_be_bytes();
        let le = 0x0102_0304_0506_0708i64.to_le_bytes();
        assert_eq!(read_i64_at(&be, 0, Endian::Big, "x").unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(read_i64_at(&le, 0, Endian::Little, "x").unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_negative_long() {
        let buf = (-42i64).to_le_bytes();
        assert_eq!(read_i64_at(&buf, 0, Endian::Little, "x").unwrap(), -42);
    }

    #[test]
    fn test_slice_at_out_of_range() {
        let buf = [0u8; 6];
        let err = read_i32_at(&buf, 4, Endian::Big, "field").unwrap_err();
        assert_eq!(
            err,
            PerfDataError::Truncated {
                what: "field",
                offset: 4,
                needed: 4,
                available: 2,
            }
        );
        assert!(slice_at(&buf, usize::MAX, 2, "field").is_err());
        assert!(slice_at(&buf, 10, 0, "field").is_err());
    }

    #[test]
    fn test_c_string_stops_at_nul() {
        let buf = b"abc\0def\0";
        assert_eq!(read_c_string(buf, 0, 8, "s").unwrap(), b"abc");
        assert_eq!(read_c_string(buf, 4, 3, "s").unwrap(), b"def");
    }

    #[test]
    fn test_decode_text_and_long() {
        let mut region = vec![0u8; 32];
        region[8..13].copy_from_slice(b"hello");
        let text = ValueSlot {
            start: 0,
            data_offset: 8,
            entry_length: 16,
            vector_length: 8,
            kind: DataKind::Text,
        };
        assert_eq!(
            decode_value(&region, Endian::Big, &text).unwrap(),
            CounterValue::Text("hello".to_string())
        );

        Endian::Big.write_i64(&mut region[24..32], 135);
        let long = ValueSlot {
            start: 16,
            data_offset: 8,
            entry_length: 16,
            vector_length: 0,
            kind: DataKind::Long,
        };
        assert_eq!(
            decode_value(&region, Endian::Big, &long).unwrap(),
            CounterValue::Long(135)
        );
    }

    #[test]
    fn test_decode_vector_and_unknown_are_unsupported() {
        let region = [0u8; 16];
        let mut slot = ValueSlot {
            start: 0,
            data_offset: 0,
            entry_length: 16,
            vector_length: 2,
            kind: DataKind::Long,
        };
        assert_eq!(
            decode_value(&region, Endian::Little, &slot).unwrap(),
            CounterValue::Unsupported
        );
        slot.vector_length = 0;
        slot.kind = DataKind::from_tag(b'I');
        assert_eq!(
            decode_value(&region, Endian::Little, &slot).unwrap(),
            CounterValue::Unsupported
        );
    }

    #[test]
    fn test_decode_long_past_end_is_truncated() {
        let region = [0u8; 12];
        let slot = ValueSlot {
            start: 0,
            data_offset: 8,
            entry_length: 16,
            vector_length: 0,
            kind: DataKind::Long,
        };
        let err = decode_value(&region, Endian::Big, &slot).unwrap_err();
        assert!(err.is_truncated());
    }
}
