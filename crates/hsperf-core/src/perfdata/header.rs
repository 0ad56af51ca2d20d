//! The fixed 32-byte prologue at the start of every hsperfdata file.

use serde::Serialize;

use super::decode::{Endian, read_i32_at, read_i64_at, slice_at};
use super::error::PerfDataError;

/// Magic number, always stored big endian.
pub const MAGIC: u32 = 0xCAFE_C0C0;

/// Size of the prologue in bytes.
pub const PROLOGUE_SIZE: usize = 32;

/// Parsed prologue.
///
/// Only the magic is validated; the other fields are taken at face value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub magic: u32,
    pub byte_order: Endian,
    pub major_version: u8,
    pub minor_version: u8,
    pub accessible: bool,
    pub used: i32,
    pub overflow: i32,
    pub mod_time_stamp: i64,
    /// Offset of the first counter entry from the start of the file.
    pub entry_offset: i32,
    pub num_entries: i32,
}

impl Header {
    /// Parses the prologue from the first 32 bytes of `buf`.
    ///
    /// Fails with `Truncated` on short input and `InvalidMagic` when the magic
    /// does not match, whatever the byte-order flag says.
    pub fn parse(buf: &[u8]) -> Result<Self, PerfDataError> {
        let prologue = slice_at(buf, 0, PROLOGUE_SIZE, "prologue")?;

        let magic = u32::from_be_bytes([prologue[0], prologue[1], prologue[2], prologue[3]]);
        if magic != MAGIC {
            return Err(PerfDataError::InvalidMagic(magic));
        }

        let byte_order = Endian::from_flag(prologue[4]);

        Ok(Self {
            magic,
            byte_order,
            major_version: prologue[5],
            minor_version: prologue[6],
            accessible: prologue[7] != 0,
            used: read_i32_at(prologue, 8, byte_order, "used")?,
            overflow: read_i32_at(prologue, 12, byte_order, "overflow")?,
            mod_time_stamp: read_i64_at(prologue, 16, byte_order, "mod_time_stamp")?,
            entry_offset: read_i32_at(prologue, 24, byte_order, "entry_offset")?,
            num_entries: read_i32_at(prologue, 28, byte_order, "num_entries")?,
        })
    }

    /// Entry directory offset as a file position.
    pub fn directory_offset(&self) -> Result<usize, PerfDataError> {
        usize::try_from(self.entry_offset).map_err(|_| PerfDataError::InvalidHeader {
            field: "entry_offset",
            value: self.entry_offset.into(),
        })
    }

    /// Number of counter entries in the directory.
    pub fn entry_count(&self) -> Result<usize, PerfDataError> {
        usize::try_from(self.num_entries).map_err(|_| PerfDataError::InvalidHeader {
            field: "num_entries",
            value: self.num_entries.into(),
        })
    }

    /// True when cached entry offsets taken under `other` are still valid here.
    pub fn same_layout(&self, other: &Header) -> bool {
        self.byte_order == other.byte_order && self.entry_offset == other.entry_offset
    }

    /// Splits `buf` at the directory offset, returning the data region that
    /// all entry offsets are relative to.
    pub fn data_region<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], PerfDataError> {
        let offset = self.directory_offset()?;
        buf.get(offset..).ok_or(PerfDataError::Truncated {
            what: "entry directory",
            offset,
            needed: 0,
            available: buf.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prologue(endian: Endian) -> Vec<u8> {
        let mut buf = vec![0u8; PROLOGUE_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4] = endian.flag();
        buf[5] = 2;
        buf[6] = 0;
        buf[7] = 1;
        endian.write_i32(&mut buf[8..12], 4096);
        endian.write_i32(&mut buf[12..16], 0);
        endian.write_i64(&mut buf[16..24], 1_700_000_000_123);
        endian.write_i32(&mut buf[24..28], 32);
        endian.write_i32(&mut buf[28..32], 3);
        buf
    }

    #[test]
    fn test_parse_big_endian() {
        let header = Header::parse(&prologue(Endian::Big)).unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.byte_order, Endian::Big);
        assert_eq!(header.major_version, 2);
        assert_eq!(header.minor_version, 0);
        assert!(header.accessible);
        assert_eq!(header.used, 4096);
        assert_eq!(header.overflow, 0);
        assert_eq!(header.mod_time_stamp, 1_700_000_000_123);
        assert_eq!(header.entry_offset, 32);
        assert_eq!(header.num_entries, 3);
    }

    #[test]
    fn test_parse_little_endian_same_values() {
        let big = Header::parse(&prologue(Endian::Big)).unwrap();
        let little = Header::parse(&prologue(Endian::Little)).unwrap();
        assert_eq!(little.byte_order, Endian::Little);
        assert_eq!(little.used, big.used);
        assert_eq!(little.mod_time_stamp, big.mod_time_stamp);
        assert_eq!(little.entry_offset, big.entry_offset);
        assert_eq!(little.num_entries, big.num_entries);
        assert!(!little.same_layout(&big));
    }

    #[test]
    fn test_bad_magic() {
        for endian in [Endian::Big, Endian::Little] {
            let mut buf = prologue(endian);
            buf[0] = 0xC0;
            buf[3] = 0xCA;
            let err = Header::parse(&buf).unwrap_err();
            assert!(matches!(err, PerfDataError::InvalidMagic(0xC0FE_C0CA)));
        }
    }

    #[test]
    fn test_short_prologue() {
        let buf = prologue(Endian::Big);
        for len in [0, 4, 31] {
            let err = Header::parse(&buf[..len]).unwrap_err();
            assert!(err.is_truncated(), "len {len}: {err}");
        }
    }

    #[test]
    fn test_negative_entry_count() {
        let mut buf = prologue(Endian::Big);
        Endian::Big.write_i32(&mut buf[28..32], -1);
        let header = Header::parse(&buf).unwrap();
        assert!(matches!(
            header.entry_count(),
            Err(PerfDataError::InvalidHeader { field: "num_entries", value: -1 })
        ));
    }

    #[test]
    fn test_data_region() {
        let mut buf = prologue(Endian::Big);
        buf.extend_from_slice(&[9, 9, 9]);
        let header = Header::parse(&buf).unwrap();
        assert_eq!(header.data_region(&buf).unwrap(), &[9, 9, 9]);

        Endian::Big.write_i32(&mut buf[24..28], 100);
        let header = Header::parse(&buf).unwrap();
        assert!(header.data_region(&buf).unwrap_err().is_truncated());
    }
}
