//! Synthetic hsperfdata files for testing.
//!
//! `PerfDataBuilder` lays out a prologue plus counter entries the way HotSpot
//! does: the name follows the fixed entry header, values are aligned to
//! 8 bytes, and every entry is padded to a multiple of 8. Rebuilding with the
//! same counters but different numbers yields an identical layout, which is
//! what a live JVM looks like between two polls.

use super::filesystem::MockFs;
use crate::perfdata::decode::{DataKind, Endian};
use crate::perfdata::directory::{ENTRY_HEADER_SIZE, Units, Variability};
use crate::perfdata::header::{MAGIC, PROLOGUE_SIZE};

fn align8(n: usize) -> usize {
    n.div_ceil(8) * 8
}

#[derive(Debug, Clone)]
enum Payload {
    Text(String),
    Long(i64),
    LongVector(Vec<i64>),
}

#[derive(Debug, Clone)]
struct PendingEntry {
    name: String,
    variability: Variability,
    payload: Payload,
}

/// Builds hsperfdata byte images.
#[derive(Debug, Clone)]
pub struct PerfDataBuilder {
    endian: Endian,
    magic: u32,
    major_version: u8,
    minor_version: u8,
    mod_time_stamp: i64,
    entries: Vec<PendingEntry>,
}

impl PerfDataBuilder {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            magic: MAGIC,
            major_version: 2,
            minor_version: 0,
            mod_time_stamp: 0,
            entries: Vec::new(),
        }
    }

    /// Overrides the magic number (for corrupt-file tests).
    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn mod_time_stamp(mut self, ticks: i64) -> Self {
        self.mod_time_stamp = ticks;
        self
    }

    /// Adds a string counter. `name` uses the raw dotted form.
    pub fn text(mut self, name: &str, value: &str, variability: Variability) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            variability,
            payload: Payload::Text(value.to_string()),
        });
        self
    }

    pub fn long(mut self, name: &str, value: i64, variability: Variability) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            variability,
            payload: Payload::Long(value),
        });
        self
    }

    pub fn long_vector(mut self, name: &str, values: &[i64], variability: Variability) -> Self {
        self.entries.push(PendingEntry {
            name: name.to_string(),
            variability,
            payload: Payload::LongVector(values.to_vec()),
        });
        self
    }

    /// Encodes the prologue and all entries.
    pub fn build(&self) -> Vec<u8> {
        let mut directory = Vec::new();
        for entry in &self.entries {
            directory.extend_from_slice(&self.encode_entry(entry));
        }

        let mut out = vec![0u8; PROLOGUE_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_be_bytes());
        out[4] = self.endian.flag();
        out[5] = self.major_version;
        out[6] = self.minor_version;
        out[7] = 1;
        let used = (PROLOGUE_SIZE + directory.len()) as i32;
        self.endian.write_i32(&mut out[8..12], used);
        self.endian.write_i32(&mut out[12..16], 0);
        self.endian.write_i64(&mut out[16..24], self.mod_time_stamp);
        self.endian.write_i32(&mut out[24..28], PROLOGUE_SIZE as i32);
        self.endian.write_i32(&mut out[28..32], self.entries.len() as i32);

        out.extend_from_slice(&directory);
        out
    }

    fn encode_entry(&self, entry: &PendingEntry) -> Vec<u8> {
        let name_offset = ENTRY_HEADER_SIZE;
        let data_offset = align8(name_offset + entry.name.len() + 1);

        let (kind, units, vector_length, value): (DataKind, Units, usize, Vec<u8>) =
            match &entry.payload {
                Payload::Text(s) => {
                    let mut bytes = s.as_bytes().to_vec();
                    bytes.resize(align8(s.len() + 1), 0);
                    (DataKind::Text, Units::String, bytes.len(), bytes)
                }
                Payload::Long(v) => {
                    let mut bytes = vec![0u8; 8];
                    self.endian.write_i64(&mut bytes, *v);
                    (DataKind::Long, Units::Events, 0, bytes)
                }
                Payload::LongVector(values) => {
                    let mut bytes = vec![0u8; values.len() * 8];
                    for (chunk, v) in bytes.chunks_exact_mut(8).zip(values) {
                        self.endian.write_i64(chunk, *v);
                    }
                    (DataKind::Long, Units::Ticks, values.len(), bytes)
                }
            };

        let entry_length = align8(data_offset + value.len());
        let mut buf = vec![0u8; entry_length];
        self.endian.write_i32(&mut buf[0..4], entry_length as i32);
        self.endian.write_i32(&mut buf[4..8], name_offset as i32);
        self.endian.write_i32(&mut buf[8..12], vector_length as i32);
        buf[12] = kind.tag();
        buf[13] = 0;
        buf[14] = units.raw();
        buf[15] = entry.variability.raw();
        self.endian.write_i32(&mut buf[16..20], data_offset as i32);
        buf[name_offset..name_offset + entry.name.len()].copy_from_slice(entry.name.as_bytes());
        buf[data_offset..data_offset + value.len()].copy_from_slice(&value);
        buf
    }
}

impl MockFs {
    /// Creates a host with two JVMs owned by different users.
    ///
    /// Files live under `/tmp`: pid 1000 (user `app`) and pid 2000
    /// (user `batch`), each with a constant VM name and a variable class count.
    pub fn two_jvms() -> Self {
        let fs = Self::new();
        fs.add_perfdata("/tmp", "app", "1000", jvm_snapshot(120));
        fs.add_perfdata("/tmp", "batch", "2000", jvm_snapshot(300));
        fs
    }
}

/// A small but realistic JVM snapshot; only the loaded-class count varies.
pub fn jvm_snapshot(loaded_classes: i64) -> Vec<u8> {
    PerfDataBuilder::new(Endian::native())
        .text(
            "sun.rt.createVmBeginTime",
            "1700000000000",
            Variability::Constant,
        )
        .text(
            "java.property.java.vm.name",
            "OpenJDK 64-Bit Server VM",
            Variability::Constant,
        )
        .long("sun.os.hrt.frequency", 1_000_000_000, Variability::Constant)
        .long("java.cls.loadedClasses", loaded_classes, Variability::Variable)
        .long("java.threads.live", 12, Variability::Variable)
        .build()
}
