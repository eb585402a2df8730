//! Track fragment run (`trun`).

use super::{check_version, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::{Error, Result};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};
use tracing::debug;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TrunFlags: u32 {
        const DATA_OFFSET_PRESENT = 0x000001;
        const FIRST_SAMPLE_FLAGS_PRESENT = 0x000004;
        const SAMPLE_DURATION_PRESENT = 0x000100;
        const SAMPLE_SIZE_PRESENT = 0x000200;
        const SAMPLE_FLAGS_PRESENT = 0x000400;
        const SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT = 0x000800;
    }
}

impl TrunFlags {
    const PER_SAMPLE: Self = Self::SAMPLE_DURATION_PRESENT
        .union(Self::SAMPLE_SIZE_PRESENT)
        .union(Self::SAMPLE_FLAGS_PRESENT)
        .union(Self::SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT);

    /// Bytes each sample entry occupies with these flags.
    fn entry_size(self) -> u64 {
        self.intersection(Self::PER_SAMPLE).bits().count_ones() as u64 * 4
    }
}

/// One sample of a run. Absent fields fall back to `tfhd`/`trex` defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrunEntry {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    /// Signed on the wire for version 1, unsigned for version 0.
    pub composition_offset: Option<i32>,
}

impl TrunEntry {
    fn flags(&self) -> TrunFlags {
        let mut flags = TrunFlags::empty();
        flags.set(TrunFlags::SAMPLE_DURATION_PRESENT, self.duration.is_some());
        flags.set(TrunFlags::SAMPLE_SIZE_PRESENT, self.size.is_some());
        flags.set(TrunFlags::SAMPLE_FLAGS_PRESENT, self.flags.is_some());
        flags.set(
            TrunFlags::SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT,
            self.composition_offset.is_some(),
        );
        flags
    }
}

/// A run of contiguous samples in `mdat`.
///
/// Every entry must carry the same set of optional fields, since a single
/// flags word describes them all. The flags are derived from the entry
/// shape and from `data_offset`/`first_sample_flags`. An empty run keeps the
/// shape it was read or last populated with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trun {
    pub version: u8,
    /// Offset of the first sample relative to the base data offset.
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    entries: Vec<TrunEntry>,
    sample_fields: TrunFlags,
}

impl Trun {
    pub fn new(entries: Vec<TrunEntry>) -> Result<Self> {
        let mut trun = Self::default();
        trun.set_entries(entries)?;
        Ok(trun)
    }

    pub fn entries(&self) -> &[TrunEntry] {
        &self.entries
    }

    /// Replace all entries; fails when they do not share one shape.
    pub fn set_entries(&mut self, entries: Vec<TrunEntry>) -> Result<()> {
        check_uniform(&entries)?;
        if let Some(first) = entries.first() {
            self.sample_fields = first.flags();
        }
        self.entries = entries;
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.entries.len()
    }

    pub fn flags(&self) -> TrunFlags {
        let mut flags = self
            .entries
            .first()
            .map(TrunEntry::flags)
            .unwrap_or(self.sample_fields);
        flags.set(TrunFlags::DATA_OFFSET_PRESENT, self.data_offset.is_some());
        flags.set(
            TrunFlags::FIRST_SAMPLE_FLAGS_PRESENT,
            self.first_sample_flags.is_some(),
        );
        flags
    }
}

fn check_uniform(entries: &[TrunEntry]) -> Result<()> {
    let Some(first) = entries.first() else {
        return Ok(());
    };
    let expected = first.flags();
    match entries.iter().position(|e| e.flags() != expected) {
        Some(index) => Err(Error::validation(format!(
            "trun entry {} has fields {:?}, expected {:?}",
            index,
            entries[index].flags(),
            expected
        ))),
        None => Ok(()),
    }
}

impl TypedBox for Trun {
    const ATOM_TYPE: AtomType = AtomType::TRUN;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0, 1])?;

        let raw = header.flags();
        let flags = TrunFlags::from_bits_truncate(raw);
        if flags.bits() != raw {
            debug!("trun flags 0x{:06X} carry unrecognized bits", raw);
            reader.require_rewrite();
        }

        let count_at = reader.position();
        let sample_count = reader.read_u32("sample_count")?;
        let data_offset = flags
            .contains(TrunFlags::DATA_OFFSET_PRESENT)
            .then(|| reader.read_i32("data_offset"))
            .transpose()?;
        let first_sample_flags = flags
            .contains(TrunFlags::FIRST_SAMPLE_FLAGS_PRESENT)
            .then(|| reader.read_u32("first_sample_flags"))
            .transpose()?;

        let needed = sample_count as u64 * flags.entry_size();
        if needed > reader.remaining() {
            return Err(reader.error_at(
                count_at,
                format!(
                    "sample_count {} needs {} bytes but only {} remain",
                    sample_count,
                    needed,
                    reader.remaining()
                ),
            ));
        }

        let mut entries = Vec::with_capacity(sample_count as usize);
        for _ in 0..sample_count {
            let duration = flags
                .contains(TrunFlags::SAMPLE_DURATION_PRESENT)
                .then(|| reader.read_u32("sample_duration"))
                .transpose()?;
            let size = flags
                .contains(TrunFlags::SAMPLE_SIZE_PRESENT)
                .then(|| reader.read_u32("sample_size"))
                .transpose()?;
            let sample_flags = flags
                .contains(TrunFlags::SAMPLE_FLAGS_PRESENT)
                .then(|| reader.read_u32("sample_flags"))
                .transpose()?;
            let composition_offset = flags
                .contains(TrunFlags::SAMPLE_COMPOSITION_TIME_OFFSETS_PRESENT)
                .then(|| reader.read_i32("sample_composition_time_offset"))
                .transpose()?;

            entries.push(TrunEntry {
                duration,
                size,
                flags: sample_flags,
                composition_offset,
            });
        }

        Ok(Self {
            version: header.version(),
            data_offset,
            first_sample_flags,
            entries,
            sample_fields: flags.intersection(TrunFlags::PER_SAMPLE),
        })
    }

    fn content_size(&self) -> u64 {
        let flags = self.flags();
        let mut size = FullBoxHeader::SIZE + 4; // sample_count
        if self.data_offset.is_some() {
            size += 4;
        }
        if self.first_sample_flags.is_some() {
            size += 4;
        }
        size + self.entries.len() as u64 * flags.entry_size()
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        write_full_header(writer, self.version, self.flags().bits())?;
        writer.write_u32::<BigEndian>(self.entries.len() as u32)?;

        if let Some(data_offset) = self.data_offset {
            writer.write_i32::<BigEndian>(data_offset)?;
        }
        if let Some(first_sample_flags) = self.first_sample_flags {
            writer.write_u32::<BigEndian>(first_sample_flags)?;
        }

        for entry in &self.entries {
            if let Some(duration) = entry.duration {
                writer.write_u32::<BigEndian>(duration)?;
            }
            if let Some(size) = entry.size {
                writer.write_u32::<BigEndian>(size)?;
            }
            if let Some(flags) = entry.flags {
                writer.write_u32::<BigEndian>(flags)?;
            }
            if let Some(offset) = entry.composition_offset {
                writer.write_i32::<BigEndian>(offset)?;
            }
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_uniform(&self.entries)?;
        if self.entries.len() > u32::MAX as usize {
            return Err(Error::validation("trun has more than 2^32-1 samples"));
        }
        Ok(())
    }
}
