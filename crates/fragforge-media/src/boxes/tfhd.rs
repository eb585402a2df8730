//! Track fragment header (`tfhd`).

use super::{check_version, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};
use tracing::debug;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TfhdFlags: u32 {
        const BASE_DATA_OFFSET_PRESENT = 0x000001;
        const SAMPLE_DESCRIPTION_INDEX_PRESENT = 0x000002;
        const DEFAULT_SAMPLE_DURATION_PRESENT = 0x000008;
        const DEFAULT_SAMPLE_SIZE_PRESENT = 0x000010;
        const DEFAULT_SAMPLE_FLAGS_PRESENT = 0x000020;
        const DURATION_IS_EMPTY = 0x010000;
        const DEFAULT_BASE_IS_MOOF = 0x020000;
    }
}

/// Per-fragment defaults for one track.
///
/// The flags word is never stored: it is derived from which optional
/// fields are set whenever the box is sized or written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tfhd {
    pub version: u8,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub duration_is_empty: bool,
    pub default_base_is_moof: bool,
}

impl Tfhd {
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            ..Default::default()
        }
    }

    pub fn flags(&self) -> TfhdFlags {
        let mut flags = TfhdFlags::empty();
        flags.set(
            TfhdFlags::BASE_DATA_OFFSET_PRESENT,
            self.base_data_offset.is_some(),
        );
        flags.set(
            TfhdFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT,
            self.sample_description_index.is_some(),
        );
        flags.set(
            TfhdFlags::DEFAULT_SAMPLE_DURATION_PRESENT,
            self.default_sample_duration.is_some(),
        );
        flags.set(
            TfhdFlags::DEFAULT_SAMPLE_SIZE_PRESENT,
            self.default_sample_size.is_some(),
        );
        flags.set(
            TfhdFlags::DEFAULT_SAMPLE_FLAGS_PRESENT,
            self.default_sample_flags.is_some(),
        );
        flags.set(TfhdFlags::DURATION_IS_EMPTY, self.duration_is_empty);
        flags.set(TfhdFlags::DEFAULT_BASE_IS_MOOF, self.default_base_is_moof);
        flags
    }
}

impl TypedBox for Tfhd {
    const ATOM_TYPE: AtomType = AtomType::TFHD;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0])?;

        let raw = header.flags();
        let flags = TfhdFlags::from_bits_truncate(raw);
        if flags.bits() != raw {
            // Unknown bits are not carried through a rewrite.
            debug!(
                "tfhd flags 0x{:06X} carry unrecognized bits 0x{:06X}",
                raw,
                raw & !TfhdFlags::all().bits()
            );
            reader.require_rewrite();
        }

        let track_id = reader.read_u32("track_id")?;
        let base_data_offset = flags
            .contains(TfhdFlags::BASE_DATA_OFFSET_PRESENT)
            .then(|| reader.read_u64("base_data_offset"))
            .transpose()?;
        let sample_description_index = flags
            .contains(TfhdFlags::SAMPLE_DESCRIPTION_INDEX_PRESENT)
            .then(|| reader.read_u32("sample_description_index"))
            .transpose()?;
        let default_sample_duration = flags
            .contains(TfhdFlags::DEFAULT_SAMPLE_DURATION_PRESENT)
            .then(|| reader.read_u32("default_sample_duration"))
            .transpose()?;
        let default_sample_size = flags
            .contains(TfhdFlags::DEFAULT_SAMPLE_SIZE_PRESENT)
            .then(|| reader.read_u32("default_sample_size"))
            .transpose()?;
        let default_sample_flags = flags
            .contains(TfhdFlags::DEFAULT_SAMPLE_FLAGS_PRESENT)
            .then(|| reader.read_u32("default_sample_flags"))
            .transpose()?;

        Ok(Self {
            version: header.version(),
            track_id,
            base_data_offset,
            sample_description_index,
            default_sample_duration,
            default_sample_size,
            default_sample_flags,
            duration_is_empty: flags.contains(TfhdFlags::DURATION_IS_EMPTY),
            default_base_is_moof: flags.contains(TfhdFlags::DEFAULT_BASE_IS_MOOF),
        })
    }

    fn content_size(&self) -> u64 {
        let mut size = FullBoxHeader::SIZE + 4; // track_ID

        if self.base_data_offset.is_some() {
            size += 8;
        }

        for field in [
            self.sample_description_index,
            self.default_sample_duration,
            self.default_sample_size,
            self.default_sample_flags,
        ] {
            if field.is_some() {
                size += 4;
            }
        }

        size
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        write_full_header(writer, self.version, self.flags().bits())?;
        writer.write_u32::<BigEndian>(self.track_id)?;

        if let Some(base_data_offset) = self.base_data_offset {
            writer.write_u64::<BigEndian>(base_data_offset)?;
        }

        if let Some(sample_description_index) = self.sample_description_index {
            writer.write_u32::<BigEndian>(sample_description_index)?;
        }

        if let Some(default_sample_duration) = self.default_sample_duration {
            writer.write_u32::<BigEndian>(default_sample_duration)?;
        }

        if let Some(default_sample_size) = self.default_sample_size {
            writer.write_u32::<BigEndian>(default_sample_size)?;
        }

        if let Some(default_sample_flags) = self.default_sample_flags {
            writer.write_u32::<BigEndian>(default_sample_flags)?;
        }

        Ok(())
    }
}
