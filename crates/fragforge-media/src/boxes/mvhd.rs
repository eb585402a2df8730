//! Movie header (`mvhd`).

use super::{check_version, needs_64_bits, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

/// Bytes after `volume`: reserved(10) + matrix(36) + pre_defined(24).
const TRAILER_LEN: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mvhd {
    version: u8,
    flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// 16.16 fixed point.
    pub rate: i32,
    /// 8.8 fixed point.
    pub volume: i16,
    trailer: [u8; TRAILER_LEN],
    pub next_track_id: u32,
}

impl Mvhd {
    /// On-disk version, 1 when any time no longer fits 32 bits.
    pub fn version(&self) -> u8 {
        if self.version == 1
            || needs_64_bits(self.creation_time)
            || needs_64_bits(self.modification_time)
            || needs_64_bits(self.duration)
        {
            1
        } else {
            0
        }
    }
}

impl TypedBox for Mvhd {
    const ATOM_TYPE: AtomType = AtomType::MVHD;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0, 1])?;

        let (creation_time, modification_time, timescale, duration) = if header.version() == 1 {
            (
                reader.read_u64("creation_time")?,
                reader.read_u64("modification_time")?,
                reader.read_u32("timescale")?,
                reader.read_u64("duration")?,
            )
        } else {
            (
                reader.read_u32("creation_time")? as u64,
                reader.read_u32("modification_time")? as u64,
                reader.read_u32("timescale")?,
                reader.read_u32("duration")? as u64,
            )
        };

        Ok(Self {
            version: header.version(),
            flags: header.flags(),
            creation_time,
            modification_time,
            timescale,
            duration,
            rate: reader.read_i32("rate")?,
            volume: reader.read_i16("volume")?,
            trailer: reader.read_array("matrix")?,
            next_track_id: reader.read_u32("next_track_ID")?,
        })
    }

    fn content_size(&self) -> u64 {
        let times = if self.version() == 1 { 28 } else { 16 };
        FullBoxHeader::SIZE + times + 4 + 2 + TRAILER_LEN as u64 + 4
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let version = self.version();
        write_full_header(writer, version, self.flags)?;
        if version == 1 {
            writer.write_u64::<BigEndian>(self.creation_time)?;
            writer.write_u64::<BigEndian>(self.modification_time)?;
            writer.write_u32::<BigEndian>(self.timescale)?;
            writer.write_u64::<BigEndian>(self.duration)?;
        } else {
            writer.write_u32::<BigEndian>(self.creation_time as u32)?;
            writer.write_u32::<BigEndian>(self.modification_time as u32)?;
            writer.write_u32::<BigEndian>(self.timescale)?;
            writer.write_u32::<BigEndian>(self.duration as u32)?;
        }
        writer.write_i32::<BigEndian>(self.rate)?;
        writer.write_i16::<BigEndian>(self.volume)?;
        writer.write_all(&self.trailer)?;
        writer.write_u32::<BigEndian>(self.next_track_id)
    }
}
