//! Track header (`tkhd`).

use super::{check_flags, check_version, needs_64_bits, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tkhd {
    version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: i16,
    pub matrix: [u8; 36],
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
}

impl Tkhd {
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

    pub fn is_enabled(&self) -> bool {
        self.flags & 0x1 != 0
    }

    /// Integer part of the presentation size.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width >> 16, self.height >> 16)
    }
}

impl TypedBox for Tkhd {
    const ATOM_TYPE: AtomType = AtomType::TKHD;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0, 1])?;
        let wide = header.version() == 1;

        let creation_time;
        let modification_time;
        let track_id;
        let mut reserved;
        let duration;
        if wide {
            creation_time = reader.read_u64("creation_time")?;
            modification_time = reader.read_u64("modification_time")?;
            track_id = reader.read_u32("track_ID")?;
            reserved = reader.read_u32("reserved")? as u64;
            duration = reader.read_u64("duration")?;
        } else {
            creation_time = reader.read_u32("creation_time")? as u64;
            modification_time = reader.read_u32("modification_time")? as u64;
            track_id = reader.read_u32("track_ID")?;
            reserved = reader.read_u32("reserved")? as u64;
            duration = reader.read_u32("duration")? as u64;
        }
        reserved |= reader.read_u64("reserved")?;

        let layer = reader.read_i16("layer")?;
        let alternate_group = reader.read_i16("alternate_group")?;
        let volume = reader.read_i16("volume")?;
        reserved |= reader.read_u16("reserved")? as u64;

        // Reserved bits are written back as zero.
        if reserved != 0 {
            reader.require_rewrite();
        }

        Ok(Self {
            version: header.version(),
            flags: header.flags(),
            creation_time,
            modification_time,
            track_id,
            duration,
            layer,
            alternate_group,
            volume,
            matrix: reader.read_array("matrix")?,
            width: reader.read_u32("width")?,
            height: reader.read_u32("height")?,
        })
    }

    fn content_size(&self) -> u64 {
        let times = if self.version() == 1 { 32 } else { 20 };
        FullBoxHeader::SIZE + times + 8 + 8 + 36 + 8
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        let version = self.version();
        write_full_header(writer, version, self.flags)?;
        if version == 1 {
            writer.write_u64::<BigEndian>(self.creation_time)?;
            writer.write_u64::<BigEndian>(self.modification_time)?;
            writer.write_u32::<BigEndian>(self.track_id)?;
            writer.write_u32::<BigEndian>(0)?;
            writer.write_u64::<BigEndian>(self.duration)?;
        } else {
            writer.write_u32::<BigEndian>(self.creation_time as u32)?;
            writer.write_u32::<BigEndian>(self.modification_time as u32)?;
            writer.write_u32::<BigEndian>(self.track_id)?;
            writer.write_u32::<BigEndian>(0)?;
            writer.write_u32::<BigEndian>(self.duration as u32)?;
        }
        writer.write_u64::<BigEndian>(0)?;
        writer.write_i16::<BigEndian>(self.layer)?;
        writer.write_i16::<BigEndian>(self.alternate_group)?;
        writer.write_i16::<BigEndian>(self.volume)?;
        writer.write_u16::<BigEndian>(0)?;
        writer.write_all(&self.matrix)?;
        writer.write_u32::<BigEndian>(self.width)?;
        writer.write_u32::<BigEndian>(self.height)
    }

    fn validate(&self) -> Result<()> {
        check_flags(Self::ATOM_TYPE, self.flags)
    }
}
