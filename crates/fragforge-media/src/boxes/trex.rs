//! Track extends (`trex`).

use super::{check_version, TypedBox};
use crate::atom::{AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

/// Movie-level sample defaults for a track's fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trex {
    pub header: FullBoxHeader,
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl Trex {
    pub fn new(track_id: u32) -> Self {
        Self {
            header: FullBoxHeader::default(),
            track_id,
            default_sample_description_index: 1,
            default_sample_duration: 0,
            default_sample_size: 0,
            default_sample_flags: 0,
        }
    }
}

impl TypedBox for Trex {
    const ATOM_TYPE: AtomType = AtomType::TREX;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0])?;
        Ok(Self {
            header,
            track_id: reader.read_u32("track_ID")?,
            default_sample_description_index: reader
                .read_u32("default_sample_description_index")?,
            default_sample_duration: reader.read_u32("default_sample_duration")?,
            default_sample_size: reader.read_u32("default_sample_size")?,
            default_sample_flags: reader.read_u32("default_sample_flags")?,
        })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + 20
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.header.write(writer)?;
        writer.write_u32::<BigEndian>(self.track_id)?;
        writer.write_u32::<BigEndian>(self.default_sample_description_index)?;
        writer.write_u32::<BigEndian>(self.default_sample_duration)?;
        writer.write_u32::<BigEndian>(self.default_sample_size)?;
        writer.write_u32::<BigEndian>(self.default_sample_flags)
    }
}
