//! Movie fragment header (`mfhd`).

use super::{check_version, TypedBox};
use crate::atom::{AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mfhd {
    pub header: FullBoxHeader,
    pub sequence_number: u32,
}

impl Mfhd {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            header: FullBoxHeader::default(),
            sequence_number,
        }
    }
}

impl TypedBox for Mfhd {
    const ATOM_TYPE: AtomType = AtomType::MFHD;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0])?;
        let sequence_number = reader.read_u32("sequence_number")?;
        Ok(Self {
            header,
            sequence_number,
        })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.header.write(writer)?;
        writer.write_u32::<BigEndian>(self.sequence_number)
    }
}
