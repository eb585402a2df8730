//! Handler reference (`hdlr`).

use super::{check_version, TypedBox};
use crate::atom::{AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use std::io::{self, Read, Seek, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hdlr {
    pub header: FullBoxHeader,
    pub pre_defined: u32,
    /// `vide`, `soun`, `subt`, ...
    pub handler_type: AtomType,
    pub reserved: [u32; 3],
    /// Raw name bytes, usually NUL-terminated UTF-8.
    pub name: Bytes,
}

impl Hdlr {
    pub fn new(handler_type: AtomType, name: &str) -> Self {
        let mut raw = name.as_bytes().to_vec();
        raw.push(0);
        Self {
            header: FullBoxHeader::default(),
            pre_defined: 0,
            handler_type,
            reserved: [0; 3],
            name: Bytes::from(raw),
        }
    }

    /// Name up to the first NUL, lossily decoded.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl TypedBox for Hdlr {
    const ATOM_TYPE: AtomType = AtomType::HDLR;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0])?;
        let pre_defined = reader.read_u32("pre_defined")?;
        let handler_type = AtomType(reader.read_array("handler_type")?);
        let reserved = [
            reader.read_u32("reserved")?,
            reader.read_u32("reserved")?,
            reader.read_u32("reserved")?,
        ];
        let name = reader.read_to_end("name")?;
        Ok(Self {
            header,
            pre_defined,
            handler_type,
            reserved,
            name,
        })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 4 + 12 + self.name.len() as u64
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.header.write(writer)?;
        writer.write_u32::<BigEndian>(self.pre_defined)?;
        writer.write_all(&self.handler_type.0)?;
        for reserved in self.reserved {
            writer.write_u32::<BigEndian>(reserved)?;
        }
        writer.write_all(&self.name)
    }
}
