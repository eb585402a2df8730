//! Media data (`mdat`).

use super::TypedBox;
use crate::atom::AtomType;
use crate::io::BoxReader;
use crate::Result;
use bytes::Bytes;
use std::io::{self, Read, Seek, Write};

/// Raw sample bytes. Not a FullBox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mdat {
    pub data: Bytes,
}

impl Mdat {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl TypedBox for Mdat {
    const ATOM_TYPE: AtomType = AtomType::MDAT;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let data = reader.read_to_end("media data")?;
        Ok(Self { data })
    }

    fn content_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.data)
    }
}
