//! Independent and disposable samples (`sdtp`).

use super::{check_version, TypedBox};
use crate::atom::{AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::{Error, Result};
use std::io::{self, Read, Seek, Write};

/// Dependency description of one sample, four 2-bit fields packed in a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdtpEntry(u8);

impl SdtpEntry {
    pub fn new(
        is_leading: u8,
        sample_depends_on: u8,
        sample_is_depended_on: u8,
        sample_has_redundancy: u8,
    ) -> Result<Self> {
        let fields = [
            ("is_leading", is_leading),
            ("sample_depends_on", sample_depends_on),
            ("sample_is_depended_on", sample_is_depended_on),
            ("sample_has_redundancy", sample_has_redundancy),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| *v > 3) {
            return Err(Error::validation(format!(
                "sdtp {} must be in 0..=3, got {}",
                name, value
            )));
        }

        Ok(Self(
            is_leading << 6
                | sample_depends_on << 4
                | sample_is_depended_on << 2
                | sample_has_redundancy,
        ))
    }

    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn is_leading(self) -> u8 {
        self.0 >> 6
    }

    pub fn sample_depends_on(self) -> u8 {
        (self.0 >> 4) & 0b11
    }

    pub fn sample_is_depended_on(self) -> u8 {
        (self.0 >> 2) & 0b11
    }

    pub fn sample_has_redundancy(self) -> u8 {
        self.0 & 0b11
    }
}

/// One entry per sample of the enclosing track fragment. The count is not
/// stored; it is whatever remains of the box body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sdtp {
    pub header: FullBoxHeader,
    pub entries: Vec<SdtpEntry>,
}

impl Sdtp {
    pub fn new(entries: Vec<SdtpEntry>) -> Self {
        Self {
            header: FullBoxHeader::default(),
            entries,
        }
    }
}

impl TypedBox for Sdtp {
    const ATOM_TYPE: AtomType = AtomType::SDTP;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0])?;
        let entries = reader
            .read_to_end("sample dependency entries")?
            .iter()
            .copied()
            .map(SdtpEntry::from_byte)
            .collect();
        Ok(Self { header, entries })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + self.entries.len() as u64
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.header.write(writer)?;
        let bytes: Vec<u8> = self.entries.iter().map(|e| e.to_byte()).collect();
        writer.write_all(&bytes)
    }
}
