//! Media header (`mdhd`).

use super::{check_flags, check_version, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::{Error, Result};
use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Seek, Write};
use tracing::debug;

/// ISO-639-2/T language code packed as three 5-bit letters offset by 0x60.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Language([u8; 3]);

impl Language {
    /// `und`, undetermined.
    pub const UNDETERMINED: Self = Self(*b"und");

    pub fn new(code: &str) -> Result<Self> {
        let bytes: [u8; 3] = code
            .as_bytes()
            .try_into()
            .map_err(|_| Error::validation(format!("language code {:?} is not 3 letters", code)))?;
        if !bytes.iter().all(u8::is_ascii_lowercase) {
            return Err(Error::validation(format!(
                "language code {:?} must be lowercase ASCII",
                code
            )));
        }
        Ok(Self(bytes))
    }

    /// Unpack the 15-bit on-disk form; `None` when a letter is out of range.
    pub fn from_packed(packed: u16) -> Option<Self> {
        let mut letters = [0u8; 3];
        for (i, letter) in letters.iter_mut().enumerate() {
            let bits = ((packed >> (10 - 5 * i)) & 0x1F) as u8;
            if !(1..=26).contains(&bits) {
                return None;
            }
            *letter = bits + 0x60;
        }
        Some(Self(letters))
    }

    pub fn to_packed(self) -> u16 {
        self.0
            .iter()
            .fold(0u16, |acc, c| (acc << 5) | (c - 0x60) as u16)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("und")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Language({})", self.as_str())
    }
}

/// Always serialized as version 1. A version 0 box parses fine but comes
/// back dirty, since it cannot be reproduced byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mdhd {
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub language: Language,
    pub pre_defined: u16,
}

impl Mdhd {
    pub fn new(timescale: u32, duration: u64) -> Self {
        Self {
            flags: 0,
            creation_time: 0,
            modification_time: 0,
            timescale,
            duration,
            language: Language::UNDETERMINED,
            pre_defined: 0,
        }
    }
}

impl TypedBox for Mdhd {
    const ATOM_TYPE: AtomType = AtomType::MDHD;

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
            debug!("mdhd version 0 will be rewritten as version 1");
            reader.require_rewrite();
            (
                reader.read_u32("creation_time")? as u64,
                reader.read_u32("modification_time")? as u64,
                reader.read_u32("timescale")?,
                reader.read_u32("duration")? as u64,
            )
        };

        let language_at = reader.position();
        let packed = reader.read_u16("language")?;
        if packed & 0x8000 != 0 {
            return Err(reader.error_at(language_at, "language pad bit is set"));
        }
        let language = Language::from_packed(packed).ok_or_else(|| {
            reader.error_at(
                language_at,
                format!("language 0x{:04X} is not a valid ISO-639-2/T code", packed),
            )
        })?;
        let pre_defined = reader.read_u16("pre_defined")?;

        Ok(Self {
            flags: header.flags(),
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
            pre_defined,
        })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + 8 + 8 + 4 + 8 + 2 + 2
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        write_full_header(writer, 1, self.flags)?;
        writer.write_u64::<BigEndian>(self.creation_time)?;
        writer.write_u64::<BigEndian>(self.modification_time)?;
        writer.write_u32::<BigEndian>(self.timescale)?;
        writer.write_u64::<BigEndian>(self.duration)?;
        writer.write_u16::<BigEndian>(self.language.to_packed())?;
        writer.write_u16::<BigEndian>(self.pre_defined)
    }

    fn validate(&self) -> Result<()> {
        check_flags(Self::ATOM_TYPE, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_language_packing() {
        let eng = Language::new("eng").unwrap();
        assert_eq!(eng.to_packed(), 0x15C7);
        assert_eq!(Language::from_packed(0x15C7), Some(eng));
        assert_eq!(Language::UNDETERMINED.to_packed(), 0x55C4);

        assert!(Language::new("EN").is_err());
        assert!(Language::from_packed(0).is_none());
        // 27 in the last letter slot.
        assert!(Language::from_packed(0x15DB).is_none());
    }

    #[test]
    fn test_version_0_is_widened_and_forces_rewrite() {
        let mut body = vec![0, 0, 0, 0];
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&48_000u32.to_be_bytes());
        body.extend_from_slice(&96_000u32.to_be_bytes());
        body.extend_from_slice(&0x15C7u16.to_be_bytes());
        body.extend_from_slice(&[0, 0]);

        let mut reader = BoxReader::new(Cursor::new(body)).unwrap();
        let mdhd = Mdhd::read_body(&mut reader).unwrap();
        assert!(reader.take_rewrite_required());
        assert_eq!(mdhd.timescale, 48_000);
        assert_eq!(mdhd.duration, 96_000);
        assert_eq!(mdhd.language.as_str(), "eng");

        let mut out = Vec::new();
        mdhd.write_body(&mut out).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(out.len() as u64, mdhd.content_size());
    }

    #[test]
    fn test_bad_language_reports_offset() {
        let mut body = vec![1, 0, 0, 0];
        body.extend_from_slice(&[0u8; 28]);
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&[0, 0]);

        let mut reader = BoxReader::with_base_offset(Cursor::new(body), 100).unwrap();
        match Mdhd::read_body(&mut reader).unwrap_err() {
            Error::Deserialize { offset, .. } => assert_eq!(offset, 132),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
