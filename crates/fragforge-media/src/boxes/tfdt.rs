//! Track fragment decode time (`tfdt`).

use super::{check_version, needs_64_bits, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};

/// Decode time of the first sample in the track fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tfdt {
    version: u8,
    flags: u32,
    base_media_decode_time: u64,
}

impl Tfdt {
    pub fn new(base_media_decode_time: u64) -> Self {
        let mut tfdt = Self {
            version: 0,
            flags: 0,
            base_media_decode_time: 0,
        };
        tfdt.set_base_media_decode_time(base_media_decode_time);
        tfdt
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn base_media_decode_time(&self) -> u64 {
        self.base_media_decode_time
    }

    /// Set the decode time, switching to the 64-bit layout if needed.
    pub fn set_base_media_decode_time(&mut self, time: u64) {
        if needs_64_bits(time) {
            self.version = 1;
        }
        self.base_media_decode_time = time;
    }
}

impl TypedBox for Tfdt {
    const ATOM_TYPE: AtomType = AtomType::TFDT;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0, 1])?;

        let base_media_decode_time = if header.version() == 1 {
            reader.read_u64("base_media_decode_time")?
        } else {
            reader.read_u32("base_media_decode_time")? as u64
        };

        Ok(Self {
            version: header.version(),
            flags: header.flags(),
            base_media_decode_time,
        })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + if self.version == 1 { 8 } else { 4 }
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        write_full_header(writer, self.version, self.flags)?;
        if self.version == 1 {
            writer.write_u64::<BigEndian>(self.base_media_decode_time)
        } else {
            writer.write_u32::<BigEndian>(self.base_media_decode_time as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_widens_for_large_times() {
        let mut tfdt = Tfdt::new(90_000);
        assert_eq!(tfdt.version(), 0);
        assert_eq!(tfdt.content_size(), 8);

        tfdt.set_base_media_decode_time(1 << 33);
        assert_eq!(tfdt.version(), 1);
        assert_eq!(tfdt.content_size(), 12);

        // Stays 64-bit once widened.
        tfdt.set_base_media_decode_time(1);
        assert_eq!(tfdt.version(), 1);
    }

    #[test]
    fn test_reads_version_1() {
        let mut bytes = vec![1, 0, 0, 0];
        bytes.extend_from_slice(&0x1_0000_0000u64.to_be_bytes());
        let mut reader = BoxReader::new(Cursor::new(bytes)).unwrap();
        let tfdt = Tfdt::read_body(&mut reader).unwrap();
        assert_eq!(tfdt.base_media_decode_time(), 0x1_0000_0000);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let bytes = vec![2, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = BoxReader::new(Cursor::new(bytes)).unwrap();
        assert!(Tfdt::read_body(&mut reader).is_err());
    }
}
