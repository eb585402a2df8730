//! Smooth Streaming fragment timing (`uuid` 6d1d9b05-42d5-44e6-80e2-141daff757b2).

use super::{check_version, needs_64_bits, TypedBox};
use crate::atom::{write_full_header, AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Read, Seek, Write};
use uuid::Uuid;

pub const TFXD_UUID: Uuid = Uuid::from_u128(0x6d1d9b05_42d5_44e6_80e2_141daff757b2);

/// Absolute time and duration of the fragment, in track timescale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tfxd {
    version: u8,
    flags: u32,
    fragment_absolute_time: u64,
    fragment_duration: u64,
}

impl Tfxd {
    pub fn new(fragment_absolute_time: u64, fragment_duration: u64) -> Self {
        let mut tfxd = Self {
            version: 0,
            flags: 0,
            fragment_absolute_time: 0,
            fragment_duration: 0,
        };
        tfxd.set_times(fragment_absolute_time, fragment_duration);
        tfxd
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn fragment_absolute_time(&self) -> u64 {
        self.fragment_absolute_time
    }

    pub fn fragment_duration(&self) -> u64 {
        self.fragment_duration
    }

    pub fn set_times(&mut self, fragment_absolute_time: u64, fragment_duration: u64) {
        if needs_64_bits(fragment_absolute_time) || needs_64_bits(fragment_duration) {
            self.version = 1;
        }
        self.fragment_absolute_time = fragment_absolute_time;
        self.fragment_duration = fragment_duration;
    }
}

impl TypedBox for Tfxd {
    const ATOM_TYPE: AtomType = AtomType::UUID;
    const EXTENDED_TYPE: Option<Uuid> = Some(TFXD_UUID);

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let header = FullBoxHeader::read(reader)?;
        check_version(reader, header.version(), &[0, 1])?;

        let (fragment_absolute_time, fragment_duration) = if header.version() == 1 {
            (
                reader.read_u64("fragment_absolute_time")?,
                reader.read_u64("fragment_duration")?,
            )
        } else {
            (
                reader.read_u32("fragment_absolute_time")? as u64,
                reader.read_u32("fragment_duration")? as u64,
            )
        };

        Ok(Self {
            version: header.version(),
            flags: header.flags(),
            fragment_absolute_time,
            fragment_duration,
        })
    }

    fn content_size(&self) -> u64 {
        FullBoxHeader::SIZE + if self.version == 1 { 16 } else { 8 }
    }

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        write_full_header(writer, self.version, self.flags)?;
        if self.version == 1 {
            writer.write_u64::<BigEndian>(self.fragment_absolute_time)?;
            writer.write_u64::<BigEndian>(self.fragment_duration)
        } else {
            writer.write_u32::<BigEndian>(self.fragment_absolute_time as u32)?;
            writer.write_u32::<BigEndian>(self.fragment_duration as u32)
        }
    }
}
