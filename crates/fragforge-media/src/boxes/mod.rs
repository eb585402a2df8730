//! Concrete box types and the [`Payload`] sum type that holds them.
//!
//! Fragment boxes (`moof` tree and `mdat`) are fully editable. Movie boxes
//! (`moov` tree) are parsed for read access and written back unchanged.

mod hdlr;
mod mdat;
mod mdhd;
mod mfhd;
mod mvhd;
mod sdtp;
mod tfdt;
mod tfhd;
mod tfxd;
mod tkhd;
mod trex;
mod trun;

pub use hdlr::Hdlr;
pub use mdat::Mdat;
pub use mdhd::{Language, Mdhd};
pub use mfhd::Mfhd;
pub use mvhd::Mvhd;
pub use sdtp::{Sdtp, SdtpEntry};
pub use tfdt::Tfdt;
pub use tfhd::{Tfhd, TfhdFlags};
pub use tfxd::{Tfxd, TFXD_UUID};
pub use tkhd::Tkhd;
pub use trex::Trex;
pub use trun::{Trun, TrunEntry, TrunFlags};

use crate::atom::{AtomType, FullBoxHeader};
use crate::io::BoxReader;
use crate::{Error, Result};
use std::io::{self, Read, Seek, Write};
use uuid::Uuid;

/// A box type with its own field layout.
///
/// `read_body` starts right after the box header (including the FullBox
/// version/flags where applicable) and must consume the whole body.
/// `content_size` and `write_body` cover the same bytes.
pub trait TypedBox: Sized + Into<Payload> + PayloadVariant {
    const ATOM_TYPE: AtomType;

    /// Set for boxes identified by a GUID behind a `uuid` compact type.
    const EXTENDED_TYPE: Option<Uuid> = None;

    fn read_body<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self>;

    fn content_size(&self) -> u64;

    fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;

    /// Reject states that cannot be serialized.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Projection from [`Payload`] to one of its variants.
pub trait PayloadVariant {
    fn from_payload(payload: &Payload) -> Option<&Self>;
    fn from_payload_mut(payload: &mut Payload) -> Option<&mut Self>;
}

macro_rules! payloads {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// What an atom carries besides its header.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Payload {
            /// Unregistered type; the raw body stays on the atom.
            Opaque,
            /// Registered container; the content is the child list.
            Container,
            $($variant($ty),)*
        }

        impl Payload {
            pub fn content_size(&self) -> u64 {
                match self {
                    Payload::Opaque | Payload::Container => 0,
                    $(Payload::$variant(b) => b.content_size(),)*
                }
            }

            pub(crate) fn write_body<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
                match self {
                    Payload::Opaque | Payload::Container => Ok(()),
                    $(Payload::$variant(b) => b.write_body(writer),)*
                }
            }

            pub fn validate(&self) -> Result<()> {
                match self {
                    Payload::Opaque | Payload::Container => Ok(()),
                    $(Payload::$variant(b) => b.validate(),)*
                }
            }
        }

        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$variant(value)
                }
            }

            impl PayloadVariant for $ty {
                fn from_payload(payload: &Payload) -> Option<&Self> {
                    match payload {
                        Payload::$variant(b) => Some(b),
                        _ => None,
                    }
                }

                fn from_payload_mut(payload: &mut Payload) -> Option<&mut Self> {
                    match payload {
                        Payload::$variant(b) => Some(b),
                        _ => None,
                    }
                }
            }
        )*
    };
}

payloads! {
    Mfhd(Mfhd),
    Tfhd(Tfhd),
    Trun(Trun),
    Tfdt(Tfdt),
    Sdtp(Sdtp),
    Tfxd(Tfxd),
    Mdat(Mdat),
    Mvhd(Mvhd),
    Tkhd(Tkhd),
    Trex(Trex),
    Hdlr(Hdlr),
    Mdhd(Mdhd),
}

/// Whether a 64-bit value needs a version-1 (64-bit) field layout.
pub(crate) fn needs_64_bits(value: u64) -> bool {
    value > u32::MAX as u64
}

/// Reject FullBox flags that do not fit the 24-bit field.
pub(crate) fn check_flags(atom_type: AtomType, flags: u32) -> Result<()> {
    if flags > FullBoxHeader::MAX_FLAGS {
        return Err(Error::validation(format!(
            "{} flags 0x{:X} do not fit in 24 bits",
            atom_type, flags
        )));
    }
    Ok(())
}

/// Fail with a deserialize error for an unsupported FullBox version.
pub(crate) fn check_version<R: Read + Seek>(
    reader: &BoxReader<R>,
    version: u8,
    supported: &[u8],
) -> Result<()> {
    if supported.contains(&version) {
        Ok(())
    } else {
        Err(reader.error_at(
            reader.position().saturating_sub(4),
            format!("unsupported version {}", version),
        ))
    }
}
