//! Whole-file view: top-level atoms grouped into fragments.

use crate::atom::{Atom, AtomType};
use crate::fragment::{Fragment, FragmentOptions};
use crate::io::BoxReader;
use crate::{registry, Error, Result};
use std::io::{Read, Seek, Write};
use tracing::debug;

/// One top-level item of a fragmented MP4 stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    /// A `moof` and the `mdat` right after it.
    Fragment(Fragment),
    /// Anything else (`ftyp`, `moov`, `styp`, `sidx`, ...), passed through.
    Atom(Atom),
}

impl TopLevel {
    pub fn atom_type(&self) -> AtomType {
        match self {
            TopLevel::Fragment(_) => AtomType::MOOF,
            TopLevel::Atom(atom) => atom.atom_type(),
        }
    }
}

/// Parse every top-level atom until the end of the stream.
pub fn read_atoms<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Vec<(u64, Atom)>> {
    let mut atoms = Vec::new();
    while !reader.is_empty() {
        let offset = reader.file_offset();
        let atom = registry::parse_atom(reader)?;
        atoms.push((offset, atom));
    }
    debug!("read {} top-level atoms", atoms.len());
    Ok(atoms)
}

/// Pair each `moof` with the `mdat` that immediately follows it.
///
/// Takes atoms with their file offsets, as returned by [`read_atoms`], so a
/// dangling `moof` can be reported where it sits.
pub fn split_fragments(
    atoms: Vec<(u64, Atom)>,
    options: FragmentOptions,
) -> Result<Vec<TopLevel>> {
    let mut items = Vec::with_capacity(atoms.len());
    let mut atoms = atoms.into_iter().peekable();

    while let Some((offset, atom)) = atoms.next() {
        if atom.atom_type() != AtomType::MOOF {
            items.push(TopLevel::Atom(atom));
            continue;
        }

        match atoms.next_if(|(_, next)| next.atom_type() == AtomType::MDAT) {
            Some((_, data)) => {
                let fragment = Fragment::new(atom, data)?.with_options(options);
                items.push(TopLevel::Fragment(fragment));
            }
            None => {
                return Err(Error::deserialize(
                    "moof",
                    offset,
                    "movie fragment is not followed by mdat",
                ));
            }
        }
    }

    Ok(items)
}

/// Read a stream and group it into fragments.
pub fn read_stream<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    options: FragmentOptions,
) -> Result<Vec<TopLevel>> {
    let atoms = read_atoms(reader)?;
    split_fragments(atoms, options)
}

/// Write items back out in order. Fragments have their data offsets
/// recomputed; `set_sample_defaults` additionally runs default inference.
pub fn write_stream<W: Write + ?Sized>(
    items: &mut [TopLevel],
    writer: &mut W,
    set_sample_defaults: bool,
) -> Result<()> {
    for item in items {
        match item {
            TopLevel::Fragment(fragment) => fragment.write_to(writer, set_sample_defaults)?,
            TopLevel::Atom(atom) => atom.write_to(writer)?,
        }
    }
    Ok(())
}
