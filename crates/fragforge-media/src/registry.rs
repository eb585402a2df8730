//! Box factory: maps type codes to the routine that parses their body.
//!
//! Every atom is first read generically (header plus raw body). If its
//! compact type, or its extended type for `uuid` atoms, is registered, the
//! body is re-read through the registered routine; otherwise the raw bytes
//! stay on the atom and are written back verbatim.

use crate::atom::{describe, Atom, AtomType};
use crate::boxes::{
    Hdlr, Mdat, Mdhd, Mfhd, Mvhd, Payload, Sdtp, Tfdt, Tfhd, Tfxd, Tkhd, Trex, Trun, TypedBox,
};
use crate::field::VariableLengthField;
use crate::io::BoxReader;
use crate::{Error, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, trace, warn};
use uuid::Uuid;

type BodyReader = BoxReader<Cursor<Bytes>>;
type Upgrade = fn(&mut BodyReader) -> Result<Payload>;

fn typed<T: TypedBox>(reader: &mut BodyReader) -> Result<Payload> {
    T::read_body(reader).map(Into::into)
}

fn container(_reader: &mut BodyReader) -> Result<Payload> {
    Ok(Payload::Container)
}

fn entry<T: TypedBox>() -> (AtomType, Upgrade) {
    (T::ATOM_TYPE, typed::<T> as Upgrade)
}

/// Compact types parsed as a list of child boxes.
const CONTAINER_TYPES: [AtomType; 6] = [
    AtomType::MOOF,
    AtomType::TRAF,
    AtomType::MOOV,
    AtomType::TRAK,
    AtomType::MVEX,
    AtomType::MDIA,
];

static COMPACT_TYPES: Lazy<HashMap<AtomType, Upgrade>> = Lazy::new(|| {
    let mut table: HashMap<AtomType, Upgrade> = [
        entry::<Mfhd>(),
        entry::<Tfhd>(),
        entry::<Trun>(),
        entry::<Tfdt>(),
        entry::<Sdtp>(),
        entry::<Mdat>(),
        entry::<Mvhd>(),
        entry::<Tkhd>(),
        entry::<Trex>(),
        entry::<Hdlr>(),
        entry::<Mdhd>(),
    ]
    .into_iter()
    .collect();

    for ty in CONTAINER_TYPES {
        table.insert(ty, container as Upgrade);
    }
    table
});

static EXTENDED_TYPES: Lazy<HashMap<Uuid, Upgrade>> = Lazy::new(|| {
    let mut table: HashMap<Uuid, Upgrade> = HashMap::new();
    if let Some(uuid) = Tfxd::EXTENDED_TYPE {
        table.insert(uuid, typed::<Tfxd> as Upgrade);
    }
    table
});

fn lookup(atom_type: AtomType, extended_type: Option<Uuid>) -> Option<Upgrade> {
    match extended_type {
        Some(uuid) => EXTENDED_TYPES.get(&uuid).copied(),
        None => COMPACT_TYPES.get(&atom_type).copied(),
    }
}

/// Whether `atom_type` is parsed as a container of child boxes.
pub fn is_container_type(atom_type: AtomType) -> bool {
    CONTAINER_TYPES.contains(&atom_type)
}

/// Parse one atom and its subtree at the reader's position.
///
/// On return the reader sits just past the atom. Errors carry the absolute
/// file offset of the offending field.
pub fn parse_atom<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Atom> {
    let previous = reader.set_context("box header");
    let result = read_untyped(reader).and_then(upgrade);
    reader.set_context(previous);
    result
}

/// Parse one atom, requiring it to be a `T`.
///
/// On a type mismatch the reader is left where it started.
pub fn parse_expected<T: TypedBox, R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Atom> {
    let expected = T::EXTENDED_TYPE.map_or(T::ATOM_TYPE, |_| AtomType::UUID);
    expect_type(reader, expected, T::EXTENDED_TYPE)?;
    parse_atom(reader)
}

/// Parse one atom, requiring its compact type to be `atom_type`.
pub fn parse_expected_type<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    atom_type: AtomType,
) -> Result<Atom> {
    expect_type(reader, atom_type, None)?;
    parse_atom(reader)
}

fn expect_type<R: Read + Seek>(
    reader: &mut BoxReader<R>,
    atom_type: AtomType,
    extended_type: Option<Uuid>,
) -> Result<()> {
    let start = reader.position();
    let peeked = peek_type(reader);
    reader.seek_to(start)?;
    let (found, found_extended) = peeked?;

    let matches = found == atom_type && (extended_type.is_none() || found_extended == extended_type);
    if matches {
        Ok(())
    } else {
        Err(Error::deserialize(
            describe(found, found_extended),
            reader.file_offset_of(start),
            format!("expected {}", describe(atom_type, extended_type)),
        ))
    }
}

fn peek_type<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<(AtomType, Option<Uuid>)> {
    let size = reader.read_u32("size")?;
    let atom_type = AtomType(reader.read_array("type")?);
    if size == 1 {
        reader.read_u64("largesize")?;
    }
    let extended_type = if atom_type == AtomType::UUID {
        Some(reader.read_uuid("extended_type")?)
    } else {
        None
    };
    Ok((atom_type, extended_type))
}

/// Read the header and raw body of one atom.
///
/// Returns the atom (payload still opaque) and the file offset of its body.
fn read_untyped<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<(Atom, u64)> {
    let start = reader.position();
    let mut dirty = false;

    let compact_size = reader.read_u32("size")?;
    let atom_type = AtomType(reader.read_array("type")?);
    reader.set_context(atom_type.to_string());

    let mut size = VariableLengthField::for_box_size(compact_size as u64);
    match compact_size {
        1 => {
            let large = reader.read_u64("largesize")?;
            size.set_value(large)?;
            size.set_bit_depth(64)?;
            debug!("{} at {} has a 64-bit size {}", atom_type, start, large);
            dirty = true;
        }
        0 => {
            let to_end = reader.len() - start;
            debug!("{} at {} extends to end of stream ({} bytes)", atom_type, start, to_end);
            size.set_value(to_end)?;
            dirty = true;
        }
        _ => {}
    }

    let extended_type = if atom_type == AtomType::UUID {
        let consumed = reader.position() - start;
        if size.value() < consumed + 16 {
            return Err(reader.error_at(
                start,
                format!("declared size {} cannot hold an extended type", size.value()),
            ));
        }
        let uuid = reader.read_uuid("extended_type")?;
        reader.set_context(describe(atom_type, Some(uuid)));
        Some(uuid)
    } else {
        None
    };

    let consumed = reader.position() - start;
    if size.value() < consumed {
        return Err(reader.error_at(
            start,
            format!(
                "declared size {} is smaller than its {}-byte header",
                size.value(),
                consumed
            ),
        ));
    }

    let body_offset = reader.file_offset();
    let body = reader.read_bytes(size.value() - consumed, "body")?;

    trace!(
        "read {} at {} ({} bytes)",
        describe(atom_type, extended_type),
        reader.file_offset_of(start),
        size.value()
    );

    size.mark_clean();
    Ok((
        Atom::from_raw(size, atom_type, extended_type, body, dirty),
        body_offset,
    ))
}

/// Re-read a generic atom's body through its registered routine and, for
/// containers, parse its children.
fn upgrade((mut atom, body_offset): (Atom, u64)) -> Result<Atom> {
    let Some(read_payload) = lookup(atom.atom_type(), atom.extended_type()) else {
        debug!(
            "passing through unregistered {} at {}",
            atom.description(),
            body_offset
        );
        return Ok(atom);
    };

    let body = atom.take_body().unwrap_or_default();
    let mut reader = BoxReader::with_base_offset(Cursor::new(body), body_offset)?;
    reader.set_context(atom.description());

    let payload = read_payload(&mut reader)?;

    if matches!(payload, Payload::Container) {
        let mut children = Vec::new();
        while !reader.is_empty() {
            let before = reader.position();
            let child = parse_atom(&mut reader)?;
            if reader.position() == before {
                warn!(
                    "child of {} at {} made no progress",
                    atom.description(),
                    reader.file_offset()
                );
                break;
            }
            children.push(child);
        }
        atom.set_children(children);
    }

    if !reader.is_empty() {
        return Err(reader.error(format!(
            "failed to fully consume body, {} bytes left over",
            reader.remaining()
        )));
    }

    atom.set_payload(payload);
    atom.force_dirty(reader.take_rewrite_required());
    Ok(atom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::TFXD_UUID;

    fn parse(bytes: Vec<u8>) -> Result<Atom> {
        let mut reader = BoxReader::new(Cursor::new(bytes))?;
        parse_atom(&mut reader)
    }

    fn mfhd_bytes(sequence_number: u32) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 16];
        out.extend_from_slice(b"mfhd");
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&sequence_number.to_be_bytes());
        out
    }

    #[test]
    fn test_registered_type_is_typed() {
        let atom = parse(mfhd_bytes(42)).unwrap();
        assert_eq!(atom.as_typed::<Mfhd>().unwrap().sequence_number, 42);
        assert!(!atom.is_dirty());
        assert!(atom.body().is_none());
    }

    #[test]
    fn test_unregistered_type_passes_through() {
        let mut bytes = vec![0, 0, 0, 12];
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(&[9, 9, 9, 9]);

        let mut atom = parse(bytes.clone()).unwrap();
        assert_eq!(atom.payload(), &Payload::Opaque);
        assert_eq!(atom.body().unwrap().as_ref(), &[9, 9, 9, 9]);
        assert_eq!(atom.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_size_zero_runs_to_end_and_is_dirty() {
        let mut bytes = vec![0, 0, 0, 0];
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&[1, 2, 3]);

        let mut atom = parse(bytes).unwrap();
        assert_eq!(atom.size().value(), 11);
        assert!(atom.is_dirty());
        assert_eq!(atom.as_typed::<Mdat>().unwrap().data.as_ref(), &[1, 2, 3]);

        let written = atom.to_bytes().unwrap();
        assert_eq!(&written[..4], &[0, 0, 0, 11]);
    }

    #[test]
    fn test_largesize_is_dirty_and_keeps_64_bit_form() {
        let mut bytes = vec![0, 0, 0, 1];
        bytes.extend_from_slice(b"mdat");
        bytes.extend_from_slice(&18u64.to_be_bytes());
        bytes.extend_from_slice(&[7, 7]);

        let mut atom = parse(bytes.clone()).unwrap();
        assert!(atom.is_dirty());
        assert_eq!(atom.size().bit_depth(), 64);
        assert_eq!(atom.header_size(), 16);
        // The 64-bit form is kept, so the bytes still match.
        assert_eq!(atom.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_size_smaller_than_header() {
        let mut bytes = vec![0, 0, 0, 4];
        bytes.extend_from_slice(b"free");
        let err = parse(bytes).unwrap_err();
        match err {
            Error::Deserialize { atom, offset, .. } => {
                assert_eq!(atom, "free");
                assert_eq!(offset, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_child_overrunning_parent() {
        // traf declares 16 bytes but its child claims 16 of the 8 available.
        let mut bytes = vec![0, 0, 0, 16];
        bytes.extend_from_slice(b"traf");
        bytes.extend_from_slice(&[0, 0, 0, 16]);
        bytes.extend_from_slice(b"free");

        let err = parse(bytes).unwrap_err();
        match err {
            Error::Deserialize { atom, offset, .. } => {
                assert_eq!(atom, "free");
                assert_eq!(offset, 16);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extended_type_lookup() {
        let mut bytes = vec![0, 0, 0, 36];
        bytes.extend_from_slice(b"uuid");
        bytes.extend_from_slice(TFXD_UUID.as_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&1000u32.to_be_bytes());
        bytes.extend_from_slice(&500u32.to_be_bytes());

        let mut atom = parse(bytes.clone()).unwrap();
        assert_eq!(atom.extended_type(), Some(TFXD_UUID));
        let tfxd = atom.as_typed::<Tfxd>().unwrap();
        assert_eq!(tfxd.fragment_absolute_time(), 1000);
        assert_eq!(tfxd.fragment_duration(), 500);
        assert_eq!(atom.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_parse_expected_restores_position() {
        let mut reader = BoxReader::new(Cursor::new(mfhd_bytes(1))).unwrap();
        let err = parse_expected::<Tfhd, _>(&mut reader).unwrap_err();
        assert!(err.to_string().contains("expected tfhd"));
        assert_eq!(reader.position(), 0);

        let atom = parse_expected::<Mfhd, _>(&mut reader).unwrap();
        assert_eq!(atom.atom_type(), AtomType::MFHD);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_container_types() {
        assert!(is_container_type(AtomType::TRAF));
        assert!(!is_container_type(AtomType::TRUN));
        assert!(!is_container_type(AtomType::FREE));
    }
}
