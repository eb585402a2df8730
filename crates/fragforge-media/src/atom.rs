//! The generic box node and its header types.

use crate::boxes::{Payload, TypedBox};
use crate::field::VariableLengthField;
use crate::io::{BoxReader, CountingWriter};
use crate::{registry, Error, Result};
use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use std::io::{self, Read, Seek, Write};
use uuid::Uuid;

/// Four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TRUN: Self = Self(*b"trun");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const SDTP: Self = Self(*b"sdtp");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const MDIA: Self = Self(*b"mdia");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const FREE: Self = Self(*b"free");
    /// Marks an extended (GUID) type following the compact header.
    pub const UUID: Self = Self(*b"uuid");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn from_u32(code: u32) -> Self {
        Self(code.to_be_bytes())
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Debug for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AtomType({})", self.as_str())
    }
}

/// Version and 24-bit flags of an ISO "FullBox".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullBoxHeader {
    version: u8,
    flags: u32,
}

impl FullBoxHeader {
    pub const SIZE: u64 = 4;
    pub const MAX_FLAGS: u32 = 0x00FF_FFFF;

    pub fn new(version: u8, flags: u32) -> Result<Self> {
        let mut header = Self { version, flags: 0 };
        header.set_flags(flags)?;
        Ok(header)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_version(&mut self, version: u8) {
        self.version = version;
    }

    /// Replace the flags; fails when they do not fit in 24 bits.
    pub fn set_flags(&mut self, flags: u32) -> Result<()> {
        if flags > Self::MAX_FLAGS {
            return Err(Error::validation(format!(
                "flags 0x{:08X} do not fit in 24 bits",
                flags
            )));
        }
        self.flags = flags;
        Ok(())
    }

    pub fn read<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        let version = reader.read_u8("version")?;
        let flags = reader.read_u24("flags")?;
        Ok(Self { version, flags })
    }

    pub(crate) fn write<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        write_full_header(writer, self.version, self.flags)
    }
}

/// Write a version byte plus 24-bit flags.
pub(crate) fn write_full_header<W: Write + ?Sized>(
    writer: &mut W,
    version: u8,
    flags: u32,
) -> io::Result<()> {
    writer.write_u8(version)?;
    writer.write_u24::<BigEndian>(flags & FullBoxHeader::MAX_FLAGS)
}

/// One box of an ISO BMFF stream.
///
/// An atom starts dirty when built in memory, and clean when read from bytes
/// that it can reproduce exactly. Any mutation through the `*_mut` accessors
/// or the child-management methods marks it dirty again; a successful
/// [`write_to`](Self::write_to) makes the whole subtree clean.
#[derive(Debug, Clone)]
pub struct Atom {
    size: VariableLengthField,
    atom_type: AtomType,
    extended_type: Option<Uuid>,
    payload: Payload,
    children: Vec<Atom>,
    body: Option<Bytes>,
    dirty: bool,
}

impl Atom {
    /// Build an atom around a typed box value.
    pub fn new<T: TypedBox>(value: T) -> Self {
        let atom_type = if T::EXTENDED_TYPE.is_some() {
            AtomType::UUID
        } else {
            T::ATOM_TYPE
        };
        Self::from_parts(atom_type, T::EXTENDED_TYPE, value.into(), None)
    }

    /// Build an empty container atom (moof, traf, moov, ...).
    pub fn container(atom_type: AtomType) -> Self {
        Self::from_parts(atom_type, None, Payload::Container, None)
    }

    /// Build an atom whose body is carried through verbatim.
    pub fn opaque(atom_type: AtomType, body: Bytes) -> Self {
        Self::from_parts(atom_type, None, Payload::Opaque, Some(body))
    }

    /// Build an extended-type (`uuid`) atom whose body is carried through verbatim.
    pub fn opaque_extended(extended_type: Uuid, body: Bytes) -> Self {
        Self::from_parts(AtomType::UUID, Some(extended_type), Payload::Opaque, Some(body))
    }

    pub(crate) fn from_parts(
        atom_type: AtomType,
        extended_type: Option<Uuid>,
        payload: Payload,
        body: Option<Bytes>,
    ) -> Self {
        Self {
            size: VariableLengthField::for_box_size(0),
            atom_type,
            extended_type,
            payload,
            children: Vec::new(),
            body,
            dirty: true,
        }
    }

    pub(crate) fn from_raw(
        size: VariableLengthField,
        atom_type: AtomType,
        extended_type: Option<Uuid>,
        body: Bytes,
        dirty: bool,
    ) -> Self {
        Self {
            size,
            atom_type,
            extended_type,
            payload: Payload::Opaque,
            children: Vec::new(),
            body: Some(body),
            dirty,
        }
    }

    /// Parse one atom (and its subtree) at the reader's position.
    pub fn parse<R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        registry::parse_atom(reader)
    }

    /// Parse one atom only if its type is `T`; see [`registry::parse_expected`].
    pub fn parse_expected<T: TypedBox, R: Read + Seek>(reader: &mut BoxReader<R>) -> Result<Self> {
        registry::parse_expected::<T, R>(reader)
    }

    pub fn atom_type(&self) -> AtomType {
        self.atom_type
    }

    pub fn extended_type(&self) -> Option<Uuid> {
        self.extended_type
    }

    /// Human-readable type used in errors and logs.
    pub fn description(&self) -> String {
        describe(self.atom_type, self.extended_type)
    }

    /// The size field as last read or written. Stale while dirty; see
    /// [`compute_size`](Self::compute_size).
    pub fn size(&self) -> &VariableLengthField {
        &self.size
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Mutable payload access; marks the atom dirty.
    pub fn payload_mut(&mut self) -> &mut Payload {
        self.dirty = true;
        &mut self.payload
    }

    /// Unparsed body bytes, present only for passthrough atoms.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn is_container(&self) -> bool {
        matches!(self.payload, Payload::Container)
    }

    /// Whether this atom or any descendant may differ from its last
    /// known on-disk bytes.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.children.iter().any(Atom::is_dirty)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// This atom's payload as `T`.
    pub fn as_typed<T: TypedBox>(&self) -> Option<&T> {
        T::from_payload(&self.payload)
    }

    /// This atom's payload as `T`; marks the atom dirty when it matches.
    pub fn as_typed_mut<T: TypedBox>(&mut self) -> Option<&mut T> {
        let typed = T::from_payload_mut(&mut self.payload)?;
        self.dirty = true;
        Some(typed)
    }

    pub fn children(&self) -> &[Atom] {
        &self.children
    }

    /// Children with the given compact type, in order.
    pub fn children_of(&self, atom_type: AtomType) -> impl Iterator<Item = &Atom> + '_ {
        self.children
            .iter()
            .filter(move |c| c.atom_type == atom_type)
    }

    /// First child with the given compact type.
    pub fn find_child(&self, atom_type: AtomType) -> Option<&Atom> {
        self.children_of(atom_type).next()
    }

    /// The only child with the given type; fails when there are none or several.
    pub fn child(&self, atom_type: AtomType) -> Result<&Atom> {
        let index = self.single_index(|c| c.atom_type == atom_type, &atom_type.to_string())?;
        Ok(&self.children[index])
    }

    /// Mutable form of [`child`](Self::child). Mutations made through the
    /// returned atom mark it (and therefore this atom) dirty.
    pub fn child_mut(&mut self, atom_type: AtomType) -> Result<&mut Atom> {
        let index = self.single_index(|c| c.atom_type == atom_type, &atom_type.to_string())?;
        Ok(&mut self.children[index])
    }

    /// First child whose payload is a `T`.
    pub fn find<T: TypedBox>(&self) -> Option<&T> {
        self.children.iter().find_map(|c| c.as_typed::<T>())
    }

    /// The payload of the only child of type `T`.
    pub fn single<T: TypedBox>(&self) -> Result<&T> {
        let index = self.single_index(|c| c.as_typed::<T>().is_some(), T::ATOM_TYPE.as_str())?;
        self.children[index]
            .as_typed::<T>()
            .ok_or_else(|| Error::validation(format!("{} is not typed", T::ATOM_TYPE)))
    }

    /// Mutable payload of the only child of type `T`; marks that child dirty.
    pub fn single_mut<T: TypedBox>(&mut self) -> Result<&mut T> {
        let index = self.single_index(|c| c.as_typed::<T>().is_some(), T::ATOM_TYPE.as_str())?;
        self.children[index]
            .as_typed_mut::<T>()
            .ok_or_else(|| Error::validation(format!("{} is not typed", T::ATOM_TYPE)))
    }

    fn single_index(&self, matches: impl Fn(&Atom) -> bool, what: &str) -> Result<usize> {
        let mut found = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| matches(c))
            .map(|(i, _)| i);

        match (found.next(), found.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(Error::validation(format!(
                "{} has no {} child",
                self.description(),
                what
            ))),
            (Some(_), Some(_)) => Err(Error::validation(format!(
                "{} has more than one {} child",
                self.description(),
                what
            ))),
        }
    }

    fn ensure_container(&self) -> Result<()> {
        if self.is_container() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "{} cannot hold child boxes",
                self.description()
            )))
        }
    }

    /// Append a child.
    pub fn add_child(&mut self, child: Atom) -> Result<()> {
        self.ensure_container()?;
        self.children.push(child);
        self.dirty = true;
        Ok(())
    }

    /// Insert a child at `index` (clamped to the child count).
    pub fn insert_child(&mut self, index: usize, child: Atom) -> Result<()> {
        self.ensure_container()?;
        let index = index.min(self.children.len());
        self.children.insert(index, child);
        self.dirty = true;
        Ok(())
    }

    /// Remove every child matching `predicate`, returning them in order.
    pub fn remove_children(&mut self, mut predicate: impl FnMut(&Atom) -> bool) -> Vec<Atom> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.children).into_iter().partition(|c| predicate(c));
        self.children = kept;
        if !removed.is_empty() {
            self.dirty = true;
        }
        removed
    }

    /// Bytes occupied by the header (size, type, optional largesize and
    /// extended type) at the atom's current content size.
    pub fn header_size(&self) -> u64 {
        self.header_size_for(self.content_size())
    }

    fn header_size_for(&self, content_size: u64) -> u64 {
        let compact = 8 + if self.extended_type.is_some() { 16 } else { 0 };
        if self.size.bit_depth() == 64 || compact + content_size > u32::MAX as u64 {
            compact + 8
        } else {
            compact
        }
    }

    fn content_size(&self) -> u64 {
        self.payload.content_size()
            + self.body.as_ref().map_or(0, |b| b.len() as u64)
            + self.children.iter().map(Atom::compute_size).sum::<u64>()
    }

    /// Current total size in bytes, recomputed from the content.
    pub fn compute_size(&self) -> u64 {
        let content = self.content_size();
        self.header_size_for(content) + content
    }

    fn validate(&self) -> Result<()> {
        self.payload.validate()?;
        self.children.iter().try_for_each(Atom::validate)
    }

    /// Serialize this atom and its subtree.
    ///
    /// Dirty subtrees are validated and resized first. Every atom checks that
    /// it emitted exactly the byte count its size field declares.
    pub fn write_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> Result<()> {
        if self.is_dirty() {
            self.validate()?;
        }
        let mut adapter = WriterRef(writer);
        self.write_inner(&mut adapter)
    }

    /// Serialize into a fresh buffer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    fn write_inner(&mut self, writer: &mut dyn Write) -> Result<()> {
        if self.is_dirty() {
            let size = self.compute_size();
            self.size.set_value(size)?;
        }
        let declared = self.size.value();

        let mut counter = CountingWriter::new(writer);
        self.write_header(&mut counter)?;
        self.payload.write_body(&mut counter)?;
        if let Some(body) = &self.body {
            counter.write_all(body)?;
        }
        for child in &mut self.children {
            child.write_inner(&mut counter)?;
        }

        let actual = counter.count();
        if actual != declared {
            return Err(Error::SizeMismatch {
                atom: self.description(),
                declared,
                actual,
            });
        }

        self.dirty = false;
        self.size.mark_clean();
        Ok(())
    }

    fn write_header(&self, writer: &mut dyn Write) -> io::Result<()> {
        if self.size.bit_depth() == 64 {
            writer.write_u32::<BigEndian>(1)?;
            writer.write_all(&self.atom_type.0)?;
            writer.write_u64::<BigEndian>(self.size.value())?;
        } else {
            writer.write_u32::<BigEndian>(self.size.value() as u32)?;
            writer.write_all(&self.atom_type.0)?;
        }
        if let Some(extended_type) = &self.extended_type {
            writer.write_all(extended_type.as_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub(crate) fn take_body(&mut self) -> Option<Bytes> {
        self.body.take()
    }

    pub(crate) fn set_children(&mut self, children: Vec<Atom>) {
        self.children = children;
    }

    pub(crate) fn force_dirty(&mut self, dirty: bool) {
        self.dirty |= dirty;
    }
}

/// Structural equality: type, payload, passthrough body and children.
/// Size encoding and dirtiness are ignored.
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.atom_type == other.atom_type
            && self.extended_type == other.extended_type
            && self.payload == other.payload
            && self.body == other.body
            && self.children == other.children
    }
}

pub(crate) fn describe(atom_type: AtomType, extended_type: Option<Uuid>) -> String {
    match extended_type {
        Some(uuid) => format!("{}[{}]", atom_type, uuid),
        None => atom_type.to_string(),
    }
}

/// Lets a `?Sized` writer be used as `dyn Write`.
struct WriterRef<'a, W: ?Sized>(&'a mut W);

impl<W: Write + ?Sized> Write for WriterRef<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
