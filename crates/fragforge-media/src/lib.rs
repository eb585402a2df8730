//! Fragforge-Media: an editable object model for fragmented MP4 boxes
//!
//! This crate reads ISO/IEC 14496-12 box streams into a tree of [`Atom`]s,
//! lets callers edit fragment-level boxes through typed accessors, and writes
//! the tree back out. A tree that was read and not modified serializes to
//! exactly the bytes it came from.
//!
//! # Modules
//!
//! - `field` - Integers with a variable on-disk width (box sizes)
//! - `io` - Big-endian reader with file-offset error reporting
//! - `atom` - The generic box node, its header and dirty tracking
//! - `registry` - Type-code and GUID tables used while parsing
//! - `boxes` - Concrete box layouts (moof tree, moov tree read access)
//! - `fragment` - moof + mdat view with sample editing and offset repair
//! - `stream` - Top-level stream splitting
//!
//! # Round trip
//!
//! Every atom carries a dirty flag. Parsed atoms start clean; any mutation
//! marks the atom (and therefore its ancestors) dirty. Writing a dirty tree
//! recomputes sizes bottom-up, widening a size field to 64 bits only when it
//! has to. Writing a clean tree re-emits the stored sizes unchanged.

pub mod atom;
pub mod boxes;
pub mod error;
pub mod field;
pub mod fragment;
pub mod io;
pub mod registry;
pub mod stream;

pub use atom::{Atom, AtomType, FullBoxHeader};
pub use boxes::{Payload, TypedBox};
pub use error::{Error, Result};
pub use field::VariableLengthField;
pub use fragment::{Fragment, FragmentOptions, FragmentSample, Samples};
pub use io::{BoxReader, CountingWriter};
pub use stream::{read_stream, write_stream, TopLevel};
