//! Big-endian stream primitives used by the box codec.

use crate::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use std::io::{self, Read, Seek, SeekFrom, Write};
use uuid::Uuid;

/// Seekable reader that tracks its position and reports errors against
/// absolute file offsets.
///
/// `base_offset` is the file offset that stream position 0 corresponds to.
/// Box bodies are re-read through a fresh `BoxReader` whose base offset is
/// the body's position in the file, so nested errors stay file-locatable.
pub struct BoxReader<R> {
    inner: R,
    base_offset: u64,
    position: u64,
    len: u64,
    context: String,
    rewrite_required: bool,
}

impl<R: Read + Seek> BoxReader<R> {
    /// Wrap a stream whose position 0 is file offset 0.
    pub fn new(inner: R) -> Result<Self> {
        Self::with_base_offset(inner, 0)
    }

    /// Wrap a stream whose position 0 is `base_offset` in the file.
    pub fn with_base_offset(mut inner: R, base_offset: u64) -> Result<Self> {
        let position = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;

        Ok(Self {
            inner,
            base_offset,
            position,
            len,
            context: "box header".to_string(),
            rewrite_required: false,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total stream length.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes left between the current position and the end of the stream.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    /// Absolute file offset of the current position.
    pub fn file_offset(&self) -> u64 {
        self.base_offset + self.position
    }

    /// Absolute file offset of an arbitrary stream position.
    pub fn file_offset_of(&self, position: u64) -> u64 {
        self.base_offset + position
    }

    /// Reposition the stream. Used to undo a peek.
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.position = position;
        Ok(())
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Replace the description used in errors, returning the previous one.
    pub(crate) fn set_context(&mut self, context: impl Into<String>) -> String {
        std::mem::replace(&mut self.context, context.into())
    }

    /// Build a deserialize error pointing at `position`.
    pub fn error_at(&self, position: u64, message: impl Into<String>) -> Error {
        Error::deserialize(self.context.clone(), self.file_offset_of(position), message)
    }

    /// Build a deserialize error pointing at the current position.
    pub fn error(&self, message: impl Into<String>) -> Error {
        self.error_at(self.position, message)
    }

    /// Record that the bytes just read cannot be reproduced verbatim, so the
    /// box being parsed must start out dirty.
    pub fn require_rewrite(&mut self) {
        self.rewrite_required = true;
    }

    pub(crate) fn take_rewrite_required(&mut self) -> bool {
        std::mem::take(&mut self.rewrite_required)
    }

    fn read_field<T>(
        &mut self,
        width: u64,
        field: &str,
        read: impl FnOnce(&mut R) -> io::Result<T>,
    ) -> Result<T> {
        let at = self.position;
        if self.remaining() < width {
            return Err(self.error_at(at, format!("unexpected end of data reading {}", field)));
        }

        match read(&mut self.inner) {
            Ok(value) => {
                self.position += width;
                Ok(value)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(self.error_at(at, format!("unexpected end of data reading {}", field)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_u8(&mut self, field: &str) -> Result<u8> {
        self.read_field(1, field, |r| r.read_u8())
    }

    pub fn read_u16(&mut self, field: &str) -> Result<u16> {
        self.read_field(2, field, |r| r.read_u16::<BigEndian>())
    }

    pub fn read_i16(&mut self, field: &str) -> Result<i16> {
        self.read_field(2, field, |r| r.read_i16::<BigEndian>())
    }

    pub fn read_u24(&mut self, field: &str) -> Result<u32> {
        self.read_field(3, field, |r| r.read_u24::<BigEndian>())
    }

    pub fn read_u32(&mut self, field: &str) -> Result<u32> {
        self.read_field(4, field, |r| r.read_u32::<BigEndian>())
    }

    pub fn read_i32(&mut self, field: &str) -> Result<i32> {
        self.read_field(4, field, |r| r.read_i32::<BigEndian>())
    }

    pub fn read_u64(&mut self, field: &str) -> Result<u64> {
        self.read_field(8, field, |r| r.read_u64::<BigEndian>())
    }

    pub fn read_array<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        self.read_field(N as u64, field, |r| {
            let mut buf = [0u8; N];
            r.read_exact(&mut buf)?;
            Ok(buf)
        })
    }

    pub fn read_uuid(&mut self, field: &str) -> Result<Uuid> {
        self.read_array::<16>(field).map(Uuid::from_bytes)
    }

    /// Read `len` bytes into a fresh buffer.
    ///
    /// Fails without allocating when the stream cannot supply `len` bytes or
    /// the allocation itself is refused.
    pub fn read_bytes(&mut self, len: u64, field: &str) -> Result<Bytes> {
        let at = self.position;
        if self.remaining() < len {
            return Err(self.error_at(
                at,
                format!(
                    "{} needs {} bytes but only {} remain",
                    field,
                    len,
                    self.remaining()
                ),
            ));
        }

        let size = usize::try_from(len)
            .map_err(|_| self.error_at(at, format!("{} of {} bytes is too large", field, len)))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| {
            self.error_at(at, format!("cannot allocate {} bytes for {}", len, field))
        })?;
        buf.resize(size, 0);

        self.read_field(len, field, |r| r.read_exact(&mut buf))?;
        Ok(Bytes::from(buf))
    }

    /// Read everything up to the end of the stream.
    pub fn read_to_end(&mut self, field: &str) -> Result<Bytes> {
        let len = self.remaining();
        self.read_bytes(len, field)
    }
}

/// Writer adapter counting how many bytes went through it.
pub struct CountingWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    count: u64,
}

impl<'a, W: Write + ?Sized> CountingWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
