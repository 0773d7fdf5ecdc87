//! Cursor helpers for reading and writing packet fields.
//!
//! Strings and binary fields are prefixed with a big-endian `u16` length.

// ============================================================================
// Imports
// ============================================================================

use crate::error::PacketError;

use super::header::{FixedHeader, write_remaining_length};

// ============================================================================
// Field Sizes
// ============================================================================

/// Encoded size of a length-prefixed string or binary field.
#[inline]
pub(crate) const fn field_len(len: usize) -> usize {
    2 + len
}

/// Rejects fields that do not fit a `u16` length prefix.
#[inline]
pub(crate) fn check_field(len: usize) -> Result<(), PacketError> {
    if len > usize::from(u16::MAX) {
        return Err(PacketError::FieldTooLong(len));
    }
    Ok(())
}

// ============================================================================
// Writer
// ============================================================================

/// Bounds-checked writer over a caller-provided buffer.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn reserve(&mut self, len: usize) -> Result<&mut [u8], PacketError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(PacketError::BufferTooSmall {
                needed: end,
                available: self.buf.len(),
            });
        }
        let slice = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn header(&mut self, header: FixedHeader) -> Result<(), PacketError> {
        self.u8(header.byte())?;
        let n = write_remaining_length(&mut self.buf[self.pos..], header.remaining_length)?;
        self.pos += n;
        Ok(())
    }

    pub(crate) fn u8(&mut self, value: u8) -> Result<(), PacketError> {
        self.reserve(1)?[0] = value;
        Ok(())
    }

    pub(crate) fn u16(&mut self, value: u16) -> Result<(), PacketError> {
        self.reserve(2)?.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn binary(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        check_field(bytes.len())?;
        self.u16(bytes.len() as u16)?;
        self.raw(bytes)
    }

    pub(crate) fn string(&mut self, value: &str) -> Result<(), PacketError> {
        self.binary(value.as_bytes())
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Cursor over a packet body.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], PacketError> {
        if self.remaining() < len {
            return Err(PacketError::InsufficientBytes { field });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8, PacketError> {
        Ok(self.take(1, field)?[0])
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> Result<u16, PacketError> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn binary(&mut self, field: &'static str) -> Result<&'a [u8], PacketError> {
        let len = self.u16(field)?;
        self.take(usize::from(len), field)
    }

    pub(crate) fn string(&mut self, field: &'static str) -> Result<String, PacketError> {
        let bytes = self.binary(field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PacketError::InvalidUtf8 { field })
    }

    /// Consumes everything left.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// Fails if any byte is left unread.
    pub(crate) fn finish(&self) -> Result<(), PacketError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(PacketError::TrailingBytes { extra }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
