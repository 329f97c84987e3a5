//! Bounds-checked reads over the bytes of one PDU.
//!
//! Every length and offset taken from the wire goes through here. A read
//! that would run past the captured bytes fails with
//! [`DissectError::OutOfBounds`]; nothing indexes the buffer directly.

use crate::error::{DissectError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    reported_len: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            reported_len: data.len(),
        }
    }

    /// A cursor whose PDU was declared longer (or shorter) than what was
    /// captured. Reads are still limited to the captured bytes.
    pub fn with_reported_len(data: &'a [u8], reported_len: usize) -> Self {
        Self { data, reported_len }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reported_len(&self) -> usize {
        self.reported_len
    }

    /// True when fewer bytes were captured than the transport declared.
    pub fn is_short_capture(&self) -> bool {
        self.data.len() < self.reported_len
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or(DissectError::OutOfBounds {
            offset,
            len,
            available: self.data.len(),
        })?;
        self.data.get(offset..end).ok_or(DissectError::OutOfBounds {
            offset,
            len,
            available: self.data.len(),
        })
    }

    /// Up to `len` bytes at `offset`, cut short at the end of the buffer.
    /// The flag is true when fewer than `len` bytes were available.
    pub fn read_bytes_clamped(&self, offset: usize, len: usize) -> (&'a [u8], bool) {
        if offset >= self.data.len() {
            return (&[], len > 0);
        }
        let end = offset.saturating_add(len).min(self.data.len());
        (&self.data[offset..end], end - offset < len)
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    pub fn read_u16le(&self, offset: usize) -> Result<u16> {
        let b = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32le(&self, offset: usize) -> Result<u32> {
        let b = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64le(&self, offset: usize) -> Result<u64> {
        let b = self.read_bytes(offset, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Bytes from `offset` to the end of the buffer.
    pub fn rest(&self, offset: usize) -> Result<&'a [u8]> {
        self.data.get(offset..).ok_or(DissectError::OutOfBounds {
            offset,
            len: 0,
            available: self.data.len(),
        })
    }

    /// NUL-terminated string starting at `offset`: UTF-16LE when `unicode`,
    /// otherwise one byte per character. A missing terminator takes the rest
    /// of the buffer. Returns the string and the offset past the terminator.
    pub fn read_string(&self, offset: usize, unicode: bool) -> Result<(String, usize)> {
        let tail = self.rest(offset)?;
        if unicode {
            let units: Vec<u16> = tail
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            let consumed = (units.len() * 2 + 2).min(tail.len());
            Ok((String::from_utf16_lossy(&units), offset + consumed))
        } else {
            let n = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
            let consumed = (n + 1).min(tail.len());
            Ok((String::from_utf8_lossy(&tail[..n]).into_owned(), offset + consumed))
        }
    }
}
