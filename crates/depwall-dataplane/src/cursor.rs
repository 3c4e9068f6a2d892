//! Bounds-checked read cursor over a frame
//!
//! Every read is checked against the end of the buffer first. A read that
//! does not fit returns [`OutOfBounds`] and leaves the cursor where it was;
//! nothing is ever indexed past the end.

use std::fmt;

/// A read that would run past the end of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    /// Offset the read started at
    pub offset: usize,
    /// Bytes the read required
    pub needed: usize,
    /// Bytes left from `offset` to the end
    pub available: usize,
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "need {} bytes at offset {}, {} available",
            self.needed, self.offset, self.available
        )
    }
}

/// Forward-only reader over a byte slice
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Start at offset 0
    #[inline(always)]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the buffer
    #[inline(always)]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[inline(always)]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Borrow the next `n` bytes and advance past them
    #[inline]
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfBounds> {
        let available = self.remaining();
        if n > available {
            return Err(OutOfBounds {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    /// Split off the next `n` bytes as their own cursor and advance past them
    #[inline]
    pub fn sub(&mut self, n: usize) -> Result<Cursor<'a>, OutOfBounds> {
        self.take(n).map(Cursor::new)
    }

    /// Require that `n` more bytes exist without consuming them
    #[inline]
    pub fn ensure(&self, n: usize) -> Result<(), OutOfBounds> {
        let available = self.remaining();
        if n > available {
            return Err(OutOfBounds {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        Ok(())
    }

    /// Skip `n` bytes
    #[inline]
    pub fn skip(&mut self, n: usize) -> Result<(), OutOfBounds> {
        self.take(n).map(|_| ())
    }

    /// Read a fixed-size array
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], OutOfBounds> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Read one byte
    #[inline(always)]
    pub fn read_u8(&mut self) -> Result<u8, OutOfBounds> {
        self.read_array::<1>().map(|b| b[0])
    }

    /// Read a network-order u16, returned in host order
    #[inline(always)]
    pub fn read_u16_be(&mut self) -> Result<u16, OutOfBounds> {
        self.read_array::<2>().map(u16::from_be_bytes)
    }

    /// Read a network-order u32, returned in host order
    #[inline(always)]
    pub fn read_u32_be(&mut self) -> Result<u32, OutOfBounds> {
        self.read_array::<4>().map(u32::from_be_bytes)
    }
}
