//! Random access over the bytes of an export file
//!
//! Both file families are parsed through `ByteSource`: a seekable,
//! length-known view over either a memory-mapped file or an owned buffer.
//! Sub-views are zero-copy (the backing bytes are shared), which lets the
//! page and section walkers hand bounded slices to the row and tag decoders.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{Error, Result};

#[derive(Debug)]
enum Backing {
    Mmap(Mmap),
    Buffer(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mmap(map) => map,
            Backing::Buffer(buf) => buf,
        }
    }
}

/// A bounded, randomly accessible byte range.
///
/// All reads are offset-addressed relative to the start of the view and fail
/// with [`Error::Truncated`] when they would run past its end. Cloning is
/// cheap; clones and sub-views share the same backing storage.
#[derive(Debug, Clone)]
pub struct ByteSource {
    backing: Arc<Backing>,
    start: usize,
    len: usize,
}

impl ByteSource {
    /// Memory-map the file at `path`.
    pub fn map_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // Read-only mapping of a file we never mutate.
        let map = unsafe { Mmap::map(&file)? };
        let len = map.len();
        Ok(Self {
            backing: Arc::new(Backing::Mmap(map)),
            start: 0,
            len,
        })
    }

    /// Wrap an in-memory buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            backing: Arc::new(Backing::Buffer(bytes)),
            start: 0,
            len,
        }
    }

    /// Total number of bytes visible through this view.
    pub fn len(&self) -> u64 {
        self.len as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: u64, wanted: u64) -> Result<usize> {
        let end = offset.checked_add(wanted).ok_or(Error::Truncated {
            at: offset,
            needed: wanted,
        })?;
        if end > self.len as u64 {
            return Err(Error::Truncated {
                at: offset,
                needed: end - self.len as u64,
            });
        }
        Ok(self.start + offset as usize)
    }

    /// Zero-copy sub-view of `len` bytes starting at `offset`.
    pub fn sub(&self, offset: u64, len: u64) -> Result<ByteSource> {
        let start = self.check(offset, len)?;
        Ok(ByteSource {
            backing: Arc::clone(&self.backing),
            start,
            len: len as usize,
        })
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn read_bytes(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let start = self.check(offset, len)?;
        Ok(&self.backing.bytes()[start..start + len as usize])
    }

    /// The whole view as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.backing.bytes()[self.start..self.start + self.len]
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    pub fn read_u16_le(&self, offset: u64) -> Result<u16> {
        let b = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&self, offset: u64) -> Result<u32> {
        let b = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u16_be(&self, offset: u64) -> Result<u16> {
        let b = self.read_bytes(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32_be(&self, offset: u64) -> Result<u32> {
        let b = self.read_bytes(offset, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read `n` bits (`n <= 64`) from the little-endian bit stream starting
    /// at byte `offset`, bit `bit_offset`. Bits are taken LSB-first within
    /// each byte, which is the packing used by the row-presence bitmaps.
    pub fn read_bits(&self, offset: u64, bit_offset: u32, n: u32) -> Result<u64> {
        debug_assert!(n <= 64);
        if n == 0 {
            return Ok(0);
        }
        let total_bits = bit_offset as u64 + n as u64;
        let byte_span = total_bits.div_ceil(8);
        let bytes = self.read_bytes(offset, byte_span)?;
        let mut value = 0u64;
        for i in 0..n {
            let bit_index = bit_offset as u64 + i as u64;
            let bit = (bytes[(bit_index / 8) as usize] >> (bit_index % 8)) & 1;
            value |= (bit as u64) << i;
        }
        Ok(value)
    }
}
