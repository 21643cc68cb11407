//! Bit-level output and input.
//!
//! [`ByteWriter`] buffers a fixed number of independent blocks in memory
//! and concatenates them on [`ByteWriter::finish`], so that a header can be
//! completed after the body it describes has been produced. [`ByteReader`]
//! reads the concatenation back one bit at a time from any [`Read`].

use std::io::{self, Read, Write};

use crate::bit_string::BitString;
use crate::error::{Error, Result};

/// Block-structured bit writer.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    blocks: Vec<BitString>,
}

impl ByteWriter {
    /// Create a writer with `block_count` empty blocks.
    pub fn new(block_count: usize) -> Self {
        Self {
            blocks: vec![BitString::new(); block_count],
        }
    }

    /// Append the low `count` bits of `value` to `block`.
    pub fn write_bits(&mut self, value: u32, count: u32, block: usize) {
        self.blocks[block].push_bits(value, count);
    }

    /// Append a byte to `block`.
    pub fn write_byte(&mut self, byte: u8, block: usize) {
        self.blocks[block].push_byte(byte);
    }

    /// Append a big-endian `u16` to `block`.
    pub fn write_u16(&mut self, value: u16, block: usize) {
        self.write_bits(value as u32, 16, block);
    }

    /// Append a big-endian `u32` to `block`.
    pub fn write_u32(&mut self, value: u32, block: usize) {
        self.write_bits(value, 32, block);
    }

    /// Append a big-endian `u64` to `block`.
    pub fn write_u64(&mut self, value: u64, block: usize) {
        self.write_bits((value >> 32) as u32, 32, block);
        self.write_bits(value as u32, 32, block);
    }

    /// Append a whole bit string to `block`.
    pub fn write_bit_string(&mut self, bits: &BitString, block: usize) {
        self.blocks[block].append(bits);
    }

    /// Bits written so far to `block`.
    pub fn block_len(&self, block: usize) -> usize {
        self.blocks[block].len()
    }

    /// Bits written so far across all blocks.
    pub fn total_bits(&self) -> usize {
        self.blocks.iter().map(BitString::len).sum()
    }

    /// Concatenate the blocks in index order, pad to a byte, and write the
    /// result. Returns the number of bytes written.
    pub fn finish<W: Write>(self, writer: &mut W) -> Result<usize> {
        let mut all = BitString::new();
        for block in &self.blocks {
            all.append(block);
        }
        let bytes = all.to_bytes();
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(bytes.len())
    }
}

/// Bit reader over a byte stream.
#[derive(Debug)]
pub struct ByteReader<R> {
    inner: R,
    buffer: u64,
    buffered: u32,
    bits_read: u64,
}

impl<R: Read> ByteReader<R> {
    /// Wrap a byte source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: 0,
            buffered: 0,
            bits_read: 0,
        }
    }

    /// Bits consumed so far.
    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }

    fn fill(&mut self, need: u32) -> Result<()> {
        while self.buffered < need {
            let mut byte = [0u8; 1];
            match self.inner.read_exact(&mut byte) {
                Ok(()) => {
                    self.buffer = (self.buffer << 8) | byte[0] as u64;
                    self.buffered += 8;
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(Error::Truncated)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Read `count <= 32` bits as a big-endian integer.
    ///
    /// # Errors
    /// `Error::Truncated` if the stream ends first.
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        if count == 0 {
            return Ok(0);
        }
        self.fill(count)?;
        self.buffered -= count;
        let value = (self.buffer >> self.buffered) & ((1u64 << count) - 1);
        self.buffer &= (1u64 << self.buffered) - 1;
        self.bits_read += count as u64;
        Ok(value as u32)
    }

    /// Read one bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Read eight bits.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bits(32)
    }

    /// Read a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        let high = self.read_bits(32)? as u64;
        let low = self.read_bits(32)? as u64;
        Ok((high << 32) | low)
    }

    /// Whether the underlying stream is exhausted, ignoring the padding
    /// bits of the current byte.
    pub fn at_end(&mut self) -> Result<bool> {
        if self.buffered >= 8 {
            return Ok(false);
        }
        match self.fill(self.buffered + 8) {
            Ok(()) => Ok(false),
            Err(Error::Truncated) => Ok(true),
            Err(e) => Err(e),
        }
    }
}
