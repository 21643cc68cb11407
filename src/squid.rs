//! The branching decision protocol shared by every model.
//!
//! A [`Squid`] determines one attribute value through a sequence of
//! decisions. Each decision offers candidate branches as cumulative
//! [`Prob`] boundaries; the encoder picks the branch consistent with the
//! true value and narrows the tuple's [`ProbInterval`], the decoder reads
//! just enough bits to tell which branch the encoder picked. Both sides
//! then call [`Squid::choose_next_branch`] with the same index, so the
//! candidate sets they see next are identical.
//!
//! # Decoding window
//!
//! The decoder tracks the bits read so far for the current tuple as a
//! dyadic cell `[num / 2^depth, (num + 1) / 2^depth)` relative to the
//! unscaled coder window. A boundary `B` (over `2^32`) is compared with the
//! cell exactly in 128-bit arithmetic; a bit is read only when the cell
//! straddles `B`. Bytes settled by [`ProbInterval::narrow`] are stripped from
//! the front of the cell, mirroring the encoder. At the end of the tuple the
//! decoder reads until the cell lies inside the final window, which is
//! exactly where [`BitString::from_interval`] stopped.

use std::cmp::Ordering;
use std::io::Read;

use crate::attr::AttrValue;
use crate::bit_string::BitString;
use crate::data_io::ByteReader;
use crate::error::{Error, Result};
use crate::interval::{branch_bounds, Prob, ProbInterval, STATE_BITS};

/// Upper bound on bits held by the decoding window.
const MAX_WINDOW_BITS: u32 = 56;

/// Decision cursor for one attribute of one tuple.
pub trait Squid {
    /// Whether the value is fully determined.
    fn is_end(&self) -> bool;

    /// Prepare the candidates of the next decision.
    fn generate_next_branch(&mut self);

    /// Cumulative boundaries of the current decision.
    fn branches(&self) -> &[Prob];

    /// The branch consistent with `value` (encoding only).
    fn get_next_branch(&self, value: &AttrValue) -> Result<usize>;

    /// Commit `branch` and advance.
    fn choose_next_branch(&mut self, branch: usize) -> Result<()>;

    /// The determined value.
    fn result(&self) -> Result<AttrValue>;
}

/// Run `squid` to completion for `value`, narrowing `encoder`.
pub fn encode_value<S: Squid + ?Sized>(
    squid: &mut S,
    value: &AttrValue,
    encoder: &mut TupleEncoder,
) -> Result<()> {
    while !squid.is_end() {
        squid.generate_next_branch();
        let branch = squid.get_next_branch(value)?;
        encoder.encode_branch(squid.branches(), branch)?;
        squid.choose_next_branch(branch)?;
    }
    Ok(())
}

/// Run `squid` to completion, reading its decisions from `decoder`.
pub fn decode_value<S: Squid + ?Sized, R: Read>(
    squid: &mut S,
    decoder: &mut TupleDecoder<'_, R>,
) -> Result<AttrValue> {
    while !squid.is_end() {
        squid.generate_next_branch();
        let branch = decoder.decode_branch(squid.branches())?;
        squid.choose_next_branch(branch)?;
    }
    squid.result()
}

/// The branch indices `squid` takes for `value`, without coding them.
#[cfg(test)]
pub(crate) fn trace_branches<S: Squid + ?Sized>(
    squid: &mut S,
    value: &AttrValue,
) -> Result<Vec<usize>> {
    let mut trace = Vec::new();
    while !squid.is_end() {
        squid.generate_next_branch();
        let branch = squid.get_next_branch(value)?;
        trace.push(branch);
        squid.choose_next_branch(branch)?;
    }
    Ok(trace)
}

/// Encoder state for one tuple.
#[derive(Debug, Default)]
pub struct TupleEncoder {
    interval: ProbInterval,
    bits: BitString,
}

impl TupleEncoder {
    /// Start a tuple with the whole unit interval.
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow to `branch` of the decision described by `boundaries`.
    pub fn encode_branch(&mut self, boundaries: &[Prob], branch: usize) -> Result<()> {
        let (lo, hi) = branch_bounds(boundaries, branch)?;
        let bits = &mut self.bits;
        self.interval.narrow(lo, hi, |byte| bits.push_byte(byte))
    }

    /// Bits emitted so far, excluding the terminal bits.
    pub fn emitted_bits(&self) -> usize {
        self.bits.len()
    }

    /// The complete bit string of the tuple.
    pub fn finish(mut self) -> BitString {
        let tail = BitString::from_interval(&self.interval);
        self.bits.append(&tail);
        self.bits
    }
}

/// Decoder state for one tuple.
#[derive(Debug)]
pub struct TupleDecoder<'a, R> {
    reader: &'a mut ByteReader<R>,
    interval: ProbInterval,
    num: u64,
    depth: u32,
}

impl<'a, R: Read> TupleDecoder<'a, R> {
    /// Start a tuple at the reader's current position.
    pub fn new(reader: &'a mut ByteReader<R>) -> Self {
        Self {
            reader,
            interval: ProbInterval::whole(),
            num: 0,
            depth: 0,
        }
    }

    fn pull_bit(&mut self) -> Result<()> {
        if self.depth >= MAX_WINDOW_BITS {
            return Err(Error::Corrupt("decoding window overflow".into()));
        }
        let bit = self.reader.read_bit()?;
        self.num = (self.num << 1) | bit as u64;
        self.depth += 1;
        Ok(())
    }

    /// Position of the bit cell relative to `boundary`: `Less` when the
    /// cell lies entirely below it, `Greater` when entirely at or above it.
    fn locate(&self, boundary: u64) -> Ordering {
        let scaled = (boundary as u128) << self.depth;
        if scaled >= (self.num as u128 + 1) << STATE_BITS {
            Ordering::Less
        } else if scaled <= (self.num as u128) << STATE_BITS {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// Determine which branch of `boundaries` the encoder took and narrow.
    pub fn decode_branch(&mut self, boundaries: &[Prob]) -> Result<usize> {
        let (mut lo, mut hi) = (0, boundaries.len());
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.locate(self.interval.point(boundaries[mid])) {
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => self.pull_bit()?,
            }
        }
        let (p_lo, p_hi) = branch_bounds(boundaries, lo)?;
        let mut settled = Vec::new();
        self.interval
            .narrow(p_lo, p_hi, |byte| settled.push(byte))
            .map_err(|_| Error::Corrupt(format!("decoded branch {lo} has no probability mass")))?;
        for byte in settled {
            self.strip_byte(byte)?;
        }
        Ok(lo)
    }

    fn strip_byte(&mut self, byte: u8) -> Result<()> {
        while self.depth < 8 {
            self.pull_bit()?;
        }
        let shift = self.depth - 8;
        let top = self.num >> shift;
        if top != byte as u64 {
            return Err(Error::Corrupt("bit stream diverges from the models".into()));
        }
        self.num -= top << shift;
        self.depth -= 8;
        Ok(())
    }

    /// Consume the terminal bits of the tuple.
    pub fn finish(mut self) -> Result<()> {
        while !self.interval.contains_cell(self.num, self.depth) {
            if self.depth >= STATE_BITS {
                return Err(Error::Corrupt("tuple does not terminate".into()));
            }
            self.pull_bit()?;
        }
        Ok(())
    }
}
