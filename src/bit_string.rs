//! Appendable bit strings.
//!
//! Bits are stored most-significant first in 32-bit words:
//!
//! ```text
//! words[0]      words[1]       ...  words[n]
//! bits 1..=32   bits 33..=64   ...  bits 32n+1..=32n+k, low 32-k bits zero
//! ```

use crate::interval::{ProbInterval, STATE_BITS};

/// A growable sequence of bits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitString {
    words: Vec<u32>,
    len: usize,
}

impl BitString {
    /// Create an empty bit string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the string holds no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing words; bits past `len` are zero.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Append the `count` least significant bits of `value` (`count <= 32`).
    pub fn push_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let value = if count == 32 {
            value
        } else {
            value & ((1 << count) - 1)
        };
        let offset = (self.len % 32) as u32;
        if offset == 0 {
            self.words.push(0);
        }
        let free = 32 - offset;
        let last = self.words.len() - 1;
        if count <= free {
            self.words[last] |= value << (free - count);
        } else {
            let spill = count - free;
            self.words[last] |= value >> spill;
            self.words.push(value << (32 - spill));
        }
        self.len += count as usize;
    }

    /// Append a single bit.
    pub fn push_bit(&mut self, bit: bool) {
        self.push_bits(bit as u32, 1);
    }

    /// Append eight bits.
    pub fn push_byte(&mut self, byte: u8) {
        self.push_bits(byte as u32, 8);
    }

    /// Append every bit of `other`.
    pub fn append(&mut self, other: &BitString) {
        let full = other.len / 32;
        for &word in &other.words[..full] {
            self.push_bits(word, 32);
        }
        let rest = (other.len % 32) as u32;
        if rest > 0 {
            self.push_bits(other.words[full] >> (32 - rest), rest);
        }
    }

    /// Bit at `index`, if present.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some((self.words[index / 32] >> (31 - index % 32)) & 1 == 1)
    }

    /// The first `count` bits as an integer (`count <= 32`); missing bits
    /// read as zero.
    pub fn prefix(&self, count: u32) -> u32 {
        debug_assert!(count <= 32);
        if count == 0 {
            return 0;
        }
        let first = self.words.first().copied().unwrap_or(0);
        if count == 32 {
            first
        } else {
            first >> (32 - count)
        }
    }

    /// Iterate over the bits in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| (self.words[i / 32] >> (31 - i % 32)) & 1 == 1)
    }

    /// Pack into bytes, zero-padding the final byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        bytes.truncate(self.len.div_ceil(8));
        bytes
    }

    /// The shortest bit string, found by descending towards the side with
    /// the larger overlap, whose dyadic cell lies inside `interval`.
    ///
    /// The result never exceeds 32 bits because the window bounds are
    /// integers over `2^32`.
    pub fn from_interval(interval: &ProbInterval) -> Self {
        let mut bits = BitString::new();
        let (low, high) = (interval.low(), interval.high());
        let (mut num, mut depth) = (0u64, 0u32);
        while depth < STATE_BITS && !interval.contains_cell(num, depth) {
            let shift = STATE_BITS - depth - 1;
            let cell_low = num << (shift + 1);
            let cell_high = (num + 1) << (shift + 1);
            let mid = (2 * num + 1) << shift;
            let left = mid.min(high).saturating_sub(cell_low.max(low));
            let right = cell_high.min(high).saturating_sub(mid.max(low));
            let bit = right > left;
            bits.push_bit(bit);
            num = 2 * num + bit as u64;
            depth += 1;
        }
        bits
    }
}

impl FromIterator<bool> for BitString {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut bits = BitString::new();
        for bit in iter {
            bits.push_bit(bit);
        }
        bits
    }
}
