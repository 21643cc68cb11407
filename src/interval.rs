//! Fixed-point probability interval arithmetic.
//!
//! Every branching decision narrows a window `[low, high)` of the unit
//! interval. The window is kept as two integers over `2^32` and every
//! sub-interval is a 16-bit fixed-point [`Prob`], so the encoder and the
//! decoder execute exactly the same integer operations and can never
//! disagree on a boundary.
//!
//! Whenever the leading byte of the window is settled it is shifted out and
//! handed to the caller. A window that straddles a byte boundary while being
//! narrower than `2^PRECISION_BITS` is shrunk to its larger side, which costs
//! at most one bit and keeps the arithmetic inside 64-bit integers.

use crate::error::{Error, Result};

/// Fractional bits of a [`Prob`].
pub const PROB_BITS: u32 = 16;

/// Fixed-point representation of one.
pub const PROB_ONE: u32 = 1 << PROB_BITS;

/// Bits in the coder window.
pub const STATE_BITS: u32 = 32;

/// Minimum window width, in bits, kept after renormalization.
pub const PRECISION_BITS: u32 = 24;

const WHOLE: u64 = 1 << STATE_BITS;
const MIN_RANGE: u64 = 1 << PRECISION_BITS;
const BYTE_SHIFT: u32 = STATE_BITS - 8;

/// A probability in `[0, 1]` with 16 fractional bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prob(u32);

impl Prob {
    /// Probability zero.
    pub const ZERO: Prob = Prob(0);
    /// Probability one half.
    pub const HALF: Prob = Prob(PROB_ONE / 2);
    /// Probability one.
    pub const ONE: Prob = Prob(PROB_ONE);

    /// Build from a raw value in units of `2^-16`.
    pub const fn from_raw(raw: u32) -> Self {
        Prob(raw)
    }

    /// Widen a `bits`-bit fixed-point code (`bits <= 16`).
    pub const fn from_code(code: u32, bits: u32) -> Self {
        Prob(code << (PROB_BITS - bits))
    }

    /// Round a float to the nearest representable probability, clamped to
    /// `[min_raw, max_raw]`. NaN maps to `min_raw`.
    pub fn from_f64_clamped(p: f64, min_raw: u32, max_raw: u32) -> Self {
        let raw = if p.is_nan() {
            min_raw as f64
        } else {
            (p * PROB_ONE as f64).round()
        };
        Prob(raw.clamp(min_raw as f64, max_raw as f64) as u32)
    }

    /// Raw value in units of `2^-16`.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Truncate to a `bits`-bit fixed-point code.
    pub const fn to_code(self, bits: u32) -> u32 {
        self.0 >> (PROB_BITS - bits)
    }

    /// Approximate floating-point value.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / PROB_ONE as f64
    }
}

/// Sub-interval of `branch` given the cumulative `boundaries` of a decision.
///
/// A decision with `n` boundaries has `n + 1` branches; branch `i` spans
/// `[boundaries[i - 1], boundaries[i])` with implicit `0` and `1` at the ends.
pub fn branch_bounds(boundaries: &[Prob], branch: usize) -> Result<(Prob, Prob)> {
    if branch > boundaries.len() {
        return Err(Error::Corrupt(format!(
            "branch {branch} out of range for {} candidates",
            boundaries.len() + 1
        )));
    }
    let low = match branch {
        0 => Prob::ZERO,
        _ => boundaries[branch - 1],
    };
    let high = boundaries.get(branch).copied().unwrap_or(Prob::ONE);
    Ok((low, high))
}

/// The accumulated probability window `[low, high)` over `2^32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbInterval {
    low: u64,
    high: u64,
}

impl Default for ProbInterval {
    fn default() -> Self {
        Self::whole()
    }
}

impl ProbInterval {
    /// The unit interval `[0, 1)`.
    pub const fn whole() -> Self {
        Self {
            low: 0,
            high: WHOLE,
        }
    }

    /// Lower bound over `2^32`.
    pub fn low(&self) -> u64 {
        self.low
    }

    /// Upper bound (exclusive) over `2^32`.
    pub fn high(&self) -> u64 {
        self.high
    }

    /// Width of the window over `2^32`.
    pub fn width(&self) -> u64 {
        self.high - self.low
    }

    /// The point at fraction `ratio` of the window.
    pub fn point(&self, ratio: Prob) -> u64 {
        self.low + ((self.width() * ratio.0 as u64) >> PROB_BITS)
    }

    /// The window restricted to `[lo, hi)` of itself, without renormalizing.
    ///
    /// # Errors
    /// Returns `Error::InvalidProbability` unless `lo < hi <= 1`.
    pub fn sub_interval(&self, lo: Prob, hi: Prob) -> Result<Self> {
        if lo >= hi || hi > Prob::ONE {
            return Err(Error::InvalidProbability {
                low: lo.0,
                high: hi.0,
            });
        }
        Ok(Self {
            low: self.point(lo),
            high: self.point(hi),
        })
    }

    /// Narrow the window to `[lo, hi)` and emit every settled leading byte.
    ///
    /// # Errors
    /// Returns `Error::InvalidProbability` unless `lo < hi <= 1`.
    pub fn narrow<F: FnMut(u8)>(&mut self, lo: Prob, hi: Prob, mut emit: F) -> Result<()> {
        *self = self.sub_interval(lo, hi)?;
        self.renormalize(&mut emit);
        Ok(())
    }

    fn renormalize<F: FnMut(u8)>(&mut self, emit: &mut F) {
        loop {
            let top = self.low >> BYTE_SHIFT;
            if top == (self.high - 1) >> BYTE_SHIFT {
                emit(top as u8);
                self.low = (self.low - (top << BYTE_SHIFT)) << 8;
                self.high = (self.high - (top << BYTE_SHIFT)) << 8;
                continue;
            }
            if self.width() >= MIN_RANGE {
                break;
            }
            // Straddling a byte boundary with too little room: keep the larger side.
            let boundary = ((self.high - 1) >> BYTE_SHIFT) << BYTE_SHIFT;
            if boundary - self.low >= self.high - boundary {
                self.high = boundary;
            } else {
                self.low = boundary;
            }
        }
    }

    /// Whether the dyadic cell `[num / 2^bits, (num + 1) / 2^bits)` lies
    /// inside the window.
    pub fn contains_cell(&self, num: u64, bits: u32) -> bool {
        let cell_low = (num as u128) << STATE_BITS;
        let cell_high = (num as u128 + 1) << STATE_BITS;
        cell_low >= (self.low as u128) << bits && cell_high <= (self.high as u128) << bits
    }
}

/// Quantize symbol counts into cumulative `bits`-bit boundaries.
///
/// Every symbol with a non-zero count receives at least one unit and the
/// remaining units are shared proportionally, any rounding remainder going
/// to the most frequent symbol. When the last symbol's count is zero it
/// still receives one unit so that every boundary stays below `2^bits`.
/// An all-zero row is treated as uniform.
///
/// Returns `None` when the non-zero symbols cannot each receive a unit.
pub fn quantize(counts: &[u64], bits: u32) -> Option<Vec<u32>> {
    let n = counts.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let uniform;
    let counts = if counts.iter().all(|&c| c == 0) {
        uniform = vec![1u64; n];
        &uniform[..]
    } else {
        counts
    };

    let mut total: u64 = 1 << bits;
    let mut units = vec![0u64; n];
    if counts[n - 1] == 0 {
        units[n - 1] = 1;
        total -= 1;
    }
    let nonzero = counts.iter().filter(|&&c| c > 0).count() as u64;
    if nonzero > total {
        return None;
    }
    let spare = (total - nonzero) as u128;
    let sum: u128 = counts.iter().map(|&c| c as u128).sum();

    let mut assigned = 0u64;
    for (unit, &count) in units.iter_mut().zip(counts) {
        if count > 0 {
            *unit = 1 + (count as u128 * spare / sum) as u64;
            assigned += *unit;
        }
    }
    let most_frequent = counts
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    units[most_frequent] += total - assigned;

    let mut acc = 0u64;
    Some(
        units[..n - 1]
            .iter()
            .map(|&u| {
                acc += u;
                acc as u32
            })
            .collect(),
    )
}
