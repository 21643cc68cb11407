//! Length and character model for strings.
//!
//! A value is coded as its length code followed by its bytes. Lengths
//! below [`LENGTH_CAP`] are coded directly; longer values use the cap as an
//! escape and end with a NUL byte instead.

use std::io::Read;

use crate::attr::AttrValue;
use crate::data_io::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::interval::{quantize, Prob};
use crate::learner::{Candidate, Learner};
use crate::model::{read_boundaries, write_boundaries, Model};
use crate::squid::Squid;

/// Length code meaning "terminated by NUL".
pub const LENGTH_CAP: usize = 63;

const CHAR_BITS: u32 = 16;
const LENGTH_BITS: u32 = 8;

/// Byte and length distributions of one string column.
#[derive(Clone, Debug, PartialEq)]
pub struct StringModel {
    target: usize,
    chars: Vec<Prob>,
    lengths: Vec<Prob>,
}

impl StringModel {
    /// Column the model encodes.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Decision cursor for one value.
    pub fn squid(&self) -> StringSquid<'_> {
        StringSquid {
            model: self,
            phase: Phase::Length,
            bytes: Vec::new(),
        }
    }

    /// Serialized size in bits, tag excluded.
    pub fn description_bits(&self) -> usize {
        255 * CHAR_BITS as usize + LENGTH_CAP * LENGTH_BITS as usize
    }

    /// Serialize into `block`.
    pub fn write(&self, out: &mut ByteWriter, block: usize) {
        write_boundaries(&self.chars, CHAR_BITS, out, block);
        write_boundaries(&self.lengths, LENGTH_BITS, out, block);
    }

    /// Read the model of string column `column`.
    pub fn read<R: Read>(reader: &mut ByteReader<R>, column: usize) -> Result<Self> {
        Ok(Self {
            target: column,
            chars: read_boundaries(reader, 255, CHAR_BITS)?,
            lengths: read_boundaries(reader, LENGTH_CAP, LENGTH_BITS)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Length,
    Counted(usize),
    Terminated,
    Done,
}

/// Cursor accumulating the bytes of one string.
#[derive(Debug)]
pub struct StringSquid<'a> {
    model: &'a StringModel,
    phase: Phase,
    bytes: Vec<u8>,
}

impl Squid for StringSquid<'_> {
    fn is_end(&self) -> bool {
        self.phase == Phase::Done
    }

    fn generate_next_branch(&mut self) {}

    fn branches(&self) -> &[Prob] {
        match self.phase {
            Phase::Length => &self.model.lengths,
            Phase::Counted(_) | Phase::Terminated => &self.model.chars,
            Phase::Done => &[],
        }
    }

    fn get_next_branch(&self, value: &AttrValue) -> Result<usize> {
        let text = value.as_str().ok_or(Error::TypeMismatch {
            column: self.model.target,
            expected: "string",
        })?;
        let bytes = text.as_bytes();
        Ok(match self.phase {
            Phase::Length => {
                if bytes.len() >= LENGTH_CAP && bytes.contains(&0) {
                    return Err(Error::Unencodable {
                        column: self.model.target,
                        reason: format!(
                            "strings of {LENGTH_CAP} bytes or more cannot contain NUL"
                        ),
                    });
                }
                bytes.len().min(LENGTH_CAP)
            }
            _ => bytes.get(self.bytes.len()).map_or(0, |&b| b as usize),
        })
    }

    fn choose_next_branch(&mut self, branch: usize) -> Result<()> {
        self.phase = match self.phase {
            Phase::Length => match branch {
                0 => Phase::Done,
                LENGTH_CAP => Phase::Terminated,
                n => Phase::Counted(n),
            },
            Phase::Counted(n) => {
                self.bytes.push(branch as u8);
                if self.bytes.len() == n {
                    Phase::Done
                } else {
                    Phase::Counted(n)
                }
            }
            Phase::Terminated if branch == 0 => Phase::Done,
            Phase::Terminated => {
                self.bytes.push(branch as u8);
                Phase::Terminated
            }
            Phase::Done => return Err(Error::Stage("string value is already complete")),
        };
        Ok(())
    }

    fn result(&self) -> Result<AttrValue> {
        if self.phase != Phase::Done {
            return Err(Error::Stage("string value is not yet determined"));
        }
        String::from_utf8(self.bytes.clone())
            .map(AttrValue::String)
            .map_err(|_| Error::Corrupt("decoded string is not valid UTF-8".into()))
    }
}

/// Counts bytes and length codes, with add-one smoothing.
#[derive(Debug)]
pub struct StringLearner {
    target: usize,
    chars: Vec<u64>,
    lengths: Vec<u64>,
    trained: bool,
}

impl StringLearner {
    /// Learner for string column `target`.
    pub fn new(target: usize) -> Self {
        Self {
            target,
            chars: vec![1; 256],
            lengths: vec![1; LENGTH_CAP + 1],
            trained: false,
        }
    }
}

fn boundaries(counts: &[u64], bits: u32) -> Result<Vec<Prob>> {
    quantize(counts, bits)
        .map(|codes| codes.into_iter().map(|c| Prob::from_code(c, bits)).collect())
        .ok_or_else(|| Error::Config(format!("alphabet of {} does not fit {bits} bits", counts.len())))
}

fn coding_bits(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    counts
        .iter()
        .filter(|&&c| c > 1)
        .map(|&c| (c - 1) as f64 * (total as f64 / c as f64).log2())
        .sum()
}

impl Learner for StringLearner {
    fn feed_tuple(&mut self, tuple: &[AttrValue]) -> Result<()> {
        if self.trained {
            return Ok(());
        }
        let text = tuple
            .get(self.target)
            .and_then(AttrValue::as_str)
            .ok_or(Error::TypeMismatch {
                column: self.target,
                expected: "string",
            })?;
        let bytes = text.as_bytes();
        self.lengths[bytes.len().min(LENGTH_CAP)] += 1;
        for &b in bytes {
            self.chars[b as usize] += 1;
        }
        if bytes.len() >= LENGTH_CAP {
            self.chars[0] += 1;
        }
        Ok(())
    }

    fn end_of_data(&mut self) {
        self.trained = true;
    }

    fn require_more_iterations(&self) -> bool {
        !self.trained
    }

    fn require_full_pass(&self) -> bool {
        false
    }

    fn finish(self: Box<Self>) -> Result<Vec<Candidate>> {
        let model = StringModel {
            target: self.target,
            chars: boundaries(&self.chars, CHAR_BITS)?,
            lengths: boundaries(&self.lengths, LENGTH_BITS)?,
        };
        let estimate = coding_bits(&self.chars) + coding_bits(&self.lengths);
        Ok(vec![Candidate::new(Model::String(model), estimate)])
    }
}
