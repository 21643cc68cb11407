//! Multi-pass compressor.
//!
//! The caller scans its tuples as often as the compressor asks:
//!
//! ```text
//! while compressor.require_more_iterations() {
//!     for tuple in input (all of it if compressor.require_full_pass()) {
//!         compressor.read_tuple(tuple)?;
//!     }
//!     compressor.end_of_data()?;
//! }
//! let writer = compressor.finish()?;
//! ```
//!
//! Training passes feed the column learners. When they are satisfied the
//! models are frozen and the dictionary is written; the next pass encodes
//! every tuple. The header, which carries the tuple count, is completed last.

use std::io::Write;

use tracing::{debug, info};

use crate::attr::{AttrValue, Schema};
use crate::config::CompressionConfig;
use crate::data_io::ByteWriter;
use crate::error::{Error, Result};
use crate::learner::{attribute_order, ModelLearner};
use crate::model::Model;
use crate::squid::{encode_value, TupleEncoder};

/// File signature.
pub const MAGIC: [u8; 4] = *b"SQSH";

/// Format version.
pub const VERSION: u8 = 1;

/// Tuples scanned by passes that need not see everything.
pub const SAMPLE_ROWS: usize = 2000;

pub(crate) const BLOCK_HEADER: usize = 0;
pub(crate) const BLOCK_DICTIONARY: usize = 1;
pub(crate) const BLOCK_STREAM: usize = 2;
const BLOCK_COUNT: usize = 3;

/// Where a compressor is in its life cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Feeding learners; `pass` passes completed so far.
    Training {
        /// Completed training passes.
        pass: u32,
    },
    /// Models are frozen; tuples are being encoded.
    Encoding,
    /// Everything has been written.
    Done,
}

#[derive(Debug)]
enum State {
    Training(ModelLearner),
    Encoding { models: Vec<Model>, order: Vec<usize> },
    Done,
}

/// Compresses a relation into `W`.
#[derive(Debug)]
pub struct Compressor<W> {
    writer: W,
    schema: Schema,
    state: State,
    out: ByteWriter,
    tuples: u64,
}

impl<W: Write> Compressor<W> {
    /// Start compressing tuples of `schema` into `writer`.
    ///
    /// # Errors
    /// Configuration errors are reported here, before anything is written.
    pub fn new(writer: W, schema: Schema, config: &CompressionConfig) -> Result<Self> {
        let learner = ModelLearner::new(&schema, config)?;
        Ok(Self {
            writer,
            schema,
            state: State::Training(learner),
            out: ByteWriter::new(BLOCK_COUNT),
            tuples: 0,
        })
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        match &self.state {
            State::Training(learner) => Stage::Training {
                pass: learner.pass(),
            },
            State::Encoding { .. } => Stage::Encoding,
            State::Done => Stage::Done,
        }
    }

    /// Whether the caller must scan the input again.
    pub fn require_more_iterations(&self) -> bool {
        !matches!(self.state, State::Done)
    }

    /// Whether the next scan must include every tuple.
    pub fn require_full_pass(&self) -> bool {
        match &self.state {
            State::Training(learner) => learner.require_full_pass(),
            State::Encoding { .. } => true,
            State::Done => false,
        }
    }

    /// Bits of encoded tuples so far.
    pub fn stream_bits(&self) -> usize {
        self.out.block_len(BLOCK_STREAM)
    }

    /// Tuples encoded so far.
    pub fn tuples(&self) -> u64 {
        self.tuples
    }

    /// Process one tuple of the current pass.
    pub fn read_tuple(&mut self, tuple: &[AttrValue]) -> Result<()> {
        self.schema.check_tuple(tuple)?;
        match &mut self.state {
            State::Training(learner) => learner.feed_tuple(tuple),
            State::Encoding { models, order } => {
                let mut encoder = TupleEncoder::new();
                for &column in order.iter() {
                    let mut squid = models[column].squid(tuple)?;
                    encode_value(&mut squid, &tuple[column], &mut encoder)?;
                }
                self.out.write_bit_string(&encoder.finish(), BLOCK_STREAM);
                self.tuples += 1;
                Ok(())
            }
            State::Done => Err(Error::Stage("compressor has already finished")),
        }
    }

    /// End the current pass.
    pub fn end_of_data(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Training(mut learner) => {
                learner.end_of_data();
                if learner.require_more_iterations() {
                    self.state = State::Training(learner);
                } else {
                    self.freeze(learner)?;
                }
                Ok(())
            }
            State::Encoding { .. } => self.write_out(),
            State::Done => Err(Error::Stage("compressor has already finished")),
        }
    }

    fn freeze(&mut self, learner: ModelLearner) -> Result<()> {
        let models = learner.finish()?;
        let predictors: Vec<Vec<usize>> = models.iter().map(|m| m.predictors().to_vec()).collect();
        let order = attribute_order(&predictors)?;

        let block = BLOCK_DICTIONARY;
        self.out.write_u16(models.len() as u16, block);
        for &column in &order {
            self.out.write_u16(column as u16, block);
        }
        for model in &models {
            model.write(&mut self.out, block);
        }
        info!(
            columns = models.len(),
            dictionary_bits = self.out.block_len(block),
            ?order,
            "models frozen"
        );
        self.state = State::Encoding { models, order };
        Ok(())
    }

    fn write_out(&mut self) -> Result<()> {
        let block = BLOCK_HEADER;
        for byte in MAGIC {
            self.out.write_byte(byte, block);
        }
        self.out.write_byte(VERSION, block);
        self.out.write_u64(self.tuples, block);

        let stream_bits = self.stream_bits();
        let out = std::mem::replace(&mut self.out, ByteWriter::new(0));
        let bytes = out.finish(&mut self.writer)?;
        info!(tuples = self.tuples, stream_bits, bytes, "compression finished");
        Ok(())
    }

    /// Return the writer once everything has been written.
    pub fn finish(self) -> Result<W> {
        match self.state {
            State::Done => Ok(self.writer),
            _ => Err(Error::Stage("compressor has not finished")),
        }
    }
}

/// Compress `rows` into `writer`, scanning them as often as needed.
///
/// Passes that do not need every tuple see only the first [`SAMPLE_ROWS`].
pub fn compress_tuples<W: Write>(
    writer: W,
    schema: &Schema,
    config: &CompressionConfig,
    rows: &[Vec<AttrValue>],
) -> Result<W> {
    let mut compressor = Compressor::new(writer, schema.clone(), config)?;
    while compressor.require_more_iterations() {
        let limit = if compressor.require_full_pass() {
            rows.len()
        } else {
            rows.len().min(SAMPLE_ROWS)
        };
        debug!(stage = ?compressor.stage(), rows = limit, "scanning input");
        for row in &rows[..limit] {
            compressor.read_tuple(row)?;
        }
        compressor.end_of_data()?;
    }
    compressor.finish()
}
