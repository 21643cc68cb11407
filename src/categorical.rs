//! Conditional probability tables over enum codes.

use std::io::Read;

use crate::attr::{AttrValue, Row, Schema};
use crate::data_io::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::interval::{branch_bounds, quantize, Prob, PROB_ONE};
use crate::learner::{Candidate, Learner};
use crate::model::{read_boundaries, write_boundaries, CellIndex, Model};
use crate::squid::Squid;

/// Cell precisions the learner tries.
const CELL_BITS: [u32; 2] = [8, 16];

/// A categorical model: one row of cumulative boundaries per predictor cell.
#[derive(Clone, Debug, PartialEq)]
pub struct TableCategorical {
    target: usize,
    cells: CellIndex,
    cell_bits: u32,
    alphabet: u32,
    rows: Vec<Vec<Prob>>,
}

impl TableCategorical {
    /// Column the model encodes.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Predictor columns.
    pub fn predictors(&self) -> &[usize] {
        self.cells.predictors()
    }

    /// Number of symbols in the learned alphabet.
    pub fn alphabet(&self) -> u32 {
        self.alphabet
    }

    /// Precision of the stored boundaries.
    pub fn cell_bits(&self) -> u32 {
        self.cell_bits
    }

    /// Decision cursor for the cell selected by `row`.
    pub fn squid<R: Row + ?Sized>(&self, row: &R) -> Result<CategoricalSquid<'_>> {
        let cell = self.cells.locate(row)?;
        Ok(CategoricalSquid {
            column: self.target,
            boundaries: &self.rows[cell],
            choice: None,
        })
    }

    /// Serialized size in bits, tag excluded.
    pub fn description_bits(&self) -> usize {
        self.cells.description_bits()
            + 8
            + 16
            + self.rows.len() * (self.alphabet as usize - 1) * self.cell_bits as usize
    }

    /// Serialize into `block`.
    pub fn write(&self, out: &mut ByteWriter, block: usize) {
        self.cells.write(out, block);
        out.write_byte(self.cell_bits as u8, block);
        out.write_u16(self.alphabet as u16, block);
        for row in &self.rows {
            write_boundaries(row, self.cell_bits, out, block);
        }
    }

    /// Read the table of enum column `column` with capacity `cap`.
    pub fn read<R: Read>(
        reader: &mut ByteReader<R>,
        schema: &Schema,
        column: usize,
        cap: u32,
    ) -> Result<Self> {
        let cells = CellIndex::read(reader, schema)?;
        let cell_bits = reader.read_byte()? as u32;
        if !CELL_BITS.contains(&cell_bits) {
            return Err(Error::Corrupt(format!("unsupported cell precision {cell_bits}")));
        }
        let alphabet = reader.read_u16()? as u32;
        if alphabet == 0 || alphabet > cap {
            return Err(Error::Corrupt(format!(
                "alphabet of {alphabet} symbols for column {column} with capacity {cap}"
            )));
        }
        let rows = (0..cells.cells())
            .map(|_| read_boundaries(reader, alphabet as usize - 1, cell_bits))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            target: column,
            cells,
            cell_bits,
            alphabet,
            rows,
        })
    }
}

/// Cursor selecting one symbol in a single decision.
#[derive(Debug)]
pub struct CategoricalSquid<'a> {
    column: usize,
    boundaries: &'a [Prob],
    choice: Option<usize>,
}

impl Squid for CategoricalSquid<'_> {
    fn is_end(&self) -> bool {
        self.choice.is_some()
    }

    fn generate_next_branch(&mut self) {}

    fn branches(&self) -> &[Prob] {
        self.boundaries
    }

    fn get_next_branch(&self, value: &AttrValue) -> Result<usize> {
        let symbol = value.as_enum().ok_or(Error::TypeMismatch {
            column: self.column,
            expected: "enum",
        })?;
        let unencodable = |reason: String| Error::Unencodable {
            column: self.column,
            reason,
        };
        let branch = symbol as usize;
        let (lo, hi) = branch_bounds(self.boundaries, branch)
            .map_err(|_| unencodable(format!("code {symbol} is outside the learned alphabet")))?;
        if lo >= hi {
            return Err(unencodable(format!("code {symbol} was never observed")));
        }
        Ok(branch)
    }

    fn choose_next_branch(&mut self, branch: usize) -> Result<()> {
        self.choice = Some(branch);
        Ok(())
    }

    fn result(&self) -> Result<AttrValue> {
        self.choice
            .map(|c| AttrValue::Enum(c as u32))
            .ok_or(Error::Stage("categorical value is not yet determined"))
    }
}

/// Counts symbols per predictor cell over one full pass.
#[derive(Debug)]
pub struct CategoricalLearner {
    target: usize,
    cells: CellIndex,
    counts: Vec<Vec<u64>>,
    alphabet: u32,
    trained: bool,
}

impl CategoricalLearner {
    /// Learner for enum column `target` conditioned on `predictors`.
    pub fn new(schema: &Schema, target: usize, predictors: Vec<usize>) -> Result<Self> {
        let cells = CellIndex::new(schema, predictors)?;
        Ok(Self {
            target,
            counts: vec![Vec::new(); cells.cells()],
            cells,
            alphabet: 0,
            trained: false,
        })
    }
}

/// Bits needed to code `counts` with `row`.
fn coding_bits(counts: &[u64], row: &[Prob]) -> f64 {
    counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .map(|(i, &c)| {
            let lo = if i == 0 { 0 } else { row[i - 1].raw() };
            let hi = row.get(i).map_or(PROB_ONE, |p| p.raw());
            let p = (hi - lo) as f64 / PROB_ONE as f64;
            -(c as f64) * p.log2()
        })
        .sum()
}

impl Learner for CategoricalLearner {
    fn feed_tuple(&mut self, tuple: &[AttrValue]) -> Result<()> {
        if self.trained {
            return Ok(());
        }
        let cell = self.cells.locate(tuple)?;
        let symbol = tuple
            .get(self.target)
            .and_then(AttrValue::as_enum)
            .ok_or(Error::TypeMismatch {
                column: self.target,
                expected: "enum",
            })?;
        let row = &mut self.counts[cell];
        if row.len() <= symbol as usize {
            row.resize(symbol as usize + 1, 0);
        }
        row[symbol as usize] += 1;
        self.alphabet = self.alphabet.max(symbol + 1);
        Ok(())
    }

    fn end_of_data(&mut self) {
        self.trained = true;
    }

    fn require_more_iterations(&self) -> bool {
        !self.trained
    }

    fn require_full_pass(&self) -> bool {
        !self.trained
    }

    fn finish(self: Box<Self>) -> Result<Vec<Candidate>> {
        let alphabet = self.alphabet.max(1);
        let mut candidates = Vec::with_capacity(CELL_BITS.len());
        'bits: for bits in CELL_BITS {
            let mut rows = Vec::with_capacity(self.counts.len());
            let mut total = 0.0;
            for counts in &self.counts {
                let mut counts = counts.clone();
                counts.resize(alphabet as usize, 0);
                let Some(codes) = quantize(&counts, bits) else {
                    continue 'bits;
                };
                let row: Vec<Prob> = codes.into_iter().map(|c| Prob::from_code(c, bits)).collect();
                total += coding_bits(&counts, &row);
                rows.push(row);
            }
            let model = TableCategorical {
                target: self.target,
                cells: self.cells.clone(),
                cell_bits: bits,
                alphabet,
                rows,
            };
            candidates.push(Candidate::new(Model::Categorical(model), total));
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrType;
    use crate::squid::trace_branches;

    fn schema() -> Schema {
        Schema::new(vec![AttrType::Enum { cap: 2 }, AttrType::Enum { cap: 5 }])
    }

    fn train(rows: &[(u32, u32)], predictors: Vec<usize>) -> Vec<Candidate> {
        let mut learner = Box::new(CategoricalLearner::new(&schema(), 1, predictors).unwrap());
        assert!(learner.require_full_pass());
        for &(a, b) in rows {
            learner
                .feed_tuple(&[AttrValue::Enum(a), AttrValue::Enum(b)])
                .unwrap();
        }
        learner.end_of_data();
        assert!(!learner.require_more_iterations());
        learner.finish().unwrap()
    }

    fn table(candidate: &Candidate) -> &TableCategorical {
        match &candidate.model {
            Model::Categorical(t) => t,
            other => panic!("unexpected model {other:?}"),
        }
    }

    #[test]
    fn test_learner_offers_both_precisions() {
        let candidates = train(&[(0, 1), (0, 3), (1, 3)], vec![]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(table(&candidates[0]).cell_bits(), 8);
        assert_eq!(table(&candidates[1]).cell_bits(), 16);
        assert_eq!(table(&candidates[0]).alphabet(), 4);
        assert!(candidates[0].description_bits() < candidates[1].description_bits());
    }

    #[test]
    fn test_single_symbol_costs_nothing() {
        let candidates = train(&[(0, 0), (1, 0), (0, 0)], vec![]);
        let model = table(&candidates[0]);
        assert_eq!(model.alphabet(), 1);
        assert_eq!(candidates[0].coding_bits, 0.0);
        let mut squid = model.squid(&[AttrValue::Enum(1), AttrValue::Enum(0)][..]).unwrap();
        assert!(squid.branches().is_empty());
        assert_eq!(
            trace_branches(&mut squid, &AttrValue::Enum(0)).unwrap(),
            vec![0]
        );
        assert_eq!(squid.result().unwrap(), AttrValue::Enum(0));
    }

    #[test]
    fn test_predictor_rows_are_separate() {
        let candidates = train(&[(0, 2), (0, 2), (1, 4), (1, 4)], vec![0]);
        let model = table(&candidates[0]);
        // Each predictor value has a deterministic target; only the unit
        // reserved for the unseen last symbol of cell 0 costs anything.
        assert!(candidates[0].coding_bits < 0.05);
        let row = [AttrValue::Enum(1), AttrValue::Enum(4)];
        let squid = model.squid(&row[..]).unwrap();
        assert_eq!(squid.get_next_branch(&AttrValue::Enum(4)).unwrap(), 4);
        assert!(matches!(
            squid.get_next_branch(&AttrValue::Enum(2)),
            Err(Error::Unencodable { column: 1, .. })
        ));
    }

    #[test]
    fn test_unseen_code_is_unencodable() {
        let candidates = train(&[(0, 1)], vec![]);
        let model = table(&candidates[0]);
        let squid = model.squid(&[AttrValue::Enum(0), AttrValue::Enum(1)][..]).unwrap();
        assert!(squid.get_next_branch(&AttrValue::Enum(3)).is_err());
        assert!(matches!(
            squid.get_next_branch(&AttrValue::Integer(3)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_description_round_trip() {
        let candidates = train(&[(0, 1), (1, 3), (1, 0), (0, 4)], vec![0]);
        for candidate in &candidates {
            let mut out = ByteWriter::new(1);
            candidate.model.write(&mut out, 0);
            assert_eq!(out.total_bits(), candidate.description_bits());
            let mut bytes = Vec::new();
            out.finish(&mut bytes).unwrap();
            let mut reader = ByteReader::new(&bytes[..]);
            let decoded = Model::read(&mut reader, &schema(), 1).unwrap();
            assert_eq!(decoded, candidate.model);
        }
    }

    #[test]
    fn test_alphabet_beyond_capacity_is_corrupt() {
        let mut out = ByteWriter::new(1);
        out.write_byte(0, 0);
        out.write_byte(8, 0);
        out.write_u16(6, 0);
        let mut bytes = Vec::new();
        out.finish(&mut bytes).unwrap();
        let mut reader = ByteReader::new(&bytes[..]);
        assert!(matches!(
            TableCategorical::read(&mut reader, &schema(), 1, 5),
            Err(Error::Corrupt(_))
        ));
    }
}
