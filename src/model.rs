//! Per-column models and their serialized descriptions.
//!
//! The set of model kinds is closed, so [`Model`] is an enum and the
//! decision cursors it hands out are dispatched through [`ModelSquid`].

use std::io::Read;

use crate::attr::{AttrType, AttrValue, Row, Schema};
use crate::categorical::{CategoricalSquid, TableCategorical};
use crate::data_io::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::interval::Prob;
use crate::numerical::{LaplaceSquid, TableLaplace};
use crate::squid::Squid;
use crate::string::{StringModel, StringSquid};

/// Largest number of predictor cells a table model may have.
pub const MAX_TABLE_CELLS: usize = 1 << 16;

/// Largest number of predictor columns of one model.
pub const MAX_PREDICTORS: usize = u8::MAX as usize;

/// Dictionary tag of categorical tables.
pub const TAG_CATEGORICAL: u8 = 0;
/// Dictionary tag of integer Laplace models.
pub const TAG_INTEGER: u8 = 1;
/// Dictionary tag of real Laplace models.
pub const TAG_REAL: u8 = 2;
/// Dictionary tag of string models.
pub const TAG_STRING: u8 = 3;

/// Maps the predictor values of a row to a table cell.
///
/// Cells are laid out in mixed radix, the first predictor most significant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellIndex {
    predictors: Vec<usize>,
    caps: Vec<u32>,
    cells: usize,
}

impl CellIndex {
    /// Build an index over `predictors`, which must be enum columns.
    pub fn new(schema: &Schema, predictors: Vec<usize>) -> Result<Self> {
        if predictors.len() > MAX_PREDICTORS {
            return Err(Error::Config(format!(
                "{} predictors, at most {MAX_PREDICTORS} allowed",
                predictors.len()
            )));
        }
        let mut caps = Vec::with_capacity(predictors.len());
        let mut cells = 1usize;
        for &p in &predictors {
            let cap = match schema.attr_type(p) {
                Some(AttrType::Enum { cap }) => cap,
                Some(other) => {
                    return Err(Error::Config(format!(
                        "predictor column {p} is {other}, expected an enum"
                    )))
                }
                None => {
                    return Err(Error::Config(format!(
                        "predictor column {p} is out of range"
                    )))
                }
            };
            cells = cells.saturating_mul(cap.max(1) as usize);
            if cells > MAX_TABLE_CELLS {
                return Err(Error::Config(format!(
                    "predictor table over {MAX_TABLE_CELLS} cells"
                )));
            }
            caps.push(cap);
        }
        Ok(Self {
            predictors,
            caps,
            cells,
        })
    }

    /// Predictor columns.
    pub fn predictors(&self) -> &[usize] {
        &self.predictors
    }

    /// Number of cells.
    pub fn cells(&self) -> usize {
        self.cells
    }

    /// Cell of `row`.
    pub fn locate<R: Row + ?Sized>(&self, row: &R) -> Result<usize> {
        let mut index = 0usize;
        for (&p, &cap) in self.predictors.iter().zip(&self.caps) {
            let value = row
                .enum_value(p)
                .ok_or_else(|| Error::Corrupt(format!("predictor column {p} not yet known")))?;
            if value >= cap {
                return Err(Error::Unencodable {
                    column: p,
                    reason: format!("predictor code {value} is not below capacity {cap}"),
                });
            }
            index = index * cap as usize + value as usize;
        }
        Ok(index)
    }

    /// Serialized size in bits.
    pub fn description_bits(&self) -> usize {
        8 + 16 * self.predictors.len()
    }

    /// Serialize into `block`.
    pub fn write(&self, out: &mut ByteWriter, block: usize) {
        out.write_byte(self.predictors.len() as u8, block);
        for &p in &self.predictors {
            out.write_u16(p as u16, block);
        }
    }

    /// Read a serialized index and validate it against `schema`.
    pub fn read<R: Read>(reader: &mut ByteReader<R>, schema: &Schema) -> Result<Self> {
        let count = reader.read_byte()? as usize;
        let mut predictors = Vec::with_capacity(count);
        for _ in 0..count {
            predictors.push(reader.read_u16()? as usize);
        }
        Self::new(schema, predictors).map_err(|e| match e {
            Error::Config(msg) => Error::Corrupt(msg),
            other => other,
        })
    }
}

/// Read `count` cumulative boundaries of `bits` bits each, checking that
/// they never decrease.
pub(crate) fn read_boundaries<R: Read>(
    reader: &mut ByteReader<R>,
    count: usize,
    bits: u32,
) -> Result<Vec<Prob>> {
    let mut boundaries = Vec::with_capacity(count);
    let mut prev = 0;
    for _ in 0..count {
        let code = reader.read_bits(bits)?;
        if code < prev {
            return Err(Error::Corrupt("probability boundaries decrease".into()));
        }
        prev = code;
        boundaries.push(Prob::from_code(code, bits));
    }
    Ok(boundaries)
}

/// Write boundaries as `bits`-bit codes.
pub(crate) fn write_boundaries(boundaries: &[Prob], bits: u32, out: &mut ByteWriter, block: usize) {
    for p in boundaries {
        out.write_bits(p.to_code(bits), bits, block);
    }
}

/// A finalized model for one column.
#[derive(Clone, Debug, PartialEq)]
pub enum Model {
    /// Conditional probability table over enum codes.
    Categorical(TableCategorical),
    /// Error-bounded Laplace model for integers or reals.
    Laplace(TableLaplace),
    /// Length and character model for strings.
    String(StringModel),
}

impl Model {
    /// Column the model encodes.
    pub fn target(&self) -> usize {
        match self {
            Model::Categorical(m) => m.target(),
            Model::Laplace(m) => m.target(),
            Model::String(m) => m.target(),
        }
    }

    /// Predictor columns.
    pub fn predictors(&self) -> &[usize] {
        match self {
            Model::Categorical(m) => m.predictors(),
            Model::Laplace(m) => m.predictors(),
            Model::String(_) => &[],
        }
    }

    /// Dictionary tag.
    pub fn tag(&self) -> u8 {
        match self {
            Model::Categorical(_) => TAG_CATEGORICAL,
            Model::Laplace(m) if m.is_integer() => TAG_INTEGER,
            Model::Laplace(_) => TAG_REAL,
            Model::String(_) => TAG_STRING,
        }
    }

    /// Short name used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Model::Categorical(_) => "categorical",
            Model::Laplace(_) => "laplace",
            Model::String(_) => "string",
        }
    }

    /// Decision cursor for the value of `row`'s target column.
    pub fn squid<R: Row + ?Sized>(&self, row: &R) -> Result<ModelSquid<'_>> {
        Ok(match self {
            Model::Categorical(m) => ModelSquid::Categorical(m.squid(row)?),
            Model::Laplace(m) => ModelSquid::Laplace(m.squid(row)?),
            Model::String(m) => ModelSquid::String(m.squid()),
        })
    }

    /// Serialized size in bits, tag included.
    pub fn description_bits(&self) -> usize {
        8 + match self {
            Model::Categorical(m) => m.description_bits(),
            Model::Laplace(m) => m.description_bits(),
            Model::String(m) => m.description_bits(),
        }
    }

    /// Serialize tag and description into `block`.
    pub fn write(&self, out: &mut ByteWriter, block: usize) {
        out.write_byte(self.tag(), block);
        match self {
            Model::Categorical(m) => m.write(out, block),
            Model::Laplace(m) => m.write(out, block),
            Model::String(m) => m.write(out, block),
        }
    }

    /// Read the model of `column`, checking its tag against `schema`.
    pub fn read<R: Read>(reader: &mut ByteReader<R>, schema: &Schema, column: usize) -> Result<Self> {
        let tag = reader.read_byte()?;
        let attr_type = schema
            .attr_type(column)
            .ok_or_else(|| Error::Corrupt(format!("model for unknown column {column}")))?;
        match (tag, attr_type) {
            (TAG_CATEGORICAL, AttrType::Enum { cap }) => Ok(Model::Categorical(
                TableCategorical::read(reader, schema, column, cap)?,
            )),
            (TAG_INTEGER, AttrType::Integer) => Ok(Model::Laplace(TableLaplace::read(
                reader, schema, column, true,
            )?)),
            (TAG_REAL, AttrType::Real) => Ok(Model::Laplace(TableLaplace::read(
                reader, schema, column, false,
            )?)),
            (TAG_STRING, AttrType::String) => Ok(Model::String(StringModel::read(reader, column)?)),
            _ => Err(Error::Corrupt(format!(
                "model tag {tag} does not fit {attr_type} column {column}"
            ))),
        }
    }
}

/// Decision cursor of any model kind.
#[derive(Debug)]
pub enum ModelSquid<'a> {
    /// Categorical cursor.
    Categorical(CategoricalSquid<'a>),
    /// Laplace cursor.
    Laplace(LaplaceSquid<'a>),
    /// String cursor.
    String(StringSquid<'a>),
}

macro_rules! dispatch {
    ($self:expr, $squid:ident => $body:expr) => {
        match $self {
            ModelSquid::Categorical($squid) => $body,
            ModelSquid::Laplace($squid) => $body,
            ModelSquid::String($squid) => $body,
        }
    };
}

impl Squid for ModelSquid<'_> {
    fn is_end(&self) -> bool {
        dispatch!(self, s => s.is_end())
    }

    fn generate_next_branch(&mut self) {
        dispatch!(self, s => s.generate_next_branch())
    }

    fn branches(&self) -> &[Prob] {
        dispatch!(self, s => s.branches())
    }

    fn get_next_branch(&self, value: &AttrValue) -> Result<usize> {
        dispatch!(self, s => s.get_next_branch(value))
    }

    fn choose_next_branch(&mut self, branch: usize) -> Result<()> {
        dispatch!(self, s => s.choose_next_branch(branch))
    }

    fn result(&self) -> Result<AttrValue> {
        dispatch!(self, s => s.result())
    }
}
