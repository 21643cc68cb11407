//! Tuple-by-tuple decompressor.

use std::io::Read;

use tracing::info;

use crate::attr::{AttrValue, Schema};
use crate::compression::{MAGIC, VERSION};
use crate::data_io::ByteReader;
use crate::error::{Error, Result};
use crate::learner::is_valid_order;
use crate::model::Model;
use crate::squid::{decode_value, TupleDecoder};

/// Reads tuples back from a compressed stream.
#[derive(Debug)]
pub struct Decompressor<R> {
    reader: ByteReader<R>,
    schema: Schema,
    models: Vec<Model>,
    order: Vec<usize>,
    total: u64,
    decoded: u64,
}

impl<R: Read> Decompressor<R> {
    /// Read and validate the header and model dictionary.
    ///
    /// # Errors
    /// `Error::Corrupt` if the stream was not produced for `schema`,
    /// `Error::Truncated` if it ends early.
    pub fn new(reader: R, schema: Schema) -> Result<Self> {
        let mut reader = ByteReader::new(reader);
        for expected in MAGIC {
            if reader.read_byte()? != expected {
                return Err(Error::Corrupt("bad file signature".into()));
            }
        }
        let version = reader.read_byte()?;
        if version != VERSION {
            return Err(Error::Corrupt(format!("unsupported format version {version}")));
        }
        let total = reader.read_u64()?;

        let columns = reader.read_u16()? as usize;
        if columns != schema.len() {
            return Err(Error::Corrupt(format!(
                "stream has {columns} columns, schema has {}",
                schema.len()
            )));
        }
        let order = (0..columns)
            .map(|_| reader.read_u16().map(usize::from))
            .collect::<Result<Vec<_>>>()?;
        let models = (0..columns)
            .map(|column| Model::read(&mut reader, &schema, column))
            .collect::<Result<Vec<_>>>()?;
        let predictors: Vec<Vec<usize>> = models.iter().map(|m| m.predictors().to_vec()).collect();
        if !is_valid_order(&order, &predictors) {
            return Err(Error::Corrupt(
                "attribute order does not respect the predictors".into(),
            ));
        }
        info!(
            tuples = total,
            columns,
            dictionary_bits = reader.bits_read(),
            "dictionary loaded"
        );
        Ok(Self {
            reader,
            schema,
            models,
            order,
            total,
            decoded: 0,
        })
    }

    /// Schema of the tuples.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Models in column order.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Number of tuples in the stream.
    pub fn tuple_count(&self) -> u64 {
        self.total
    }

    /// Whether tuples remain.
    pub fn has_next(&self) -> bool {
        self.decoded < self.total
    }

    /// Decode the next tuple.
    pub fn read_next_tuple(&mut self) -> Result<Vec<AttrValue>> {
        if !self.has_next() {
            return Err(Error::Stage("no tuples left"));
        }
        let mut values: Vec<Option<AttrValue>> = vec![None; self.models.len()];
        let mut decoder = TupleDecoder::new(&mut self.reader);
        for &column in &self.order {
            let mut squid = self.models[column].squid(&values[..])?;
            let value = decode_value(&mut squid, &mut decoder)?;
            values[column] = Some(value);
        }
        decoder.finish()?;
        self.decoded += 1;
        values
            .into_iter()
            .map(|v| v.ok_or_else(|| Error::Corrupt("column left undecoded".into())))
            .collect()
    }

    /// Check that nothing but padding follows the last tuple.
    pub fn verify_end(&mut self) -> Result<()> {
        if self.has_next() {
            return Err(Error::Stage("tuples remain"));
        }
        if !self.reader.at_end()? {
            return Err(Error::Corrupt("data after the last tuple".into()));
        }
        Ok(())
    }
}

impl<R: Read> Iterator for Decompressor<R> {
    type Item = Result<Vec<AttrValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.has_next().then(|| self.read_next_tuple())
    }
}

/// Decode every tuple of a stream produced for `schema`.
pub fn decompress_tuples<R: Read>(reader: R, schema: &Schema) -> Result<Vec<Vec<AttrValue>>> {
    let mut decompressor = Decompressor::new(reader, schema.clone())?;
    let mut rows = Vec::new();
    while decompressor.has_next() {
        rows.push(decompressor.read_next_tuple()?);
    }
    decompressor.verify_end()?;
    Ok(rows)
}
