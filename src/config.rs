//! Compression configuration.
//!
//! A [`CompressionConfig`] holds, per column, the maximum absolute error a
//! numeric column may incur and the enum columns its model is conditioned
//! on. It is passed explicitly to the compressor; nothing is registered
//! globally.
//!
//! The text form used by the command-line tool has one line per column
//! followed by optional predictor declarations:
//!
//! ```text
//! # type      parameters
//! ENUM        4
//! INTEGER     0
//! REAL        0.005
//! STRING
//! PREDICT 1 0
//! ```

use std::collections::BTreeSet;

use crate::attr::{AttrType, Schema};
use crate::error::{Error, Result};
use crate::learner::attribute_order;
use crate::model::CellIndex;
use crate::numerical::Width;

/// Largest enum capacity.
pub const MAX_ENUM_CAP: u32 = u16::MAX as u32;

/// Largest number of columns.
pub const MAX_COLUMNS: usize = u16::MAX as usize;

/// Settings of one column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnConfig {
    /// Maximum absolute reconstruction error; ignored for enums and strings.
    pub tolerance: f64,
    /// Enum columns the model is conditioned on.
    pub predictors: Vec<usize>,
}

impl ColumnConfig {
    /// A column allowed to err by `tolerance`.
    pub fn lossy(tolerance: f64) -> Self {
        Self {
            tolerance,
            predictors: Vec::new(),
        }
    }

    /// Condition the column on `predictors`.
    pub fn with_predictors(mut self, predictors: Vec<usize>) -> Self {
        self.predictors = predictors;
        self
    }
}

/// Settings of every column of a schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompressionConfig {
    columns: Vec<ColumnConfig>,
}

impl CompressionConfig {
    /// Build from per-column settings.
    pub fn new(columns: Vec<ColumnConfig>) -> Self {
        Self { columns }
    }

    /// Zero tolerance and no predictors for every column.
    ///
    /// Real columns cannot be lossless; give them a positive tolerance with
    /// [`CompressionConfig::column_mut`] before validating.
    pub fn lossless(schema: &Schema) -> Self {
        Self {
            columns: vec![ColumnConfig::default(); schema.len()],
        }
    }

    /// Per-column settings.
    pub fn columns(&self) -> &[ColumnConfig] {
        &self.columns
    }

    /// Mutable settings of `column`.
    pub fn column_mut(&mut self, column: usize) -> Option<&mut ColumnConfig> {
        self.columns.get_mut(column)
    }

    /// Predictor lists, indexed by column.
    pub fn predictor_lists(&self) -> Vec<Vec<usize>> {
        self.columns.iter().map(|c| c.predictors.clone()).collect()
    }

    /// Check the settings against `schema`.
    ///
    /// # Errors
    /// `Error::Config` for any inconsistent setting and
    /// `Error::CyclicPredictors` when predictors form a cycle.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.columns.len() != schema.len() {
            return Err(Error::Config(format!(
                "{} column settings for {} columns",
                self.columns.len(),
                schema.len()
            )));
        }
        if schema.len() > MAX_COLUMNS {
            return Err(Error::Config(format!("more than {MAX_COLUMNS} columns")));
        }
        for (column, (&attr_type, settings)) in
            schema.attr_types().iter().zip(&self.columns).enumerate()
        {
            let tolerance = settings.tolerance;
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                return Err(Error::Config(format!(
                    "column {column}: tolerance {tolerance} must be finite and non-negative"
                )));
            }
            match attr_type {
                AttrType::Enum { cap } if cap == 0 || cap > MAX_ENUM_CAP => {
                    return Err(Error::Config(format!(
                        "column {column}: enum capacity {cap} outside 1..={MAX_ENUM_CAP}"
                    )));
                }
                AttrType::Real if tolerance == 0.0 => {
                    return Err(Error::Config(format!(
                        "column {column}: real columns need a positive tolerance"
                    )));
                }
                AttrType::Real => {
                    Width::for_tolerance(attr_type, tolerance)?;
                }
                AttrType::String if !settings.predictors.is_empty() => {
                    return Err(Error::Config(format!(
                        "column {column}: string models take no predictors"
                    )));
                }
                _ => {}
            }
            let mut seen = BTreeSet::new();
            for &p in &settings.predictors {
                if p == column {
                    return Err(Error::Config(format!(
                        "column {column} cannot predict itself"
                    )));
                }
                if !seen.insert(p) {
                    return Err(Error::Config(format!(
                        "column {column}: predictor {p} listed twice"
                    )));
                }
            }
            CellIndex::new(schema, settings.predictors.clone())
                .map_err(|e| Error::Config(format!("column {column}: {e}")))?;
        }
        attribute_order(&self.predictor_lists())?;
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, line: usize, what: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| Error::Config(format!("line {line}: invalid {what} '{field}'")))
}

/// Parse the text configuration into a schema and its settings.
///
/// The result is validated.
pub fn parse_config(text: &str) -> Result<(Schema, CompressionConfig)> {
    let mut attr_types = Vec::new();
    let mut columns = Vec::new();
    let mut predictions = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        let fields: Vec<&str> = content.split_whitespace().collect();
        let Some((&tag, args)) = fields.split_first() else {
            continue;
        };
        let tolerance_at = |position: usize| -> Result<f64> {
            args.get(position)
                .map(|f| parse_number(f, line, "tolerance"))
                .unwrap_or(Ok(0.0))
        };
        let (attr_type, tolerance) = match tag.to_ascii_uppercase().as_str() {
            "ENUM" => {
                let cap = args
                    .first()
                    .ok_or_else(|| Error::Config(format!("line {line}: ENUM needs a capacity")))?;
                let tolerance = tolerance_at(1)?;
                if tolerance != 0.0 {
                    return Err(Error::Config(format!(
                        "line {line}: ENUM columns are lossless, tolerance must be 0"
                    )));
                }
                (
                    AttrType::Enum {
                        cap: parse_number(cap, line, "capacity")?,
                    },
                    0.0,
                )
            }
            "INTEGER" => (AttrType::Integer, tolerance_at(0)?),
            "DOUBLE" | "REAL" => (AttrType::Real, tolerance_at(0)?),
            "STRING" => (AttrType::String, 0.0),
            "PREDICT" => {
                let mut numbers = args
                    .iter()
                    .map(|f| parse_number::<usize>(f, line, "column"));
                let target = numbers
                    .next()
                    .ok_or_else(|| Error::Config(format!("line {line}: PREDICT needs a target")))??;
                let predictors = numbers.collect::<Result<Vec<_>>>()?;
                predictions.push((line, target, predictors));
                continue;
            }
            other => {
                return Err(Error::Config(format!(
                    "line {line}: unknown column type '{other}'"
                )))
            }
        };
        attr_types.push(attr_type);
        columns.push(ColumnConfig::lossy(tolerance));
    }
    for (line, target, predictors) in predictions {
        let settings = columns.get_mut(target).ok_or_else(|| {
            Error::Config(format!("line {line}: PREDICT target {target} is not a column"))
        })?;
        settings.predictors.extend(predictors);
    }
    let schema = Schema::new(attr_types);
    let config = CompressionConfig::new(columns);
    config.validate(&schema)?;
    Ok((schema, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = "\
# demo
ENUM 4
integer 2

REAL 0.5   # metres
STRING
PREDICT 1 0
";
        let (schema, config) = parse_config(text).unwrap();
        assert_eq!(
            schema.attr_types(),
            &[
                AttrType::Enum { cap: 4 },
                AttrType::Integer,
                AttrType::Real,
                AttrType::String
            ]
        );
        assert_eq!(config.columns()[1].tolerance, 2.0);
        assert_eq!(config.columns()[1].predictors, vec![0]);
        assert_eq!(config.columns()[2].tolerance, 0.5);
    }

    #[test]
    fn test_unknown_tag_reports_line() {
        let err = parse_config("ENUM 2\nBLOB\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_malformed_numbers() {
        assert!(parse_config("ENUM\n").is_err());
        assert!(parse_config("INTEGER x\n").is_err());
        assert!(parse_config("ENUM 2\nPREDICT\n").is_err());
        assert!(parse_config("ENUM 2\nPREDICT 5 0\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let schema = Schema::new(vec![AttrType::Enum { cap: 3 }, AttrType::Real]);
        let mut config = CompressionConfig::lossless(&schema);
        assert!(matches!(config.validate(&schema), Err(Error::Config(_))));

        config.column_mut(1).unwrap().tolerance = 0.1;
        assert!(config.validate(&schema).is_ok());

        config.column_mut(1).unwrap().tolerance = f64::NAN;
        assert!(config.validate(&schema).is_err());
        config.column_mut(1).unwrap().tolerance = 0.1;

        config.column_mut(0).unwrap().predictors = vec![1];
        assert!(config.validate(&schema).is_err());
        config.column_mut(0).unwrap().predictors = vec![0];
        assert!(config.validate(&schema).is_err());
        config.column_mut(0).unwrap().predictors = vec![];
        config.column_mut(1).unwrap().predictors = vec![0, 0];
        assert!(config.validate(&schema).is_err());

        assert!(CompressionConfig::new(vec![]).validate(&schema).is_err());
    }

    #[test]
    fn test_validate_rejects_cycles() {
        let schema = Schema::new(vec![AttrType::Enum { cap: 2 }, AttrType::Enum { cap: 2 }]);
        let config = CompressionConfig::new(vec![
            ColumnConfig::default().with_predictors(vec![1]),
            ColumnConfig::default().with_predictors(vec![0]),
        ]);
        assert!(matches!(
            config.validate(&schema),
            Err(Error::CyclicPredictors(_))
        ));
    }

    #[test]
    fn test_validate_rejects_large_tables() {
        let schema = Schema::new(vec![
            AttrType::Enum { cap: 300 },
            AttrType::Enum { cap: 300 },
            AttrType::Integer,
        ]);
        let config = CompressionConfig::new(vec![
            ColumnConfig::default(),
            ColumnConfig::default(),
            ColumnConfig::default().with_predictors(vec![0, 1]),
        ]);
        assert!(config.validate(&schema).is_err());
    }

    #[test]
    fn test_enum_tolerance_must_be_zero() {
        assert!(parse_config("ENUM 4 0\n").is_ok());
        let err = parse_config("INTEGER 1\nENUM 4 0.5\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_validate_rejects_too_many_predictors() {
        // Single-value enums never grow the table, only the predictor list.
        let mut attr_types = vec![AttrType::Enum { cap: 1 }; 256];
        attr_types.push(AttrType::Integer);
        let schema = Schema::new(attr_types);
        let mut config = CompressionConfig::lossless(&schema);
        config.column_mut(256).unwrap().predictors = (0..256).collect();
        let err = config.validate(&schema).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("at most 255"), "{err}");

        config.column_mut(256).unwrap().predictors = (0..255).collect();
        assert!(config.validate(&schema).is_ok());
    }

    #[test]
    fn test_enum_capacity_bounds() {
        let schema = Schema::new(vec![AttrType::Enum { cap: 0 }]);
        assert!(CompressionConfig::lossless(&schema).validate(&schema).is_err());
        let schema = Schema::new(vec![AttrType::Enum { cap: 70_000 }]);
        assert!(CompressionConfig::lossless(&schema).validate(&schema).is_err());
    }
}
