//! Delimited text rows and enum dictionaries.
//!
//! Enum columns hold arbitrary labels in text form. Each column gets an
//! [`EnumDictionary`] that assigns codes in order of first appearance; the
//! dictionaries are stored beside the compressed file, one block per column:
//!
//! ```text
//! 2          <- number of labels of column 0
//! north
//! south
//! 0          <- column 1 is not an enum, or has no labels
//! ```

use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::attr::{AttrType, AttrValue, Schema};
use crate::error::{Error, Result};

/// Labels of one enum column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumDictionary {
    labels: Vec<String>,
    codes: HashMap<String, u32>,
}

impl EnumDictionary {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no label has been seen.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Code of `label`, assigning the next free code when it is new.
    ///
    /// # Errors
    /// `Error::Unencodable` when a new label would exceed `cap`.
    pub fn code(&mut self, label: &str, cap: u32, column: usize) -> Result<u32> {
        if let Some(&code) = self.codes.get(label) {
            return Ok(code);
        }
        let code = self.labels.len() as u32;
        if code >= cap {
            return Err(Error::Unencodable {
                column,
                reason: format!("label '{label}' exceeds the capacity of {cap} labels"),
            });
        }
        self.labels.push(label.to_string());
        self.codes.insert(label.to_string(), code);
        Ok(code)
    }

    /// Label of `code`.
    pub fn label(&self, code: u32) -> Option<&str> {
        self.labels.get(code as usize).map(String::as_str)
    }

    fn push(&mut self, label: String) {
        self.codes.insert(label.clone(), self.labels.len() as u32);
        self.labels.push(label);
    }
}

fn escape(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(line: &str) -> Result<String> {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            other => {
                return Err(Error::Corrupt(format!(
                    "bad escape in enum label: {other:?}"
                )))
            }
        }
    }
    Ok(out)
}

/// Write one block per dictionary.
pub fn write_dictionaries<W: Write>(dictionaries: &[EnumDictionary], mut writer: W) -> Result<()> {
    for dictionary in dictionaries {
        writeln!(writer, "{}", dictionary.len())?;
        for label in &dictionary.labels {
            writeln!(writer, "{}", escape(label))?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read `columns` dictionary blocks.
pub fn read_dictionaries<R: BufRead>(reader: R, columns: usize) -> Result<Vec<EnumDictionary>> {
    let mut lines = reader.lines();
    let mut next_line = || -> Result<String> {
        lines
            .next()
            .transpose()?
            .ok_or(Error::Corrupt("enum dictionary ends early".into()))
    };
    let mut dictionaries = Vec::with_capacity(columns);
    for _ in 0..columns {
        let count: usize = next_line()?
            .trim()
            .parse()
            .map_err(|_| Error::Corrupt("bad enum dictionary size".into()))?;
        let mut dictionary = EnumDictionary::new();
        for _ in 0..count {
            dictionary.push(unescape(&next_line()?)?);
        }
        dictionaries.push(dictionary);
    }
    Ok(dictionaries)
}

/// Split a line into fields. With `,` as delimiter, fields may be wrapped
/// in double quotes, with `""` standing for a literal quote.
pub fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    if delimiter != ',' {
        return line.split(delimiter).map(str::to_string).collect();
    }
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if field.is_empty() => quoted = true,
            c if c == delimiter && !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn quote(field: &str, delimiter: char) -> String {
    if delimiter == ',' && (field.contains(',') || field.contains('"') || field.starts_with(' ')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse a line into a tuple of `schema`.
///
/// A single trailing delimiter is accepted and ignored.
pub fn parse_row(
    line: &str,
    schema: &Schema,
    dictionaries: &mut [EnumDictionary],
    delimiter: char,
) -> Result<Vec<AttrValue>> {
    let mut fields = split_fields(line, delimiter);
    if fields.len() == schema.len() + 1 && fields.last().is_some_and(String::is_empty) {
        fields.pop();
    }
    if fields.len() != schema.len() {
        return Err(Error::TupleShape {
            expected: schema.len(),
            found: fields.len(),
        });
    }
    let unparsable = |column: usize, field: &str, what: &str| Error::Unencodable {
        column,
        reason: format!("'{field}' is not {what}"),
    };
    fields
        .iter()
        .zip(schema.attr_types())
        .enumerate()
        .map(|(column, (field, &attr_type))| match attr_type {
            AttrType::Enum { cap } => {
                let dictionary = dictionaries.get_mut(column).ok_or(Error::Config(format!(
                    "no enum dictionary for column {column}"
                )))?;
                dictionary.code(field, cap, column).map(AttrValue::Enum)
            }
            AttrType::Integer => field
                .trim()
                .parse()
                .map(AttrValue::Integer)
                .map_err(|_| unparsable(column, field, "an integer")),
            AttrType::Real => field
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(AttrValue::Real)
                .ok_or_else(|| unparsable(column, field, "a finite number")),
            AttrType::String => Ok(AttrValue::String(field.clone())),
        })
        .collect()
}

/// Render a tuple as a line, without the line break.
pub fn format_row(
    tuple: &[AttrValue],
    dictionaries: &[EnumDictionary],
    delimiter: char,
) -> Result<String> {
    let fields = tuple
        .iter()
        .enumerate()
        .map(|(column, value)| match value {
            AttrValue::Enum(code) => dictionaries
                .get(column)
                .and_then(|d| d.label(*code))
                .map(|label| quote(label, delimiter))
                .ok_or_else(|| {
                    Error::Corrupt(format!("column {column} has no label for code {code}"))
                }),
            AttrValue::Integer(v) => Ok(v.to_string()),
            AttrValue::Real(v) => Ok(v.to_string()),
            AttrValue::String(s) => Ok(quote(s, delimiter)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(fields.join(&delimiter.to_string()))
}
