//! Text encoding of the enrollment record file.
//!
//! ```text
//! name,dim,signatures
//! Alice,512,<8 × 512 comma-separated floats>
//! ```
//!
//! Each row holds the person's name, the signature dimension, then the eight
//! signatures concatenated in augmentation order. Floats use Rust's shortest
//! round-trip rendering, so a serialize/deserialize cycle is bit-exact.

use crate::types::{FaceSignature, PersonRecord, SIGNATURES_PER_PERSON};
use std::collections::HashSet;
use std::fmt::Write as _;
use thiserror::Error;

pub const HEADER: &str = "name,dim,signatures";
pub const DELIMITER: char = ',';

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("line {line}: missing {field}")]
    MissingField { line: usize, field: &'static str },
    #[error("line {line}: invalid signature dimension {value:?}")]
    InvalidDimension { line: usize, value: String },
    #[error("line {line}: expected {expected} values, got {actual}")]
    WrongValueCount {
        line: usize,
        expected: usize,
        actual: usize,
    },
    #[error("line {line}: invalid value {value:?}")]
    InvalidValue { line: usize, value: String },
    #[error("line {line}: duplicate name {name:?}")]
    DuplicateName { line: usize, name: String },
    #[error("line {line}: dimension {actual} differs from {expected} used by earlier rows")]
    DimensionMismatch {
        line: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name {0:?} contains a delimiter or line break")]
    ForbiddenCharacter(String),
    #[error("name {0:?} has leading or trailing whitespace")]
    Untrimmed(String),
    #[error("name {0:?} cannot be used as a file name")]
    PathLike(String),
}

/// Check that `name` can be stored as the first field of a row and as a
/// library file stem.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if name.trim() != name {
        return Err(NameError::Untrimmed(name.to_string()));
    }
    if name.contains([DELIMITER, '\n', '\r']) {
        return Err(NameError::ForbiddenCharacter(name.to_string()));
    }
    if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(NameError::PathLike(name.to_string()));
    }
    Ok(())
}

/// Render one record as a row (without trailing newline).
pub fn serialize_row(record: &PersonRecord) -> String {
    let dim = record.signatures.first().map_or(0, FaceSignature::dimension);
    let mut row = format!("{}{DELIMITER}{dim}", record.name);
    for value in record.signatures.iter().flat_map(|s| s.values.iter()) {
        // Writing into a String cannot fail.
        let _ = write!(row, "{DELIMITER}{value}");
    }
    row
}

/// Render the whole table, header first.
pub fn serialize(records: &[PersonRecord]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for record in records {
        out.push_str(&serialize_row(record));
        out.push('\n');
    }
    out
}

/// Parse one row. `line` is 1-based and only used for error reporting.
pub fn deserialize_row(row: &str, line: usize) -> Result<PersonRecord, CodecError> {
    let mut fields = row.split(DELIMITER);

    let name = fields
        .next()
        .filter(|n| !n.is_empty())
        .ok_or(CodecError::MissingField { line, field: "name" })?;

    let dim_field = fields
        .next()
        .ok_or(CodecError::MissingField { line, field: "dim" })?;
    let dim = dim_field
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&d| d > 0)
        .ok_or_else(|| CodecError::InvalidDimension {
            line,
            value: dim_field.to_string(),
        })?;

    let values = fields
        .map(|raw| {
            raw.trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CodecError::InvalidValue {
                    line,
                    value: raw.to_string(),
                })
        })
        .collect::<Result<Vec<f32>, _>>()?;

    let expected = dim * SIGNATURES_PER_PERSON;
    if values.len() != expected {
        return Err(CodecError::WrongValueCount {
            line,
            expected,
            actual: values.len(),
        });
    }

    Ok(PersonRecord {
        name: name.to_string(),
        signatures: values
            .chunks(dim)
            .map(|chunk| FaceSignature::new(chunk.to_vec()))
            .collect(),
    })
}

/// Parse a whole table. The header row and blank lines are skipped.
pub fn deserialize(text: &str) -> Result<Vec<PersonRecord>, CodecError> {
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut dimension: Option<usize> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let row = raw.trim_end_matches('\r');
        if row.trim().is_empty() || row == HEADER {
            continue;
        }

        let record = deserialize_row(row, line)?;

        let dim = record.signatures[0].dimension();
        match dimension {
            Some(expected) if expected != dim => {
                return Err(CodecError::DimensionMismatch {
                    line,
                    expected,
                    actual: dim,
                });
            }
            _ => dimension = Some(dim),
        }

        if !seen.insert(record.name.clone()) {
            return Err(CodecError::DuplicateName {
                line,
                name: record.name,
            });
        }
        records.push(record);
    }

    Ok(records)
}
