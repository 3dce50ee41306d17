//! In-memory sections awaiting serialization

use crate::crypto::{self, KEY_LENGTH};
use crate::schema::{DataType, Schema};
use crate::types::{FieldValue, Row};
use crate::{Result, TrackError};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a section's rows are stored at rest
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SectionEncoding {
    Standard,
    Encrypted,
}

impl SectionEncoding {
    pub(crate) fn tag(self) -> u8 {
        match self {
            SectionEncoding::Standard => 0,
            SectionEncoding::Encrypted => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SectionEncoding::Standard),
            1 => Some(SectionEncoding::Encrypted),
            _ => None,
        }
    }
}

impl fmt::Display for SectionEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionEncoding::Standard => write!(f, "standard"),
            SectionEncoding::Encrypted => write!(f, "encrypted"),
        }
    }
}

/// A schema-typed sequence of rows, optionally encrypted
///
/// Every present value is checked against the schema on construction. The key of an
/// encrypted section only lives in memory; it is never written to the track.
#[derive(Clone)]
pub struct Section {
    schema: Schema,
    rows: Vec<Row>,
    key: Option<[u8; KEY_LENGTH]>,
}

impl Section {
    /// Create a plaintext section
    pub fn standard(schema: Schema, rows: Vec<Row>) -> Result<Self> {
        validate_rows(&schema, &rows)?;
        Ok(Self {
            schema,
            rows,
            key: None,
        })
    }

    /// Create a section whose rows are encrypted at rest under `key` (32 bytes)
    pub fn encrypted(schema: Schema, rows: Vec<Row>, key: &[u8]) -> Result<Self> {
        let key = crypto::key_from_slice(key)?;
        validate_rows(&schema, &rows)?;
        Ok(Self {
            schema,
            rows,
            key: Some(key),
        })
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[inline]
    pub fn encoding(&self) -> SectionEncoding {
        if self.key.is_some() {
            SectionEncoding::Encrypted
        } else {
            SectionEncoding::Standard
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> Option<&[u8; KEY_LENGTH]> {
        self.key.as_ref()
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Section<{}, fields: {}, rows: {}>",
            self.encoding(),
            self.schema.len(),
            self.rows.len()
        )
    }
}

fn validate_rows(schema: &Schema, rows: &[Row]) -> Result<()> {
    if schema.is_empty() && !rows.is_empty() {
        return Err(TrackError::Format(format!(
            "a section without fields cannot hold {} rows",
            rows.len()
        )));
    }
    for (row_index, row) in rows.iter().enumerate() {
        for (name, value) in row.iter() {
            let field = schema.field(name).ok_or_else(|| {
                TrackError::Format(format!(
                    "row {row_index}: field '{name}' is not part of the schema"
                ))
            })?;

            let matches = matches!(
                (field.data_type(), value),
                (DataType::F64 { .. }, FieldValue::F64(_))
                    | (DataType::I64, FieldValue::I64(_))
                    | (DataType::U64, FieldValue::U64(_))
                    | (DataType::String, FieldValue::String(_))
            );
            if !matches {
                return Err(TrackError::Format(format!(
                    "row {row_index}: field '{name}' expects {:?}, got {}",
                    field.data_type(),
                    value.type_name()
                )));
            }
        }
    }
    Ok(())
}
