//! Schema definitions
//!
//! A schema is an ordered list of uniquely named, typed fields. The order fixes
//! the column layout on disk; rows are still accessed by name.

use crate::{Result, TrackError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest supported number of decimal digits for quantized floats
pub const MAX_PRECISION: u8 = 15;

/// Storage type of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    /// 64-bit float. With `precision`, values are rounded to that many decimal
    /// digits on write; without it the raw bits are stored.
    F64 { precision: Option<u8> },
    I64,
    U64,
    String,
}

impl DataType {
    pub(crate) fn type_tag(&self) -> u8 {
        match self {
            DataType::F64 { .. } => 0,
            DataType::I64 => 1,
            DataType::U64 => 2,
            DataType::String => 3,
        }
    }

    pub(crate) fn from_type_tag(tag: u8, precision: Option<u8>) -> Option<Self> {
        match tag {
            0 => Some(DataType::F64 { precision }),
            1 => Some(DataType::I64),
            2 => Some(DataType::U64),
            3 => Some(DataType::String),
            _ => None,
        }
    }

    /// Precision of a quantized float field
    #[inline]
    pub fn precision(&self) -> Option<u8> {
        match self {
            DataType::F64 { precision } => *precision,
            _ => None,
        }
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        !matches!(self, DataType::String)
    }
}

/// A named, typed field
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldDefinition {
    name: String,
    data_type: DataType,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Ordered list of field definitions with unique names
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Schema {
    fields: Vec<FieldDefinition>,
}

impl Schema {
    /// Create a schema, rejecting duplicate names and unsupported precisions
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(TrackError::InvalidSchema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
            match field.data_type.precision() {
                Some(precision) if precision > MAX_PRECISION => {
                    return Err(TrackError::InvalidSchema(format!(
                        "field '{}' has precision {precision}, maximum is {MAX_PRECISION}",
                        field.name
                    )));
                }
                _ => {}
            }
        }

        Ok(Self { fields })
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field in the column layout
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}
