//! Multi-field polyline encoding
//!
//! Google's polyline algorithm generalized to any number of fields. Every field is
//! scaled to its own precision and delta-coded against its own previous value, and the
//! fields of a row are emitted in the caller's order, row after row. A decoder therefore
//! needs both the field order and the precisions.

use crate::geometry::{X_FIELD, Y_FIELD, haversine_distance};
use crate::{Result, RwgpsError};
use geo::Coord;
use smallvec::{SmallVec, smallvec};
use tracklib::{FieldValue, MAX_PRECISION, Row, Schema, quantize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Virtual field: cumulative great-circle distance in meters from the first encoded row
pub const DISTANCE_FIELD: &str = "d";

/// One encoded field: its name, decimal precision and optional fill-in value
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolylineField {
    name: String,
    precision: u8,
    default: Option<f64>,
}

impl PolylineField {
    pub fn new(name: impl Into<String>, precision: u8) -> Self {
        Self {
            name: name.into(),
            precision,
            default: None,
        }
    }

    /// Value used for rows that lack the field, instead of skipping them
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    #[inline]
    pub fn default(&self) -> Option<f64> {
        self.default
    }

    #[inline]
    fn is_distance(&self) -> bool {
        self.name == DISTANCE_FIELD
    }
}

/// Ordered list of fields to encode
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PolylineOptions {
    fields: Vec<PolylineField>,
}

impl PolylineOptions {
    pub fn new(fields: Vec<PolylineField>) -> Result<Self> {
        if let Some(field) = fields.iter().find(|f| f.precision > MAX_PRECISION) {
            return Err(RwgpsError::InvalidOption(format!(
                "field '{}' has precision {}, maximum is {MAX_PRECISION}",
                field.name, field.precision
            )));
        }
        Ok(Self { fields })
    }

    /// Build options from `(name, precision, default)` triples
    pub fn from_triples<'a, I>(triples: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, u8, Option<f64>)>,
    {
        Self::new(
            triples
                .into_iter()
                .map(|(name, precision, default)| PolylineField {
                    name: name.to_string(),
                    precision,
                    default,
                })
                .collect(),
        )
    }

    #[inline]
    pub fn fields(&self) -> &[PolylineField] {
        &self.fields
    }

    #[inline]
    pub fn precisions(&self) -> Vec<u8> {
        self.fields.iter().map(PolylineField::precision).collect()
    }

    /// Section columns needed to encode these fields
    pub(crate) fn source_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.fields.len() + 2);
        for field in &self.fields {
            if field.is_distance() {
                names.extend([X_FIELD, Y_FIELD]);
            } else {
                names.push(&field.name);
            }
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    /// `true` when a requested field (other than `d`) does not exist in the schema at all
    pub(crate) fn structurally_absent(&self, schema: &Schema) -> bool {
        self.fields
            .iter()
            .any(|f| !f.is_distance() && !schema.contains(&f.name))
    }
}

/// Encode `rows` (conforming to `schema`) as a polyline
///
/// Returns an empty string if any requested field is missing from the schema. Rows that
/// lack a requested field without default are skipped entirely.
pub fn polyline_encode(rows: &[Row], schema: &Schema, options: &PolylineOptions) -> Result<String> {
    #[cfg(feature = "profiling")]
    profiling::scope!("polyline::encode");

    if options.structurally_absent(schema) {
        tracing::debug!("requested polyline field is not part of the schema");
        return Ok(String::new());
    }

    for field in options.fields() {
        if let Some(definition) = schema.field(&field.name) {
            if !definition.data_type().is_numeric() && !field.is_distance() {
                return Err(RwgpsError::UnsupportedField {
                    name: field.name.clone(),
                    data_type: definition.data_type(),
                });
            }
        }
    }

    let fields = options.fields();
    let needs_distance = fields.iter().any(PolylineField::is_distance);

    let mut output = String::new();
    let mut prev: SmallVec<[i64; 8]> = smallvec![0; fields.len()];
    let mut values: SmallVec<[f64; 8]> = SmallVec::with_capacity(fields.len());
    let mut last_point: Option<(Coord<f64>, f64)> = None;
    let mut encoded_rows = 0usize;

    'rows: for row in rows {
        values.clear();

        let coord = if needs_distance {
            match (
                row.get(X_FIELD).and_then(FieldValue::as_f64),
                row.get(Y_FIELD).and_then(FieldValue::as_f64),
            ) {
                (Some(x), Some(y)) => Some(Coord { x, y }),
                _ => continue 'rows,
            }
        } else {
            None
        };

        for field in fields {
            if field.is_distance() {
                // filled in once the row is known to survive
                values.push(0.0);
                continue;
            }
            match row
                .get(&field.name)
                .and_then(FieldValue::as_f64)
                .or(field.default)
            {
                Some(value) => values.push(value),
                None => continue 'rows,
            }
        }

        if let Some(coord) = coord {
            let distance = match last_point {
                Some((prev_coord, prev_distance)) => {
                    prev_distance + haversine_distance(prev_coord, coord)
                }
                None => 0.0,
            };
            last_point = Some((coord, distance));
            for (value, field) in values.iter_mut().zip(fields) {
                if field.is_distance() {
                    *value = distance;
                }
            }
        }

        for ((value, field), prev) in values.iter().zip(fields).zip(prev.iter_mut()) {
            let scaled = quantize(*value, field.precision).ok_or_else(|| {
                RwgpsError::InvalidOption(format!(
                    "value {value} of field '{}' does not fit precision {}",
                    field.name, field.precision
                ))
            })?;
            encode_delta(&mut output, scaled.wrapping_sub(*prev));
            *prev = scaled;
        }
        encoded_rows += 1;
    }

    tracing::trace!(
        rows = rows.len(),
        encoded_rows,
        fields = fields.len(),
        "encoded polyline"
    );

    Ok(output)
}

/// Zig-zag the delta, then emit 5-bit groups (low first) offset by 63
fn encode_delta(output: &mut String, delta: i64) {
    let mut v = ((delta << 1) ^ (delta >> 63)) as u64;
    while v >= 0x20 {
        output.push(char::from((0x20 | (v & 0x1F) as u8) + 63));
        v >>= 5;
    }
    output.push(char::from(v as u8 + 63));
}

/// Decode a polyline produced by [`polyline_encode`] with the same precisions, in order
///
/// The result is flat: `[row0_field0, row0_field1, ..., row1_field0, ...]`.
pub fn polyline_decode(polyline: &str, precisions: &[u8]) -> Result<Vec<f64>> {
    if precisions.is_empty() {
        return if polyline.is_empty() {
            Ok(Vec::new())
        } else {
            Err(RwgpsError::InvalidPolyline(
                "no precisions given for a non-empty polyline".to_string(),
            ))
        };
    }

    let bytes = polyline.as_bytes();
    let factors: Vec<f64> = precisions
        .iter()
        .map(|p| 10f64.powi(i32::from(*p)))
        .collect();
    let mut prev = vec![0i64; precisions.len()];
    let mut output = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        for (field, factor) in factors.iter().enumerate() {
            let mut result: u64 = 0;
            let mut shift = 0u32;
            loop {
                let byte = *bytes.get(pos).ok_or_else(|| {
                    RwgpsError::InvalidPolyline(format!("truncated value at offset {pos}"))
                })?;
                let chunk = byte.checked_sub(63).filter(|c| *c < 0x40).ok_or_else(|| {
                    RwgpsError::InvalidPolyline(format!("invalid character at offset {pos}"))
                })?;
                if shift > 60 {
                    return Err(RwgpsError::InvalidPolyline(format!(
                        "value at offset {pos} overflows"
                    )));
                }
                pos += 1;
                result |= u64::from(chunk & 0x1F) << shift;
                shift += 5;
                if chunk < 0x20 {
                    break;
                }
            }
            let delta = ((result >> 1) as i64) ^ -((result & 1) as i64);
            prev[field] = prev[field].wrapping_add(delta);
            output.push(prev[field] as f64 / factor);
        }
    }

    Ok(output)
}
