//! Track serialization
//!
//! Layout of a track buffer:
//!
//! ```text
//! "TRKL" | version
//! metadata count | (key, tagged value)*
//! section count | (encoding, rows, schema, body length, body crc32)*
//! header crc32
//! section bodies
//! ```
//!
//! A plaintext section body is one length-prefixed column per schema field, each a
//! presence bitmap followed by the values of the rows that have the field.

use crate::encoding::{
    bitmap_len, bitmap_set, scale_factor, write_schema, write_signed_varint, write_string,
    write_tagged_value, write_varint,
};
use crate::schema::{DataType, FieldDefinition};
use crate::section::{Section, SectionEncoding};
use crate::types::{FieldValue, MetadataEntry, Row};
use crate::{Result, TrackError, crypto};
use rayon::prelude::*;

pub(crate) const MAGIC: &[u8; 4] = b"TRKL";
pub(crate) const VERSION: u8 = 1;

/// Largest magnitude a quantized float may reach before it no longer fits an i64
const MAX_QUANTIZED: f64 = 9.0e18;

/// Serialize metadata and sections into a single buffer
///
/// Sections are encoded in parallel; the output keeps the given order.
pub fn write_track(metadata: &[MetadataEntry], sections: &[Section]) -> Result<Vec<u8>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("write::write_track");

    let bodies: Vec<Vec<u8>> = sections
        .par_iter()
        .map(encode_section_body)
        .collect::<Result<_>>()?;

    let mut out = Vec::with_capacity(64 + bodies.iter().map(Vec::len).sum::<usize>());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);

    write_varint(&mut out, metadata.len() as u64);
    for entry in metadata {
        write_string(&mut out, &entry.key);
        write_tagged_value(&mut out, &entry.value);
    }

    write_varint(&mut out, sections.len() as u64);
    for (section, body) in sections.iter().zip(&bodies) {
        out.push(section.encoding().tag());
        write_varint(&mut out, section.rows().len() as u64);
        write_schema(&mut out, section.schema());
        write_varint(&mut out, body.len() as u64);
        out.extend_from_slice(&crc32fast::hash(body).to_le_bytes());
    }

    let header_crc = crc32fast::hash(&out);
    out.extend_from_slice(&header_crc.to_le_bytes());

    for body in &bodies {
        out.extend_from_slice(body);
    }

    tracing::debug!(
        sections = sections.len(),
        metadata = metadata.len(),
        bytes = out.len(),
        "wrote track"
    );

    Ok(out)
}

fn encode_section_body(section: &Section) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for field in section.schema().fields() {
        let column = encode_column(field, section.rows())?;
        write_varint(&mut body, column.len() as u64);
        body.extend_from_slice(&column);
    }

    match (section.encoding(), section.key()) {
        (SectionEncoding::Encrypted, Some(key)) => {
            let sealed = crypto::seal(key, &body)?;
            tracing::debug!(
                rows = section.rows().len(),
                plaintext = body.len(),
                sealed = sealed.len(),
                "encoded encrypted section"
            );
            Ok(sealed)
        }
        _ => {
            tracing::debug!(
                rows = section.rows().len(),
                bytes = body.len(),
                "encoded section"
            );
            Ok(body)
        }
    }
}

fn encode_column(field: &FieldDefinition, rows: &[Row]) -> Result<Vec<u8>> {
    let mut bitmap = vec![0u8; bitmap_len(rows.len())];
    let mut values = Vec::new();
    let mut prev: i64 = 0;

    for (row_index, row) in rows.iter().enumerate() {
        let Some(value) = row.get(field.name()) else {
            continue;
        };
        bitmap_set(&mut bitmap, row_index);

        match (field.data_type(), value) {
            (DataType::F64 { precision: Some(p) }, FieldValue::F64(v)) => {
                let q = quantize(*v, p).ok_or_else(|| {
                    TrackError::Format(format!(
                        "row {row_index}: value {v} of field '{}' does not fit precision {p}",
                        field.name()
                    ))
                })?;
                write_signed_varint(&mut values, q.wrapping_sub(prev));
                prev = q;
            }
            (DataType::F64 { precision: None }, FieldValue::F64(v)) => {
                values.extend_from_slice(&v.to_le_bytes());
            }
            (DataType::I64, FieldValue::I64(v)) => {
                write_signed_varint(&mut values, v.wrapping_sub(prev));
                prev = *v;
            }
            (DataType::U64, FieldValue::U64(v)) => write_varint(&mut values, *v),
            (DataType::String, FieldValue::String(s)) => write_string(&mut values, s),
            (data_type, value) => {
                return Err(TrackError::Format(format!(
                    "row {row_index}: field '{}' expects {data_type:?}, got {}",
                    field.name(),
                    value.type_name()
                )));
            }
        }
    }

    let mut column = bitmap;
    column.extend_from_slice(&values);
    Ok(column)
}

/// Round a float to `precision` decimal digits as a scaled integer
///
/// `None` when the scaled value is not finite or does not fit an `i64`.
pub fn quantize(v: f64, precision: u8) -> Option<i64> {
    let scaled = (v * scale_factor(precision)).round();
    if scaled.is_finite() && scaled.abs() < MAX_QUANTIZED {
        Some(scaled as i64)
    } else {
        None
    }
}
