//! Low-level byte encoding shared by the writer and the reader
//!
//! Integers are LEB128 varints, signed values are zig-zag mapped first. Every
//! read is bounds checked and reports `CorruptBuffer` instead of panicking.

use crate::schema::{DataType, FieldDefinition, Schema};
use crate::types::FieldValue;
use crate::{Result, TrackError};

/// Marker byte for an F64 field without precision
const NO_PRECISION: u8 = 0xFF;

#[inline]
pub(crate) fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub(crate) fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

pub(crate) fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8 & 0x7F) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

#[inline]
pub(crate) fn write_signed_varint(out: &mut Vec<u8>, v: i64) {
    write_varint(out, zigzag_encode(v));
}

pub(crate) fn write_string(out: &mut Vec<u8>, s: &str) {
    write_varint(out, s.len() as u64);
    out.extend_from_slice(s.as_bytes());
}

pub(crate) fn write_schema(out: &mut Vec<u8>, schema: &Schema) {
    write_varint(out, schema.len() as u64);
    for field in schema.fields() {
        write_string(out, field.name());
        let data_type = field.data_type();
        out.push(data_type.type_tag());
        out.push(data_type.precision().unwrap_or(NO_PRECISION));
    }
}

/// Type-tagged value, used for metadata entries
pub(crate) fn write_tagged_value(out: &mut Vec<u8>, value: &FieldValue) {
    match value {
        FieldValue::F64(v) => {
            out.push(0);
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldValue::I64(v) => {
            out.push(1);
            write_signed_varint(out, *v);
        }
        FieldValue::U64(v) => {
            out.push(2);
            write_varint(out, *v);
        }
        FieldValue::String(s) => {
            out.push(3);
            write_string(out, s);
        }
    }
}

/// Bounds-checked cursor over a byte slice
pub(crate) struct ByteReader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    #[inline]
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .input
            .get(self.pos)
            .ok_or_else(|| truncated(self.pos, 1))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| truncated(self.pos, len))?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_f64_le(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        let start = self.pos;
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            if shift == 63 && byte > 1 {
                return Err(TrackError::CorruptBuffer(format!(
                    "varint at offset {start} overflows u64"
                )));
            }
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
            if shift > 63 {
                return Err(TrackError::CorruptBuffer(format!(
                    "varint at offset {start} is too long"
                )));
            }
        }
    }

    #[inline]
    pub(crate) fn read_signed_varint(&mut self) -> Result<i64> {
        Ok(zigzag_decode(self.read_varint()?))
    }

    /// Read a varint that is used as a length or count
    pub(crate) fn read_len(&mut self) -> Result<usize> {
        let v = self.read_varint()?;
        usize::try_from(v)
            .map_err(|_| TrackError::CorruptBuffer(format!("length {v} does not fit in memory")))
    }

    pub(crate) fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TrackError::CorruptBuffer(format!("invalid UTF-8 string: {e}")))
    }

    pub(crate) fn read_schema(&mut self) -> Result<Schema> {
        let count = self.read_len()?;
        let mut fields = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            let name = self.read_string()?;
            let tag = self.read_u8()?;
            let precision = match self.read_u8()? {
                NO_PRECISION => None,
                p => Some(p),
            };
            let data_type = DataType::from_type_tag(tag, precision).ok_or_else(|| {
                TrackError::CorruptBuffer(format!("unknown type tag {tag} for field '{name}'"))
            })?;
            fields.push(FieldDefinition::new(name, data_type));
        }
        Schema::new(fields).map_err(|e| TrackError::CorruptBuffer(e.to_string()))
    }

    pub(crate) fn read_tagged_value(&mut self) -> Result<FieldValue> {
        match self.read_u8()? {
            0 => Ok(FieldValue::F64(self.read_f64_le()?)),
            1 => Ok(FieldValue::I64(self.read_signed_varint()?)),
            2 => Ok(FieldValue::U64(self.read_varint()?)),
            3 => Ok(FieldValue::String(self.read_string()?)),
            tag => Err(TrackError::CorruptBuffer(format!(
                "unknown value tag {tag}"
            ))),
        }
    }
}

fn truncated(pos: usize, wanted: usize) -> TrackError {
    TrackError::CorruptBuffer(format!(
        "buffer truncated: needed {wanted} bytes at offset {pos}"
    ))
}

/// Number of bytes of a presence bitmap for `rows` rows
#[inline]
pub(crate) fn bitmap_len(rows: usize) -> usize {
    rows.div_ceil(8)
}

#[inline]
pub(crate) fn bitmap_get(bitmap: &[u8], row: usize) -> bool {
    bitmap[row / 8] & (1 << (row % 8)) != 0
}

#[inline]
pub(crate) fn bitmap_set(bitmap: &mut [u8], row: usize) {
    bitmap[row / 8] |= 1 << (row % 8);
}

/// `10^precision` as a float scale factor
#[inline]
pub(crate) fn scale_factor(precision: u8) -> f64 {
    10f64.powi(i32::from(precision))
}
