//! Track reading
//!
//! [`TrackReader`] validates the header and section index up front and keeps borrowed
//! slices of the section bodies. Nothing below the index is decoded until a caller opens
//! a section, and even then only the requested columns are materialized.

use crate::encoding::{ByteReader, bitmap_get, bitmap_len, scale_factor};
use crate::schema::{DataType, FieldDefinition, Schema};
use crate::section::SectionEncoding;
use crate::types::{FieldValue, MetadataEntry, Row};
use crate::write::{MAGIC, VERSION};
use crate::{Result, TrackError, crypto};
use std::borrow::Cow;
use std::ops::Range;

/// Read-only view over a track buffer
#[derive(Debug)]
pub struct TrackReader<'a> {
    metadata: Vec<MetadataEntry>,
    sections: Vec<SectionEntry<'a>>,
}

#[derive(Debug)]
struct SectionEntry<'a> {
    encoding: SectionEncoding,
    rows: usize,
    schema: Schema,
    body: &'a [u8],
    crc: u32,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> TrackReader<'a> {
    /// Parse the header and section index of `input`
    pub fn new(input: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(input);

        if reader.read_bytes(MAGIC.len())? != MAGIC {
            return Err(TrackError::CorruptBuffer("bad magic".to_string()));
        }
        let version = reader.read_u8()?;
        if version != VERSION {
            return Err(TrackError::CorruptBuffer(format!(
                "unsupported version {version}"
            )));
        }

        let metadata_count = reader.read_len()?;
        let mut metadata = Vec::with_capacity(metadata_count.min(reader.remaining()));
        for _ in 0..metadata_count {
            let key = reader.read_string()?;
            let value = reader.read_tagged_value()?;
            metadata.push(MetadataEntry { key, value });
        }

        let section_count = reader.read_len()?;
        let mut index = Vec::with_capacity(section_count.min(reader.remaining()));
        for section_index in 0..section_count {
            let tag = reader.read_u8()?;
            let encoding = SectionEncoding::from_tag(tag).ok_or_else(|| {
                TrackError::CorruptBuffer(format!(
                    "section {section_index} has unknown encoding {tag}"
                ))
            })?;
            let rows = reader.read_len()?;
            let schema = reader.read_schema()?;
            let body_len = reader.read_len()?;
            let crc = reader.read_u32_le()?;
            index.push((encoding, rows, schema, body_len, crc));
        }

        let header_len = reader.position();
        let expected_crc = reader.read_u32_le()?;
        if crc32fast::hash(&input[..header_len]) != expected_crc {
            return Err(TrackError::CorruptBuffer(
                "header checksum mismatch".to_string(),
            ));
        }

        let mut sections = Vec::with_capacity(index.len());
        for (encoding, rows, schema, body_len, crc) in index {
            let body = reader.read_bytes(body_len)?;
            sections.push(SectionEntry {
                encoding,
                rows,
                schema,
                body,
                crc,
            });
        }

        if reader.remaining() != 0 {
            return Err(TrackError::CorruptBuffer(format!(
                "{} trailing bytes after last section",
                reader.remaining()
            )));
        }

        tracing::debug!(
            sections = sections.len(),
            metadata = metadata.len(),
            bytes = input.len(),
            "opened track"
        );

        Ok(Self { metadata, sections })
    }

    #[inline]
    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    #[inline]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Handle to the section at `index`
    pub fn section(&self, index: usize) -> Result<SectionHandle<'_>> {
        self.sections
            .get(index)
            .map(|entry| SectionHandle {
                index,
                encoding: entry.encoding,
                rows: entry.rows,
                schema: &entry.schema,
                body: entry.body,
                crc: entry.crc,
            })
            .ok_or(TrackError::OutOfRange {
                index,
                count: self.sections.len(),
            })
    }

    pub fn sections(&self) -> impl Iterator<Item = SectionHandle<'_>> {
        (0..self.sections.len()).filter_map(|index| self.section(index).ok())
    }
}

/// Lightweight reference to one section of a track
#[derive(Clone, Copy, Debug)]
pub struct SectionHandle<'r> {
    index: usize,
    encoding: SectionEncoding,
    rows: usize,
    schema: &'r Schema,
    body: &'r [u8],
    crc: u32,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'r> SectionHandle<'r> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn encoding(&self) -> SectionEncoding {
        self.encoding
    }

    /// Schema of the section (readable without a key)
    #[inline]
    pub fn schema(&self) -> &'r Schema {
        self.schema
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Verify and, for encrypted sections, decrypt the section body
    ///
    /// `key` is required for encrypted sections and ignored for standard ones.
    pub fn open(&self, key: Option<&[u8]>) -> Result<SectionData<'r>> {
        if crc32fast::hash(self.body) != self.crc {
            return Err(TrackError::CorruptBuffer(format!(
                "section {} checksum mismatch",
                self.index
            )));
        }

        let body = match self.encoding {
            SectionEncoding::Standard => Cow::Borrowed(self.body),
            SectionEncoding::Encrypted => {
                let key = key.ok_or_else(|| {
                    TrackError::Decryption(format!(
                        "section {} is encrypted and no key was supplied",
                        self.index
                    ))
                })?;
                Cow::Owned(crypto::open(key, self.body)?)
            }
        };

        SectionData::new(self.schema, self.rows, body)
    }
}

/// One decoded column: a slot per row, `None` where the row lacks the field
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub field: FieldDefinition,
    pub values: Vec<Option<FieldValue>>,
}

/// Plaintext body of an opened section, decodable column by column
#[derive(Debug)]
pub struct SectionData<'r> {
    schema: &'r Schema,
    rows: usize,
    body: Cow<'r, [u8]>,
    columns: Vec<Range<usize>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'r> SectionData<'r> {
    fn new(schema: &'r Schema, rows: usize, body: Cow<'r, [u8]>) -> Result<Self> {
        // Every column starts with a presence bitmap, so `rows` is bounded by the body.
        if schema.is_empty() && rows != 0 {
            return Err(TrackError::CorruptBuffer(format!(
                "section without fields claims {rows} rows"
            )));
        }

        let mut reader = ByteReader::new(&body);
        let mut columns = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let len = reader.read_len()?;
            let start = reader.position();
            reader.read_bytes(len).map_err(|_| {
                TrackError::CorruptBuffer(format!("column '{}' is truncated", field.name()))
            })?;
            if len < bitmap_len(rows) {
                return Err(TrackError::CorruptBuffer(format!(
                    "column '{}' is too short for {rows} rows",
                    field.name()
                )));
            }
            columns.push(start..start + len);
        }
        if reader.remaining() != 0 {
            return Err(TrackError::CorruptBuffer(
                "unexpected bytes after last column".to_string(),
            ));
        }

        Ok(Self {
            schema,
            rows,
            body,
            columns,
        })
    }

    #[inline]
    pub fn schema(&self) -> &'r Schema {
        self.schema
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Decode a single column; `Ok(None)` when the schema has no such field
    pub fn column(&self, name: &str) -> Result<Option<Column>> {
        let Some(index) = self.schema.index_of(name) else {
            return Ok(None);
        };
        let field = &self.schema.fields()[index];
        let values = decode_column(field, &self.body[self.columns[index].clone()], self.rows)?;
        Ok(Some(Column {
            field: field.clone(),
            values,
        }))
    }

    /// Decode several columns, preserving the requested order
    pub fn columns(&self, names: &[&str]) -> Result<Vec<Option<Column>>> {
        names.iter().map(|name| self.column(name)).collect()
    }

    /// Materialize every row with all of its present fields
    pub fn rows(&self) -> Result<Vec<Row>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("read::rows");

        self.collect_rows(|_| true)
    }

    /// Materialize every row restricted to `names`; names missing from the schema are ignored
    pub fn project(&self, names: &[&str]) -> Result<Vec<Row>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("read::project");

        self.collect_rows(|field| names.contains(&field.name()))
    }

    fn collect_rows(&self, wanted: impl Fn(&FieldDefinition) -> bool) -> Result<Vec<Row>> {
        let mut rows = vec![Row::new(); self.rows];
        for (field, range) in self.schema.fields().iter().zip(&self.columns) {
            if !wanted(field) {
                continue;
            }
            let values = decode_column(field, &self.body[range.clone()], self.rows)?;
            for (row, value) in rows.iter_mut().zip(values) {
                if let Some(value) = value {
                    row.insert(field.name(), value);
                }
            }
        }
        Ok(rows)
    }
}

fn decode_column(
    field: &FieldDefinition,
    bytes: &[u8],
    rows: usize,
) -> Result<Vec<Option<FieldValue>>> {
    let mut reader = ByteReader::new(bytes);
    let bitmap = reader.read_bytes(bitmap_len(rows))?;
    let mut values = Vec::with_capacity(rows);
    let mut prev: i64 = 0;

    for row in 0..rows {
        if !bitmap_get(bitmap, row) {
            values.push(None);
            continue;
        }

        let value = match field.data_type() {
            DataType::F64 { precision: Some(p) } => {
                prev = prev.wrapping_add(reader.read_signed_varint()?);
                FieldValue::F64(prev as f64 / scale_factor(p))
            }
            DataType::F64 { precision: None } => FieldValue::F64(reader.read_f64_le()?),
            DataType::I64 => {
                prev = prev.wrapping_add(reader.read_signed_varint()?);
                FieldValue::I64(prev)
            }
            DataType::U64 => FieldValue::U64(reader.read_varint()?),
            DataType::String => FieldValue::String(reader.read_string()?),
        };
        values.push(Some(value));
    }

    if reader.remaining() != 0 {
        return Err(TrackError::CorruptBuffer(format!(
            "column '{}' has {} unread bytes",
            field.name(),
            reader.remaining()
        )));
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::Section;
    use crate::write::write_track;

    const KEY: &[u8] = b"01234567890123456789012345678901";

    fn schema() -> Schema {
        Schema::new(vec![
            FieldDefinition::new("x", DataType::F64 { precision: Some(7) }),
            FieldDefinition::new("y", DataType::F64 { precision: Some(7) }),
            FieldDefinition::new("raw", DataType::F64 { precision: None }),
            FieldDefinition::new("t", DataType::I64),
            FieldDefinition::new("S", DataType::U64),
            FieldDefinition::new("z", DataType::String),
        ])
        .unwrap()
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("x", 40.0)
                .with("y", 12.0)
                .with("raw", 0.1 + 0.2)
                .with("t", 1_600_000_000i64)
                .with("S", 3u64)
                .with("z", "Foo"),
            Row::new().with("x", -122.402).with("y", 72.1),
            Row::new()
                .with("x", 41.0)
                .with("y", 800.0)
                .with("t", 1_599_999_990i64),
        ]
    }

    #[test]
    fn test_roundtrip_standard() {
        let section = Section::standard(schema(), rows()).unwrap();
        let buf = write_track(&[MetadataEntry::new("name", "Morning Ride")], &[section]).unwrap();

        let reader = TrackReader::new(&buf).unwrap();
        assert_eq!(reader.metadata(), &[MetadataEntry::new("name", "Morning Ride")]);
        assert_eq!(reader.section_count(), 1);

        let handle = reader.section(0).unwrap();
        assert_eq!(handle.encoding(), SectionEncoding::Standard);
        assert_eq!(handle.rows(), 3);
        assert_eq!(handle.schema(), &schema());

        let data = handle.open(None).unwrap();
        assert_eq!(data.rows().unwrap(), rows());
    }

    #[test]
    fn test_roundtrip_encrypted() {
        let section = Section::encrypted(schema(), rows(), KEY).unwrap();
        let buf = write_track(&[], &[section]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();

        let handle = reader.section(0).unwrap();
        assert_eq!(handle.encoding(), SectionEncoding::Encrypted);
        assert_eq!(handle.schema(), &schema());
        assert_eq!(handle.open(Some(KEY)).unwrap().rows().unwrap(), rows());
    }

    #[test]
    fn test_encrypted_requires_correct_key() {
        let section = Section::encrypted(schema(), rows(), KEY).unwrap();
        let buf = write_track(&[], &[section]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();
        let handle = reader.section(0).unwrap();

        assert!(matches!(handle.open(None), Err(TrackError::Decryption(_))));
        assert!(matches!(
            handle.open(Some(&b"10987654321098765432109876543210"[..])),
            Err(TrackError::Decryption(_))
        ));
    }

    #[test]
    fn test_mixed_sections() {
        let plain = Section::standard(schema(), rows()).unwrap();
        let secret = Section::encrypted(schema(), rows()[..1].to_vec(), KEY).unwrap();
        let buf = write_track(&[], &[plain, secret]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();

        let encodings: Vec<_> = reader.sections().map(|s| s.encoding()).collect();
        assert_eq!(
            encodings,
            vec![SectionEncoding::Standard, SectionEncoding::Encrypted]
        );
        // The key is ignored for standard sections
        assert_eq!(
            reader.section(0).unwrap().open(Some(KEY)).unwrap().len(),
            3
        );
        assert_eq!(
            reader.section(1).unwrap().open(Some(KEY)).unwrap().rows().unwrap(),
            rows()[..1].to_vec()
        );
    }

    #[test]
    fn test_single_column() {
        let section = Section::standard(schema(), rows()).unwrap();
        let buf = write_track(&[], &[section]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();
        let data = reader.section(0).unwrap().open(None).unwrap();

        let z = data.column("z").unwrap().unwrap();
        assert_eq!(z.values, vec![Some(FieldValue::from("Foo")), None, None]);

        let t = data.column("t").unwrap().unwrap();
        assert_eq!(
            t.values,
            vec![
                Some(FieldValue::I64(1_600_000_000)),
                None,
                Some(FieldValue::I64(1_599_999_990))
            ]
        );

        assert!(data.column("F").unwrap().is_none());
    }

    #[test]
    fn test_project() {
        let section = Section::standard(schema(), rows()).unwrap();
        let buf = write_track(&[], &[section]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();
        let data = reader.section(0).unwrap().open(None).unwrap();

        let projected = data.project(&["x", "z", "missing"]).unwrap();
        assert_eq!(
            projected,
            vec![
                Row::new().with("x", 40.0).with("z", "Foo"),
                Row::new().with("x", -122.402),
                Row::new().with("x", 41.0),
            ]
        );
    }

    #[test]
    fn test_precision_is_lossy() {
        let schema = Schema::new(vec![FieldDefinition::new(
            "e",
            DataType::F64 { precision: Some(1) },
        )])
        .unwrap();
        let section = Section::standard(schema, vec![Row::new().with("e", 12.3456)]).unwrap();
        let buf = write_track(&[], &[section]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();
        let rows = reader.section(0).unwrap().open(None).unwrap().rows().unwrap();
        assert_eq!(rows[0].get("e"), Some(&FieldValue::F64(12.3)));
    }

    #[test]
    fn test_out_of_range() {
        let buf = write_track(&[], &[]).unwrap();
        let reader = TrackReader::new(&buf).unwrap();
        assert!(matches!(
            reader.section(0),
            Err(TrackError::OutOfRange { index: 0, count: 0 })
        ));
    }

    #[test]
    fn test_truncated_buffer_is_corrupt() {
        let section = Section::standard(schema(), rows()).unwrap();
        let buf = write_track(&[], &[section]).unwrap();
        for len in [0, 3, 5, buf.len() / 2, buf.len() - 1] {
            assert!(
                matches!(
                    TrackReader::new(&buf[..len]),
                    Err(TrackError::CorruptBuffer(_))
                ),
                "prefix of {len} bytes should be rejected"
            );
        }
    }

    /// Track buffer with one standard section whose header claims `rows` rows
    fn forged_track(schema: &Schema, rows: u64, body: &[u8]) -> Vec<u8> {
        use crate::encoding::{write_schema, write_varint};

        let mut buf = MAGIC.to_vec();
        buf.push(VERSION);
        write_varint(&mut buf, 0);
        write_varint(&mut buf, 1);
        buf.push(SectionEncoding::Standard.tag());
        write_varint(&mut buf, rows);
        write_schema(&mut buf, schema);
        write_varint(&mut buf, body.len() as u64);
        buf.extend_from_slice(&crc32fast::hash(body).to_le_bytes());
        let header_crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&header_crc.to_le_bytes());
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn test_absurd_row_count_is_corrupt() {
        let empty = Schema::new(vec![]).unwrap();
        let buf = forged_track(&empty, 1 << 61, &[]);
        let reader = TrackReader::new(&buf).unwrap();
        assert!(matches!(
            reader.section(0).unwrap().open(None),
            Err(TrackError::CorruptBuffer(_))
        ));

        // A single empty column: one length byte, no bitmap
        let single = Schema::new(vec![FieldDefinition::new("t", DataType::I64)]).unwrap();
        let buf = forged_track(&single, 1 << 40, &[0]);
        let reader = TrackReader::new(&buf).unwrap();
        assert!(matches!(
            reader.section(0).unwrap().open(None),
            Err(TrackError::CorruptBuffer(_))
        ));

        // Same layout with an honest row count
        let buf = forged_track(&empty, 0, &[]);
        let reader = TrackReader::new(&buf).unwrap();
        let data = reader.section(0).unwrap().open(None).unwrap();
        assert!(data.rows().unwrap().is_empty());
    }

    #[test]
    fn test_flipped_header_byte_is_corrupt() {
        let buf = write_track(&[MetadataEntry::new("k", 1u64)], &[]).unwrap();
        let mut damaged = buf.clone();
        damaged[6] ^= 0x01;
        assert!(matches!(
            TrackReader::new(&damaged),
            Err(TrackError::CorruptBuffer(_))
        ));
    }

    #[test]
    fn test_flipped_body_byte_is_detected_on_open() {
        let section = Section::standard(schema(), rows()).unwrap();
        let mut buf = write_track(&[], &[section]).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0x01;

        let reader = TrackReader::new(&buf).unwrap();
        assert!(matches!(
            reader.section(0).unwrap().open(None),
            Err(TrackError::CorruptBuffer(_))
        ));
    }
}
