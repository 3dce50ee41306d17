//! Tracklib - Columnar Storage for GPS Track Data
//!
//! This library stores activity tracks as a single immutable binary buffer. A track is an
//! ordered list of sections, each holding rows that conform to a typed schema. Rows are laid
//! out column by column so a query can decode the fields it needs without touching the rest.
//!
//! # Architecture
//!
//! - **[`Schema`]**: Ordered, named, typed field definitions
//! - **[`Section`]**: Rows bound to a schema, stored in plaintext or encrypted at rest
//! - **[`write_track`]**: Serializes metadata and sections into one buffer
//! - **[`TrackReader`]**: Parses the header eagerly and decodes section data on demand
//!
//! # Example
//!
//! ```
//! use tracklib::{DataType, FieldDefinition, Row, Schema, Section, TrackReader, write_track};
//!
//! let schema = Schema::new(vec![
//!     FieldDefinition::new("x", DataType::F64 { precision: Some(7) }),
//!     FieldDefinition::new("y", DataType::F64 { precision: Some(7) }),
//! ])
//! .unwrap();
//! let rows = vec![Row::new().with("x", 40.0).with("y", 12.0)];
//! let section = Section::standard(schema, rows).unwrap();
//!
//! let buf = write_track(&[], &[section]).unwrap();
//! let reader = TrackReader::new(&buf).unwrap();
//! let data = reader.section(0).unwrap().open(None).unwrap();
//! assert_eq!(data.rows().unwrap().len(), 1);
//! ```

mod crypto;
mod encoding;
mod read;
mod schema;
mod section;
mod types;
mod write;

// Public API exports
pub use crypto::KEY_LENGTH;
pub use read::{Column, SectionData, SectionHandle, TrackReader};
pub use schema::{DataType, FieldDefinition, MAX_PRECISION, Schema};
pub use section::{Section, SectionEncoding};
pub use types::{FieldValue, MetadataEntry, Row};
pub use write::{quantize, write_track};

/// Error types for the storage layer
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("Corrupt buffer: {0}")]
    CorruptBuffer(String),

    #[error("Section index {index} out of range (track has {count} sections)")]
    OutOfRange { index: usize, count: usize },

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrackError>;

/// Write a track to a file.
pub fn write_track_file<P: AsRef<std::path::Path>>(
    path: P,
    metadata: &[MetadataEntry],
    sections: &[Section],
) -> Result<()> {
    let buf = write_track(metadata, sections)?;
    std::fs::write(path, buf)?;
    Ok(())
}

/// Read a whole track file into memory, ready to be handed to [`TrackReader::new`].
pub fn read_track_file<P: AsRef<std::path::Path>>(path: P) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}
