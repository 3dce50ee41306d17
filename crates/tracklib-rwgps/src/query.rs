//! Row-level queries over the sections of a track
//!
//! Each query opens one section (decrypting it when needed), decodes only the columns it
//! touches and hands the rows to the polyline codec or the simplification engine.

use crate::Result;
use crate::geometry::{SIMPLIFICATION_FIELDS, points_from_rows};
use crate::polyline::{PolylineOptions, polyline_encode};
use crate::simplify::{ImportancePolicy, UniformImportance, simplify_points, simplify_rows};
use crate::surface::SurfaceMapping;
use std::collections::BTreeSet;
use tracklib::{FieldValue, Row, SectionData, TrackReader};

/// Polyline of every row of section `index`
pub fn section_data_polyline(
    reader: &TrackReader<'_>,
    index: usize,
    options: &PolylineOptions,
    key: Option<&[u8]>,
) -> Result<String> {
    let data = reader.section(index)?.open(key)?;
    if options.structurally_absent(data.schema()) {
        return Ok(String::new());
    }

    let rows = data.project(&options.source_fields())?;
    polyline_encode(&rows, data.schema(), options)
}

/// Polyline of the rows that survive simplification of section `index`
pub fn section_data_simplified_polyline(
    reader: &TrackReader<'_>,
    index: usize,
    mapping: &SurfaceMapping,
    tolerance: f64,
    options: &PolylineOptions,
    key: Option<&[u8]>,
) -> Result<String> {
    let query = SimplifyQuery::new(mapping, tolerance);
    section_data_simplified_polyline_with(reader, index, &query, options, key)
}

/// Full rows (every present field, in its stored type) that survive simplification
pub fn section_data_simplified(
    reader: &TrackReader<'_>,
    index: usize,
    mapping: &SurfaceMapping,
    tolerance: f64,
    key: Option<&[u8]>,
) -> Result<Vec<Row>> {
    section_data_simplified_with(reader, index, &SimplifyQuery::new(mapping, tolerance), key)
}

/// One slot per retained row holding its value of `field`, `None` where the row lacks it
///
/// Returns `Ok(None)` when the section's schema has no such field.
pub fn section_column_simplified(
    reader: &TrackReader<'_>,
    index: usize,
    field: &str,
    mapping: &SurfaceMapping,
    tolerance: f64,
    key: Option<&[u8]>,
) -> Result<Option<Vec<Option<FieldValue>>>> {
    let query = SimplifyQuery::new(mapping, tolerance);
    section_column_simplified_with(reader, index, field, &query, key)
}

/// Simplification settings shared by the `_with` queries
///
/// Uses [`UniformImportance`] unless another policy is given.
#[derive(Clone, Copy)]
pub struct SimplifyQuery<'q> {
    pub mapping: &'q SurfaceMapping,
    pub tolerance: f64,
    pub policy: &'q dyn ImportancePolicy,
}

impl<'q> SimplifyQuery<'q> {
    pub fn new(mapping: &'q SurfaceMapping, tolerance: f64) -> Self {
        Self {
            mapping,
            tolerance,
            policy: &UniformImportance,
        }
    }

    pub fn with_policy(mut self, policy: &'q dyn ImportancePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// [`section_data_simplified_polyline`] with an explicit importance policy
pub fn section_data_simplified_polyline_with(
    reader: &TrackReader<'_>,
    index: usize,
    query: &SimplifyQuery<'_>,
    options: &PolylineOptions,
    key: Option<&[u8]>,
) -> Result<String> {
    let data = reader.section(index)?.open(key)?;
    if options.structurally_absent(data.schema()) {
        return Ok(String::new());
    }

    let mut fields = options.source_fields();
    fields.extend(SIMPLIFICATION_FIELDS);
    let rows = data.project(&fields)?;
    let retained = simplify_rows(&rows, query.mapping, query.tolerance, query.policy);

    tracing::debug!(
        section = index,
        rows = rows.len(),
        retained = retained.len(),
        "simplified polyline"
    );

    polyline_encode(&retained, data.schema(), options)
}

/// [`section_data_simplified`] with an explicit importance policy
pub fn section_data_simplified_with(
    reader: &TrackReader<'_>,
    index: usize,
    query: &SimplifyQuery<'_>,
    key: Option<&[u8]>,
) -> Result<Vec<Row>> {
    let data = reader.section(index)?.open(key)?;
    let rows = data.rows()?;
    let retained = simplify_rows(&rows, query.mapping, query.tolerance, query.policy);

    tracing::debug!(
        section = index,
        rows = rows.len(),
        retained = retained.len(),
        "simplified section"
    );

    Ok(retained)
}

/// [`section_column_simplified`] with an explicit importance policy
pub fn section_column_simplified_with(
    reader: &TrackReader<'_>,
    index: usize,
    field: &str,
    query: &SimplifyQuery<'_>,
    key: Option<&[u8]>,
) -> Result<Option<Vec<Option<FieldValue>>>> {
    let data = reader.section(index)?.open(key)?;
    let Some(column) = data.column(field)? else {
        return Ok(None);
    };

    let retained = simplified_row_indices(&data, query.mapping, query.tolerance, query.policy)?;
    let mut values = column.values;
    Ok(Some(
        retained
            .into_iter()
            .map(|row| values.get_mut(row).and_then(Option::take))
            .collect(),
    ))
}

/// Indices of the rows of an opened section that survive simplification
pub fn simplified_row_indices(
    data: &SectionData<'_>,
    mapping: &SurfaceMapping,
    tolerance: f64,
    policy: &dyn ImportancePolicy,
) -> Result<BTreeSet<usize>> {
    let rows = data.project(&SIMPLIFICATION_FIELDS)?;
    let points = points_from_rows(&rows);
    Ok(simplify_points(&points, mapping, tolerance, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RwgpsError;
    use crate::polyline::polyline_decode;
    use crate::simplify::{GroupImportance, Importance};
    use tracklib::{DataType, FieldDefinition, Schema, Section, TrackError, write_track};

    fn track() -> Vec<u8> {
        let schema = Schema::new(vec![
            FieldDefinition::new("x", DataType::F64 { precision: Some(7) }),
            FieldDefinition::new("y", DataType::F64 { precision: Some(7) }),
            FieldDefinition::new("n", DataType::String),
        ])
        .unwrap();
        let rows = vec![
            Row::new().with("x", 0.0).with("y", 0.0).with("n", "a"),
            Row::new().with("x", 1.0).with("y", 0.0),
            Row::new().with("n", "free"),
            Row::new().with("x", 2.0).with("y", 0.0).with("n", "c"),
        ];
        let key = [7u8; 32];
        write_track(
            &[],
            &[
                Section::standard(schema.clone(), rows.clone()).unwrap(),
                Section::encrypted(schema, rows, &key).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_row_indices_skip_rows_without_geometry() {
        let buf = track();
        let reader = TrackReader::new(&buf).unwrap();
        let data = reader.section(0).unwrap().open(None).unwrap();
        let mapping = SurfaceMapping::new(0);

        let all = simplified_row_indices(&data, &mapping, 0.0, &UniformImportance).unwrap();
        assert_eq!(all, BTreeSet::from([0, 1, 3]));

        let simplified = simplified_row_indices(&data, &mapping, 0.5, &UniformImportance).unwrap();
        assert_eq!(simplified, BTreeSet::from([0, 3]));
    }

    #[test]
    fn test_column_slots() {
        let buf = track();
        let reader = TrackReader::new(&buf).unwrap();
        let mapping = SurfaceMapping::new(0);

        let column = section_column_simplified(&reader, 0, "n", &mapping, 0.0, None).unwrap();
        assert_eq!(
            column,
            Some(vec![
                Some(FieldValue::from("a")),
                None,
                Some(FieldValue::from("c"))
            ])
        );
        assert_eq!(
            section_column_simplified(&reader, 0, "missing", &mapping, 0.0, None).unwrap(),
            None
        );
    }

    #[test]
    fn test_encrypted_section_needs_key() {
        let buf = track();
        let reader = TrackReader::new(&buf).unwrap();
        let mapping = SurfaceMapping::new(0);

        // Even a structurally absent field does not bypass decryption
        let result = section_column_simplified(&reader, 1, "missing", &mapping, 0.0, None);
        assert!(matches!(
            result,
            Err(RwgpsError::Track(TrackError::Decryption(_)))
        ));

        let key = [7u8; 32];
        let rows = section_data_simplified(&reader, 1, &mapping, 0.0, Some(&key[..])).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_queries_honor_policy() {
        let buf = track();
        let reader = TrackReader::new(&buf).unwrap();
        let mapping = SurfaceMapping::new(0);
        let keep = GroupImportance::new(Importance::Keep);
        let query = SimplifyQuery::new(&mapping, 0.5).with_policy(&keep);

        let uniform = section_data_simplified(&reader, 0, &mapping, 0.5, None).unwrap();
        assert_eq!(uniform.len(), 2);
        let kept = section_data_simplified_with(&reader, 0, &query, None).unwrap();
        assert_eq!(kept.len(), 3);

        let column = section_column_simplified_with(&reader, 0, "n", &query, None).unwrap();
        assert_eq!(
            column,
            Some(vec![
                Some(FieldValue::from("a")),
                None,
                Some(FieldValue::from("c"))
            ])
        );

        let options = PolylineOptions::from_triples([("x", 0, None)]).unwrap();
        let polyline =
            section_data_simplified_polyline_with(&reader, 0, &query, &options, None).unwrap();
        assert_eq!(polyline_decode(&polyline, &[0]).unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_out_of_range_section() {
        let buf = track();
        let reader = TrackReader::new(&buf).unwrap();
        let options = PolylineOptions::from_triples([("x", 5, None)]).unwrap();
        assert!(matches!(
            section_data_polyline(&reader, 2, &options, None),
            Err(RwgpsError::Track(TrackError::OutOfRange { index: 2, count: 2 }))
        ));
    }
}
