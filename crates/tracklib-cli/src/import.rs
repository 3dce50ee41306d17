//! GPX import

use crate::Result;
use tracklib::{DataType, FieldDefinition, MetadataEntry, Row, Schema, Section};

/// Precision knobs of a GPX import
#[derive(Clone, Debug, PartialEq)]
pub struct GpxImportConfig {
    /// Decimal digits kept for longitude (`x`) and latitude (`y`)
    pub precision_xy: u8,
    /// Decimal digits kept for elevation (`e`)
    pub precision_e: u8,
}

impl Default for GpxImportConfig {
    fn default() -> Self {
        Self {
            precision_xy: 7,
            precision_e: 1,
        }
    }
}

impl GpxImportConfig {
    pub fn schema(&self) -> Result<Schema> {
        Ok(Schema::new(vec![
            FieldDefinition::new(
                "x",
                DataType::F64 {
                    precision: Some(self.precision_xy),
                },
            ),
            FieldDefinition::new(
                "y",
                DataType::F64 {
                    precision: Some(self.precision_xy),
                },
            ),
            FieldDefinition::new(
                "e",
                DataType::F64 {
                    precision: Some(self.precision_e),
                },
            ),
        ])?)
    }
}

/// Read and parse a GPX file
pub fn read_gpx<P: AsRef<std::path::Path>>(path: P) -> Result<gpx::Gpx> {
    let file = std::fs::File::open(path.as_ref())?;
    let reader = std::io::BufReader::new(file);
    Ok(gpx::read(reader)?)
}

/// Metadata entries and one section per GPX track, encrypted when a key is given
pub fn gpx_to_track(
    gpx: &gpx::Gpx,
    config: &GpxImportConfig,
    key: Option<&[u8]>,
) -> Result<(Vec<MetadataEntry>, Vec<Section>)> {
    let schema = config.schema()?;

    let mut metadata = Vec::with_capacity(2);
    if let Some(name) = gpx.metadata.as_ref().and_then(|m| m.name.as_ref()) {
        metadata.push(MetadataEntry::new("name", name.as_str()));
    }
    metadata.push(MetadataEntry::new("source", "gpx"));

    let mut sections = Vec::with_capacity(gpx.tracks.len());
    for (index, track) in gpx.tracks.iter().enumerate() {
        let rows: Vec<Row> = track
            .segments
            .iter()
            .flat_map(|segment| &segment.points)
            .map(|waypoint| {
                let point = waypoint.point();
                let row = Row::new().with("x", point.x()).with("y", point.y());
                match waypoint.elevation {
                    Some(elevation) => row.with("e", elevation),
                    None => row,
                }
            })
            .collect();

        tracing::debug!(
            track = index,
            name = track.name.as_deref().unwrap_or("-"),
            points = rows.len(),
            "imported GPX track"
        );

        let section = match key {
            Some(key) => Section::encrypted(schema.clone(), rows, key)?,
            None => Section::standard(schema.clone(), rows)?,
        };
        sections.push(section);
    }

    if sections.is_empty() {
        tracing::warn!("GPX file has no tracks, writing a track without sections");
    }

    Ok((metadata, sections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpx::{Gpx, Track, TrackSegment, Waypoint};
    use tracklib::{FieldValue, SectionEncoding, TrackReader, write_track};

    const KEY: &[u8] = b"01234567890123456789012345678901";

    fn create_test_gpx() -> Gpx {
        let mut gpx = Gpx::default();
        for t in 0..2 {
            let mut track = Track::default();
            let mut segment = TrackSegment::default();
            for i in 0..3 {
                let x = -122.0 + f64::from(i) * 0.01;
                let mut waypoint = Waypoint::new(geo::Point::new(x, 45.0 + f64::from(t)));
                if i != 1 {
                    waypoint.elevation = Some(100.25);
                }
                segment.points.push(waypoint);
            }
            track.segments.push(segment);
            gpx.tracks.push(track);
        }
        gpx
    }

    #[test]
    fn test_config_default() {
        let config = GpxImportConfig::default();
        assert_eq!(config.precision_xy, 7);
        assert_eq!(config.precision_e, 1);
    }

    #[test]
    fn test_one_section_per_track() {
        let (metadata, sections) =
            gpx_to_track(&create_test_gpx(), &GpxImportConfig::default(), None).unwrap();
        assert_eq!(metadata, vec![MetadataEntry::new("source", "gpx")]);
        assert_eq!(sections.len(), 2);
        assert!(sections.iter().all(|s| s.rows().len() == 3));

        let rows = sections[1].rows();
        assert_eq!(rows[0].get("y"), Some(&FieldValue::F64(46.0)));
        assert!(!rows[1].contains("e"));
    }

    #[test]
    fn test_elevation_precision() {
        let (metadata, sections) =
            gpx_to_track(&create_test_gpx(), &GpxImportConfig::default(), Some(KEY)).unwrap();
        assert_eq!(sections[0].encoding(), SectionEncoding::Encrypted);

        let buf = write_track(&metadata, &sections).unwrap();
        let reader = TrackReader::new(&buf).unwrap();
        let rows = reader.section(0).unwrap().open(Some(KEY)).unwrap().rows().unwrap();
        assert_eq!(rows[0].get("e"), Some(&FieldValue::F64(100.3)));
    }

    #[test]
    fn test_read_gpx_document() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="tracklib" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><name>Morning ride</name></metadata>
  <trk>
    <name>Loop</name>
    <trkseg>
      <trkpt lat="45.5" lon="-122.6"><ele>10.5</ele></trkpt>
      <trkpt lat="45.6" lon="-122.7"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;
        let gpx = gpx::read(xml.as_bytes()).unwrap();
        let (metadata, sections) = gpx_to_track(&gpx, &GpxImportConfig::default(), None).unwrap();

        assert_eq!(metadata[0], MetadataEntry::new("name", "Morning ride"));
        assert_eq!(sections.len(), 1);
        assert_eq!(
            sections[0].rows()[0],
            Row::new().with("x", -122.6).with("y", 45.5).with("e", 10.5)
        );
    }
}
