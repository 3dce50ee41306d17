//! Track points and planar/spherical distance helpers

use crate::surface::{RoadClassId, SurfaceTypeId};
use geo::Coord;
use tracklib::{FieldValue, Row};

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Longitude field
pub(crate) const X_FIELD: &str = "x";
/// Latitude field
pub(crate) const Y_FIELD: &str = "y";
/// Surface type field
pub(crate) const SURFACE_FIELD: &str = "S";
/// Road class field
pub(crate) const ROAD_CLASS_FIELD: &str = "R";

/// Fields the simplification engine reads from a section
pub(crate) const SIMPLIFICATION_FIELDS: [&str; 4] =
    [X_FIELD, Y_FIELD, SURFACE_FIELD, ROAD_CLASS_FIELD];

/// A row that carries geometry, reduced to what simplification needs
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// Index of the row in its section
    pub index: usize,
    /// `x` = longitude, `y` = latitude, in degrees
    pub coord: Coord<f64>,
    pub surface: Option<SurfaceTypeId>,
    pub road_class: Option<RoadClassId>,
}

impl Point {
    pub fn new(index: usize, x: f64, y: f64) -> Self {
        Self {
            index,
            coord: Coord { x, y },
            surface: None,
            road_class: None,
        }
    }

    pub fn with_surface(mut self, surface: SurfaceTypeId) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_road_class(mut self, road_class: RoadClassId) -> Self {
        self.road_class = Some(road_class);
        self
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.coord.x
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.coord.y
    }

    /// Build a point from a row; `None` if the row lacks numeric `x` or `y`
    pub fn from_row(index: usize, row: &Row) -> Option<Self> {
        let x = row.get(X_FIELD).and_then(FieldValue::as_f64)?;
        let y = row.get(Y_FIELD).and_then(FieldValue::as_f64)?;

        Some(Self {
            index,
            coord: Coord { x, y },
            surface: classification(row, SURFACE_FIELD),
            road_class: classification(row, ROAD_CLASS_FIELD),
        })
    }
}

fn classification(row: &Row, name: &str) -> Option<u64> {
    let value = row.get(name)?;
    let id = value.as_u64();
    if id.is_none() {
        tracing::warn!(field = name, %value, "ignoring non-integer classification value");
    }
    id
}

/// Points of every row with geometry, keeping their row indices
pub fn points_from_rows(rows: &[Row]) -> Vec<Point> {
    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| Point::from_row(index, row))
        .collect()
}

/// Great-circle distance in meters between two (longitude, latitude) coordinates
#[inline]
pub fn haversine_distance(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let lat1 = from.y.to_radians();
    let lat2 = to.y.to_radians();
    let delta_lat = (to.y - from.y).to_radians();
    let delta_lon = (to.x - from.x).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Planar distance from `point` to the segment `start`-`end`
#[inline]
pub(crate) fn segment_distance(point: Coord<f64>, start: Coord<f64>, end: Coord<f64>) -> f64 {
    let delta = end - start;
    let len_sq = delta.x * delta.x + delta.y * delta.y;

    let closest = if len_sq == 0.0 {
        start
    } else {
        let rel = point - start;
        let t = ((rel.x * delta.x + rel.y * delta.y) / len_sq).clamp(0.0, 1.0);
        start + delta * t
    };

    let offset = point - closest;
    offset.x.hypot(offset.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_from_row() {
        let row = Row::new()
            .with("x", 40.0)
            .with("y", 12.0)
            .with("S", 3u64)
            .with("R", 7i64);
        let point = Point::from_row(4, &row).unwrap();
        assert_eq!(point, Point::new(4, 40.0, 12.0).with_surface(3).with_road_class(7));
    }

    #[test]
    fn test_rows_without_geometry_are_dropped() {
        let rows = vec![
            Row::new().with("x", 1.0).with("y", 2.0),
            Row::new().with("e", 5.0),
            Row::new().with("x", 1.0),
            Row::new().with("x", 3i64).with("y", 4u64),
        ];
        let points = points_from_rows(&rows);
        let indices: Vec<_> = points.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(points[1].coord, Coord { x: 3.0, y: 4.0 });
    }

    #[test]
    fn test_negative_surface_is_ignored() {
        let row = Row::new().with("x", 0.0).with("y", 0.0).with("S", -1i64);
        assert_eq!(Point::from_row(0, &row).unwrap().surface, None);
    }

    #[test]
    fn test_haversine_distance() {
        let d = haversine_distance(
            Coord {
                x: -122.402,
                y: 72.1,
            },
            Coord {
                x: -122.5,
                y: 72.309,
            },
        );
        assert!((d - 23477.14945).abs() < 1e-4, "d = {d}");

        let same = Coord { x: 10.0, y: 10.0 };
        assert_eq!(haversine_distance(same, same), 0.0);
    }

    #[test]
    fn test_segment_distance() {
        let start = Coord { x: 0.0, y: 0.0 };
        let end = Coord { x: 2.0, y: 0.0 };
        // Perpendicular foot inside the segment
        assert_eq!(segment_distance(Coord { x: 1.0, y: 1.0 }, start, end), 1.0);
        // Beyond the end the distance is to the endpoint
        assert_eq!(segment_distance(Coord { x: 5.0, y: 4.0 }, start, end), 5.0);
        // Degenerate segment
        assert_eq!(segment_distance(Coord { x: 3.0, y: 4.0 }, start, start), 5.0);
    }
}
