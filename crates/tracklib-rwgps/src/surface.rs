//! Surface type and road class mappings
//!
//! A point's surface group comes from its surface id. Points whose surface is the
//! "unknown" id fall back to the road class mappings: the first mapping whose bounding
//! box contains the point and which knows the point's road class supplies a surface id,
//! which is then looked up like any other. Mappings should therefore be added from the
//! most specific area to the least specific one.

use crate::geometry::Point;
use geo::Coord;
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub type SurfaceTypeId = u64;
pub type RoadClassId = u64;

/// Road class to surface rules that apply inside a bounding box
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoadClassMapping {
    /// Corners as given, `x` = longitude, `y` = latitude. An inverted box contains nothing.
    min: Coord<f64>,
    max: Coord<f64>,
    map: HashMap<RoadClassId, SurfaceTypeId>,
}

impl RoadClassMapping {
    /// Create a mapping for `[min_lat, min_lon, max_lat, max_lon]`
    pub fn new(bbox: [f64; 4]) -> Self {
        let [min_lat, min_lon, max_lat, max_lon] = bbox;
        Self {
            min: Coord {
                x: min_lon,
                y: min_lat,
            },
            max: Coord {
                x: max_lon,
                y: max_lat,
            },
            map: HashMap::new(),
        }
    }

    pub fn add_road_class(&mut self, road_class_id: RoadClassId, surface_id: SurfaceTypeId) {
        self.map.insert(road_class_id, surface_id);
    }

    /// Strict containment: points on the border are outside
    fn contains(&self, coord: Coord<f64>) -> bool {
        let (min, max) = (self.min, self.max);
        min.y < coord.y && min.x < coord.x && max.y > coord.y && max.x > coord.x
    }

    fn lookup(&self, point: &Point) -> Option<SurfaceTypeId> {
        match (self.contains(point.coord), point.road_class) {
            (true, Some(road_class)) => self.map.get(&road_class).copied(),
            _ => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for RoadClassMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (min, max) = (self.min, self.max);
        write!(
            f,
            "RoadClassMapping<bbox: [{}, {}, {}, {}], len: {}>",
            min.y,
            min.x,
            max.y,
            max.x,
            self.map.len()
        )
    }
}

impl fmt::Display for RoadClassMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Surface ids to named groups, with road class fallbacks for unknown surfaces
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurfaceMapping {
    unknown_surface_id: SurfaceTypeId,
    groups: HashMap<SurfaceTypeId, String>,
    road_class_mappings: Vec<RoadClassMapping>,
}

impl SurfaceMapping {
    pub fn new(unknown_surface_id: SurfaceTypeId) -> Self {
        Self {
            unknown_surface_id,
            groups: HashMap::new(),
            road_class_mappings: Vec::new(),
        }
    }

    pub fn add_surface(&mut self, surface_id: SurfaceTypeId, group: impl Into<String>) {
        self.groups.insert(surface_id, group.into());
    }

    pub fn add_road_class_mapping(&mut self, road_class_mapping: RoadClassMapping) {
        self.road_class_mappings.push(road_class_mapping);
    }

    #[inline]
    pub fn unknown_surface_id(&self) -> SurfaceTypeId {
        self.unknown_surface_id
    }

    /// Group of a point, `None` when the point has no surface or the id is unmapped
    pub fn surface_group(&self, point: &Point) -> Option<&str> {
        let surface = point.surface?;
        let surface = if surface == self.unknown_surface_id {
            self.road_class_mappings
                .iter()
                .find_map(|mapping| mapping.lookup(point))?
        } else {
            surface
        };
        self.groups.get(&surface).map(String::as_str)
    }
}

impl fmt::Debug for SurfaceMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SurfaceMapping<unknown_surface_id: {}, groups: {}, road class mappings: {:?}>",
            self.unknown_surface_id,
            self.groups.len(),
            self.road_class_mappings
        )
    }
}

impl fmt::Display for SurfaceMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
