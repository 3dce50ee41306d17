//! Tracklib RWGPS - Geometry-Aware Queries over Track Sections
//!
//! This library builds the queries a route viewer needs on top of [`tracklib`] sections:
//! compact multi-field polylines, Douglas-Peucker simplification and surface-aware
//! partitioning of that simplification.
//!
//! # Architecture
//!
//! - **[`PolylineOptions`]**: Field order, precision and defaults of an encoded polyline
//! - **[`SurfaceMapping`]**: Surface ids (and road classes inside bounding boxes) to groups
//! - **[`simplify_points`]**: Per-surface-group Douglas-Peucker with an importance hook
//! - **Query façade**: [`section_data_polyline`], [`section_data_simplified_polyline`],
//!   [`section_data_simplified`] and [`section_column_simplified`]
//!
//! # Performance Characteristics
//!
//! - **Polyline**: O(N) over the surviving rows
//! - **Simplification**: O(N log N) expected, O(N²) worst case per surface run
//! - **Decoding**: only the columns a query touches are decoded

mod geometry;
mod polyline;
mod query;
mod simplify;
mod surface;

// Public API exports
pub use geometry::{EARTH_RADIUS_M, Point, haversine_distance, points_from_rows};
pub use polyline::{
    DISTANCE_FIELD, PolylineField, PolylineOptions, polyline_decode, polyline_encode,
};
pub use query::{
    SimplifyQuery, section_column_simplified, section_column_simplified_with,
    section_data_polyline, section_data_simplified, section_data_simplified_polyline,
    section_data_simplified_polyline_with, section_data_simplified_with, simplified_row_indices,
};
pub use simplify::{
    GroupImportance, Importance, ImportancePolicy, UniformImportance, simplify_points,
    simplify_rows,
};
pub use surface::{RoadClassId, RoadClassMapping, SurfaceMapping, SurfaceTypeId};

/// Error types for the query layer
#[derive(Debug, thiserror::Error)]
pub enum RwgpsError {
    #[error(transparent)]
    Track(#[from] tracklib::TrackError),

    #[error("Field '{name}' of type {data_type:?} cannot be polyline encoded")]
    UnsupportedField {
        name: String,
        data_type: tracklib::DataType,
    },

    #[error("Invalid polyline option: {0}")]
    InvalidOption(String),

    #[error("Invalid polyline: {0}")]
    InvalidPolyline(String),
}

pub type Result<T> = std::result::Result<T, RwgpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that all public types are accessible
        let _: fn(SurfaceTypeId) -> SurfaceMapping = SurfaceMapping::new;
        let _: fn(&str, &[u8]) -> Result<Vec<f64>> = polyline_decode;
    }
}
