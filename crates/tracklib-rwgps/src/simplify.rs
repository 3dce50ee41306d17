//! Surface-aware Douglas-Peucker simplification
//!
//! Points are split into maximal runs that share a surface group and every run is
//! simplified on its own, so the points on both sides of a surface change always survive.
//! Distances are planar, measured in degree space.

use crate::geometry::{Point, points_from_rows, segment_distance};
use crate::surface::SurfaceMapping;
use std::collections::{BTreeSet, HashMap};
use tracklib::Row;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How strongly the points of a surface group resist simplification
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Importance {
    /// Plain tolerance
    #[default]
    Regular,
    /// Never drop these points
    Keep,
    /// Scale the tolerance by this factor; below 1.0 keeps more detail
    Tolerance(f64),
}

impl Importance {
    /// Tolerance multiplier, `None` when every point must be kept
    fn factor(self) -> Option<f64> {
        match self {
            Importance::Regular => Some(1.0),
            Importance::Keep => None,
            Importance::Tolerance(factor) if factor > 0.0 => Some(factor),
            Importance::Tolerance(_) => None,
        }
    }
}

/// Decides the importance of a surface group (`None` = no group)
pub trait ImportancePolicy: Sync {
    fn importance(&self, group: Option<&str>) -> Importance;
}

/// Every group is [`Importance::Regular`]
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformImportance;

impl ImportancePolicy for UniformImportance {
    #[inline]
    fn importance(&self, _group: Option<&str>) -> Importance {
        Importance::Regular
    }
}

/// Per-group importance table with a fallback for everything else
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupImportance {
    groups: HashMap<String, Importance>,
    fallback: Importance,
}

impl GroupImportance {
    pub fn new(fallback: Importance) -> Self {
        Self {
            groups: HashMap::new(),
            fallback,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>, importance: Importance) -> Self {
        self.groups.insert(group.into(), importance);
        self
    }
}

impl ImportancePolicy for GroupImportance {
    fn importance(&self, group: Option<&str>) -> Importance {
        group
            .and_then(|group| self.groups.get(group))
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Splits points into maximal runs of equal surface group
struct SurfaceRuns<'p, 'm> {
    points: &'p [Point],
    mapping: &'m SurfaceMapping,
}

impl<'p, 'm> SurfaceRuns<'p, 'm> {
    fn new(points: &'p [Point], mapping: &'m SurfaceMapping) -> Self {
        Self { points, mapping }
    }
}

impl<'p, 'm> Iterator for SurfaceRuns<'p, 'm> {
    type Item = (Option<&'m str>, &'p [Point]);

    fn next(&mut self) -> Option<Self::Item> {
        let mapping = self.mapping;
        let first = self.points.first()?;
        let group = mapping.surface_group(first);
        let len = self
            .points
            .iter()
            .position(|point| mapping.surface_group(point) != group)
            .unwrap_or(self.points.len());

        let (run, rest) = self.points.split_at(len);
        self.points = rest;
        Some((group, run))
    }
}

/// Row indices of the points that survive simplification at `tolerance`
///
/// The first and last point of every surface run are always kept, and a tolerance of
/// zero or less keeps every point.
pub fn simplify_points(
    points: &[Point],
    mapping: &SurfaceMapping,
    tolerance: f64,
    policy: &dyn ImportancePolicy,
) -> BTreeSet<usize> {
    #[cfg(feature = "profiling")]
    profiling::scope!("simplify::points");

    if tolerance <= 0.0 || tolerance.is_nan() {
        return points.iter().map(|point| point.index).collect();
    }

    let mut retained = BTreeSet::new();
    for (group, run) in SurfaceRuns::new(points, mapping) {
        let importance = policy.importance(group);
        let before = retained.len();
        match importance.factor() {
            Some(factor) => simplify_run(run, tolerance * factor, &mut retained),
            None => retained.extend(run.iter().map(|point| point.index)),
        }
        tracing::trace!(
            group = group.unwrap_or("-"),
            ?importance,
            points = run.len(),
            retained = retained.len() - before,
            "simplified surface run"
        );
    }

    retained
}

/// Stack-based Douglas-Peucker over one run
fn simplify_run(run: &[Point], tolerance: f64, retained: &mut BTreeSet<usize>) {
    let (Some(first), Some(last)) = (run.first(), run.last()) else {
        return;
    };
    retained.insert(first.index);
    retained.insert(last.index);

    let mut stack = vec![(0, run.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let (a, b) = (run[start].coord, run[end].coord);
        let mut farthest = (start, 0.0);
        for (offset, point) in run[start + 1..end].iter().enumerate() {
            let distance = segment_distance(point.coord, a, b);
            if distance > farthest.1 {
                farthest = (start + 1 + offset, distance);
            }
        }

        let (index, distance) = farthest;
        if distance > tolerance {
            retained.insert(run[index].index);
            stack.push((start, index));
            stack.push((index, end));
        }
    }
}

/// Simplify rows directly, returning clones of the retained rows in their original order
///
/// Rows without numeric `x` and `y` are not part of the geometry and are dropped.
pub fn simplify_rows(
    rows: &[Row],
    mapping: &SurfaceMapping,
    tolerance: f64,
    policy: &dyn ImportancePolicy,
) -> Vec<Row> {
    let points = points_from_rows(rows);
    simplify_points(&points, mapping, tolerance, policy)
        .into_iter()
        .map(|index| rows[index].clone())
        .collect()
}
