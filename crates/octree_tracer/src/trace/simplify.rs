//! Polyline simplification for traced paths.
//!
//! A* paths step voxel by voxel, so a straight neurite comes back as a long
//! run of colinear points. The simplifier keeps only the points where the
//! direction of travel changes.
//!
//! Point `i` survives when its outgoing direction differs both from the
//! direction one step back and from the direction two steps back. The
//! second look-back absorbs single-voxel jitter on a staircase: a run like
//! `+x, +x+y, +x, +x+y` keeps alternating and would otherwise keep every
//! point.

use glam::DVec3;

use crate::coords::ZoomedVoxelIndex;

/// Angular slack added to the tolerance so rounding in the direction
/// normalisation does not split exactly parallel steps.
const ANGLE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathSimplifier {
  /// Largest angle between directions, in radians, still treated as the
  /// same direction.
  tolerance: f64,
}

impl Default for PathSimplifier {
  fn default() -> Self {
    Self { tolerance: 0.0 }
  }
}

impl PathSimplifier {
  /// Negative tolerances are treated as zero.
  pub fn new(tolerance: f64) -> Self {
    Self {
      tolerance: tolerance.max(0.0),
    }
  }

  pub fn tolerance(&self) -> f64 {
    self.tolerance
  }

  fn differs(&self, a: DVec3, b: DVec3) -> bool {
    let angle = a.cross(b).length().atan2(a.dot(b));
    angle > self.tolerance + ANGLE_EPSILON
  }

  /// Indices into `points` of the vertices that survive simplification.
  ///
  /// Repeated consecutive points count once; interior vertices report the
  /// first of their run. The first and last indices are always present.
  pub fn simplified_indices(&self, points: &[ZoomedVoxelIndex]) -> Vec<usize> {
    let mut distinct: Vec<usize> = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
      if distinct.last().is_none_or(|&last| points[last] != *point) {
        distinct.push(i);
      }
    }
    let last = points.len().saturating_sub(1);
    if distinct.len() <= 2 {
      return match points.len() {
        0 => Vec::new(),
        1 => vec![0],
        _ => vec![0, last],
      };
    }

    // directions[k] leads from distinct[k] to distinct[k + 1].
    let directions: Vec<DVec3> = distinct
      .windows(2)
      .map(|pair| {
        (points[pair[1]].xyz() - points[pair[0]].xyz())
          .as_dvec3()
          .normalize()
      })
      .collect();

    let mut kept = vec![distinct[0]];
    for k in 1..directions.len() {
      let two_back = directions[k.saturating_sub(2)];
      if self.differs(directions[k], directions[k - 1]) && self.differs(directions[k], two_back) {
        kept.push(distinct[k]);
      }
    }
    kept.push(last);
    kept
  }

  /// Surviving vertices, in path order.
  pub fn simplify(&self, points: &[ZoomedVoxelIndex]) -> Vec<ZoomedVoxelIndex> {
    self
      .simplified_indices(points)
      .into_iter()
      .map(|i| points[i])
      .collect()
  }
}

#[cfg(test)]
#[path = "simplify_test.rs"]
mod simplify_test;
