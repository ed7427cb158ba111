//! Traced path segments: the value handed back for a completed trace.

use std::fmt;

use crate::coords::{CoordinateAxis, MicrometerXyz, TileFormat, ZoomedVoxelIndex};

/// Caller-side identity of a traced endpoint.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct AnchorId(pub u64);

impl fmt::Display for AnchorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "anchor {}", self.0)
  }
}

/// Unordered pair of anchors a segment connects.
///
/// Stored with the smaller id first, so `(a, b)` and `(b, a)` compare and
/// hash equal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SegmentIndex {
  first: AnchorId,
  second: AnchorId,
}

impl SegmentIndex {
  pub fn new(a: AnchorId, b: AnchorId) -> Self {
    if a <= b {
      Self { first: a, second: b }
    } else {
      Self { first: b, second: a }
    }
  }

  pub fn first(&self) -> AnchorId {
    self.first
  }

  pub fn second(&self) -> AnchorId {
    self.second
  }

  pub fn connects(&self, anchor: AnchorId) -> bool {
    self.first == anchor || self.second == anchor
  }
}

/// A completed trace. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct TracedPathSegment {
  segment: SegmentIndex,
  path: Vec<ZoomedVoxelIndex>,
  intensities: Vec<u16>,
  simplified: Vec<ZoomedVoxelIndex>,
  cost: f64,
}

impl TracedPathSegment {
  /// `intensities[i]` is the sample at `path[i]`.
  pub fn new(
    segment: SegmentIndex,
    path: Vec<ZoomedVoxelIndex>,
    intensities: Vec<u16>,
    simplified: Vec<ZoomedVoxelIndex>,
    cost: f64,
  ) -> Self {
    debug_assert_eq!(path.len(), intensities.len());
    Self {
      segment,
      path,
      intensities,
      simplified,
      cost,
    }
  }

  pub fn segment(&self) -> SegmentIndex {
    self.segment
  }

  /// Every voxel the search stepped through, start to goal.
  pub fn path(&self) -> &[ZoomedVoxelIndex] {
    &self.path
  }

  pub fn intensities(&self) -> &[u16] {
    &self.intensities
  }

  pub fn simplified(&self) -> &[ZoomedVoxelIndex] {
    &self.simplified
  }

  pub fn cost(&self) -> f64 {
    self.cost
  }

  /// Simplified polyline in micrometers, at voxel corners in-plane and
  /// slice centres along Z.
  pub fn micrometer_points(&self, format: &TileFormat) -> Vec<MicrometerXyz> {
    self
      .simplified
      .iter()
      .map(|&point| format.micrometer_xyz_for_zoomed_voxel_index(point, CoordinateAxis::Z))
      .collect()
  }
}
