//! Axis-aligned micrometer box.

use glam::DVec3;

/// Double-precision axis-aligned bounding box in micrometers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MicrometerBounds {
  /// Minimum corner (inclusive).
  pub min: DVec3,
  /// Maximum corner (exclusive for voxel containment).
  pub max: DVec3,
}

impl MicrometerBounds {
  pub fn new(min: DVec3, max: DVec3) -> Self {
    debug_assert!(
      min.x <= max.x && min.y <= max.y && min.z <= max.z,
      "bounds min must be <= max on all axes"
    );
    Self { min, max }
  }

  /// Inclusive-exclusive point test.
  #[inline]
  pub fn contains_point(&self, point: DVec3) -> bool {
    point.cmpge(self.min).all() && point.cmplt(self.max).all()
  }

  #[inline]
  pub fn size(&self) -> DVec3 {
    self.max - self.min
  }

  #[inline]
  pub fn center(&self) -> DVec3 {
    (self.min + self.max) * 0.5
  }
}
