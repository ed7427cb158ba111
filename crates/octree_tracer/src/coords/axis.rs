//! Axis and indexing-style enums shared by the coordinate model and tile keys.

/// One of the three volume axes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum CoordinateAxis {
  X,
  Y,
  #[default]
  Z,
}

impl CoordinateAxis {
  pub const ALL: [CoordinateAxis; 3] = [CoordinateAxis::X, CoordinateAxis::Y, CoordinateAxis::Z];

  /// Component index (X = 0, Y = 1, Z = 2).
  #[inline]
  pub fn index(self) -> usize {
    match self {
      CoordinateAxis::X => 0,
      CoordinateAxis::Y => 1,
      CoordinateAxis::Z => 2,
    }
  }

  pub fn from_index(index: usize) -> Option<Self> {
    Self::ALL.get(index).copied()
  }

  /// Axis running left to right when looking down this axis.
  #[inline]
  pub fn horizontal(self) -> Self {
    Self::ALL[(self.index() + 1) % 3]
  }

  /// Axis running top to bottom when looking down this axis.
  #[inline]
  pub fn vertical(self) -> Self {
    Self::ALL[(self.index() + 2) % 3]
  }
}

/// How tile coordinates relate between zoom levels.
///
/// `Quadtree` tiles halve only the two in-plane axes per zoom step and keep the
/// slice axis at full resolution. `Octree` tiles halve all three axes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum IndexStyle {
  #[default]
  Quadtree,
  Octree,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_axis_index_round_trip() {
    for axis in CoordinateAxis::ALL {
      assert_eq!(CoordinateAxis::from_index(axis.index()), Some(axis));
    }
    assert_eq!(CoordinateAxis::from_index(3), None);
  }

  #[test]
  fn test_in_plane_axes_for_z_slices() {
    assert_eq!(CoordinateAxis::Z.horizontal(), CoordinateAxis::X);
    assert_eq!(CoordinateAxis::Z.vertical(), CoordinateAxis::Y);
    assert_eq!(CoordinateAxis::X.horizontal(), CoordinateAxis::Y);
    assert_eq!(CoordinateAxis::X.vertical(), CoordinateAxis::Z);
  }
}
