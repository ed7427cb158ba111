//! TileIndex - immutable value type addressing one 2D tile of the pyramid.
//!
//! Coordinates are in tiles at the index's own zoom level, with Y counting up
//! from the bottom of the volume. Zoom 0 = full resolution, higher = coarser.

use crate::coords::{CoordinateAxis, IndexStyle, TileXyz, ZoomLevel};

/// Tile address - immutable value type.
///
/// Equality, ordering and hashing are structural, so an index can be used
/// directly as a map key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TileIndex {
  /// Tile X at this zoom level
  pub x: i32,
  /// Tile Y at this zoom level (bottom-origin)
  pub y: i32,
  /// Tile Z at this zoom level
  pub z: i32,
  pub zoom: ZoomLevel,
  /// Coarsest zoom level of the pyramid this index belongs to
  pub max_zoom: ZoomLevel,
  pub index_style: IndexStyle,
  pub slice_axis: CoordinateAxis,
}

impl TileIndex {
  pub fn new(
    xyz: TileXyz,
    zoom: ZoomLevel,
    max_zoom: ZoomLevel,
    index_style: IndexStyle,
    slice_axis: CoordinateAxis,
  ) -> Self {
    debug_assert!(zoom <= max_zoom, "{} beyond max {}", zoom, max_zoom);
    Self {
      x: xyz.x,
      y: xyz.y,
      z: xyz.z,
      zoom,
      max_zoom,
      index_style,
      slice_axis,
    }
  }

  #[inline]
  pub fn tile_xyz(&self) -> TileXyz {
    TileXyz::new(self.x, self.y, self.z)
  }

  /// Same zoom, style and slice axis at a different position.
  pub fn with_xyz(&self, xyz: TileXyz) -> Self {
    Self {
      x: xyz.x,
      y: xyz.y,
      z: xyz.z,
      ..*self
    }
  }

  #[inline]
  pub fn coordinate(&self, axis: CoordinateAxis) -> i32 {
    match axis {
      CoordinateAxis::X => self.x,
      CoordinateAxis::Y => self.y,
      CoordinateAxis::Z => self.z,
    }
  }

  /// Whether `axis` changes scale between zoom levels for this index.
  #[inline]
  fn scales_with_zoom(&self, axis: CoordinateAxis) -> bool {
    axis != self.slice_axis || self.index_style == IndexStyle::Octree
  }

  fn map_axes(&self, f: impl Fn(i32) -> i32) -> TileXyz {
    let mut xyz = [self.x, self.y, self.z];
    for axis in CoordinateAxis::ALL {
      if self.scales_with_zoom(axis) {
        xyz[axis.index()] = f(xyz[axis.index()]);
      }
    }
    TileXyz::new(xyz[0], xyz[1], xyz[2])
  }

  /// Parent tile one level coarser.
  ///
  /// Returns None if already at max zoom.
  pub fn zoom_out(&self) -> Option<Self> {
    if self.zoom >= self.max_zoom {
      return None;
    }
    Some(Self {
      zoom: self.zoom.coarser(),
      ..self.with_xyz(self.map_axes(|c| c.div_euclid(2)))
    })
  }

  /// First child tile one level finer.
  ///
  /// Returns None if already at full resolution.
  pub fn zoom_in(&self) -> Option<Self> {
    let zoom = self.zoom.finer()?;
    Some(Self {
      zoom,
      ..self.with_xyz(self.map_axes(|c| c * 2))
    })
  }

  fn step_slice(&self, delta: i32) -> Self {
    let mut xyz = [self.x, self.y, self.z];
    xyz[self.slice_axis.index()] += delta;
    self.with_xyz(TileXyz::new(xyz[0], xyz[1], xyz[2]))
  }

  pub fn next_slice(&self) -> Self {
    self.step_slice(1)
  }

  pub fn previous_slice(&self) -> Self {
    self.step_slice(-1)
  }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
