//! Value types for the four coordinate spaces.
//!
//! Each space gets its own type so a voxel position can never be handed to a
//! function expecting tile coordinates. Conversions live on
//! [`TileFormat`](super::TileFormat).

use std::fmt;

use glam::{DVec3, IVec3};

use super::CoordinateAxis;

/// Log2 zoom-out factor. Level 0 is full resolution.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct ZoomLevel(u32);

impl ZoomLevel {
  pub const FULL_RESOLUTION: ZoomLevel = ZoomLevel(0);

  pub fn new(log2: u32) -> Self {
    Self(log2)
  }

  #[inline]
  pub fn log2(self) -> u32 {
    self.0
  }

  /// Number of full-resolution voxels per zoomed voxel along a zoomed axis.
  #[inline]
  pub fn zoom_out_factor(self) -> i32 {
    1 << self.0
  }

  pub fn coarser(self) -> Self {
    Self(self.0 + 1)
  }

  pub fn finer(self) -> Option<Self> {
    self.0.checked_sub(1).map(Self)
  }
}

impl fmt::Display for ZoomLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "zoom {}", self.0)
  }
}

/// Point in physical space, in micrometers.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct MicrometerXyz(pub DVec3);

impl MicrometerXyz {
  pub fn new(x: f64, y: f64, z: f64) -> Self {
    Self(DVec3::new(x, y, z))
  }

  #[inline]
  pub fn get(self, axis: CoordinateAxis) -> f64 {
    self.0[axis.index()]
  }
}

/// Full-resolution voxel position, relative to the volume origin.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct VoxelXyz(pub IVec3);

impl VoxelXyz {
  pub fn new(x: i32, y: i32, z: i32) -> Self {
    Self(IVec3::new(x, y, z))
  }
}

/// Tile grid position. Y counts up from the bottom of the volume.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct TileXyz {
  pub x: i32,
  pub y: i32,
  pub z: i32,
}

impl TileXyz {
  pub fn new(x: i32, y: i32, z: i32) -> Self {
    Self { x, y, z }
  }

  pub fn to_ivec3(self) -> IVec3 {
    IVec3::new(self.x, self.y, self.z)
  }

  pub fn from_ivec3(v: IVec3) -> Self {
    Self::new(v.x, v.y, v.z)
  }
}

/// Voxel position expressed at a particular zoom level.
///
/// Image rows are top-origin: `y == 0` is the top row of the volume.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ZoomedVoxelIndex {
  pub x: i32,
  pub y: i32,
  pub z: i32,
  pub zoom: ZoomLevel,
}

impl ZoomedVoxelIndex {
  pub fn new(x: i32, y: i32, z: i32, zoom: ZoomLevel) -> Self {
    Self { x, y, z, zoom }
  }

  pub fn from_ivec3(xyz: IVec3, zoom: ZoomLevel) -> Self {
    Self::new(xyz.x, xyz.y, xyz.z, zoom)
  }

  #[inline]
  pub fn xyz(&self) -> IVec3 {
    IVec3::new(self.x, self.y, self.z)
  }

  /// Same zoom, shifted by `delta` voxels.
  pub fn offset(&self, delta: IVec3) -> Self {
    Self::from_ivec3(self.xyz() + delta, self.zoom)
  }
}

impl fmt::Display for ZoomedVoxelIndex {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}, {}, {}) @ {}", self.x, self.y, self.z, self.zoom)
  }
}
