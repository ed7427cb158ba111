//! TileFormat - geometry of one octree image pyramid and the conversions
//! between its coordinate spaces.
//!
//! Spaces, finest to coarsest:
//! - micrometers (`MicrometerXyz`): physical position, origin shared with the
//!   microscope stage;
//! - voxels (`VoxelXyz`): full-resolution grid relative to `origin`;
//! - zoomed voxels (`ZoomedVoxelIndex`): voxels at a pyramid level, zoomed
//!   axes divided by `2^zoom`;
//! - tiles (`TileXyz`/`TileIndex`): fixed-size in-plane chunks of zoomed
//!   voxels, numbered from the bottom of the volume.

use glam::{DVec3, IVec3};

use super::{
  CoordinateAxis, IndexStyle, MicrometerBounds, MicrometerXyz, TileXyz, VoxelXyz, ZoomLevel,
  ZoomedVoxelIndex,
};
use crate::error::TraceError;
use crate::tile::TileIndex;

/// Added to log2(voxels per pixel) before truncating to a zoom level.
const CAMERA_ZOOM_OFFSET: f64 = 0.5;

/// Deepest pyramid whose zoom-out factors still fit an `i32`.
pub const MAX_ZOOM_LEVEL_COUNT: u32 = 31;

/// Shape and sampling of an image pyramid.
#[derive(Clone, Debug, PartialEq)]
pub struct TileFormat {
  /// Volume origin in full-resolution voxels.
  pub origin: IVec3,
  /// Volume size in full-resolution voxels.
  pub volume_size: IVec3,
  /// Tile width and height in zoomed voxels; `z` is slices per octree block.
  pub tile_size: IVec3,
  /// Physical size of one full-resolution voxel.
  pub voxel_micrometers: DVec3,
  /// Number of pyramid levels, including full resolution.
  pub zoom_level_count: u32,
  /// Bits per intensity sample (8 or 16).
  pub bit_depth: u32,
  /// Interleaved channels per voxel.
  pub channel_count: u32,
  pub intensity_min: u32,
  pub intensity_max: u32,
  pub index_style: IndexStyle,
}

impl Default for TileFormat {
  fn default() -> Self {
    Self {
      origin: IVec3::ZERO,
      volume_size: IVec3::new(1024, 1024, 1),
      tile_size: IVec3::new(1024, 1024, 1),
      voxel_micrometers: DVec3::ONE,
      zoom_level_count: 1,
      bit_depth: 8,
      channel_count: 1,
      intensity_min: 0,
      intensity_max: 255,
      index_style: IndexStyle::Quadtree,
    }
  }
}

impl TileFormat {
  /// Reject shapes the conversions cannot work with.
  pub fn validate(&self) -> Result<(), TraceError> {
    if self.tile_size.min_element() <= 0 {
      return Err(TraceError::InvalidFormat(format!(
        "tile size {} must be positive",
        self.tile_size
      )));
    }
    if self.volume_size.min_element() <= 0 {
      return Err(TraceError::InvalidFormat(format!(
        "volume size {} must be positive",
        self.volume_size
      )));
    }
    if self.voxel_micrometers.min_element() <= 0.0 {
      return Err(TraceError::InvalidFormat(format!(
        "voxel size {} must be positive",
        self.voxel_micrometers
      )));
    }
    if !matches!(self.bit_depth, 8 | 16) {
      return Err(TraceError::InvalidFormat(format!(
        "unsupported bit depth {}",
        self.bit_depth
      )));
    }
    if self.channel_count == 0 || self.zoom_level_count == 0 {
      return Err(TraceError::InvalidFormat(
        "channel and zoom level counts must be at least 1".into(),
      ));
    }
    if self.zoom_level_count > MAX_ZOOM_LEVEL_COUNT {
      return Err(TraceError::InvalidFormat(format!(
        "{} zoom levels exceed the limit of {}",
        self.zoom_level_count, MAX_ZOOM_LEVEL_COUNT
      )));
    }
    Ok(())
  }

  /// Coarsest zoom level.
  #[inline]
  pub fn max_zoom(&self) -> ZoomLevel {
    ZoomLevel::new(self.zoom_level_count.saturating_sub(1))
  }

  #[inline]
  pub fn bytes_per_intensity(&self) -> usize {
    (self.bit_depth as usize).div_ceil(8).max(1)
  }

  /// Decoded byte size of one 2D tile.
  pub fn tile_bytes(&self) -> usize {
    self.tile_size.x as usize
      * self.tile_size.y as usize
      * self.channel_count as usize
      * self.bytes_per_intensity()
  }

  /// Physical extent of the whole volume.
  pub fn bounding_box(&self) -> MicrometerBounds {
    let min = self.origin.as_dvec3() * self.voxel_micrometers;
    let max = (self.origin + self.volume_size).as_dvec3() * self.voxel_micrometers;
    MicrometerBounds::new(min, max)
  }

  /// Whether `axis` is divided by the zoom factor at coarser levels.
  #[inline]
  fn is_zoomed_axis(&self, axis: CoordinateAxis, slice_axis: CoordinateAxis) -> bool {
    axis != slice_axis || self.index_style == IndexStyle::Octree
  }

  /// Pick the pyramid level whose voxels best match the screen resolution.
  pub fn zoom_level_for_camera_zoom(&self, pixels_per_micrometer: f64) -> ZoomLevel {
    let zoom_max = self.max_zoom().log2() as i64;
    let finest_micrometers = self.voxel_micrometers.min_element();
    let pixels_per_voxel = pixels_per_micrometer * finest_micrometers;
    let mut zoom = zoom_max;
    if pixels_per_voxel > 0.0 {
      let voxels_per_pixel = 1.0 / pixels_per_voxel;
      let top_zoom = voxels_per_pixel.log2();
      zoom = (top_zoom + CAMERA_ZOOM_OFFSET) as i64;
    }
    ZoomLevel::new(zoom.clamp(0, zoom_max) as u32)
  }

  /// Full-resolution voxel containing a physical point.
  pub fn voxel_xyz_for_micrometer_xyz(&self, micrometers: MicrometerXyz) -> VoxelXyz {
    let voxel = (micrometers.0 / self.voxel_micrometers).floor().as_ivec3();
    VoxelXyz(voxel - self.origin)
  }

  /// Physical position of a voxel: the in-plane upper-left corner, centred
  /// along the slice axis.
  pub fn micrometer_xyz_for_voxel_xyz(
    &self,
    voxel: VoxelXyz,
    slice_axis: CoordinateAxis,
  ) -> MicrometerXyz {
    let mut grid = (voxel.0 + self.origin).as_dvec3();
    grid[slice_axis.index()] += 0.5;
    MicrometerXyz(grid * self.voxel_micrometers)
  }

  /// Position of a zoomed voxel's full-resolution corner voxel.
  pub fn micrometer_xyz_for_zoomed_voxel_index(
    &self,
    zoomed: ZoomedVoxelIndex,
    slice_axis: CoordinateAxis,
  ) -> MicrometerXyz {
    let voxel = self.voxel_xyz_for_zoomed_voxel_index(zoomed, slice_axis);
    self.micrometer_xyz_for_voxel_xyz(voxel, slice_axis)
  }

  pub fn zoomed_voxel_index_for_voxel_xyz(
    &self,
    voxel: VoxelXyz,
    zoom: ZoomLevel,
    slice_axis: CoordinateAxis,
  ) -> ZoomedVoxelIndex {
    let factor = zoom.zoom_out_factor();
    let mut xyz = voxel.0;
    for axis in CoordinateAxis::ALL {
      if self.is_zoomed_axis(axis, slice_axis) {
        xyz[axis.index()] = xyz[axis.index()].div_euclid(factor);
      }
    }
    ZoomedVoxelIndex::from_ivec3(xyz, zoom)
  }

  /// Full-resolution voxel at the upper-left-front corner of a zoomed voxel.
  pub fn voxel_xyz_for_zoomed_voxel_index(
    &self,
    zoomed: ZoomedVoxelIndex,
    slice_axis: CoordinateAxis,
  ) -> VoxelXyz {
    let factor = zoomed.zoom.zoom_out_factor();
    let mut xyz = zoomed.xyz();
    for axis in CoordinateAxis::ALL {
      if self.is_zoomed_axis(axis, slice_axis) {
        xyz[axis.index()] *= factor;
      }
    }
    VoxelXyz(xyz)
  }

  /// Volume height in zoomed voxels, the reference for flipping Y between
  /// top-origin rows and bottom-origin tiles.
  #[inline]
  fn zoomed_height(&self, zoom: ZoomLevel) -> i32 {
    self.volume_size.y / zoom.zoom_out_factor()
  }

  pub fn tile_xyz_for_zoomed_voxel_index(
    &self,
    zoomed: ZoomedVoxelIndex,
    slice_axis: CoordinateAxis,
  ) -> TileXyz {
    let mut xyz = zoomed.xyz();
    if slice_axis != CoordinateAxis::Y {
      xyz.y = self.zoomed_height(zoomed.zoom) - 1 - xyz.y;
    }
    for axis in CoordinateAxis::ALL {
      if axis != slice_axis {
        let i = axis.index();
        xyz[i] = xyz[i].div_euclid(self.tile_size[i]);
      }
    }
    TileXyz::from_ivec3(xyz)
  }

  /// Zoomed voxel at the upper-left-front corner of a tile.
  pub fn zoomed_voxel_index_for_tile_xyz(
    &self,
    tile: TileXyz,
    zoom: ZoomLevel,
    slice_axis: CoordinateAxis,
  ) -> ZoomedVoxelIndex {
    let mut xyz = tile.to_ivec3();
    for axis in CoordinateAxis::ALL {
      if axis != slice_axis {
        xyz[axis.index()] *= self.tile_size[axis.index()];
      }
    }
    if slice_axis != CoordinateAxis::Y {
      xyz.y = self.zoomed_height(zoom) - xyz.y - self.tile_size.y;
    }
    ZoomedVoxelIndex::from_ivec3(xyz, zoom)
  }

  pub fn tile_index_for_zoomed_voxel_index(
    &self,
    zoomed: ZoomedVoxelIndex,
    slice_axis: CoordinateAxis,
  ) -> TileIndex {
    let tile = self.tile_xyz_for_zoomed_voxel_index(zoomed, slice_axis);
    TileIndex::new(
      tile,
      zoomed.zoom,
      self.max_zoom(),
      self.index_style,
      slice_axis,
    )
  }

  /// Tile containing a physical point at the given zoom level.
  pub fn tile_index_for_xyz(
    &self,
    micrometers: MicrometerXyz,
    zoom: ZoomLevel,
    slice_axis: CoordinateAxis,
  ) -> TileIndex {
    let voxel = self.voxel_xyz_for_micrometer_xyz(micrometers);
    let zoomed = self.zoomed_voxel_index_for_voxel_xyz(voxel, zoom, slice_axis);
    self.tile_index_for_zoomed_voxel_index(zoomed, slice_axis)
  }

  fn micrometer_corner_for_tile_xyz(&self, tile: TileXyz, index: &TileIndex) -> DVec3 {
    let zoomed = self.zoomed_voxel_index_for_tile_xyz(tile, index.zoom, index.slice_axis);
    let voxel = self.voxel_xyz_for_zoomed_voxel_index(zoomed, index.slice_axis);
    self.micrometer_xyz_for_voxel_xyz(voxel, index.slice_axis).0
  }

  /// In-plane corners of a tile in micrometers.
  ///
  /// Order: `[0]` upper-left-front, `[1]` one tile along the horizontal axis,
  /// `[2]` one tile along the vertical axis, `[3]` lower-right-back. Corners
  /// are assembled component-wise from the two extreme corners, so tiles
  /// sharing an edge produce bit-identical coordinates.
  pub fn corners_for_tile_index(&self, index: &TileIndex) -> [MicrometerXyz; 4] {
    let depth = index.slice_axis;
    let mut step = IVec3::new(1, -1, 1);
    step[depth.index()] = 0;

    let ulf_tile = index.tile_xyz();
    let lrb_tile = TileXyz::from_ivec3(ulf_tile.to_ivec3() + step);
    let ulf = self.micrometer_corner_for_tile_xyz(ulf_tile, index);
    let lrb = self.micrometer_corner_for_tile_xyz(lrb_tile, index);

    let horizontal = depth.horizontal().index();
    let vertical = depth.vertical().index();

    let mut right = ulf;
    right[horizontal] = lrb[horizontal];
    let mut down = ulf;
    down[vertical] = lrb[vertical];
    let mut both = right;
    both[vertical] = lrb[vertical];

    [
      MicrometerXyz(ulf),
      MicrometerXyz(right),
      MicrometerXyz(down),
      MicrometerXyz(both),
    ]
  }
}

#[cfg(test)]
#[path = "tile_format_test.rs"]
mod tile_format_test;
