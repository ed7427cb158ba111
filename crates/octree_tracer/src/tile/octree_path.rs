//! On-disk addressing of tiles in an octree folder hierarchy.
//!
//! The root folder holds the coarsest level. Each finer level lives in one of
//! eight subfolders named `1`..`8`, so a full-resolution tile sits
//! `zoom_level_count - 1` folders deep. Within a folder, slices are stacked in
//! blocks of `tile_size.z`.

use std::fmt;
use std::path::PathBuf;

use glam::IVec3;
use smallvec::SmallVec;

use super::TileIndex;
use crate::coords::{CoordinateAxis, IndexStyle, TileFormat};

/// Folder digits from the octree root down to a tile's block.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct OctreePath {
  digits: SmallVec<[u8; 16]>,
}

impl OctreePath {
  pub fn digits(&self) -> &[u8] {
    &self.digits
  }

  pub fn depth(&self) -> usize {
    self.digits.len()
  }

  /// Relative folder path, empty for the root level.
  pub fn to_path_buf(&self) -> PathBuf {
    self.digits.iter().map(|d| d.to_string()).collect()
  }
}

impl fmt::Display for OctreePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, digit) in self.digits.iter().enumerate() {
      if i > 0 {
        f.write_str("/")?;
      }
      write!(f, "{}", digit)?;
    }
    Ok(())
  }
}

/// Slice coordinate in blocks-of-slices space at the tile's own zoom.
#[inline]
fn zoomed_slice(tile: &TileIndex) -> i32 {
  match tile.index_style {
    IndexStyle::Quadtree => tile.z.div_euclid(tile.zoom.zoom_out_factor()),
    IndexStyle::Octree => tile.z,
  }
}

/// Octant digit `1 + x + 2*(1-y) + 4*z`; Y flips because folders are
/// top-origin while tiles count from the bottom.
#[inline]
fn octant_digit(ds: IVec3) -> u8 {
  (1 + ds.x + 2 * (1 - ds.y) + 4 * ds.z) as u8
}

/// Folder holding `tile`, or None when the tile lies outside the octree.
///
/// Only Z-sliced tiles have an on-disk location.
pub fn octree_path(tile: &TileIndex, format: &TileFormat) -> Option<OctreePath> {
  if tile.slice_axis != CoordinateAxis::Z || format.tile_size.z <= 0 {
    return None;
  }
  let depth = format.zoom_level_count as i32 - tile.zoom.log2() as i32;
  if depth < 1 {
    return None;
  }

  let mut xyz = IVec3::new(
    tile.x,
    tile.y,
    zoomed_slice(tile).div_euclid(format.tile_size.z),
  );
  if xyz.min_element() < 0 {
    return None;
  }

  let mut path = OctreePath::default();
  for level in 0..depth - 1 {
    let scale = 1 << (depth - 2 - level);
    let ds = xyz / scale;
    if ds.max_element() > 1 {
      return None;
    }
    path.digits.push(octant_digit(ds));
    xyz -= ds * scale;
  }

  (xyz == IVec3::ZERO).then_some(path)
}

/// Index of the tile's slice within its folder's block of slices.
pub fn relative_slice(tile: &TileIndex, format: &TileFormat) -> i32 {
  zoomed_slice(tile).rem_euclid(format.tile_size.z.max(1))
}

#[cfg(test)]
#[path = "octree_path_test.rs"]
mod octree_path_test;
