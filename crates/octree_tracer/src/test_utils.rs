//! Test utilities: synthetic tile sources for cache, subvolume and search
//! tests and benchmarks.
//!
//! Tiles are rendered on demand from an intensity field over global zoomed
//! voxel coordinates, so a test describes the volume it wants as a closure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use glam::IVec3;

use crate::coords::{CoordinateAxis, TileFormat};
use crate::error::TileLoadError;
use crate::metrics::TileLoadStats;
use crate::tile::{TileIndex, TileKey, TileLoad, TileSource};

type TilePredicate = Box<dyn Fn(&TileIndex) -> bool + Send + Sync>;

/// Small 8-bit, single-channel pyramid: 64x64x32 voxels in 16x16 tiles.
pub fn small_format() -> TileFormat {
  TileFormat {
    volume_size: IVec3::new(64, 64, 32),
    tile_size: IVec3::new(16, 16, 4),
    zoom_level_count: 2,
    ..Default::default()
  }
}

/// Tile source rendering an intensity field `(zoomed voxel, channel) -> value`.
pub struct FieldTileSource<F> {
  format: TileFormat,
  field: F,
  missing: Option<TilePredicate>,
  failing: Option<TilePredicate>,
  delay: Duration,
  loads: AtomicUsize,
}

impl<F> FieldTileSource<F>
where
  F: Fn(IVec3, u32) -> u16 + Send + Sync,
{
  pub fn new(format: TileFormat, field: F) -> Self {
    Self {
      format,
      field,
      missing: None,
      failing: None,
      delay: Duration::ZERO,
      loads: AtomicUsize::new(0),
    }
  }

  /// Report matching tiles as absent from storage.
  pub fn with_missing(mut self, predicate: impl Fn(&TileIndex) -> bool + Send + Sync + 'static) -> Self {
    self.missing = Some(Box::new(predicate));
    self
  }

  /// Fail loads of matching tiles with an I/O error.
  pub fn with_failing(mut self, predicate: impl Fn(&TileIndex) -> bool + Send + Sync + 'static) -> Self {
    self.failing = Some(Box::new(predicate));
    self
  }

  /// Sleep this long inside every load.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Number of loads this source has served.
  pub fn load_count(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }

  fn render(&self, tile: &TileIndex) -> Vec<u8> {
    let format = &self.format;
    let corner = format
      .zoomed_voxel_index_for_tile_xyz(tile.tile_xyz(), tile.zoom, CoordinateAxis::Z)
      .xyz();
    let bytes_per_intensity = format.bytes_per_intensity();
    let mut bytes = Vec::with_capacity(format.tile_bytes());
    for ly in 0..format.tile_size.y {
      for lx in 0..format.tile_size.x {
        let voxel = corner + IVec3::new(lx, ly, 0);
        for channel in 0..format.channel_count {
          let value = (self.field)(voxel, channel);
          if bytes_per_intensity == 1 {
            bytes.push(value.min(u8::MAX as u16) as u8);
          } else {
            bytes.extend_from_slice(&value.to_le_bytes());
          }
        }
      }
    }
    bytes
  }
}

impl<F> TileSource for FieldTileSource<F>
where
  F: Fn(IVec3, u32) -> u16 + Send + Sync,
{
  fn tile_format(&self) -> &TileFormat {
    &self.format
  }

  fn storage_key(&self, tile: &TileIndex) -> Option<TileKey> {
    Some(TileKey::new(format!(
      "field/{}/{}/{}/{}",
      tile.zoom.log2(),
      tile.x,
      tile.y,
      tile.z
    )))
  }

  fn load_tile(&self, tile: &TileIndex, stats: &TileLoadStats) -> TileLoad {
    stats.record_load();
    self.loads.fetch_add(1, Ordering::SeqCst);
    if !self.delay.is_zero() {
      std::thread::sleep(self.delay);
    }
    if self.missing.as_ref().is_some_and(|missing| missing(tile)) {
      return TileLoad::Missing;
    }
    if self.failing.as_ref().is_some_and(|failing| failing(tile)) {
      return TileLoad::Failed(TileLoadError::Io {
        path: format!("field/{:?}", tile).into(),
        kind: std::io::ErrorKind::InvalidData,
        message: "synthetic failure".into(),
      });
    }
    TileLoad::Loaded(self.render(tile))
  }
}

/// Same value everywhere.
pub fn uniform_source(format: TileFormat, value: u16) -> FieldTileSource<impl Fn(IVec3, u32) -> u16 + Send + Sync> {
  FieldTileSource::new(format, move |_, _| value)
}
