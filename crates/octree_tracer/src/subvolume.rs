//! Subvolume - a bounded, randomly addressable voxel window over tiles.
//!
//! Created per trace request from the two traced endpoints plus a padding
//! margin. Tiles are fetched lazily through the shared [`TileCache`] and
//! pinned for the lifetime of the window, so repeated reads of a tile never
//! go back to the cache lock.
//!
//! Only Z-sliced windows are supported: every covering tile is one slice.

use std::ops::ControlFlow;
use std::sync::{Arc, OnceLock};

use glam::IVec3;
use rayon::prelude::*;

use crate::cache::TileCache;
use crate::coords::{CoordinateAxis, TileFormat, TileXyz, ZoomLevel, ZoomedVoxelIndex};
use crate::deadline::{Interrupt, TraceDeadline};
use crate::error::TraceError;
use crate::tile::{TileIndex, TilePayload, TileSource};

const SLICE_AXIS: CoordinateAxis = CoordinateAxis::Z;

/// Summary of the intensities in a window, one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityStats {
  pub mean: f64,
  /// Population standard deviation.
  pub std_dev: f64,
  pub min: u16,
  pub max: u16,
}

/// Welford's running mean and squared deviation, so large 16-bit means
/// keep their precision.
#[derive(Clone, Copy, Debug)]
struct IntensityAccumulator {
  count: u64,
  mean: f64,
  m2: f64,
  min: u16,
  max: u16,
}

impl IntensityAccumulator {
  fn new() -> Self {
    Self {
      count: 0,
      mean: 0.0,
      m2: 0.0,
      min: u16::MAX,
      max: u16::MIN,
    }
  }

  #[inline]
  fn push(&mut self, value: u16) {
    let v = value as f64;
    self.count += 1;
    let delta = v - self.mean;
    self.mean += delta / self.count as f64;
    self.m2 += delta * (v - self.mean);
    self.min = self.min.min(value);
    self.max = self.max.max(value);
  }

  fn finish(&self) -> IntensityStats {
    let variance = if self.count == 0 {
      0.0
    } else {
      self.m2 / self.count as f64
    };
    IntensityStats {
      mean: self.mean,
      std_dev: variance.max(0.0).sqrt(),
      min: self.min,
      max: self.max,
    }
  }
}

enum PrefetchStop {
  Interrupted(Interrupt),
  Failed(TraceError),
}

pub struct Subvolume<S: TileSource> {
  source: Arc<S>,
  cache: Arc<TileCache>,
  format: TileFormat,
  origin: IVec3,
  extent: IVec3,
  zoom: ZoomLevel,
  tile_min: IVec3,
  tile_dims: IVec3,
  /// `None` once resolved means the tile is missing and reads as zero.
  tiles: Vec<OnceLock<Option<TilePayload>>>,
}

impl<S: TileSource> Subvolume<S> {
  /// Window spanning both corners, inclusive, grown by `padding` voxels on
  /// every side. Corners may be given in any order.
  pub fn new(
    corner1: ZoomedVoxelIndex,
    corner2: ZoomedVoxelIndex,
    padding: i32,
    source: Arc<S>,
    cache: Arc<TileCache>,
  ) -> Result<Self, TraceError> {
    if corner1.zoom != corner2.zoom {
      return Err(TraceError::ZoomMismatch {
        first: corner1,
        second: corner2,
      });
    }
    let format = source.tile_format().clone();
    format.validate()?;
    if cache.tile_bytes() != format.tile_bytes() {
      return Err(TraceError::InvalidFormat(format!(
        "cache holds {}-byte tiles, source produces {}",
        cache.tile_bytes(),
        format.tile_bytes()
      )));
    }

    let zoom = corner1.zoom;
    let pad = IVec3::splat(padding.max(0));
    let lo = corner1.xyz().min(corner2.xyz()) - pad;
    let hi = corner1.xyz().max(corner2.xyz()) + pad;

    let tile_of = |xyz: IVec3| {
      format
        .tile_xyz_for_zoomed_voxel_index(ZoomedVoxelIndex::from_ivec3(xyz, zoom), SLICE_AXIS)
        .to_ivec3()
    };
    let (tile_a, tile_b) = (tile_of(lo), tile_of(hi));
    // Y flips between voxel rows and tile rows, so order per component.
    let tile_min = tile_a.min(tile_b);
    let tile_dims = tile_a.max(tile_b) - tile_min + IVec3::ONE;
    let tile_count = tile_dims.x as usize * tile_dims.y as usize * tile_dims.z as usize;

    log::debug!(
      "subvolume {} .. {} at {} covers {} tiles",
      lo,
      hi,
      zoom,
      tile_count
    );

    Ok(Self {
      source,
      cache,
      format,
      origin: lo,
      extent: hi - lo + IVec3::ONE,
      zoom,
      tile_min,
      tile_dims,
      tiles: (0..tile_count).map(|_| OnceLock::new()).collect(),
    })
  }

  pub fn format(&self) -> &TileFormat {
    &self.format
  }

  pub fn zoom(&self) -> ZoomLevel {
    self.zoom
  }

  /// Global position of local voxel (0, 0, 0).
  pub fn origin(&self) -> ZoomedVoxelIndex {
    ZoomedVoxelIndex::from_ivec3(self.origin, self.zoom)
  }

  /// Size in voxels along each axis.
  pub fn extent(&self) -> IVec3 {
    self.extent
  }

  pub fn voxel_count(&self) -> usize {
    self.extent.x as usize * self.extent.y as usize * self.extent.z as usize
  }

  pub fn tile_count(&self) -> usize {
    self.tiles.len()
  }

  /// Tiles resolved so far, including missing ones.
  pub fn resolved_tile_count(&self) -> usize {
    self.tiles.iter().filter(|slot| slot.get().is_some()).count()
  }

  #[inline]
  pub fn contains_local(&self, local: IVec3) -> bool {
    local.cmpge(IVec3::ZERO).all() && local.cmplt(self.extent).all()
  }

  #[inline]
  pub fn contains(&self, position: ZoomedVoxelIndex) -> bool {
    position.zoom == self.zoom && self.contains_local(position.xyz() - self.origin)
  }

  pub fn to_local(&self, position: ZoomedVoxelIndex) -> IVec3 {
    position.xyz() - self.origin
  }

  pub fn to_global(&self, local: IVec3) -> ZoomedVoxelIndex {
    ZoomedVoxelIndex::from_ivec3(self.origin + local, self.zoom)
  }

  fn tile_index(&self, xyz: IVec3) -> TileIndex {
    TileIndex::new(
      TileXyz::from_ivec3(xyz),
      self.zoom,
      self.format.max_zoom(),
      self.format.index_style,
      SLICE_AXIS,
    )
  }

  fn slot_for_tile(&self, tile: IVec3) -> Option<usize> {
    let rel = tile - self.tile_min;
    if rel.cmplt(IVec3::ZERO).any() || rel.cmpge(self.tile_dims).any() {
      return None;
    }
    let d = self.tile_dims;
    Some(((rel.z * d.y + rel.y) * d.x + rel.x) as usize)
  }

  fn tile_for_slot(&self, slot: usize) -> IVec3 {
    let d = self.tile_dims;
    let slot = slot as i32;
    self.tile_min + IVec3::new(slot % d.x, (slot / d.x) % d.y, slot / (d.x * d.y))
  }

  /// Fetch a tile through the cache. Tiles at negative coordinates or with
  /// no storage identity are missing.
  fn fetch(&self, tile: &TileIndex) -> Result<Option<TilePayload>, TraceError> {
    if tile.x < 0 || tile.y < 0 || tile.z < 0 {
      return Ok(None);
    }
    let Some(key) = self.source.storage_key(tile) else {
      return Ok(None);
    };
    self
      .cache
      .get_or_load(key, || self.source.load_tile(tile, self.cache.stats()))
      .map_err(|source| TraceError::TileLoad {
        tile: *tile,
        source,
      })
  }

  fn slot_payload(&self, slot: usize) -> Result<Option<&[u8]>, TraceError> {
    if let Some(payload) = self.tiles[slot].get() {
      return Ok(payload.as_deref());
    }
    let fetched = self.fetch(&self.tile_index(self.tile_for_slot(slot)))?;
    Ok(self.tiles[slot].get_or_init(|| fetched).as_deref())
  }

  /// Load every covering tile, in parallel.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "subvolume::prefetch"))]
  pub fn prefetch(&self) -> Result<(), TraceError> {
    (0..self.tiles.len())
      .into_par_iter()
      .try_for_each(|slot| self.slot_payload(slot).map(|_| ()))
  }

  /// [`prefetch`](Self::prefetch) that stops starting new loads once
  /// `deadline` trips. Loads already in flight finish.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "subvolume::prefetch"))]
  pub fn prefetch_within(&self, deadline: &TraceDeadline) -> Result<ControlFlow<Interrupt>, TraceError> {
    let result = (0..self.tiles.len()).into_par_iter().try_for_each(|slot| {
      if let Some(interrupt) = deadline.check() {
        return Err(PrefetchStop::Interrupted(interrupt));
      }
      self
        .slot_payload(slot)
        .map(|_| ())
        .map_err(PrefetchStop::Failed)
    });
    match result {
      Ok(()) => Ok(ControlFlow::Continue(())),
      Err(PrefetchStop::Interrupted(interrupt)) => {
        log::debug!(
          "prefetch stopped ({:?}) with {} of {} tiles resolved",
          interrupt,
          self.resolved_tile_count(),
          self.tiles.len()
        );
        Ok(ControlFlow::Break(interrupt))
      }
      Err(PrefetchStop::Failed(err)) => Err(err),
    }
  }

  fn check_channel(&self, channel: u32) -> Result<(), TraceError> {
    if channel >= self.format.channel_count {
      return Err(TraceError::ChannelOutOfRange {
        channel,
        channel_count: self.format.channel_count,
      });
    }
    Ok(())
  }

  fn out_of_bounds(&self, position: ZoomedVoxelIndex) -> TraceError {
    TraceError::OutOfBounds {
      position,
      origin: self.origin(),
      extent: self.extent.to_array(),
    }
  }

  /// Intensity at a global zoomed voxel position.
  ///
  /// Positions outside the window are an error, never clamped. Missing
  /// tiles read as zero.
  pub fn intensity_global(&self, position: ZoomedVoxelIndex, channel: u32) -> Result<u16, TraceError> {
    self.check_channel(channel)?;
    if position.zoom != self.zoom {
      return Err(TraceError::ZoomMismatch {
        first: position,
        second: self.origin(),
      });
    }
    if !self.contains(position) {
      return Err(self.out_of_bounds(position));
    }

    let tile = self
      .format
      .tile_xyz_for_zoomed_voxel_index(position, SLICE_AXIS);
    let slot = self
      .slot_for_tile(tile.to_ivec3())
      .ok_or_else(|| self.out_of_bounds(position))?;
    let Some(bytes) = self.slot_payload(slot)? else {
      return Ok(0);
    };

    let corner = self
      .format
      .zoomed_voxel_index_for_tile_xyz(tile, self.zoom, SLICE_AXIS);
    let local_x = (position.x - corner.x) as usize;
    let local_y = (position.y - corner.y) as usize;
    let pixel = local_y * self.format.tile_size.x as usize + local_x;
    let sample = pixel * self.format.channel_count as usize + channel as usize;
    let bytes_per_intensity = self.format.bytes_per_intensity();
    let offset = sample * bytes_per_intensity;

    let value = match bytes_per_intensity {
      1 => bytes.get(offset).map(|&b| b as u16),
      _ => bytes
        .get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]])),
    };
    value.ok_or_else(|| {
      TraceError::InvalidFormat(format!(
        "offset {} outside {}-byte tile {:?}",
        offset,
        bytes.len(),
        tile
      ))
    })
  }

  /// Intensity at a position relative to [`origin`](Self::origin).
  #[inline]
  pub fn intensity_local(&self, local: IVec3, channel: u32) -> Result<u16, TraceError> {
    self.intensity_global(self.to_global(local), channel)
  }

  fn accumulate_slice(&self, z: i32, channel: u32, acc: &mut IntensityAccumulator) -> Result<(), TraceError> {
    for y in 0..self.extent.y {
      for x in 0..self.extent.x {
        acc.push(self.intensity_local(IVec3::new(x, y, z), channel)?);
      }
    }
    Ok(())
  }

  /// Mean, spread and range of one channel over the whole window.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "subvolume::intensity_stats"))]
  pub fn intensity_stats(&self, channel: u32) -> Result<IntensityStats, TraceError> {
    self.check_channel(channel)?;
    let mut acc = IntensityAccumulator::new();
    for z in 0..self.extent.z {
      self.accumulate_slice(z, channel, &mut acc)?;
    }
    Ok(acc.finish())
  }

  /// [`intensity_stats`](Self::intensity_stats), checking `deadline` before
  /// each Z slice.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "subvolume::intensity_stats"))]
  pub fn intensity_stats_within(
    &self,
    channel: u32,
    deadline: &TraceDeadline,
  ) -> Result<ControlFlow<Interrupt, IntensityStats>, TraceError> {
    self.check_channel(channel)?;
    let mut acc = IntensityAccumulator::new();
    for z in 0..self.extent.z {
      if let Some(interrupt) = deadline.check() {
        log::debug!("intensity statistics stopped ({:?}) at slice {}", interrupt, z);
        return Ok(ControlFlow::Break(interrupt));
      }
      self.accumulate_slice(z, channel, &mut acc)?;
    }
    Ok(ControlFlow::Continue(acc.finish()))
  }
}

#[cfg(test)]
#[path = "subvolume_test.rs"]
mod subvolume_test;
