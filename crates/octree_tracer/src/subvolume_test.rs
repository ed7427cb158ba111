use std::ops::ControlFlow;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use glam::IVec3;

use super::*;
use crate::error::TileLoadError;
use crate::test_utils::{small_format, uniform_source, FieldTileSource};

fn zv(x: i32, y: i32, z: i32) -> ZoomedVoxelIndex {
  ZoomedVoxelIndex::new(x, y, z, ZoomLevel::FULL_RESOLUTION)
}

/// Packs a voxel position into 16 bits so every read can be checked.
fn packed(voxel: IVec3) -> u16 {
  (voxel.x as u16) | ((voxel.y as u16) << 6) | (((voxel.z % 16) as u16) << 12)
}

fn packed_format() -> TileFormat {
  TileFormat {
    bit_depth: 16,
    intensity_max: u16::MAX as u32,
    ..small_format()
  }
}

fn cache_for(format: &TileFormat) -> Arc<TileCache> {
  Arc::new(TileCache::new(64, format.tile_bytes()))
}

// =========================================================================
// Batch 1: Construction
// =========================================================================

/// Corners may come in any order; padding grows every side.
#[test]
fn test_bounds_from_unordered_corners_with_padding() {
  let format = small_format();
  let sub = Subvolume::new(
    zv(10, 12, 5),
    zv(4, 3, 7),
    2,
    Arc::new(uniform_source(format.clone(), 1)),
    cache_for(&format),
  )
  .expect("valid window");

  assert_eq!(sub.origin(), zv(2, 1, 3));
  assert_eq!(sub.extent(), IVec3::new(11, 14, 7));
  assert_eq!(sub.voxel_count(), 11 * 14 * 7);
  assert!(sub.contains(zv(12, 14, 9)));
  assert!(!sub.contains(zv(13, 14, 9)));
}

#[test]
fn test_corners_at_different_zooms_rejected() {
  let format = small_format();
  let result = Subvolume::new(
    zv(0, 0, 0),
    ZoomedVoxelIndex::new(4, 4, 4, ZoomLevel::new(1)),
    0,
    Arc::new(uniform_source(format.clone(), 1)),
    cache_for(&format),
  );
  assert!(matches!(result, Err(TraceError::ZoomMismatch { .. })));
}

#[test]
fn test_cache_with_other_tile_size_rejected() {
  let format = small_format();
  let result = Subvolume::new(
    zv(0, 0, 0),
    zv(4, 4, 4),
    0,
    Arc::new(uniform_source(format.clone(), 1)),
    Arc::new(TileCache::new(8, 7)),
  );
  assert!(matches!(result, Err(TraceError::InvalidFormat(_))));
}

// =========================================================================
// Batch 2: Reads
// =========================================================================

/// Every voxel in a window spanning several tiles reads back its own value.
#[test]
fn test_reads_match_field_across_tiles() {
  let format = packed_format();
  let source = Arc::new(FieldTileSource::new(format.clone(), |v, _| packed(v)));
  let sub = Subvolume::new(zv(10, 12, 1), zv(21, 35, 6), 0, source, cache_for(&format))
    .expect("valid window");

  for z in 1..=6 {
    for y in 12..=35 {
      for x in 10..=21 {
        let value = sub.intensity_global(zv(x, y, z), 0).expect("in bounds");
        assert_eq!(value, packed(IVec3::new(x, y, z)), "at ({}, {}, {})", x, y, z);
      }
    }
  }
  assert_eq!(
    sub.intensity_local(IVec3::ZERO, 0).expect("in bounds"),
    packed(IVec3::new(10, 12, 1))
  );
}

/// Interleaved channels are addressed independently.
#[test]
fn test_reads_select_channel() {
  let format = TileFormat {
    channel_count: 2,
    ..small_format()
  };
  let source = Arc::new(FieldTileSource::new(format.clone(), |v, c| {
    (v.x + v.y) as u16 + 100 * c as u16
  }));
  let sub = Subvolume::new(zv(14, 14, 0), zv(18, 18, 0), 0, source, cache_for(&format))
    .expect("valid window");

  assert_eq!(sub.intensity_global(zv(15, 17, 0), 0), Ok(32));
  assert_eq!(sub.intensity_global(zv(15, 17, 0), 1), Ok(132));
  assert!(matches!(
    sub.intensity_global(zv(15, 17, 0), 2),
    Err(TraceError::ChannelOutOfRange { channel: 2, .. })
  ));
}

/// Coarser levels address the zoomed grid directly.
#[test]
fn test_reads_at_coarser_zoom() {
  let format = packed_format();
  let zoom = ZoomLevel::new(1);
  let source = Arc::new(FieldTileSource::new(format.clone(), |v, _| packed(v)));
  let sub = Subvolume::new(
    ZoomedVoxelIndex::new(3, 3, 2, zoom),
    ZoomedVoxelIndex::new(20, 25, 2, zoom),
    0,
    source,
    cache_for(&format),
  )
  .expect("valid window");

  let position = ZoomedVoxelIndex::new(17, 19, 2, zoom);
  assert_eq!(sub.intensity_global(position, 0), Ok(packed(position.xyz())));
  assert!(matches!(
    sub.intensity_global(zv(17, 19, 2), 0),
    Err(TraceError::ZoomMismatch { .. })
  ));
}

/// Reads outside the window fail instead of clamping.
#[test]
fn test_out_of_bounds_is_an_error() {
  let format = small_format();
  let sub = Subvolume::new(
    zv(5, 5, 5),
    zv(8, 8, 8),
    1,
    Arc::new(uniform_source(format.clone(), 9)),
    cache_for(&format),
  )
  .expect("valid window");

  assert_eq!(sub.intensity_global(zv(4, 4, 4), 0), Ok(9));
  for outside in [zv(3, 5, 5), zv(5, 10, 5), zv(5, 5, 10)] {
    assert!(
      matches!(
        sub.intensity_global(outside, 0),
        Err(TraceError::OutOfBounds { position, .. }) if position == outside
      ),
      "{} should be out of bounds",
      outside
    );
  }
  assert!(matches!(
    sub.intensity_local(IVec3::new(-1, 0, 0), 0),
    Err(TraceError::OutOfBounds { .. })
  ));
}

// =========================================================================
// Batch 3: Missing and failing tiles
// =========================================================================

/// Missing tiles read as zero; neighbours are unaffected.
#[test]
fn test_missing_tiles_read_as_zero() {
  let format = small_format();
  let source = Arc::new(uniform_source(format.clone(), 77).with_missing(|t| t.x == 0));
  let sub = Subvolume::new(zv(10, 10, 0), zv(20, 10, 0), 0, source, cache_for(&format))
    .expect("valid window");

  assert_eq!(sub.intensity_global(zv(15, 10, 0), 0), Ok(0));
  assert_eq!(sub.intensity_global(zv(16, 10, 0), 0), Ok(77));
}

/// Tiles at negative coordinates are missing without asking the source.
#[test]
fn test_negative_tiles_never_loaded() {
  let format = small_format();
  let source = Arc::new(uniform_source(format.clone(), 5));
  let sub = Subvolume::new(
    zv(-3, 5, 1),
    zv(2, 5, 1),
    0,
    Arc::clone(&source),
    cache_for(&format),
  )
  .expect("valid window");

  assert_eq!(sub.intensity_global(zv(-3, 5, 1), 0), Ok(0));
  assert_eq!(source.load_count(), 0);
  assert_eq!(sub.intensity_global(zv(2, 5, 1), 0), Ok(5));
  assert_eq!(source.load_count(), 1);
}

/// Load failures surface as errors and nothing is cached for that tile.
#[test]
fn test_load_failure_propagates() {
  let format = small_format();
  let cache = cache_for(&format);
  let source = Arc::new(uniform_source(format.clone(), 5).with_failing(|t| t.z == 2));
  let sub = Subvolume::new(zv(1, 1, 1), zv(3, 3, 3), 0, source, Arc::clone(&cache))
    .expect("valid window");

  assert_eq!(sub.intensity_global(zv(1, 1, 1), 0), Ok(5));
  let cached = cache.len();
  match sub.intensity_global(zv(1, 1, 2), 0) {
    Err(TraceError::TileLoad { tile, source }) => {
      assert_eq!(tile.z, 2);
      assert!(matches!(source, TileLoadError::Io { .. }));
    }
    other => panic!("expected a load error, got {:?}", other),
  }
  assert_eq!(cache.len(), cached);
}

// =========================================================================
// Batch 4: Prefetch and sharing
// =========================================================================

/// Prefetch resolves every covering tile with one load each.
#[test]
fn test_prefetch_loads_each_tile_once() {
  let format = small_format();
  let source = Arc::new(uniform_source(format.clone(), 3));
  let sub = Subvolume::new(
    zv(5, 5, 0),
    zv(20, 20, 3),
    0,
    Arc::clone(&source),
    cache_for(&format),
  )
  .expect("valid window");

  assert_eq!(sub.tile_count(), 2 * 2 * 4);
  assert_eq!(sub.resolved_tile_count(), 0);

  sub.prefetch().expect("all tiles load");

  assert_eq!(sub.resolved_tile_count(), sub.tile_count());
  assert_eq!(source.load_count(), sub.tile_count());
  sub.intensity_stats(0).expect("reads");
  assert_eq!(source.load_count(), sub.tile_count(), "reads after prefetch stay local");
}

/// A second window over the same region is served from the shared cache.
#[test]
fn test_windows_share_cache() {
  let format = small_format();
  let cache = cache_for(&format);
  let source = Arc::new(uniform_source(format.clone(), 3));

  let first = Subvolume::new(zv(0, 0, 0), zv(30, 30, 1), 0, Arc::clone(&source), Arc::clone(&cache))
    .expect("valid window");
  first.prefetch().expect("loads");
  let loads = source.load_count();

  let second = Subvolume::new(zv(2, 2, 0), zv(28, 28, 1), 0, Arc::clone(&source), cache)
    .expect("valid window");
  second.prefetch().expect("hits");
  assert_eq!(source.load_count(), loads);
}

// =========================================================================
// Batch 5: Statistics
// =========================================================================

#[test]
fn test_intensity_stats_uniform() {
  let format = small_format();
  let sub = Subvolume::new(
    zv(0, 0, 0),
    zv(9, 9, 9),
    0,
    Arc::new(uniform_source(format.clone(), 50)),
    cache_for(&format),
  )
  .expect("valid window");

  let stats = sub.intensity_stats(0).expect("reads");
  assert_eq!(stats.mean, 50.0);
  assert_eq!(stats.std_dev, 0.0);
  assert_eq!((stats.min, stats.max), (50, 50));
}

/// Half the window at 10 and half at 30: mean 20, deviation 10.
#[test]
fn test_intensity_stats_two_levels() {
  let format = small_format();
  let source = Arc::new(FieldTileSource::new(format.clone(), |v, _| {
    if v.x < 2 {
      10
    } else {
      30
    }
  }));
  let sub = Subvolume::new(zv(0, 0, 0), zv(3, 3, 0), 0, source, cache_for(&format))
    .expect("valid window");

  let stats = sub.intensity_stats(0).expect("reads");
  assert!((stats.mean - 20.0).abs() < 1e-12);
  assert!((stats.std_dev - 10.0).abs() < 1e-12);
  assert_eq!((stats.min, stats.max), (10, 30));
}

/// Large 16-bit values: the spread comes out exact, not swamped by the mean.
#[test]
fn test_intensity_stats_near_full_scale() {
  let format = packed_format();
  let source = Arc::new(FieldTileSource::new(format.clone(), |v, _| {
    if v.x < 3 {
      65000
    } else {
      65003
    }
  }));
  let sub = Subvolume::new(zv(0, 0, 0), zv(5, 2, 2), 0, source, cache_for(&format))
    .expect("valid window");
  assert_eq!(sub.voxel_count(), 54);

  let stats = sub.intensity_stats(0).expect("reads");
  assert!((stats.mean - 65001.5).abs() < 1e-9, "{:?}", stats);
  assert!((stats.std_dev - 1.5).abs() < 1e-9, "{:?}", stats);
  assert_eq!((stats.min, stats.max), (65000, 65003));
}

// =========================================================================
// Batch 6: Deadlines
// =========================================================================

#[test]
fn test_prefetch_within_open_deadline_loads_everything() {
  let format = small_format();
  let source = Arc::new(uniform_source(format.clone(), 7));
  let sub = Subvolume::new(zv(0, 0, 0), zv(40, 40, 9), 0, Arc::clone(&source), cache_for(&format))
    .expect("valid window");

  let flow = sub
    .prefetch_within(&TraceDeadline::new(Duration::from_secs(60)))
    .expect("loads");
  assert_eq!(flow, ControlFlow::Continue(()));
  assert_eq!(sub.resolved_tile_count(), sub.tile_count());

  let stats = sub
    .intensity_stats_within(0, &TraceDeadline::new(Duration::from_secs(60)))
    .expect("reads");
  assert_eq!(stats, ControlFlow::Continue(sub.intensity_stats(0).expect("reads")));
}

/// A cancelled request starts no tile loads.
#[test]
fn test_prefetch_within_stops_when_cancelled() {
  let format = small_format();
  let source = Arc::new(uniform_source(format.clone(), 7));
  let sub = Subvolume::new(zv(0, 0, 0), zv(40, 40, 9), 0, Arc::clone(&source), cache_for(&format))
    .expect("valid window");
  let deadline =
    TraceDeadline::new(Duration::from_secs(60)).with_cancel_flag(Arc::new(AtomicBool::new(true)));

  let flow = sub.prefetch_within(&deadline).expect("no load fails");
  assert_eq!(flow, ControlFlow::Break(Interrupt::Cancelled));
  assert_eq!(source.load_count(), 0);
  assert_eq!(sub.resolved_tile_count(), 0);
}

#[test]
fn test_intensity_stats_within_expired_deadline() {
  let format = small_format();
  let source = Arc::new(uniform_source(format.clone(), 7));
  let sub = Subvolume::new(zv(0, 0, 0), zv(9, 9, 9), 0, Arc::clone(&source), cache_for(&format))
    .expect("valid window");

  let flow = sub
    .intensity_stats_within(0, &TraceDeadline::new(Duration::ZERO))
    .expect("no read fails");
  assert_eq!(flow, ControlFlow::Break(Interrupt::TimedOut));
  assert_eq!(source.load_count(), 0);
}
