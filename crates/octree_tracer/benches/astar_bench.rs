//! Benchmarks for the path search over synthetic intensity fields.
//!
//! Windows are prefetched before timing, so only the search itself is
//! measured.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::IVec3;
use octree_tracer::test_utils::{small_format, FieldTileSource};
use octree_tracer::{AStar, AStarConfig, PathSimplifier, Subvolume, TileCache, TileSource, ZoomLevel, ZoomedVoxelIndex};

fn zv(x: i32, y: i32, z: i32) -> ZoomedVoxelIndex {
  ZoomedVoxelIndex::new(x, y, z, ZoomLevel::FULL_RESOLUTION)
}

/// Bright helix through a dim, noisy background.
fn helix(voxel: IVec3, _channel: u32) -> u16 {
  let t = voxel.z as f32 * 0.4;
  let centre = (32.0 + 12.0 * t.cos(), 32.0 + 12.0 * t.sin());
  let dx = voxel.x as f32 - centre.0;
  let dy = voxel.y as f32 - centre.1;
  if dx * dx + dy * dy < 6.0 {
    220
  } else {
    ((voxel.x * 31 + voxel.y * 17 + voxel.z * 7) % 40) as u16
  }
}

fn window<S: TileSource>(source: S, hi: ZoomedVoxelIndex) -> Subvolume<S> {
  let cache = Arc::new(TileCache::new(4096, source.tile_format().tile_bytes()));
  let sub = Subvolume::new(zv(0, 0, 0), hi, 0, Arc::new(source), cache).expect("window");
  sub.prefetch().expect("prefetch");
  sub
}

// ============================================================================
// Search
// ============================================================================

/// Flat field, diagonal paths of growing length.
fn bench_uniform_diagonal(c: &mut Criterion) {
  let mut group = c.benchmark_group("astar_uniform_diagonal");

  for size in [8, 16, 32] {
    let sub = window(FieldTileSource::new(small_format(), |_, _| 60), zv(size - 1, size - 1, size - 1));
    let astar = AStar::new(&sub, AStarConfig::default()).expect("stats");

    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter(|| black_box(astar.search(zv(0, 0, 0), zv(size - 1, size - 1, size - 1))))
    });
  }

  group.finish();
}

/// Following a bright helix end to end.
fn bench_helix(c: &mut Criterion) {
  let sub = window(FieldTileSource::new(small_format(), helix), zv(63, 63, 23));
  let astar = AStar::new(&sub, AStarConfig::default()).expect("stats");
  let start = zv(44, 32, 0);
  let goal = sub.to_global(IVec3::new(
    (32.0 + 12.0 * (23.0f32 * 0.4).cos()).round() as i32,
    (32.0 + 12.0 * (23.0f32 * 0.4).sin()).round() as i32,
    23,
  ));

  c.bench_function("astar_helix", |b| b.iter(|| black_box(astar.search(start, goal))));
}

// ============================================================================
// Simplification
// ============================================================================

fn bench_simplify(c: &mut Criterion) {
  let sub = window(FieldTileSource::new(small_format(), helix), zv(63, 63, 23));
  let astar = AStar::new(&sub, AStarConfig::default()).expect("stats");
  let outcome = astar.search(zv(44, 32, 0), zv(20, 32, 23)).expect("search");
  let points = outcome.path().map(|path| path.points.clone()).unwrap_or_default();
  let simplifier = PathSimplifier::new(0.2);

  c.bench_function("simplify_helix_path", |b| b.iter(|| black_box(simplifier.simplify(&points))));
}

criterion_group!(benches, bench_uniform_diagonal, bench_helix, bench_simplify);
criterion_main!(benches);
