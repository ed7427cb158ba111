use glam::{DVec3, IVec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

const EPSILON: f64 = 1e-6;

fn sample_format() -> TileFormat {
  TileFormat {
    origin: IVec3::new(100, -40, 12),
    volume_size: IVec3::new(2048, 1024, 64),
    tile_size: IVec3::new(256, 128, 8),
    voxel_micrometers: DVec3::new(0.3, 0.3, 1.1),
    zoom_level_count: 4,
    ..Default::default()
  }
}

// =========================================================================
// Batch 1: Micrometer <-> voxel
// =========================================================================

/// Voxel coordinates are floor(um / voxel size) minus the origin.
#[test]
fn test_voxel_for_micrometer_subtracts_origin() {
  let format = TileFormat {
    origin: IVec3::new(10, 20, 30),
    voxel_micrometers: DVec3::new(0.5, 0.5, 2.0),
    ..Default::default()
  };
  let voxel = format.voxel_xyz_for_micrometer_xyz(MicrometerXyz::new(5.75, 10.0, 61.9));
  assert_eq!(voxel, VoxelXyz::new(1, 0, 0));
}

/// Negative positions floor away from zero.
#[test]
fn test_voxel_for_micrometer_floors_negative() {
  let format = TileFormat::default();
  let voxel = format.voxel_xyz_for_micrometer_xyz(MicrometerXyz::new(-0.25, -1.0, 0.0));
  assert_eq!(voxel, VoxelXyz::new(-1, -1, 0));
}

/// In-plane axes map to the voxel corner, the slice axis to the voxel center.
#[test]
fn test_micrometer_for_voxel_centres_slice_axis() {
  let format = TileFormat {
    origin: IVec3::new(1, 2, 3),
    voxel_micrometers: DVec3::new(0.5, 0.25, 2.0),
    ..Default::default()
  };
  let um = format.micrometer_xyz_for_voxel_xyz(VoxelXyz::new(3, 2, 1), CoordinateAxis::Z);
  assert_eq!(um, MicrometerXyz::new(2.0, 1.0, 9.0));

  let um = format.micrometer_xyz_for_voxel_xyz(VoxelXyz::new(3, 2, 1), CoordinateAxis::X);
  assert_eq!(um, MicrometerXyz::new(2.25, 1.0, 8.0));
}

/// Axis-aligned micrometer -> voxel -> micrometer lands back on the voxel.
#[test]
fn test_micrometer_voxel_round_trip_axis_aligned() {
  let format = TileFormat {
    origin: IVec3::new(100, -40, 12),
    voxel_micrometers: DVec3::new(0.25, 0.5, 2.0),
    ..Default::default()
  };
  let voxel = VoxelXyz::new(17, 33, 5);
  let um = format.micrometer_xyz_for_voxel_xyz(voxel, CoordinateAxis::Z);
  assert_eq!(format.voxel_xyz_for_micrometer_xyz(um), voxel);
}

// =========================================================================
// Batch 2: Zoomed voxels
// =========================================================================

/// Quadtree style leaves the slice axis at full resolution.
#[test]
fn test_zoomed_index_quadtree_skips_slice_axis() {
  let format = sample_format();
  let zoomed = format.zoomed_voxel_index_for_voxel_xyz(
    VoxelXyz::new(17, 9, 13),
    ZoomLevel::new(2),
    CoordinateAxis::Z,
  );
  assert_eq!(zoomed, ZoomedVoxelIndex::new(4, 2, 13, ZoomLevel::new(2)));

  let back = format.voxel_xyz_for_zoomed_voxel_index(zoomed, CoordinateAxis::Z);
  assert_eq!(back, VoxelXyz::new(16, 8, 13));
}

/// Octree style zooms all three axes.
#[test]
fn test_zoomed_index_octree_zooms_every_axis() {
  let format = TileFormat {
    index_style: IndexStyle::Octree,
    ..sample_format()
  };
  let zoomed = format.zoomed_voxel_index_for_voxel_xyz(
    VoxelXyz::new(17, 9, 13),
    ZoomLevel::new(2),
    CoordinateAxis::Z,
  );
  assert_eq!(zoomed, ZoomedVoxelIndex::new(4, 2, 3, ZoomLevel::new(2)));
}

// =========================================================================
// Batch 3: Tiles
// =========================================================================

/// Tile rows count from the bottom while voxel rows count from the top.
#[test]
fn test_tile_y_is_bottom_origin() {
  let format = TileFormat {
    volume_size: IVec3::new(1024, 1024, 1),
    tile_size: IVec3::new(256, 256, 1),
    ..Default::default()
  };
  let top = ZoomedVoxelIndex::new(0, 0, 0, ZoomLevel::FULL_RESOLUTION);
  let bottom = ZoomedVoxelIndex::new(0, 1023, 0, ZoomLevel::FULL_RESOLUTION);

  assert_eq!(
    format.tile_xyz_for_zoomed_voxel_index(top, CoordinateAxis::Z),
    TileXyz::new(0, 3, 0)
  );
  assert_eq!(
    format.tile_xyz_for_zoomed_voxel_index(bottom, CoordinateAxis::Z),
    TileXyz::new(0, 0, 0)
  );
}

/// The upper-left corner of a tile maps back into that same tile.
#[test]
fn test_tile_corner_maps_back_to_tile() {
  let format = sample_format();
  for zoom in 0..format.zoom_level_count {
    let zoom = ZoomLevel::new(zoom);
    for tile in [TileXyz::new(0, 0, 3), TileXyz::new(2, 1, 7), TileXyz::new(1, 3, 0)] {
      let corner = format.zoomed_voxel_index_for_tile_xyz(tile, zoom, CoordinateAxis::Z);
      assert_eq!(
        format.tile_xyz_for_zoomed_voxel_index(corner, CoordinateAxis::Z),
        tile,
        "corner of {:?} at {} left the tile",
        tile,
        zoom
      );
    }
  }
}

/// The pyramid index carries the format's style and zoom limits.
#[test]
fn test_tile_index_for_xyz_carries_format_metadata() {
  let format = sample_format();
  let index = format.tile_index_for_xyz(
    MicrometerXyz::new(31.0, -11.0, 14.0),
    ZoomLevel::new(1),
    CoordinateAxis::Z,
  );
  assert_eq!(index.zoom, ZoomLevel::new(1));
  assert_eq!(index.max_zoom, ZoomLevel::new(3));
  assert_eq!(index.index_style, IndexStyle::Quadtree);
  assert_eq!(index.slice_axis, CoordinateAxis::Z);
}

/// For every sampled point and zoom, the computed tile contains the point.
#[test]
fn test_tile_containment_sampled() {
  let format = sample_format();
  let bounds = format.bounding_box();
  let mut rng = StdRng::seed_from_u64(0x5eed);

  for _ in 0..2000 {
    let point = DVec3::new(
      rng.random_range(bounds.min.x..bounds.max.x),
      rng.random_range(bounds.min.y..bounds.max.y),
      rng.random_range(bounds.min.z..bounds.max.z),
    );
    for zoom in 0..format.zoom_level_count {
      let zoom = ZoomLevel::new(zoom);
      let index = format.tile_index_for_xyz(MicrometerXyz(point), zoom, CoordinateAxis::Z);
      let corners = format.corners_for_tile_index(&index);
      let (lo, hi) = (corners[0].0, corners[3].0);

      assert!(
        lo.x - EPSILON <= point.x && point.x < hi.x + EPSILON,
        "x {} outside [{}, {}) for {:?}",
        point.x,
        lo.x,
        hi.x,
        index
      );
      assert!(
        lo.y - EPSILON <= point.y && point.y < hi.y + EPSILON,
        "y {} outside [{}, {}) for {:?}",
        point.y,
        lo.y,
        hi.y,
        index
      );
      assert!(
        (point.z - lo.z).abs() <= 0.5 * format.voxel_micrometers.z + EPSILON,
        "z {} not within half a slice of {}",
        point.z,
        lo.z
      );
    }
  }
}

/// Lower-right-back of a tile equals upper-left-front of its (x+1, y-1) neighbour.
#[test]
fn test_tile_adjacency_is_exact() {
  let format = sample_format();
  for zoom in 0..format.zoom_level_count {
    let zoom = ZoomLevel::new(zoom);
    for (x, y, z) in [(0, 1, 0), (3, 4, 9), (1, 2, 63), (-1, 0, 5)] {
      let tile = TileIndex::new(
        TileXyz::new(x, y, z),
        zoom,
        format.max_zoom(),
        format.index_style,
        CoordinateAxis::Z,
      );
      let neighbour = tile.with_xyz(TileXyz::new(x + 1, y - 1, z));

      let lrb = format.corners_for_tile_index(&tile)[3];
      let ulf = format.corners_for_tile_index(&neighbour)[0];
      assert_eq!(lrb, ulf, "gap between {:?} and {:?}", tile, neighbour);
    }
  }
}

/// Corners come out in Z order: origin, +horizontal, +vertical, both.
#[test]
fn test_corner_order() {
  let format = TileFormat {
    volume_size: IVec3::new(512, 512, 4),
    tile_size: IVec3::new(256, 256, 1),
    ..Default::default()
  };
  let tile = format.tile_index_for_zoomed_voxel_index(
    ZoomedVoxelIndex::new(0, 0, 2, ZoomLevel::FULL_RESOLUTION),
    CoordinateAxis::Z,
  );
  let corners = format.corners_for_tile_index(&tile);

  assert_eq!(corners[0], MicrometerXyz::new(0.0, 0.0, 2.5));
  assert_eq!(corners[1], MicrometerXyz::new(256.0, 0.0, 2.5));
  assert_eq!(corners[2], MicrometerXyz::new(0.0, 256.0, 2.5));
  assert_eq!(corners[3], MicrometerXyz::new(256.0, 256.0, 2.5));
}

// =========================================================================
// Batch 4: Format helpers
// =========================================================================

#[test]
fn test_tile_bytes_counts_channels_and_depth() {
  let format = TileFormat {
    tile_size: IVec3::new(64, 32, 8),
    bit_depth: 16,
    channel_count: 2,
    ..Default::default()
  };
  assert_eq!(format.bytes_per_intensity(), 2);
  assert_eq!(format.tile_bytes(), 64 * 32 * 2 * 2);
}

#[test]
fn test_bounding_box_spans_volume() {
  let format = TileFormat {
    origin: IVec3::new(10, 0, -2),
    volume_size: IVec3::new(100, 50, 4),
    voxel_micrometers: DVec3::new(0.5, 0.5, 2.0),
    ..Default::default()
  };
  let bounds = format.bounding_box();
  assert_eq!(bounds.min, DVec3::new(5.0, 0.0, -4.0));
  assert_eq!(bounds.max, DVec3::new(55.0, 25.0, 4.0));
}

/// One screen pixel per voxel selects full resolution; sparser pixels zoom out.
#[test]
fn test_zoom_level_for_camera_zoom() {
  let format = sample_format();
  let per_voxel = 1.0 / 0.3;
  assert_eq!(format.zoom_level_for_camera_zoom(per_voxel), ZoomLevel::new(0));
  assert_eq!(format.zoom_level_for_camera_zoom(per_voxel / 4.0), ZoomLevel::new(2));
  assert_eq!(format.zoom_level_for_camera_zoom(per_voxel / 1000.0), ZoomLevel::new(3));
  assert_eq!(format.zoom_level_for_camera_zoom(per_voxel * 8.0), ZoomLevel::new(0));
  assert_eq!(format.zoom_level_for_camera_zoom(0.0), ZoomLevel::new(3));
}

/// The finest axis sets the scale, even when it is the slice axis.
#[test]
fn test_zoom_level_for_camera_zoom_uses_finest_axis() {
  let format = TileFormat {
    voxel_micrometers: DVec3::new(1.0, 1.0, 0.25),
    ..sample_format()
  };
  // 0.25 pixels per finest voxel, so 4 voxels per pixel.
  assert_eq!(format.zoom_level_for_camera_zoom(1.0), ZoomLevel::new(2));
  assert_eq!(format.zoom_level_for_camera_zoom(4.0), ZoomLevel::new(0));
}

#[test]
fn test_validate_rejects_bad_shapes() {
  assert!(sample_format().validate().is_ok());
  assert!(TileFormat {
    bit_depth: 12,
    ..Default::default()
  }
  .validate()
  .is_err());
  assert!(TileFormat {
    tile_size: IVec3::new(0, 256, 1),
    ..Default::default()
  }
  .validate()
  .is_err());
}

/// Deeper pyramids would overflow the zoom-out factor.
#[test]
fn test_validate_bounds_zoom_level_count() {
  let deepest = TileFormat {
    zoom_level_count: MAX_ZOOM_LEVEL_COUNT,
    ..sample_format()
  };
  assert!(deepest.validate().is_ok());
  assert!(deepest.max_zoom().zoom_out_factor() > 0);

  let too_deep = TileFormat {
    zoom_level_count: MAX_ZOOM_LEVEL_COUNT + 1,
    ..sample_format()
  };
  assert!(matches!(too_deep.validate(), Err(TraceError::InvalidFormat(_))));
}
