//! octree_tracer - tile addressing, caching and path tracing for octree
//! image pyramids
//!
//! Large microscopy volumes are stored as a pyramid of 2D tiles, one slice
//! per tile, organised on disk as an octree. This crate provides the pieces
//! needed to trace a neurite between two picked points in such a volume:
//!
//! - **Coordinates**: conversions between micrometers, voxels, zoomed voxels
//!   and tiles ([`coords::TileFormat`])
//! - **Tile addressing**: [`TileIndex`] navigation and on-disk octree paths
//! - **Tile cache**: bounded LRU with single-flight loading, shared between
//!   concurrent traces ([`TileCache`])
//! - **Subvolume**: a padded voxel window read through the cache
//! - **Tracing**: A* over voxel intensity with a timeout, followed by path
//!   simplification, run synchronously or on rayon
//!
//! # Example
//!
//! ```ignore
//! use octree_tracer::{PathTracer, PathTraceRequest, RawOctreeTileSource, TracerConfig};
//!
//! let source = Arc::new(RawOctreeTileSource::new("/data/octree", format));
//! let tracer = PathTracer::with_new_cache(source, TracerConfig::default());
//!
//! let outcome = tracer.trace(&PathTraceRequest::new(a, b, xyz_a, xyz_b))?;
//! if let Some(segment) = outcome.traced() {
//!     println!("{} vertices", segment.simplified().len());
//! }
//! ```

pub mod cache;
pub mod coords;
pub mod deadline;
pub mod error;
pub mod metrics;
pub mod subvolume;
pub mod tile;
pub mod trace;

// Synthetic tile sources for tests and benches
pub mod test_utils;

pub use cache::{LruTileCache, TileCache};
pub use coords::{
  CoordinateAxis, IndexStyle, MicrometerXyz, TileFormat, TileXyz, VoxelXyz, ZoomLevel,
  ZoomedVoxelIndex,
};
pub use deadline::{Interrupt, TraceDeadline};
pub use error::{CacheError, TileLoadError, TraceError};
pub use subvolume::{IntensityStats, Subvolume};
pub use tile::{
  OctreeMetadata, OctreeMetadataProvider, RawOctreeTileSource, TileIndex, TileKey, TileLoad,
  TileSource,
};
pub use trace::{
  AStar, AStarConfig, AnchorId, AsyncTracePipeline, PathSimplifier, PathTraceRequest, PathTracer,
  SearchOutcome, SegmentIndex, TraceOutcome, TraceReport, TracedPathSegment, TracerConfig,
};
