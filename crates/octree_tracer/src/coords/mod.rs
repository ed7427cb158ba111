//! Coordinate model for octree image pyramids.
//!
//! Pure arithmetic, no I/O. See [`TileFormat`] for the conversions.

mod axis;
mod bounds;
mod tile_format;
mod units;

pub use axis::{CoordinateAxis, IndexStyle};
pub use bounds::MicrometerBounds;
pub use tile_format::{TileFormat, MAX_ZOOM_LEVEL_COUNT};
pub use units::{MicrometerXyz, TileXyz, VoxelXyz, ZoomLevel, ZoomedVoxelIndex};
