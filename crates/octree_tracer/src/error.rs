//! Error types for tile loading, caching and tracing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::coords::ZoomedVoxelIndex;
use crate::tile::{TileIndex, TileKey};

/// Rejected cache insert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  #[error("tile payload for {key} is {actual} bytes, expected {expected}")]
  SizeMismatch {
    key: TileKey,
    expected: usize,
    actual: usize,
  },
}

/// Unexpected failure reading a tile.
///
/// Cloneable so one failed load can be reported to every request that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileLoadError {
  #[error("failed to read {path}: {message}")]
  Io {
    path: PathBuf,
    kind: io::ErrorKind,
    message: String,
  },
  #[error(transparent)]
  Cache(#[from] CacheError),
  #[error("tile loader for {key} panicked")]
  LoaderPanicked { key: TileKey },
}

impl TileLoadError {
  pub fn io(path: impl Into<PathBuf>, err: &io::Error) -> Self {
    Self::Io {
      path: path.into(),
      kind: err.kind(),
      message: err.to_string(),
    }
  }
}

/// Failure of a trace request.
///
/// Timeouts and unreachable goals are search outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TraceError {
  #[error("voxel {position} outside subvolume at {origin} with extent {extent:?}")]
  OutOfBounds {
    position: ZoomedVoxelIndex,
    origin: ZoomedVoxelIndex,
    extent: [i32; 3],
  },
  #[error("channel {channel} requested from a {channel_count}-channel volume")]
  ChannelOutOfRange { channel: u32, channel_count: u32 },
  #[error("could not load tile {tile:?}")]
  TileLoad {
    tile: TileIndex,
    #[source]
    source: TileLoadError,
  },
  #[error("corners at {first} and {second} are at different zoom levels")]
  ZoomMismatch {
    first: ZoomedVoxelIndex,
    second: ZoomedVoxelIndex,
  },
  #[error("path tracing must not run on the UI thread")]
  OnUiThread,
  #[error("invalid tile format: {0}")]
  InvalidFormat(String),
  #[error("octree metadata under {root}: {reason}")]
  Metadata { root: PathBuf, reason: String },
}
