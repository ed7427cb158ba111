//! Tile addressing and tile storage.

mod index;
mod octree_path;
mod source;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use index::TileIndex;
pub use octree_path::{octree_path, relative_slice, OctreePath};
pub use source::{
  OctreeMetadata, OctreeMetadataProvider, RawOctreeTileSource, TileLoad, TileSource,
};

/// Decoded tile bytes, shared between the cache and readers.
pub type TilePayload = Arc<[u8]>;

/// Storage identity of a tile: the file it is read from.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TileKey(PathBuf);

impl TileKey {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self(path.into())
  }

  pub fn path(&self) -> &Path {
    &self.0
  }
}

impl From<PathBuf> for TileKey {
  fn from(path: PathBuf) -> Self {
    Self(path)
  }
}

impl fmt::Display for TileKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.display())
  }
}
