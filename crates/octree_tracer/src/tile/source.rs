//! Tile sources and the octree metadata they are configured from.

use std::io;
use std::path::{Path, PathBuf};

use glam::IVec3;

use super::{octree_path, relative_slice, TileIndex, TileKey};
use crate::coords::TileFormat;
use crate::error::{TileLoadError, TraceError};
use crate::metrics::TileLoadStats;

/// Result of reading one tile from storage.
///
/// `Missing` is an expected outcome near volume edges and in sparse octrees.
#[derive(Debug)]
pub enum TileLoad {
  Loaded(Vec<u8>),
  Missing,
  Failed(TileLoadError),
}

/// Supplier of decoded tile bytes.
///
/// Implementations call [`TileLoadStats::record_load`] whenever they touch
/// storage; the cache does the rest of the accounting.
pub trait TileSource: Send + Sync {
  fn tile_format(&self) -> &TileFormat;

  /// Cache identity for a tile, or None if the tile cannot exist in storage.
  fn storage_key(&self, tile: &TileIndex) -> Option<TileKey>;

  fn load_tile(&self, tile: &TileIndex, stats: &TileLoadStats) -> TileLoad;
}

/// Pyramid shape as reported by an octree folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OctreeMetadata {
  pub tile_size: IVec3,
  pub volume_size: IVec3,
  pub zoom_level_count: u32,
  pub standard_tile_byte_size: usize,
}

impl OctreeMetadata {
  /// Copy the pyramid shape into `format` and check the tile byte size
  /// agrees with the format's sampling.
  pub fn apply_to(&self, format: &mut TileFormat) -> Result<(), TraceError> {
    format.tile_size = self.tile_size;
    format.volume_size = self.volume_size;
    format.zoom_level_count = self.zoom_level_count;
    format.validate()?;
    if format.tile_bytes() != self.standard_tile_byte_size {
      return Err(TraceError::InvalidFormat(format!(
        "metadata reports {} bytes per tile, format expects {}",
        self.standard_tile_byte_size,
        format.tile_bytes()
      )));
    }
    Ok(())
  }
}

/// Reads pyramid metadata for an octree rooted at a folder.
pub trait OctreeMetadataProvider {
  fn read_metadata(&self, root: &Path) -> Result<OctreeMetadata, TraceError>;
}

/// Metadata known up front, e.g. from a configuration file.
impl OctreeMetadataProvider for OctreeMetadata {
  fn read_metadata(&self, _root: &Path) -> Result<OctreeMetadata, TraceError> {
    Ok(self.clone())
  }
}

/// Tile source over an octree folder of raw, already decoded slices.
///
/// Each folder holds `slice.NNNN.raw` files, one per slice of its block,
/// sized exactly [`TileFormat::tile_bytes`].
#[derive(Clone, Debug)]
pub struct RawOctreeTileSource {
  root: PathBuf,
  format: TileFormat,
}

impl RawOctreeTileSource {
  pub fn new(root: impl Into<PathBuf>, format: TileFormat) -> Self {
    Self {
      root: root.into(),
      format,
    }
  }

  /// Configure from a metadata provider, starting from `base` for the
  /// sampling fields the metadata does not cover.
  pub fn open(
    root: impl Into<PathBuf>,
    provider: &dyn OctreeMetadataProvider,
    base: TileFormat,
  ) -> Result<Self, TraceError> {
    let root = root.into();
    let metadata = provider.read_metadata(&root)?;
    let mut format = base;
    metadata.apply_to(&mut format)?;
    Ok(Self::new(root, format))
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn slice_file_name(relative_slice: i32) -> String {
    format!("slice.{:04}.raw", relative_slice)
  }
}

impl TileSource for RawOctreeTileSource {
  fn tile_format(&self) -> &TileFormat {
    &self.format
  }

  fn storage_key(&self, tile: &TileIndex) -> Option<TileKey> {
    let folder = octree_path(tile, &self.format)?;
    let file = Self::slice_file_name(relative_slice(tile, &self.format));
    Some(TileKey::new(
      self.root.join(folder.to_path_buf()).join(file),
    ))
  }

  fn load_tile(&self, tile: &TileIndex, stats: &TileLoadStats) -> TileLoad {
    let Some(key) = self.storage_key(tile) else {
      return TileLoad::Missing;
    };
    stats.record_load();
    log::debug!("reading tile {:?} from {}", tile, key);
    match std::fs::read(key.path()) {
      Ok(bytes) => TileLoad::Loaded(bytes),
      Err(err) if err.kind() == io::ErrorKind::NotFound => TileLoad::Missing,
      Err(err) => TileLoad::Failed(TileLoadError::io(key.path(), &err)),
    }
  }
}
