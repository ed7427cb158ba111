//! Bounded tile caching.

mod controller;
mod lru;

pub use controller::TileCache;
pub use lru::LruTileCache;

/// Default number of cached tiles.
pub const DEFAULT_CACHE_CAPACITY: usize = 300;
