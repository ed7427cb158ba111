//! TileCache - thread-safe tile cache shared by concurrent trace requests.
//!
//! One mutex guards the LRU. Tile I/O runs outside it, and concurrent misses
//! on the same key are coalesced: the first requester loads, the rest wait
//! for its result.
//!
//! # Usage
//!
//! ```ignore
//! let cache = Arc::new(TileCache::new(300, format.tile_bytes()));
//!
//! let payload = cache.get_or_load(key, || source.load_tile(&tile, cache.stats()))?;
//! match payload {
//!     Some(bytes) => { /* decoded tile */ }
//!     None => { /* tile absent from storage */ }
//! }
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::LruTileCache;
use crate::error::{CacheError, TileLoadError};
use crate::metrics::TileLoadStats;
use crate::tile::{TileKey, TileLoad, TilePayload};

/// Outcome shared with every requester of one load: `Ok(None)` is a missing tile.
type FetchResult = Result<Option<TilePayload>, TileLoadError>;

/// A load in progress; followers block on `ready` until `result` is set.
#[derive(Default)]
struct InFlight {
  result: Mutex<Option<FetchResult>>,
  ready: Condvar,
}

impl InFlight {
  fn publish(&self, result: FetchResult) {
    *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
    self.ready.notify_all();
  }

  fn wait(&self) -> FetchResult {
    let mut guard = self.result.lock().unwrap_or_else(PoisonError::into_inner);
    loop {
      if let Some(result) = guard.as_ref() {
        return result.clone();
      }
      guard = self
        .ready
        .wait(guard)
        .unwrap_or_else(PoisonError::into_inner);
    }
  }
}

/// Shared LRU tile cache with single-flight loading.
pub struct TileCache {
  lru: Mutex<LruTileCache>,
  in_flight: Mutex<HashMap<TileKey, Arc<InFlight>>>,
  stats: Arc<TileLoadStats>,
}

impl TileCache {
  pub fn new(capacity: usize, tile_bytes: usize) -> Self {
    Self::with_stats(capacity, tile_bytes, Arc::new(TileLoadStats::new()))
  }

  pub fn with_stats(capacity: usize, tile_bytes: usize, stats: Arc<TileLoadStats>) -> Self {
    Self {
      lru: Mutex::new(LruTileCache::new(capacity, tile_bytes)),
      in_flight: Mutex::new(HashMap::new()),
      stats,
    }
  }

  pub fn stats(&self) -> &TileLoadStats {
    &self.stats
  }

  pub fn shared_stats(&self) -> Arc<TileLoadStats> {
    Arc::clone(&self.stats)
  }

  fn lock_lru(&self) -> MutexGuard<'_, LruTileCache> {
    self.lru.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn capacity(&self) -> usize {
    self.lock_lru().capacity()
  }

  pub fn tile_bytes(&self) -> usize {
    self.lock_lru().tile_bytes()
  }

  pub fn len(&self) -> usize {
    self.lock_lru().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock_lru().is_empty()
  }

  pub fn contains(&self, key: &TileKey) -> bool {
    self.lock_lru().contains(key)
  }

  /// Look up and promote.
  pub fn get(&self, key: &TileKey) -> Option<TilePayload> {
    self.lock_lru().get(key)
  }

  /// Insert directly, bypassing any in-flight load for the key.
  pub fn put(&self, key: TileKey, payload: TilePayload) -> Result<(), CacheError> {
    let evicted = self.lock_lru().put(key, payload)?;
    if let Some(evicted) = evicted {
      self.stats.record_eviction();
      log::trace!("evicted tile {}", evicted);
    }
    Ok(())
  }

  pub fn clear(&self) {
    self.lock_lru().clear();
  }

  /// Return the cached payload for `key`, running `load` on a miss.
  ///
  /// At most one `load` runs per key at a time; concurrent callers for the
  /// same key share its result. Missing tiles and failures are not cached.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "cache::get_or_load"))]
  pub fn get_or_load<F>(&self, key: TileKey, load: F) -> Result<Option<TilePayload>, TileLoadError>
  where
    F: FnOnce() -> TileLoad,
  {
    if let Some(payload) = self.get(&key) {
      self.stats.record_hit();
      return Ok(Some(payload));
    }

    let flight = {
      let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
      // Re-check: a load may have finished since the unlocked lookup.
      if let Some(payload) = self.get(&key) {
        self.stats.record_hit();
        return Ok(Some(payload));
      }
      if let Some(flight) = in_flight.get(&key) {
        let flight = Arc::clone(flight);
        drop(in_flight);
        self.stats.record_coalesced();
        return flight.wait();
      }
      self.stats.record_miss();
      let flight = Arc::new(InFlight::default());
      in_flight.insert(key.clone(), Arc::clone(&flight));
      flight
    };

    let result = match panic::catch_unwind(AssertUnwindSafe(load)) {
      Ok(load) => self.settle(&key, load),
      Err(_) => Err(TileLoadError::LoaderPanicked { key: key.clone() }),
    };
    if let Err(err) = &result {
      self.stats.record_failure();
      log::warn!("tile {} failed to load: {}", key, err);
    }

    // Cache insert happens before the in-flight entry is dropped, so a later
    // requester either joins this flight or hits the cache.
    self
      .in_flight
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&key);
    flight.publish(result.clone());
    result
  }

  fn settle(&self, key: &TileKey, load: TileLoad) -> Result<Option<TilePayload>, TileLoadError> {
    match load {
      TileLoad::Loaded(bytes) => {
        let payload: TilePayload = Arc::from(bytes);
        self.put(key.clone(), Arc::clone(&payload))?;
        Ok(Some(payload))
      }
      TileLoad::Missing => {
        self.stats.record_missing();
        Ok(None)
      }
      TileLoad::Failed(err) => Err(err),
    }
  }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;
