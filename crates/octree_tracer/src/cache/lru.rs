//! Entry-bounded LRU map from tile keys to fixed-size payloads.
//!
//! Entries live in a slab threaded by a doubly linked recency list, so
//! lookup, promotion and eviction are all O(1). Once full, the slab never
//! grows: an insert reuses the least-recently-used slot in place.

use std::collections::HashMap;

use crate::error::CacheError;
use crate::tile::{TileKey, TilePayload};

struct Slot {
  key: TileKey,
  payload: TilePayload,
  /// Toward most recently used.
  prev: Option<usize>,
  /// Toward least recently used.
  next: Option<usize>,
}

/// Not thread-safe; see [`TileCache`](super::TileCache) for the shared wrapper.
pub struct LruTileCache {
  capacity: usize,
  tile_bytes: usize,
  slots: Vec<Slot>,
  lookup: HashMap<TileKey, usize>,
  /// Most recently used.
  head: Option<usize>,
  /// Least recently used.
  tail: Option<usize>,
}

impl LruTileCache {
  /// A capacity of zero is treated as one.
  pub fn new(capacity: usize, tile_bytes: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      capacity,
      tile_bytes,
      slots: Vec::with_capacity(capacity.min(1024)),
      lookup: HashMap::with_capacity(capacity.min(1024)),
      head: None,
      tail: None,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn tile_bytes(&self) -> usize {
    self.tile_bytes
  }

  pub fn len(&self) -> usize {
    self.lookup.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lookup.is_empty()
  }

  pub fn contains(&self, key: &TileKey) -> bool {
    self.lookup.contains_key(key)
  }

  /// Look up without touching recency.
  pub fn peek(&self, key: &TileKey) -> Option<&TilePayload> {
    self.lookup.get(key).map(|&slot| &self.slots[slot].payload)
  }

  /// Look up and promote to most recently used.
  pub fn get(&mut self, key: &TileKey) -> Option<TilePayload> {
    let slot = *self.lookup.get(key)?;
    self.promote(slot);
    Some(self.slots[slot].payload.clone())
  }

  /// Insert or replace an entry, promoting it to most recently used.
  ///
  /// Returns the evicted key when the insert pushed the cache over capacity.
  /// A payload of the wrong size is rejected and the cache is left untouched.
  pub fn put(&mut self, key: TileKey, payload: TilePayload) -> Result<Option<TileKey>, CacheError> {
    if payload.len() != self.tile_bytes {
      return Err(CacheError::SizeMismatch {
        key,
        expected: self.tile_bytes,
        actual: payload.len(),
      });
    }

    if let Some(&slot) = self.lookup.get(&key) {
      self.slots[slot].payload = payload;
      self.promote(slot);
      return Ok(None);
    }

    if self.slots.len() < self.capacity {
      let slot = self.slots.len();
      self.slots.push(Slot {
        key: key.clone(),
        payload,
        prev: None,
        next: None,
      });
      self.lookup.insert(key, slot);
      self.push_front(slot);
      return Ok(None);
    }

    // Full: recycle the least recently used slot.
    let Some(slot) = self.tail else {
      return Ok(None);
    };
    self.unlink(slot);
    let evicted = std::mem::replace(&mut self.slots[slot].key, key.clone());
    self.slots[slot].payload = payload;
    self.lookup.remove(&evicted);
    self.lookup.insert(key, slot);
    self.push_front(slot);
    Ok(Some(evicted))
  }

  pub fn clear(&mut self) {
    self.slots.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
  }

  /// Keys from most to least recently used.
  pub fn keys_by_recency(&self) -> Vec<TileKey> {
    let mut keys = Vec::with_capacity(self.len());
    let mut cursor = self.head;
    while let Some(slot) = cursor {
      keys.push(self.slots[slot].key.clone());
      cursor = self.slots[slot].next;
    }
    keys
  }

  fn promote(&mut self, slot: usize) {
    if self.head == Some(slot) {
      return;
    }
    self.unlink(slot);
    self.push_front(slot);
  }

  fn unlink(&mut self, slot: usize) {
    let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
    match prev {
      Some(p) => self.slots[p].next = next,
      None => self.head = next,
    }
    match next {
      Some(n) => self.slots[n].prev = prev,
      None => self.tail = prev,
    }
    self.slots[slot].prev = None;
    self.slots[slot].next = None;
  }

  fn push_front(&mut self, slot: usize) {
    self.slots[slot].prev = None;
    self.slots[slot].next = self.head;
    if let Some(old_head) = self.head {
      self.slots[old_head].prev = Some(slot);
    }
    self.head = Some(slot);
    if self.tail.is_none() {
      self.tail = Some(slot);
    }
  }
}

#[cfg(test)]
#[path = "lru_test.rs"]
mod lru_test;
