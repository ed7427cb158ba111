//! A* search over voxel intensity inside a [`Subvolume`].
//!
//! The graph is implicit: every voxel of the window is a node, connected to
//! its 26 neighbours. Stepping into a voxel costs the Euclidean step length
//! times the voxel's [`StepCost`], so bright neurites are cheap to follow.
//! The heuristic is Euclidean distance scaled by the window's minimum step
//! cost, which keeps it consistent.
//!
//! Ties on f-score break toward the smaller heuristic, then toward the
//! earlier insertion, so searches are reproducible.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use glam::IVec3;
use smallvec::SmallVec;
use web_time::Instant;

use super::StepCost;
use crate::coords::ZoomedVoxelIndex;
use crate::deadline::{Interrupt, TraceDeadline};
use crate::error::TraceError;
use crate::subvolume::Subvolume;
use crate::tile::TileSource;

/// Expansions between wall-clock and cancellation checks.
pub const TIMEOUT_CHECK_INTERVAL: usize = 256;

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Search parameters.
#[derive(Clone, Debug)]
pub struct AStarConfig {
  pub timeout: Duration,
  /// Channel whose intensity drives the cost.
  pub channel: u32,
  /// Voxels dimmer than this are impassable. `None` makes every voxel
  /// passable.
  pub passable_floor: Option<u16>,
}

impl Default for AStarConfig {
  fn default() -> Self {
    Self {
      timeout: DEFAULT_SEARCH_TIMEOUT,
      channel: 0,
      passable_floor: None,
    }
  }
}

/// A found path, start to goal inclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchPath {
  pub points: Vec<ZoomedVoxelIndex>,
  pub cost: f64,
  pub expanded: usize,
}

/// How a search ended. Every variant is a normal result.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
  Found(SearchPath),
  TimedOut { expanded: usize },
  /// The goal is unreachable inside the window.
  NoPathFound { expanded: usize },
  Cancelled { expanded: usize },
}

impl SearchOutcome {
  /// Nodes closed before the search ended.
  pub fn expanded(&self) -> usize {
    match self {
      SearchOutcome::Found(path) => path.expanded,
      SearchOutcome::TimedOut { expanded }
      | SearchOutcome::NoPathFound { expanded }
      | SearchOutcome::Cancelled { expanded } => *expanded,
    }
  }

  pub fn path(&self) -> Option<&SearchPath> {
    match self {
      SearchOutcome::Found(path) => Some(path),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug)]
struct SearchNode {
  local: IVec3,
  g: f64,
  h: f64,
  /// Arena index of the predecessor.
  parent: Option<u32>,
  closed: bool,
}

/// Open-set entry. `g` is the node's cost when pushed; a lower cost found
/// later leaves this entry stale.
#[derive(Clone, Copy, Debug)]
struct OpenEntry {
  f: f64,
  h: f64,
  g: f64,
  seq: u64,
  node: u32,
}

impl PartialEq for OpenEntry {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for OpenEntry {
  /// Reversed so `BinaryHeap` pops lowest f, then lowest h, then oldest.
  fn cmp(&self, other: &Self) -> Ordering {
    other
      .f
      .total_cmp(&self.f)
      .then_with(|| other.h.total_cmp(&self.h))
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

fn neighbor_offsets() -> SmallVec<[(IVec3, f64); 26]> {
  let mut offsets = SmallVec::new();
  for dz in -1..=1 {
    for dy in -1..=1 {
      for dx in -1..=1 {
        let offset = IVec3::new(dx, dy, dz);
        if offset != IVec3::ZERO {
          offsets.push((offset, offset.as_dvec3().length()));
        }
      }
    }
  }
  offsets
}

/// Path search bound to one window.
pub struct AStar<'a, S: TileSource> {
  subvolume: &'a Subvolume<S>,
  cost: StepCost,
  config: AStarConfig,
  neighbors: SmallVec<[(IVec3, f64); 26]>,
  cancel: Option<Arc<AtomicBool>>,
  /// Request-wide budget; without one the timeout starts at `search`.
  deadline: Option<TraceDeadline>,
}

impl<'a, S: TileSource> AStar<'a, S> {
  /// Derive step costs from the window's intensity statistics.
  ///
  /// Reads every voxel of the window; call [`Subvolume::prefetch`] first to
  /// load its tiles in parallel.
  pub fn new(subvolume: &'a Subvolume<S>, config: AStarConfig) -> Result<Self, TraceError> {
    let stats = subvolume.intensity_stats(config.channel)?;
    log::debug!(
      "search window intensity mean {:.2}, std dev {:.2}, max {}",
      stats.mean,
      stats.std_dev,
      stats.max
    );
    Ok(Self::with_step_cost(subvolume, config, StepCost::from_stats(&stats)))
  }

  pub fn with_step_cost(subvolume: &'a Subvolume<S>, config: AStarConfig, cost: StepCost) -> Self {
    Self {
      subvolume,
      cost,
      config,
      neighbors: neighbor_offsets(),
      cancel: None,
      deadline: None,
    }
  }

  /// Abort with [`SearchOutcome::Cancelled`] once `flag` is set.
  pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
    self.cancel = Some(flag);
    self
  }

  /// Share a budget that started before the search, replacing
  /// `config.timeout`.
  pub fn with_deadline(mut self, deadline: TraceDeadline) -> Self {
    self.deadline = Some(deadline);
    self
  }

  pub fn step_cost(&self) -> &StepCost {
    &self.cost
  }

  #[inline]
  fn heuristic(&self, from: IVec3, goal: IVec3) -> f64 {
    (goal - from).as_dvec3().length() * self.cost.min_cost()
  }

  #[inline]
  fn linear_index(&self, local: IVec3) -> usize {
    let extent = self.subvolume.extent();
    ((local.z as usize * extent.y as usize) + local.y as usize) * extent.x as usize
      + local.x as usize
  }

  #[inline]
  fn is_passable(&self, intensity: u16) -> bool {
    self.config.passable_floor.is_none_or(|floor| intensity >= floor)
  }

  fn search_deadline(&self) -> TraceDeadline {
    let deadline = self
      .deadline
      .clone()
      .unwrap_or_else(|| TraceDeadline::new(self.config.timeout));
    match &self.cancel {
      Some(flag) => deadline.with_cancel_flag(Arc::clone(flag)),
      None => deadline,
    }
  }

  /// Find the cheapest path from `start` to `goal`.
  ///
  /// Both endpoints must lie inside the window. Tile load failures abort
  /// the search with an error; timeouts and unreachable goals are outcomes.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "astar::search"))]
  pub fn search(
    &self,
    start: ZoomedVoxelIndex,
    goal: ZoomedVoxelIndex,
  ) -> Result<SearchOutcome, TraceError> {
    let started = Instant::now();
    let deadline = self.search_deadline();
    let channel = self.config.channel;
    // Validates both endpoints against the window.
    self.subvolume.intensity_global(start, channel)?;
    self.subvolume.intensity_global(goal, channel)?;

    let start_local = self.subvolume.to_local(start);
    let goal_local = self.subvolume.to_local(goal);

    let mut nodes: Vec<SearchNode> = Vec::new();
    let mut slots: HashMap<usize, u32> = HashMap::new();
    let mut open = BinaryHeap::new();
    let mut seq = 0u64;
    let mut expanded = 0usize;

    let h = self.heuristic(start_local, goal_local);
    nodes.push(SearchNode {
      local: start_local,
      g: 0.0,
      h,
      parent: None,
      closed: false,
    });
    slots.insert(self.linear_index(start_local), 0);
    open.push(OpenEntry {
      f: h,
      h,
      g: 0.0,
      seq,
      node: 0,
    });

    while let Some(entry) = open.pop() {
      let current = entry.node as usize;
      let node = nodes[current];
      if node.closed || entry.g > node.g {
        continue;
      }
      if node.local == goal_local {
        let path = self.reconstruct(&nodes, current, expanded);
        log::debug!(
          "path of {} voxels, cost {:.4}, {} nodes expanded in {:?}",
          path.points.len(),
          path.cost,
          expanded,
          started.elapsed()
        );
        return Ok(SearchOutcome::Found(path));
      }

      nodes[current].closed = true;
      expanded += 1;
      if expanded % TIMEOUT_CHECK_INTERVAL == 0 {
        match deadline.check() {
          Some(Interrupt::Cancelled) => {
            log::debug!("path search cancelled after {} nodes", expanded);
            return Ok(SearchOutcome::Cancelled { expanded });
          }
          Some(Interrupt::TimedOut) => {
            log::warn!(
              "path search timed out after {:?} ({} nodes expanded)",
              deadline.timeout(),
              expanded
            );
            return Ok(SearchOutcome::TimedOut { expanded });
          }
          None => {}
        }
      }

      for &(offset, length) in &self.neighbors {
        let next = node.local + offset;
        if !self.subvolume.contains_local(next) {
          continue;
        }
        let key = self.linear_index(next);
        let existing = slots.get(&key).map(|&slot| slot as usize);
        if existing.is_some_and(|slot| nodes[slot].closed) {
          continue;
        }

        let intensity = self.subvolume.intensity_local(next, channel)?;
        if !self.is_passable(intensity) {
          continue;
        }
        let g = node.g + length * self.cost.cost(intensity);

        let slot = match existing {
          Some(slot) => {
            if g >= nodes[slot].g {
              continue;
            }
            nodes[slot].g = g;
            nodes[slot].parent = Some(current as u32);
            slot
          }
          None => {
            let slot = nodes.len();
            nodes.push(SearchNode {
              local: next,
              g,
              h: self.heuristic(next, goal_local),
              parent: Some(current as u32),
              closed: false,
            });
            slots.insert(key, slot as u32);
            slot
          }
        };

        seq += 1;
        let h = nodes[slot].h;
        open.push(OpenEntry {
          f: g + h,
          h,
          g,
          seq,
          node: slot as u32,
        });
      }
    }

    log::debug!("no path: open set exhausted after {} nodes", expanded);
    Ok(SearchOutcome::NoPathFound { expanded })
  }

  fn reconstruct(&self, nodes: &[SearchNode], goal: usize, expanded: usize) -> SearchPath {
    let mut points = Vec::new();
    let mut cursor = Some(goal as u32);
    while let Some(index) = cursor {
      let node = &nodes[index as usize];
      points.push(self.subvolume.to_global(node.local));
      cursor = node.parent;
    }
    points.reverse();
    SearchPath {
      points,
      cost: nodes[goal].g,
      expanded,
    }
  }
}

#[cfg(test)]
#[path = "astar_test.rs"]
mod astar_test;
