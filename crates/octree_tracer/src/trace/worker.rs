//! Trace requests: from two picked points to a [`TracedPathSegment`].
//!
//! [`PathTracer`] runs one request as a strict sequence: micrometer points to
//! zoomed voxels, a padded [`Subvolume`] around them, tile prefetch, A*,
//! then simplification. It must not run on the UI thread.
//!
//! [`AsyncTracePipeline`] runs requests on rayon's pool. Each request owns
//! its subvolume; only the tile cache is shared between them.
//!
//! # Usage
//!
//! ```ignore
//! let tracer = Arc::new(PathTracer::new(source, cache, TracerConfig::default()));
//! let mut pipeline = AsyncTracePipeline::new(tracer);
//!
//! let id = pipeline.start(PathTraceRequest::new(a, b, xyz_a, xyz_b));
//!
//! // Poll from the UI loop
//! for report in pipeline.poll_results() {
//!     match report.segment() {
//!         Some(segment) => show(segment),
//!         None => status_bar.set(report.status_text()),
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, Sender, TryRecvError};
use web_time::Instant;

use super::{
  AStar, AStarConfig, AnchorId, PathSimplifier, SearchOutcome, SegmentIndex, StepCost,
  TracedPathSegment, DEFAULT_SEARCH_TIMEOUT,
};
use crate::cache::{TileCache, DEFAULT_CACHE_CAPACITY};
use crate::coords::{CoordinateAxis, MicrometerXyz, ZoomLevel, ZoomedVoxelIndex};
use crate::deadline::{Interrupt, TraceDeadline};
use crate::error::TraceError;
use crate::metrics::TraceMetrics;
use crate::subvolume::Subvolume;
use crate::tile::TileSource;

/// Voxels added around the endpoints' bounding box.
pub const DEFAULT_PADDING: i32 = 10;

/// Tracer settings.
#[derive(Clone, Debug, PartialEq)]
pub struct TracerConfig {
  pub padding: i32,
  pub timeout: Duration,
  /// Pyramid level to search at, clamped to the volume's coarsest level.
  pub zoom: ZoomLevel,
  pub channel: u32,
  /// Radians; see [`PathSimplifier`].
  pub simplify_tolerance: f64,
  /// Tiles held by a cache built through [`PathTracer::with_new_cache`].
  pub cache_capacity: usize,
  pub passable_floor: Option<u16>,
}

impl Default for TracerConfig {
  fn default() -> Self {
    Self {
      padding: DEFAULT_PADDING,
      timeout: DEFAULT_SEARCH_TIMEOUT,
      zoom: ZoomLevel::FULL_RESOLUTION,
      channel: 0,
      simplify_tolerance: 0.0,
      cache_capacity: DEFAULT_CACHE_CAPACITY,
      passable_floor: None,
    }
  }
}

impl TracerConfig {
  fn search_config(&self) -> AStarConfig {
    AStarConfig {
      timeout: self.timeout,
      channel: self.channel,
      passable_floor: self.passable_floor,
    }
  }
}

/// Two picked points in micrometers and the anchors they belong to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathTraceRequest {
  pub anchor1: AnchorId,
  pub anchor2: AnchorId,
  pub xyz1: MicrometerXyz,
  pub xyz2: MicrometerXyz,
}

impl PathTraceRequest {
  pub fn new(anchor1: AnchorId, anchor2: AnchorId, xyz1: MicrometerXyz, xyz2: MicrometerXyz) -> Self {
    Self {
      anchor1,
      anchor2,
      xyz1,
      xyz2,
    }
  }

  pub fn segment(&self) -> SegmentIndex {
    SegmentIndex::new(self.anchor1, self.anchor2)
  }
}

/// Result of a request that ran to completion.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceOutcome {
  Traced(TracedPathSegment),
  TimedOut { segment: SegmentIndex, expanded: usize },
  NoPathFound { segment: SegmentIndex, expanded: usize },
  Cancelled { segment: SegmentIndex },
}

impl TraceOutcome {
  pub fn segment_index(&self) -> SegmentIndex {
    match self {
      TraceOutcome::Traced(segment) => segment.segment(),
      TraceOutcome::TimedOut { segment, .. }
      | TraceOutcome::NoPathFound { segment, .. }
      | TraceOutcome::Cancelled { segment } => *segment,
    }
  }

  pub fn traced(&self) -> Option<&TracedPathSegment> {
    match self {
      TraceOutcome::Traced(segment) => Some(segment),
      _ => None,
    }
  }
}

/// Runs trace requests against one tile source and a shared cache.
pub struct PathTracer<S: TileSource> {
  source: Arc<S>,
  cache: Arc<TileCache>,
  config: TracerConfig,
  ui_thread: Option<ThreadId>,
  metrics: Mutex<TraceMetrics>,
}

impl<S: TileSource> PathTracer<S> {
  pub fn new(source: Arc<S>, cache: Arc<TileCache>, config: TracerConfig) -> Self {
    Self {
      source,
      cache,
      config,
      ui_thread: None,
      metrics: Mutex::new(TraceMetrics::new()),
    }
  }

  /// Tracer with its own cache sized by `config.cache_capacity`.
  pub fn with_new_cache(source: Arc<S>, config: TracerConfig) -> Self {
    let cache = Arc::new(TileCache::new(
      config.cache_capacity,
      source.tile_format().tile_bytes(),
    ));
    Self::new(source, cache, config)
  }

  /// Refuse to trace on `thread`.
  pub fn with_ui_thread(mut self, thread: ThreadId) -> Self {
    self.ui_thread = Some(thread);
    self
  }

  pub fn config(&self) -> &TracerConfig {
    &self.config
  }

  pub fn cache(&self) -> &Arc<TileCache> {
    &self.cache
  }

  pub fn source(&self) -> &Arc<S> {
    &self.source
  }

  /// Copy of the accumulated search metrics.
  pub fn metrics(&self) -> TraceMetrics {
    self
      .metrics
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Zoomed voxel under a micrometer point at the configured zoom.
  pub fn zoomed_voxel_for(&self, xyz: MicrometerXyz) -> ZoomedVoxelIndex {
    let format = self.source.tile_format();
    let zoom = self.config.zoom.min(format.max_zoom());
    let voxel = format.voxel_xyz_for_micrometer_xyz(xyz);
    format.zoomed_voxel_index_for_voxel_xyz(voxel, zoom, CoordinateAxis::Z)
  }

  pub fn trace(&self, request: &PathTraceRequest) -> Result<TraceOutcome, TraceError> {
    self.run(request, None)
  }

  /// Like [`trace`](Self::trace), ending with [`TraceOutcome::Cancelled`]
  /// soon after `cancel` is set.
  ///
  /// The flag is checked before every tile load, every statistics slice
  /// and every [`TIMEOUT_CHECK_INTERVAL`](super::TIMEOUT_CHECK_INTERVAL)
  /// search expansions. The timeout is checked at the same points.
  pub fn trace_cancellable(
    &self,
    request: &PathTraceRequest,
    cancel: Arc<AtomicBool>,
  ) -> Result<TraceOutcome, TraceError> {
    self.run(request, Some(cancel))
  }

  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "path_tracer::trace"))]
  fn run(
    &self,
    request: &PathTraceRequest,
    cancel: Option<Arc<AtomicBool>>,
  ) -> Result<TraceOutcome, TraceError> {
    let deadline = match cancel {
      Some(flag) => TraceDeadline::new(self.config.timeout).with_cancel_flag(flag),
      None => TraceDeadline::new(self.config.timeout),
    };
    if self.ui_thread == Some(thread::current().id()) {
      return Err(TraceError::OnUiThread);
    }
    self.source.tile_format().validate()?;
    let segment = request.segment();
    let interrupted = |interrupt: Interrupt| {
      log::info!("trace of {:?} stopped before search: {:?}", segment, interrupt);
      match interrupt {
        Interrupt::TimedOut => TraceOutcome::TimedOut {
          segment,
          expanded: 0,
        },
        Interrupt::Cancelled => TraceOutcome::Cancelled { segment },
      }
    };
    if let Some(interrupt) = deadline.check() {
      return Ok(interrupted(interrupt));
    }

    let start = self.zoomed_voxel_for(request.xyz1);
    let goal = self.zoomed_voxel_for(request.xyz2);
    log::debug!("tracing {:?} from {} to {}", segment, start, goal);

    let subvolume = Subvolume::new(
      start,
      goal,
      self.config.padding,
      Arc::clone(&self.source),
      Arc::clone(&self.cache),
    )?;
    if let ControlFlow::Break(interrupt) = subvolume.prefetch_within(&deadline)? {
      return Ok(interrupted(interrupt));
    }
    let stats = match subvolume.intensity_stats_within(self.config.channel, &deadline)? {
      ControlFlow::Continue(stats) => stats,
      ControlFlow::Break(interrupt) => return Ok(interrupted(interrupt)),
    };
    log::debug!(
      "search window intensity mean {:.2}, std dev {:.2}, max {}",
      stats.mean,
      stats.std_dev,
      stats.max
    );

    let astar = AStar::with_step_cost(
      &subvolume,
      self.config.search_config(),
      StepCost::from_stats(&stats),
    )
    .with_deadline(deadline);

    let started = Instant::now();
    let outcome = astar.search(start, goal)?;
    let elapsed = started.elapsed();
    self
      .metrics
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .record_search(elapsed.as_micros() as u64, &outcome);

    Ok(match outcome {
      SearchOutcome::Found(path) => {
        let intensities = path
          .points
          .iter()
          .map(|&point| subvolume.intensity_global(point, self.config.channel))
          .collect::<Result<Vec<_>, _>>()?;
        let simplified = PathSimplifier::new(self.config.simplify_tolerance).simplify(&path.points);
        log::info!(
          "traced {:?}: {} voxels, {} vertices after simplification, {:?}",
          segment,
          path.points.len(),
          simplified.len(),
          elapsed
        );
        TraceOutcome::Traced(TracedPathSegment::new(
          segment,
          path.points,
          intensities,
          simplified,
          path.cost,
        ))
      }
      SearchOutcome::TimedOut { expanded } => TraceOutcome::TimedOut { segment, expanded },
      SearchOutcome::NoPathFound { expanded } => TraceOutcome::NoPathFound { segment, expanded },
      SearchOutcome::Cancelled { .. } => TraceOutcome::Cancelled { segment },
    })
  }
}

// =============================================================================
// Async pipeline
// =============================================================================

static TRACE_REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one submitted request; unique within the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TraceRequestId(u64);

impl TraceRequestId {
  fn next() -> Self {
    Self(TRACE_REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

/// Everything the caller learns about a finished request.
#[derive(Clone, Debug)]
pub struct TraceReport {
  pub id: TraceRequestId,
  pub request: PathTraceRequest,
  pub result: Result<TraceOutcome, TraceError>,
  pub elapsed: Duration,
}

impl TraceReport {
  pub fn segment(&self) -> Option<&TracedPathSegment> {
    self.result.as_ref().ok().and_then(TraceOutcome::traced)
  }

  /// One-line status for display.
  pub fn status_text(&self) -> String {
    match &self.result {
      Ok(TraceOutcome::Traced(segment)) => {
        format!("traced {} points", segment.simplified().len())
      }
      Ok(TraceOutcome::TimedOut { .. }) => "timed out".to_string(),
      Ok(TraceOutcome::NoPathFound { .. }) => "no path found".to_string(),
      Ok(TraceOutcome::Cancelled { .. }) => "cancelled".to_string(),
      Err(err) => err.to_string(),
    }
  }
}

fn run_request<S: TileSource>(
  tracer: &PathTracer<S>,
  id: TraceRequestId,
  request: PathTraceRequest,
  cancel: Arc<AtomicBool>,
) -> TraceReport {
  let started = Instant::now();
  let result = tracer.trace_cancellable(&request, cancel);
  if let Err(err) = &result {
    log::warn!("trace request {} failed: {}", id.raw(), err);
  }
  TraceReport {
    id,
    request,
    result,
    elapsed: started.elapsed(),
  }
}

/// Non-blocking trace runner on rayon's thread pool.
pub struct AsyncTracePipeline<S: TileSource + 'static> {
  tracer: Arc<PathTracer<S>>,
  sender: Sender<TraceReport>,
  receiver: Receiver<TraceReport>,
  /// Cancel flags of requests whose reports have not been polled.
  pending: HashMap<TraceRequestId, Arc<AtomicBool>>,
}

impl<S: TileSource + 'static> AsyncTracePipeline<S> {
  pub fn new(tracer: Arc<PathTracer<S>>) -> Self {
    let (sender, receiver) = channel::unbounded();
    Self {
      tracer,
      sender,
      receiver,
      pending: HashMap::new(),
    }
  }

  pub fn tracer(&self) -> &Arc<PathTracer<S>> {
    &self.tracer
  }

  /// Requests started but not yet polled.
  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  pub fn is_busy(&self) -> bool {
    !self.pending.is_empty()
  }

  /// Start a request; its report arrives through
  /// [`poll_results`](Self::poll_results).
  pub fn start(&mut self, request: PathTraceRequest) -> TraceRequestId {
    let id = TraceRequestId::next();
    let cancel = Arc::new(AtomicBool::new(false));
    self.pending.insert(id, Arc::clone(&cancel));

    let tracer = Arc::clone(&self.tracer);
    let sender = self.sender.clone();
    rayon::spawn(move || {
      let report = run_request(&tracer, id, request, cancel);
      // Receiver dropped = pipeline gone
      let _ = sender.send(report);
    });
    id
  }

  /// Start a request whose report goes to `sink` on the worker thread
  /// instead of the poll queue.
  pub fn start_with_sink<F>(&self, request: PathTraceRequest, sink: F) -> TraceRequestId
  where
    F: FnOnce(TraceReport) + Send + 'static,
  {
    let id = TraceRequestId::next();
    let tracer = Arc::clone(&self.tracer);
    rayon::spawn(move || {
      sink(run_request(&tracer, id, request, Arc::new(AtomicBool::new(false))));
    });
    id
  }

  /// Drain finished reports (non-blocking).
  pub fn poll_results(&mut self) -> Vec<TraceReport> {
    let mut reports = Vec::new();
    loop {
      match self.receiver.try_recv() {
        Ok(report) => {
          self.pending.remove(&report.id);
          reports.push(report);
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
      }
    }
    reports
  }

  /// Block until the next report arrives or `timeout` passes.
  pub fn wait_result(&mut self, timeout: Duration) -> Option<TraceReport> {
    let report = self.receiver.recv_timeout(timeout).ok()?;
    self.pending.remove(&report.id);
    Some(report)
  }

  /// Ask a running request to stop. Its report still arrives, as
  /// cancelled unless it had already finished.
  pub fn cancel(&self, id: TraceRequestId) -> bool {
    match self.pending.get(&id) {
      Some(flag) => {
        flag.store(true, Ordering::Relaxed);
        true
      }
      None => false,
    }
  }

  pub fn cancel_all(&self) {
    for flag in self.pending.values() {
      flag.store(true, Ordering::Relaxed);
    }
  }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
