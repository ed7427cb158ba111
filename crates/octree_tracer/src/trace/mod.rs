//! Intensity-guided path tracing between two picked points.

mod astar;
mod cost;
mod segment;
mod simplify;
mod worker;

pub use astar::{AStar, AStarConfig, SearchOutcome, SearchPath, DEFAULT_SEARCH_TIMEOUT, TIMEOUT_CHECK_INTERVAL};
pub use cost::{erfc, StepCost};
pub use segment::{AnchorId, SegmentIndex, TracedPathSegment};
pub use simplify::PathSimplifier;
pub use worker::{
  AsyncTracePipeline, PathTraceRequest, PathTracer, TraceOutcome, TraceReport, TraceRequestId,
  TracerConfig, DEFAULT_PADDING,
};
