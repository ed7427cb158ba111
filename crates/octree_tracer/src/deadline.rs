//! Wall-clock budget and cancel flag for one trace request.
//!
//! Started once when a request arrives and handed to every stage that can
//! block (tile prefetch, the statistics pass, the search), so the timeout
//! bounds the whole request rather than the search alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

/// Why a stage stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
  TimedOut,
  Cancelled,
}

#[derive(Clone, Debug)]
pub struct TraceDeadline {
  started: Instant,
  timeout: Duration,
  cancel: Option<Arc<AtomicBool>>,
}

impl TraceDeadline {
  /// Budget of `timeout`, starting now.
  pub fn new(timeout: Duration) -> Self {
    Self {
      started: Instant::now(),
      timeout,
      cancel: None,
    }
  }

  pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
    self.cancel = Some(flag);
    self
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub fn elapsed(&self) -> Duration {
    self.started.elapsed()
  }

  pub fn is_cancelled(&self) -> bool {
    self
      .cancel
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::Relaxed))
  }

  /// Cancellation wins over an expired timeout.
  #[inline]
  pub fn check(&self) -> Option<Interrupt> {
    if self.is_cancelled() {
      Some(Interrupt::Cancelled)
    } else if self.elapsed() >= self.timeout {
      Some(Interrupt::TimedOut)
    } else {
      None
    }
  }
}
