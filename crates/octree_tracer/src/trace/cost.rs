//! Intensity-to-cost mapping for the path search.
//!
//! Step cost is `erfc(0.8 * z)` where `z` is the intensity's z-score within
//! the search window: near 2 for dark background, near 0 for bright signal.
//! Always positive and strictly decreasing in intensity.

use crate::subvolume::IntensityStats;

const Z_SCORE_SCALE: f64 = 0.8;

/// Keeps the heuristic scale positive even when the brightest voxel's cost
/// underflows to zero.
const MIN_COST_FLOOR: f64 = 1e-60;

/// Complementary error function, Chebyshev fit with fractional error below
/// 1.2e-7 everywhere.
pub fn erfc(x: f64) -> f64 {
  let z = x.abs();
  let t = 1.0 / (1.0 + 0.5 * z);
  let poly = -z * z - 1.265_512_23
    + t * (1.000_023_68
      + t * (0.374_091_96
        + t * (0.096_784_18
          + t * (-0.186_288_06
            + t * (0.278_868_07
              + t * (-1.135_203_98
                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
  let ans = t * poly.exp();
  if x >= 0.0 {
    ans
  } else {
    2.0 - ans
  }
}

/// Per-intensity step cost for one search window.
#[derive(Clone, Debug)]
pub struct StepCost {
  mean: f64,
  std_dev: f64,
  /// Cost for every intensity up to the window's maximum.
  table: Vec<f64>,
  min_cost: f64,
}

impl StepCost {
  pub fn from_stats(stats: &IntensityStats) -> Self {
    // A flat window has no spread; treat every voxel as average.
    let std_dev = if stats.std_dev > 0.0 { stats.std_dev } else { 1.0 };
    let mean = stats.mean;
    let table: Vec<f64> = (0..=stats.max)
      .map(|i| Self::evaluate(i, mean, std_dev))
      .collect();
    let min_cost = Self::evaluate(stats.max, mean, std_dev).max(MIN_COST_FLOOR);
    Self {
      mean,
      std_dev,
      table,
      min_cost,
    }
  }

  #[inline]
  fn evaluate(intensity: u16, mean: f64, std_dev: f64) -> f64 {
    erfc(Z_SCORE_SCALE * (intensity as f64 - mean) / std_dev)
  }

  /// Cost of stepping one voxel-length into a voxel of this intensity.
  #[inline]
  pub fn cost(&self, intensity: u16) -> f64 {
    match self.table.get(intensity as usize) {
      Some(&cost) => cost,
      None => Self::evaluate(intensity, self.mean, self.std_dev),
    }
  }

  /// Lower bound on [`cost`](Self::cost) inside the window; scales the
  /// Euclidean heuristic so it never overestimates.
  #[inline]
  pub fn min_cost(&self) -> f64 {
    self.min_cost
  }

  pub fn mean(&self) -> f64 {
    self.mean
  }

  pub fn std_dev(&self) -> f64 {
    self.std_dev
  }
}
