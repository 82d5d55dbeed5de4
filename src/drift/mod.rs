#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::similar_names)]
#![allow(clippy::float_cmp)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, invalid, AnalysisError, AnalysisResult};


/// Parameters of the drift grid search. The modulus has no default: it is the period of the
/// time-to-phase mapping and must come from the acquisition timing / FSR calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftSearch {
    pub modulus: f64,
    pub range: (f64, f64),
    pub resolution: usize,
    // local fringe spacing divided by this is the peak shift per unit of drift; it is the FSR
    // expressed in drift units (GHz)
    pub slope_divisor: f64,
    pub keep_curve: bool,
}

impl DriftSearch {
    #[must_use]
    pub fn new(modulus: f64) -> Self {
        DriftSearch {
            modulus,
            range: (-4.0, 4.0),
            resolution: 2000,
            slope_divisor: 10.0,
            keep_curve: false,
        }
    }

    #[must_use]
    pub fn range(mut self, low: f64, high: f64) -> Self {
        self.range = (low, high);
        self
    }

    #[must_use]
    pub fn resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn opt_resolution(self, resolution: Option<usize>) -> Self {
        match resolution {
            Some(x) => self.resolution(x),
            None => self,
        }
    }

    #[must_use]
    pub fn slope_divisor(mut self, divisor: f64) -> Self {
        self.slope_divisor = divisor;
        self
    }

    #[must_use]
    pub fn opt_slope_divisor(self, divisor: Option<f64>) -> Self {
        match divisor {
            Some(x) => self.slope_divisor(x),
            None => self,
        }
    }

    #[must_use]
    pub fn keep_curve(mut self, keep: bool) -> Self {
        self.keep_curve = keep;
        self
    }

    /// Spacing between neighbouring candidates.
    #[must_use]
    pub fn step(&self) -> f64 {
        (self.range.1 - self.range.0) / (self.resolution.saturating_sub(1).max(1)) as f64
    }

    /// The `i`th candidate drift; the first is the low end of the range and the last the high end.
    #[inline]
    #[must_use]
    pub fn candidate(&self, i: usize) -> f64 {
        let (low, high) = self.range;
        if i + 1 == self.resolution {
            high
        } else {
            low + (high - low) * i as f64 / (self.resolution - 1) as f64
        }
    }

    fn validate(&self) -> AnalysisResult<()> {
        if !(self.modulus.is_finite() && self.modulus > 0.0) {
            return Err(invalid!("modulus {} must be positive", self.modulus));
        }
        let (low, high) = self.range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(invalid!("search range [{low}, {high}] is empty or not finite"));
        }
        if self.resolution < 3 {
            return Err(invalid!(
                "grid resolution {} cannot hold a local minimum",
                self.resolution
            ));
        }
        if !(self.slope_divisor.is_finite() && self.slope_divisor > 0.0) {
            return Err(invalid!(
                "slope divisor {} must be positive",
                self.slope_divisor
            ));
        }
        Ok(())
    }
}

/// Shared flag for stopping a drift search from another thread. The search checks it between
/// grid points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Matching cost at every candidate drift, kept only for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCurve {
    pub candidates: Vec<f64>,
    pub costs: Vec<f64>,
    pub minima: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEstimate {
    pub drift: f64,
    pub curve: Option<CostCurve>,
}

impl DriftEstimate {
    fn unchanged() -> Self {
        DriftEstimate {
            drift: 0.0,
            curve: None,
        }
    }
}

/// Local fringe slope at each peak of `curr`: forward difference at the first index, backward at
/// the last, mean of the two in between, all divided by `divisor`. A lone peak has no neighbours
/// and gets a slope of zero.
fn local_slopes(curr: &[f64], divisor: f64) -> Vec<f64> {
    let n = curr.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|j| {
            if j == 0 {
                (curr[1] - curr[0]) / divisor
            } else if j == n - 1 {
                (curr[j] - curr[j - 1]) / divisor
            } else {
                ((curr[j + 1] - curr[j]) / divisor + (curr[j] - curr[j - 1]) / divisor) / 2.0
            }
        })
        .collect()
}

/// Sum of the `min(|prev|, |curr|)` smallest squared residuals between `curr` and the shifted,
/// wrapped `prev`. Several `prev` peaks may pair with the same `curr` peak; this is a cheap stand-in
/// for a proper assignment, not a bipartite matching.
fn matching_cost(
    prev: &[f64],
    curr: &[f64],
    slopes: &[f64],
    drift: f64,
    modulus: f64,
    residuals: &mut Vec<f64>,
) -> f64 {
    residuals.clear();
    for &p in prev {
        for (&c, &slope) in curr.iter().zip(slopes) {
            let r = c - (p + drift * slope).rem_euclid(modulus);
            residuals.push(r * r);
        }
    }
    let m = prev.len().min(curr.len());
    if m < residuals.len() {
        residuals.select_nth_unstable_by(m - 1, f64::total_cmp);
    }
    residuals[..m].iter().sum()
}

/// Indices where the cost stops falling (or sits flat) and starts rising.
fn local_minima(costs: &[f64]) -> Vec<usize> {
    (1..costs.len().saturating_sub(1))
        .filter(|&k| costs[k] - costs[k - 1] <= 0.0 && costs[k + 1] - costs[k] > 0.0)
        .collect()
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Estimate the laser frequency drift between two sweeps from their peak times.
///
/// Every candidate drift on the search grid is scored by how well the previous peaks, moved by
/// `drift * local slope` and wrapped into `[0, modulus)`, line up with the current peaks. The
/// answer is the local minimum of that cost closest to zero drift. Identical peak sets short-cut
/// to zero without searching.
/// # Errors
/// * `DegeneratePeakSet` if either set is empty.
/// * `InvalidInput` for non-finite peak times or bad search parameters.
/// * `NoConvergence` if the cost has no local minimum on the grid.
/// * `Cancelled` if `cancel` was set before the grid was finished.
pub fn estimate_drift(
    prev: &[f64],
    curr: &[f64],
    search: &DriftSearch,
    cancel: Option<&CancelToken>,
) -> AnalysisResult<DriftEstimate> {
    search.validate()?;
    if prev.is_empty() || curr.is_empty() {
        return Err(AnalysisError::DegeneratePeakSet);
    }
    ensure_finite(prev, "prev")?;
    ensure_finite(curr, "curr")?;

    let prev = sorted_copy(prev);
    let curr = sorted_copy(curr);

    if prev.len() == curr.len() && prev.iter().zip(&curr).all(|(p, c)| c - p == 0.0) {
        debug!("peak sets identical; drift is zero");
        return Ok(DriftEstimate::unchanged());
    }

    let slopes = local_slopes(&curr, search.slope_divisor);
    let mut residuals = Vec::with_capacity(prev.len() * curr.len());
    let mut costs = Vec::with_capacity(search.resolution);
    for i in 0..search.resolution {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(AnalysisError::Cancelled);
        }
        costs.push(matching_cost(
            &prev,
            &curr,
            &slopes,
            search.candidate(i),
            search.modulus,
            &mut residuals,
        ));
    }

    let minima = local_minima(&costs);
    // smallest |drift|, then lowest index
    let best = minima
        .iter()
        .copied()
        .min_by(|&a, &b| {
            search
                .candidate(a)
                .abs()
                .total_cmp(&search.candidate(b).abs())
                .then(a.cmp(&b))
        })
        .ok_or(AnalysisError::NoConvergence)?;
    let drift = search.candidate(best);
    debug!(
        "drift {drift} from {} local minima ({} prev peaks, {} curr peaks)",
        minima.len(),
        prev.len(),
        curr.len()
    );

    let curve = search.keep_curve.then(|| CostCurve {
        candidates: (0..search.resolution).map(|i| search.candidate(i)).collect(),
        costs,
        minima,
    });
    Ok(DriftEstimate { drift, curve })
}

/// Rough drift from the first peak alone, `(curr[0] - prev[0]) / slope`. Only fit for logging
/// alongside a failed search; it ignores wrapping and peak identity.
#[must_use]
pub fn first_peak_estimate(prev: &[f64], curr: &[f64], slope: f64) -> Option<f64> {
    let first_prev = prev.iter().copied().min_by(f64::total_cmp)?;
    let first_curr = curr.iter().copied().min_by(f64::total_cmp)?;
    (slope != 0.0).then(|| (first_curr - first_prev) / slope)
}
