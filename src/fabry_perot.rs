#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions
)]

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Instant;

use log::{debug, warn};

use crate::drift::{
    estimate_drift, first_peak_estimate, CancelToken, CostCurve, DriftEstimate, DriftSearch,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::peaks::{
    extract_peaks_by_adaptive_clustering, extract_peaks_by_gap, AdaptiveClustering, PeakSet,
};
use crate::ring_buffer::DyadicRingBuffer;
use crate::source::WaveformSource;
use crate::threshold::Sweep;

/// Which clustering turns a thresholded sweep into peaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeakStrategy {
    #[default]
    Gap,
    Adaptive,
}

impl fmt::Display for PeakStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakStrategy::Gap => write!(f, "gap"),
            PeakStrategy::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl FromStr for PeakStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gap" => Ok(PeakStrategy::Gap),
            "adaptive" | "kmeans" => Ok(PeakStrategy::Adaptive),
            other => Err(format!("unknown peak strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FabryPerotParams {
    pub threshold_v: f64,
    pub separation_s: f64,
    pub strategy: PeakStrategy,
    // also run the cluster-count search and complain if it disagrees with gap clustering
    pub cross_check: bool,
    pub clustering: AdaptiveClustering,
    pub drift: DriftSearch,
    // peak time shift per unit drift, for the rough estimate logged when the search fails
    pub fallback_slope: Option<f64>,
}

impl FabryPerotParams {
    #[must_use]
    pub fn new(drift: DriftSearch) -> Self {
        FabryPerotParams {
            threshold_v: 1.0,
            separation_s: 0.008,
            strategy: PeakStrategy::Gap,
            cross_check: false,
            clustering: AdaptiveClustering::default(),
            drift,
            fallback_slope: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Statistics {
    pub avg_analysis_time_us: u32,
    pub avg_peak_count: f64,
    pub avg_drift: f64,
    pub variance_drift: f64,
    pub estimates: u32,
    pub failures: u32,
}

/// Running sums over a block of cycles, turned into averages by `evaluate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeStatistics {
    cycles: u32,
    total_time_us: u64,
    total_peaks: u64,
    sum_drift: f64,
    sum_sq_drift: f64,
    estimates: u32,
    failures: u32,
}

impl CumulativeStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn new_time_us(&mut self, new_time: u64) -> &mut Self {
        self.cycles += 1;
        self.total_time_us += new_time;
        self
    }

    pub fn new_peaks(&mut self, count: usize) -> &mut Self {
        self.total_peaks += count as u64;
        self
    }

    pub fn new_drift(&mut self, drift: f64) -> &mut Self {
        self.sum_drift += drift;
        self.sum_sq_drift += drift * drift;
        self.estimates += 1;
        self
    }

    pub fn new_failure(&mut self) -> &mut Self {
        self.failures += 1;
        self
    }

    #[must_use]
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    #[must_use]
    pub fn evaluate(&self) -> Statistics {
        let cycles = NonZeroU32::new(self.cycles).map_or(1, NonZeroU32::get);
        let estimates = NonZeroU32::new(self.estimates).map_or(1, NonZeroU32::get);
        let avg_drift = self.sum_drift / f64::from(estimates);
        Statistics {
            avg_analysis_time_us: (self.total_time_us / u64::from(cycles)) as u32,
            avg_peak_count: self.total_peaks as f64 / f64::from(cycles),
            avg_drift,
            variance_drift: (self.sum_sq_drift / f64::from(estimates) - avg_drift * avg_drift)
                .max(0.0),
            estimates: self.estimates,
            failures: self.failures,
        }
    }
}

/// What one sweep produced. `drift` is `None` for the first sweep, which has nothing to compare
/// against.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub peaks: PeakSet,
    pub drift: Option<DriftEstimate>,
}

/// The tracking loop's state: analysis parameters, the previous sweep's peaks, and the recent
/// drift history.
#[derive(Debug)]
pub struct FabryPerot {
    pub params: FabryPerotParams,
    previous: Option<PeakSet>,
    cancel: CancelToken,
    pub drift_log: DyadicRingBuffer<f64>,
    pub peak_count_log: DyadicRingBuffer<u32>,
    cumulative_drift: f64,
    last_curve: Option<CostCurve>,
    pub stats: CumulativeStatistics,
    pub cycle_counter: u64,
}

impl FabryPerot {
    /// Logs hold `2^log_exponent` cycles; `None` if that is too large to allocate.
    #[must_use]
    pub fn new(params: FabryPerotParams, log_exponent: usize) -> Option<Self> {
        Some(FabryPerot {
            params,
            previous: None,
            cancel: CancelToken::new(),
            drift_log: DyadicRingBuffer::new(log_exponent)?,
            peak_count_log: DyadicRingBuffer::new(log_exponent)?,
            cumulative_drift: 0.0,
            last_curve: None,
            stats: CumulativeStatistics::new(),
            cycle_counter: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn previous_peaks(&self) -> Option<&PeakSet> {
        self.previous.as_ref()
    }

    /// Sum of every drift estimate since the last reset.
    #[inline]
    #[must_use]
    pub fn cumulative_drift(&self) -> f64 {
        self.cumulative_drift
    }

    #[inline]
    #[must_use]
    pub fn last_curve(&self) -> Option<&CostCurve> {
        self.last_curve.as_ref()
    }

    /// A handle another thread can use to abort the drift search in progress.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Forget the previous sweep and the drift history.
    pub fn reset(&mut self) {
        self.previous = None;
        self.cumulative_drift = 0.0;
        self.last_curve = None;
        self.drift_log.clear();
        self.peak_count_log.clear();
        self.stats.reset();
        self.cancel.reset();
    }

    /// Threshold a sweep and cluster what is left into peaks.
    /// # Errors
    /// `EmptySweep` if nothing crosses the threshold, or whatever the clustering reports.
    pub fn read_sweep_peaks(&self, sweep: &Sweep) -> AnalysisResult<PeakSet> {
        let above = sweep.threshold(self.params.threshold_v)?;
        match self.params.strategy {
            PeakStrategy::Gap => {
                let peaks = extract_peaks_by_gap(&above, self.params.separation_s)?;
                if self.params.cross_check {
                    self.cross_check(&above, &peaks);
                }
                Ok(peaks)
            }
            PeakStrategy::Adaptive => {
                let (peaks, k) = extract_peaks_by_adaptive_clustering(
                    &above,
                    self.params.separation_s,
                    &self.params.clustering,
                )?;
                debug!("cluster-count search settled on {k} peaks");
                Ok(peaks)
            }
        }
    }

    /// The cluster-count search's peak count, when it disagrees with `peaks`.
    fn cross_check(&self, above: &[f64], peaks: &PeakSet) -> Option<usize> {
        match extract_peaks_by_adaptive_clustering(
            above,
            self.params.separation_s,
            &self.params.clustering,
        ) {
            Ok((_, k)) if k != peaks.len() => {
                warn!(
                    "gap clustering found {} peaks but the cluster-count search found {k}",
                    peaks.len()
                );
                Some(k)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("cluster-count cross-check unavailable: {e}");
                None
            }
        }
    }

    /// Turn one sweep into peaks and, if there is a previous sweep, a drift estimate against it.
    /// The current peaks replace the previous ones only when the whole cycle succeeds.
    /// # Errors
    /// Any failure from thresholding, clustering or the drift search. Nothing is retried.
    pub fn process_sweep(&mut self, sweep: &Sweep) -> AnalysisResult<CycleReport> {
        self.cycle_counter += 1;
        let started = Instant::now();
        let result = self.analyse(sweep);
        self.stats.new_time_us(started.elapsed().as_micros() as u64);

        match &result {
            Ok(report) => {
                self.stats.new_peaks(report.peaks.len());
                self.peak_count_log.push(report.peaks.len() as u32);
                if let Some(est) = &report.drift {
                    self.stats.new_drift(est.drift);
                    self.drift_log.push(est.drift);
                    self.cumulative_drift += est.drift;
                    if est.curve.is_some() {
                        self.last_curve.clone_from(&est.curve);
                    }
                }
                self.previous = Some(report.peaks.clone());
            }
            Err(e) => {
                self.stats.new_failure();
                warn!("cycle {} failed: {e}", self.cycle_counter);
            }
        }
        result
    }

    fn analyse(&self, sweep: &Sweep) -> AnalysisResult<CycleReport> {
        let peaks = self.read_sweep_peaks(sweep)?;
        let drift = match &self.previous {
            Some(prev) => {
                let prev = prev.centroids();
                let curr = peaks.centroids();
                match estimate_drift(&prev, &curr, &self.params.drift, Some(&self.cancel)) {
                    Ok(est) => Some(est),
                    Err(AnalysisError::NoConvergence) => {
                        if let Some(rough) = self
                            .params
                            .fallback_slope
                            .and_then(|slope| first_peak_estimate(&prev, &curr, slope))
                        {
                            warn!(
                                "drift search did not converge; first-peak estimate {rough:.3} \
                                 (not used)"
                            );
                        }
                        return Err(AnalysisError::NoConvergence);
                    }
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };
        Ok(CycleReport {
            cycle: self.cycle_counter,
            peaks,
            drift,
        })
    }

    /// Pull the next sweep from `source` and process it.
    /// # Errors
    /// `SourceExhausted` if the source has run dry, otherwise as `process_sweep`.
    pub fn run_cycle<S: WaveformSource>(&mut self, source: &mut S) -> AnalysisResult<CycleReport> {
        let sweep = source.next_sweep()?.ok_or(AnalysisError::SourceExhausted)?;
        self.process_sweep(&sweep)
    }
}
