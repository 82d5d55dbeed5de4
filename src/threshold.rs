#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]

use crate::error::{ensure_finite, invalid, AnalysisError, AnalysisResult};

/// One triggered acquisition: amplitude samples (volts) against their sample times (seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    times: Vec<f64>,
    samples: Vec<f64>,
}

impl Sweep {
    /// # Errors
    /// `InvalidInput` if the arrays differ in length, hold non-finite values, or the times
    /// decrease anywhere.
    pub fn new(times: Vec<f64>, samples: Vec<f64>) -> AnalysisResult<Self> {
        validate(&times, &samples)?;
        Ok(Sweep { times, samples })
    }

    /// Build a sweep sampled at a fixed rate starting at t = 0.
    /// # Errors
    /// `InvalidInput` if the rate is not a positive finite number or a sample is non-finite.
    pub fn from_rate(samples: Vec<f64>, sample_rate_hz: f64) -> AnalysisResult<Self> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(invalid!("sample rate {sample_rate_hz} Hz is not positive"));
        }
        let times = (0..samples.len())
            .map(|i| i as f64 / sample_rate_hz)
            .collect();
        Sweep::new(times, samples)
    }

    #[inline]
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[inline]
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Times of the samples above `threshold_v`.
    /// # Errors
    /// `EmptySweep` if nothing crosses the threshold.
    pub fn threshold(&self, threshold_v: f64) -> AnalysisResult<Vec<f64>> {
        let above = threshold_unchecked(&self.times, &self.samples, threshold_v);
        if above.is_empty() {
            Err(AnalysisError::EmptySweep)
        } else {
            Ok(above)
        }
    }
}

fn validate(times: &[f64], samples: &[f64]) -> AnalysisResult<()> {
    if times.len() != samples.len() {
        return Err(invalid!(
            "{} sample times but {} amplitudes",
            times.len(),
            samples.len()
        ));
    }
    ensure_finite(times, "times")?;
    ensure_finite(samples, "samples")?;
    if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
        return Err(invalid!(
            "sample times decrease at index {}: {} -> {}",
            i + 1,
            times[i],
            times[i + 1]
        ));
    }
    Ok(())
}

fn threshold_unchecked(times: &[f64], samples: &[f64], threshold_v: f64) -> Vec<f64> {
    times
        .iter()
        .zip(samples)
        .filter(|&(_, &v)| v > threshold_v)
        .map(|(&t, _)| t)
        .collect()
}

/// Return the times whose amplitude is strictly greater than `threshold_v`, in their original
/// order. An empty result is not an error here; callers decide whether it means `EmptySweep`.
/// # Errors
/// `InvalidInput` for mismatched lengths, non-finite values, decreasing times, or a NaN threshold.
pub fn threshold(times: &[f64], samples: &[f64], threshold_v: f64) -> AnalysisResult<Vec<f64>> {
    if threshold_v.is_nan() {
        return Err(invalid!("threshold voltage is NaN"));
    }
    validate(times, samples)?;
    Ok(threshold_unchecked(times, samples, threshold_v))
}
