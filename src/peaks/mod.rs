#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, invalid, AnalysisError, AnalysisResult};

#[cfg(test)]
mod tests;

/// A single transmission fringe: the mean time of its above-threshold samples and how many
/// samples went into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub centroid: f64,
    pub members: usize,
}

/// Peaks ordered by centroid. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeakSet {
    peaks: Vec<Peak>,
}

impl PeakSet {
    /// Sorts `peaks` by centroid.
    #[must_use]
    pub fn from_peaks(mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by(|a, b| a.centroid.total_cmp(&b.centroid));
        PeakSet { peaks }
    }

    #[inline]
    #[must_use]
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    #[must_use]
    pub fn centroids(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.centroid).collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    fn rescaled(self, scale: f64) -> Self {
        PeakSet {
            peaks: self
                .peaks
                .into_iter()
                .map(|p| Peak {
                    centroid: p.centroid * scale,
                    ..p
                })
                .collect(),
        }
    }

    /// Smallest gap between neighbouring centroids; `None` with fewer than two peaks.
    #[must_use]
    pub fn min_separation(&self) -> Option<f64> {
        self.peaks
            .windows(2)
            .map(|w| w[1].centroid - w[0].centroid)
            .min_by(f64::total_cmp)
    }
}

fn check_separation(separation: f64) -> AnalysisResult<()> {
    if separation.is_finite() && separation >= 0.0 {
        Ok(())
    } else {
        Err(invalid!("separation threshold {separation} must be finite and >= 0"))
    }
}

/// Power of two at or above the largest magnitude in `values` (capped at `2^1023`), so that
/// `x / scale` lies in `[-2, 2]` and sums or squares of the scaled values cannot overflow.
/// Dividing by a power of two is exact, so scaled results match the unscaled arithmetic.
fn power_of_two_scale(values: &[f64]) -> f64 {
    let largest = values.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    if largest > 0.0 {
        2.0_f64.powi((largest.log2().ceil() as i32).clamp(f64::MIN_EXP - 1, f64::MAX_EXP - 1))
    } else {
        1.0
    }
}

fn mean(values: &[f64]) -> f64 {
    let scale = power_of_two_scale(values);
    values.iter().map(|x| x / scale).sum::<f64>() / values.len() as f64 * scale
}

/// Group thresholded times into peaks: every gap strictly larger than `separation` starts a new
/// peak. The input order does not matter.
/// # Errors
/// `EmptySweep` for no input times, `InvalidInput` for non-finite times or a bad separation.
pub fn extract_peaks_by_gap(times: &[f64], separation: f64) -> AnalysisResult<PeakSet> {
    check_separation(separation)?;
    ensure_finite(times, "times")?;
    if times.is_empty() {
        return Err(AnalysisError::EmptySweep);
    }
    let mut sorted = times.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut peaks = Vec::new();
    let mut start = 0;
    for i in 1..sorted.len() {
        if sorted[i] - sorted[i - 1] > separation {
            let members = &sorted[start..i];
            peaks.push(Peak {
                centroid: mean(members),
                members: members.len(),
            });
            start = i;
        }
    }
    let members = &sorted[start..];
    peaks.push(Peak {
        centroid: mean(members),
        members: members.len(),
    });

    debug!("gap clustering found {} peaks", peaks.len());
    Ok(PeakSet { peaks })
}

/// Settings for the cluster-count search. The search tries `max_k` clusters first and walks down
/// to `min_k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveClustering {
    pub max_k: usize,
    pub min_k: usize,
    pub max_iterations: u32,
    pub seed: u64,
}

impl Default for AdaptiveClustering {
    fn default() -> Self {
        AdaptiveClustering {
            max_k: 5,
            min_k: 2,
            max_iterations: 500,
            seed: 0,
        }
    }
}

impl AdaptiveClustering {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn k_range(mut self, min_k: usize, max_k: usize) -> Self {
        self.min_k = min_k;
        self.max_k = max_k;
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn opt_max_iterations(self, max_iterations: Option<u32>) -> Self {
        match max_iterations {
            Some(x) => self.max_iterations(x),
            None => self,
        }
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> AnalysisResult<()> {
        if self.min_k < 2 {
            return Err(invalid!(
                "min_k = {} but the cluster-count search never tries fewer than 2 clusters",
                self.min_k
            ));
        }
        if self.max_k < self.min_k {
            return Err(invalid!(
                "max_k = {} is below min_k = {}",
                self.max_k,
                self.min_k
            ));
        }
        if self.max_iterations == 0 {
            return Err(invalid!("max_iterations must be at least 1"));
        }
        Ok(())
    }
}

/// Cluster `samples` into k groups for k = `max_k` down to `min_k`, accepting the first k whose
/// sorted centroids are all more than `separation` apart. If none qualifies the `min_k` result is
/// returned as is, and may then hold peaks closer than `separation`.
///
/// Returns the peaks and how many there are. That count is below the attempted k only when a
/// cluster emptied out during the iterations.
/// # Errors
/// `EmptySweep` for no samples, `DegeneratePeakSet` if there are too few distinct samples to form
/// even `min_k` clusters, `InvalidInput` for bad settings or non-finite samples.
pub fn extract_peaks_by_adaptive_clustering(
    samples: &[f64],
    separation: f64,
    settings: &AdaptiveClustering,
) -> AnalysisResult<(PeakSet, usize)> {
    settings.validate()?;
    check_separation(separation)?;
    ensure_finite(samples, "samples")?;
    if samples.is_empty() {
        return Err(AnalysisError::EmptySweep);
    }

    // cluster in scaled units; huge but finite samples would otherwise overflow the seeding
    // weights and the centroid sums
    let scale = power_of_two_scale(samples);
    let scaled: Vec<f64> = samples.iter().map(|x| x / scale).collect();
    let scaled_separation = separation / scale;

    let mut distinct = scaled.clone();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut last = None;
    for k in (settings.min_k..=settings.max_k).rev() {
        if k > distinct.len() {
            continue;
        }
        let peaks = kmeans_1d(&scaled, &distinct, k, settings.max_iterations, &mut rng);
        match peaks.min_separation() {
            Some(gap) if gap > scaled_separation => {
                let peaks = peaks.rescaled(scale);
                let gap = gap * scale;
                debug!("cluster-count search accepted k = {k}, min separation {gap}");
                let count = peaks.len();
                return Ok((peaks, count));
            }
            _ => last = Some((peaks, k)),
        }
    }

    match last {
        Some((peaks, k)) => {
            let peaks = peaks.rescaled(scale);
            warn!(
                "no cluster count separated peaks by more than {separation}; returning k = {k} anyway"
            );
            let count = peaks.len();
            Ok((peaks, count))
        }
        None => Err(AnalysisError::DegeneratePeakSet),
    }
}

/// k-means++ seeding over the distinct values, then Lloyd iterations until the labels settle or
/// `max_iterations` runs out. Clusters that end up empty keep their old centroid while iterating
/// and are left out of the result.
fn kmeans_1d(
    samples: &[f64],
    distinct: &[f64],
    k: usize,
    max_iterations: u32,
    rng: &mut StdRng,
) -> PeakSet {
    let mut centroids = seed_centroids(distinct, k, rng);
    let mut labels = vec![usize::MAX; samples.len()];
    let mut sums = vec![0.0; k];
    let mut counts = vec![0usize; k];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (label, &x) in labels.iter_mut().zip(samples) {
            let nearest = nearest_centroid(&centroids, x);
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }

        sums.iter_mut().for_each(|s| *s = 0.0);
        counts.iter_mut().for_each(|c| *c = 0);
        for (&label, &x) in labels.iter().zip(samples) {
            sums[label] += x;
            counts[label] += 1;
        }
        for ((c, s), n) in centroids.iter_mut().zip(&sums).zip(&counts) {
            if *n > 0 {
                *c = s / *n as f64;
            }
        }

        if !changed {
            break;
        }
    }

    PeakSet::from_peaks(
        centroids
            .into_iter()
            .zip(counts)
            .filter(|(_, n)| *n > 0)
            .map(|(centroid, members)| Peak { centroid, members })
            .collect(),
    )
}

fn seed_centroids(distinct: &[f64], k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(distinct[rng.gen_range(0..distinct.len())]);
    let mut weights = vec![0.0; distinct.len()];
    while centroids.len() < k {
        for (w, &x) in weights.iter_mut().zip(distinct) {
            let d = x - centroids[nearest_centroid(&centroids, x)];
            *w = d * d;
        }
        let total: f64 = weights.iter().sum();
        // every distinct value is already a centroid
        if total <= 0.0 {
            break;
        }
        let mut target = rng.gen_range(0.0..total);
        let mut pick = weights.iter().rposition(|w| *w > 0.0).unwrap_or(0);
        for (i, w) in weights.iter().enumerate() {
            if target < *w {
                pick = i;
                break;
            }
            target -= w;
        }
        centroids.push(distinct[pick]);
    }
    centroids
}

fn nearest_centroid(centroids: &[f64], x: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = (x - c).abs();
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}
