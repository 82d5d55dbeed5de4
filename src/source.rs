#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use std::collections::VecDeque;

use log::debug;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{invalid, AnalysisResult};
use crate::threshold::Sweep;

/// Anything that can hand over one triggered sweep at a time. `Ok(None)` means the source has
/// nothing more to give.
pub trait WaveformSource {
    /// # Errors
    /// Whatever the acquisition reports; the analysis never retries on its own.
    fn next_sweep(&mut self) -> AnalysisResult<Option<Sweep>>;
}

/// Plays back pre-recorded sweeps in order.
#[derive(Debug, Default)]
pub struct ReplaySource {
    queue: VecDeque<Sweep>,
}

impl ReplaySource {
    pub fn new(sweeps: impl IntoIterator<Item = Sweep>) -> Self {
        Self {
            queue: sweeps.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl WaveformSource for ReplaySource {
    fn next_sweep(&mut self) -> AnalysisResult<Option<Sweep>> {
        Ok(self.queue.pop_front())
    }
}

/// Shape of the simulated cavity scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSetup {
    pub period_s: f64,
    pub sample_rate_hz: f64,
    pub fringes_per_sweep: u32,
    pub fsr_ghz: f64,
    pub finesse: f64,
    pub peak_amplitude_v: f64,
    pub noise_v: f64,
    // laser frequency random-walk step per sweep
    pub drift_step_ghz: f64,
    pub seed: u64,
}

impl Default for SimulationSetup {
    fn default() -> Self {
        SimulationSetup {
            period_s: 0.05,
            sample_rate_hz: 10_000.0,
            fringes_per_sweep: 3,
            fsr_ghz: 10.0,
            finesse: 30.0,
            peak_amplitude_v: 2.0,
            noise_v: 0.05,
            drift_step_ghz: 0.2,
            seed: 0,
        }
    }
}

/// Stand-in for the scope: Lorentzian transmission fringes evenly spaced across the scan, moved
/// along by a random-walking laser frequency, plus uniform noise.
#[derive(Debug)]
pub struct SimulatedFabryPerot {
    setup: SimulationSetup,
    rng: StdRng,
    noise: Option<Uniform<f64>>,
    step: Option<Uniform<f64>>,
    offset_ghz: f64,
    sweeps: u64,
}

impl SimulatedFabryPerot {
    /// # Errors
    /// `InvalidInput` if the scan geometry is not physical (non-positive period, rate, finesse, FSR
    /// or fringe count) or the noise levels are negative.
    pub fn new(setup: SimulationSetup) -> AnalysisResult<Self> {
        let positive = [
            ("period_s", setup.period_s),
            ("sample_rate_hz", setup.sample_rate_hz),
            ("fsr_ghz", setup.fsr_ghz),
            ("finesse", setup.finesse),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid!("simulation {name} = {value} must be positive"));
            }
        }
        if setup.fringes_per_sweep == 0 {
            return Err(invalid!("simulation needs at least one fringe per sweep"));
        }
        if !(setup.noise_v >= 0.0 && setup.drift_step_ghz >= 0.0) {
            return Err(invalid!("simulation noise and drift step must be >= 0"));
        }
        Ok(SimulatedFabryPerot {
            setup,
            rng: StdRng::seed_from_u64(setup.seed),
            noise: (setup.noise_v > 0.0).then(|| Uniform::new(-setup.noise_v, setup.noise_v)),
            step: (setup.drift_step_ghz > 0.0)
                .then(|| Uniform::new(-setup.drift_step_ghz, setup.drift_step_ghz)),
            offset_ghz: 0.0,
            sweeps: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn setup(&self) -> &SimulationSetup {
        &self.setup
    }

    /// Current laser frequency offset from where the simulation started.
    #[inline]
    #[must_use]
    pub fn offset_ghz(&self) -> f64 {
        self.offset_ghz
    }

    /// Move the laser by a fixed amount, on top of the random walk.
    pub fn detune(&mut self, delta_ghz: f64) {
        self.offset_ghz += delta_ghz;
    }

    #[must_use]
    pub fn fringe_spacing_s(&self) -> f64 {
        self.setup.period_s / f64::from(self.setup.fringes_per_sweep)
    }

    /// Fringe centres for the current laser offset, each wrapped into the scan.
    #[must_use]
    pub fn fringe_centres(&self) -> Vec<f64> {
        let spacing = self.fringe_spacing_s();
        let shift = (self.offset_ghz / self.setup.fsr_ghz * spacing).rem_euclid(spacing);
        (0..self.setup.fringes_per_sweep)
            .map(|n| (spacing * (f64::from(n) + 0.25) + shift).rem_euclid(self.setup.period_s))
            .collect()
    }

    fn transmission(&self, t: f64, centres: &[f64]) -> f64 {
        let half_width = self.fringe_spacing_s() / self.setup.finesse / 2.0;
        centres
            .iter()
            .map(|c| {
                // nearest image of the fringe, so peaks near the scan edges stay whole
                let d = (t - c + self.setup.period_s / 2.0).rem_euclid(self.setup.period_s)
                    - self.setup.period_s / 2.0;
                let x = d / half_width;
                self.setup.peak_amplitude_v / (1.0 + x * x)
            })
            .sum()
    }

    fn render(&mut self) -> AnalysisResult<Sweep> {
        let n = (self.setup.period_s * self.setup.sample_rate_hz).round() as usize;
        let centres = self.fringe_centres();
        let mut samples = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 / self.setup.sample_rate_hz;
            let noise = match &self.noise {
                Some(d) => d.sample(&mut self.rng),
                None => 0.0,
            };
            samples.push(self.transmission(t, &centres) + noise);
        }
        Sweep::from_rate(samples, self.setup.sample_rate_hz)
    }
}

impl WaveformSource for SimulatedFabryPerot {
    fn next_sweep(&mut self) -> AnalysisResult<Option<Sweep>> {
        if self.sweeps > 0 {
            if let Some(step) = &self.step {
                self.offset_ghz += step.sample(&mut self.rng);
            }
        }
        self.sweeps += 1;
        debug!(
            "simulated sweep {} at laser offset {:.4} GHz",
            self.sweeps, self.offset_ghz
        );
        self.render().map(Some)
    }
}
