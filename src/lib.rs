//! Laser frequency drift tracking from scanning Fabry-Perot transmission sweeps: threshold each
//! sweep, cluster what is left into transmission peaks, and compare the peak positions against the
//! previous sweep to estimate how far the laser has moved.

pub mod configs;
pub mod drift;
pub mod error;
pub mod fabry_perot;
pub mod peaks;
pub mod ring_buffer;
pub mod source;
pub mod threshold;
pub mod util;

pub use drift::{estimate_drift, CancelToken, CostCurve, DriftEstimate, DriftSearch};
pub use error::{AnalysisError, AnalysisResult};
pub use fabry_perot::{CycleReport, FabryPerot, FabryPerotParams, PeakStrategy};
pub use peaks::{
    extract_peaks_by_adaptive_clustering, extract_peaks_by_gap, AdaptiveClustering, Peak, PeakSet,
};
pub use source::{ReplaySource, SimulatedFabryPerot, SimulationSetup, WaveformSource};
pub use threshold::{threshold, Sweep};
