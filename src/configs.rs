#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc
)]

use std::path::PathBuf;

use gethostname::gethostname;
use log::warn;

use crate::drift::DriftSearch;
use crate::fabry_perot::{FabryPerot, FabryPerotParams};
use crate::peaks::AdaptiveClustering;
use crate::source::SimulationSetup;
use crate::util::{tomlget, tomlget_opt, tomlget_or};

/// Settings for the tracking loop itself rather than the analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSetup {
    // 0 runs until interrupted
    pub max_cycles: u64,
    pub stats_exponent: u32,
    pub log_exponent: usize,
    pub realtime: bool,
    pub curve_dump_path: Option<PathBuf>,
}

/// A section named after this machine may override any `[fabry_perot]` key, so that one file can
/// serve several acquisition hosts.
fn fp_section(cfg: &toml::Value, key: &str) -> String {
    gethostname()
        .into_string()
        .ok()
        .filter(|host| cfg.get(host.as_str()).and_then(|sec| sec.get(key)).is_some())
        .unwrap_or_else(|| "fabry_perot".to_string())
}

pub fn run_from_config(cfg: &toml::Value) -> RunSetup {
    let stats_every = tomlget_or!(cfg, "general", "stats_every_cycles", as_integer, u32, 512);
    let stats_exponent = stats_every.checked_ilog2().unwrap_or(0);
    if 1u32 << stats_exponent != stats_every {
        warn!(
            "stats interval {} rounded down to 2^{} = {} cycles",
            stats_every,
            stats_exponent,
            1u32 << stats_exponent
        );
    }
    RunSetup {
        max_cycles: tomlget_or!(cfg, "general", "max_cycles", as_integer, u64, 0),
        stats_exponent,
        log_exponent: log_exponent(cfg),
        realtime: tomlget_or!(cfg, "general", "realtime", as_bool, true),
        curve_dump_path: tomlget_opt!(cfg, "general", "curve_dump_path", as_str).map(PathBuf::from),
    }
}

/// Drift logs are `2^n` entries long. An explicit exponent wins; otherwise a plain length is
/// rounded down to a power of two; otherwise 1024 entries.
#[must_use]
fn log_exponent(cfg: &toml::Value) -> usize {
    if let Some(exponent) = tomlget_opt!(cfg, "general", "log_length_exponent", as_integer, usize)
    {
        exponent
    } else if let Some(length) = tomlget_opt!(cfg, "general", "log_length", as_integer, u64) {
        let exponent = length.checked_ilog2().unwrap_or(0) as usize;
        if 1u64 << exponent != length {
            warn!(
                "log length {} rounded down to 2^{} = {}",
                length,
                exponent,
                1u64 << exponent
            );
        }
        exponent
    } else {
        10
    }
}

pub fn drift_search_from_config(cfg: &toml::Value) -> Result<DriftSearch, String> {
    // no default: the modulus must come from the FSR / timing calibration
    let modulus = tomlget!(cfg, "drift", "modulus", as_float, f64);
    Ok(DriftSearch::new(modulus)
        .range(
            tomlget_or!(cfg, "drift", "range_min", as_float, f64, -4.0),
            tomlget_or!(cfg, "drift", "range_max", as_float, f64, 4.0),
        )
        .opt_resolution(tomlget_opt!(cfg, "drift", "resolution", as_integer, usize))
        .opt_slope_divisor(tomlget_opt!(cfg, "drift", "slope_divisor", as_float, f64))
        .keep_curve(tomlget_or!(cfg, "drift", "keep_curve", as_bool, false)))
}

pub fn clustering_from_config(cfg: &toml::Value) -> AdaptiveClustering {
    AdaptiveClustering::new()
        .k_range(
            tomlget_or!(cfg, "clustering", "min_k", as_integer, usize, 2),
            tomlget_or!(cfg, "clustering", "max_k", as_integer, usize, 5),
        )
        .opt_max_iterations(tomlget_opt!(cfg, "clustering", "max_iterations", as_integer, u32))
        .seed(tomlget_or!(cfg, "clustering", "seed", as_integer, u64, 0))
}

pub fn fabry_perot_params_from_config(cfg: &toml::Value) -> Result<FabryPerotParams, String> {
    let mut out = FabryPerotParams::new(drift_search_from_config(cfg)?);
    let sec = fp_section(cfg, "threshold_v");
    out.threshold_v = tomlget_or!(cfg, sec.as_str(), "threshold_v", as_float, f64, 1.0);
    let sec = fp_section(cfg, "separation_s");
    out.separation_s = tomlget_or!(cfg, sec.as_str(), "separation_s", as_float, f64, 0.008);
    let sec = fp_section(cfg, "peak_strategy");
    out.strategy = tomlget_or!(cfg, sec.as_str(), "peak_strategy", as_str, "gap").parse()?;
    let sec = fp_section(cfg, "cross_check");
    out.cross_check = tomlget_or!(cfg, sec.as_str(), "cross_check", as_bool, false);
    let sec = fp_section(cfg, "fallback_slope");
    out.fallback_slope = tomlget_opt!(cfg, sec.as_str(), "fallback_slope", as_float, f64);
    out.clustering = clustering_from_config(cfg);
    Ok(out)
}

pub fn simulation_from_config(cfg: &toml::Value) -> Result<SimulationSetup, String> {
    let defaults = SimulationSetup::default();
    let out = SimulationSetup {
        period_s: tomlget_or!(cfg, "simulation", "period_ms", as_float, f64, 50.0) / 1000.0,
        sample_rate_hz: tomlget_or!(
            cfg,
            "simulation",
            "sample_rate_hz",
            as_float,
            f64,
            defaults.sample_rate_hz
        ),
        fringes_per_sweep: tomlget_or!(
            cfg,
            "simulation",
            "fringes_per_sweep",
            as_integer,
            u32,
            3
        ),
        fsr_ghz: tomlget_or!(cfg, "simulation", "fsr_ghz", as_float, f64, defaults.fsr_ghz),
        finesse: tomlget_or!(cfg, "simulation", "finesse", as_float, f64, defaults.finesse),
        peak_amplitude_v: tomlget_or!(
            cfg,
            "simulation",
            "peak_amplitude_v",
            as_float,
            f64,
            defaults.peak_amplitude_v
        ),
        noise_v: tomlget_or!(cfg, "simulation", "noise_v", as_float, f64, defaults.noise_v),
        drift_step_ghz: tomlget_or!(
            cfg,
            "simulation",
            "drift_step_ghz",
            as_float,
            f64,
            defaults.drift_step_ghz
        ),
        seed: tomlget_or!(cfg, "simulation", "seed", as_integer, u64, 0),
    };
    if out.period_s <= 0.0 {
        return Err(format!("simulation period {} s must be positive", out.period_s));
    }
    Ok(out)
}

pub fn fabry_perot_from_config(cfg: &toml::Value) -> Result<FabryPerot, String> {
    FabryPerot::new(fabry_perot_params_from_config(cfg)?, log_exponent(cfg))
        .ok_or_else(|| "failed to allocate drift logs; log length too large".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabry_perot::PeakStrategy;

    const SAMPLE: &str = r#"
        [general]
        max_cycles = 20
        stats_every_cycles = 100
        log_length = 300
        realtime = false

        [fabry_perot]
        threshold_v = 1.2
        separation_s = 0.006
        peak_strategy = "adaptive"
        fallback_slope = 0.00156

        [clustering]
        max_k = 4
        max_iterations = 50

        [drift]
        modulus = 0.05
        resolution = 1000
        keep_curve = true
    "#;

    fn parse(text: &str) -> toml::Value {
        toml::from_str(text).expect("valid toml")
    }

    #[test]
    fn full_config() {
        let cfg = parse(SAMPLE);
        let run = run_from_config(&cfg);
        assert_eq!(run.max_cycles, 20);
        assert_eq!(run.stats_exponent, 6);
        assert_eq!(run.log_exponent, 8);
        assert!(!run.realtime);
        assert!(run.curve_dump_path.is_none());

        let params = fabry_perot_params_from_config(&cfg).unwrap();
        assert_eq!(params.threshold_v, 1.2);
        assert_eq!(params.separation_s, 0.006);
        assert_eq!(params.strategy, PeakStrategy::Adaptive);
        assert_eq!(params.fallback_slope, Some(0.00156));
        assert_eq!(params.clustering.max_k, 4);
        assert_eq!(params.clustering.min_k, 2);
        assert_eq!(params.clustering.max_iterations, 50);
        assert_eq!(params.drift.modulus, 0.05);
        assert_eq!(params.drift.resolution, 1000);
        assert_eq!(params.drift.range, (-4.0, 4.0));
        assert_eq!(params.drift.slope_divisor, 10.0);
        assert!(params.drift.keep_curve);

        let fp = fabry_perot_from_config(&cfg).unwrap();
        assert_eq!(fp.drift_log.capacity(), 256);
    }

    #[test]
    fn modulus_is_required() {
        let cfg = parse("[fabry_perot]\nthreshold_v = 1.0\n");
        let err = fabry_perot_params_from_config(&cfg).unwrap_err();
        assert!(err.contains("drift"), "{err}");
    }

    #[test]
    fn defaults() {
        let cfg = parse("[drift]\nmodulus = 0.5\n");
        let params = fabry_perot_params_from_config(&cfg).unwrap();
        assert_eq!(params.threshold_v, 1.0);
        assert_eq!(params.separation_s, 0.008);
        assert_eq!(params.strategy, PeakStrategy::Gap);
        assert!(params.fallback_slope.is_none());
        let run = run_from_config(&cfg);
        assert_eq!(run.max_cycles, 0);
        assert_eq!(run.log_exponent, 10);
        assert_eq!(run.stats_exponent, 9);
        assert_eq!(simulation_from_config(&cfg).unwrap(), SimulationSetup::default());
    }

    #[test]
    fn host_section_overrides() {
        let host = gethostname().into_string().unwrap();
        let text = format!(
            "[drift]\nmodulus = 0.5\n[fabry_perot]\nthreshold_v = 1.0\n[\"{host}\"]\nthreshold_v = 0.7\n"
        );
        let params = fabry_perot_params_from_config(&parse(&text)).unwrap();
        assert_eq!(params.threshold_v, 0.7);
        assert_eq!(params.separation_s, 0.008);
    }

    #[test]
    fn optional_keys_and_wrong_types() {
        let cfg = parse(
            r#"
            [general]
            curve_dump_path = "curve.json"
            log_length_exponent = 5
            realtime = "yes"

            [fabry_perot]
            cross_check = true
            threshold_v = "high"

            [drift]
            modulus = 0.05
            resolution = 500
        "#,
        );
        let run = run_from_config(&cfg);
        assert_eq!(run.curve_dump_path, Some(PathBuf::from("curve.json")));
        assert_eq!(run.log_exponent, 5);
        // unconvertible values fall back to the default
        assert!(run.realtime);
        let params = fabry_perot_params_from_config(&cfg).unwrap();
        assert!(params.cross_check);
        assert_eq!(params.threshold_v, 1.0);
        assert_eq!(params.drift.resolution, 500);

        let cfg = parse("[drift]\nmodulus = \"wide\"\n");
        let err = drift_search_from_config(&cfg).unwrap_err();
        assert!(err.contains("drift:modulus"), "{err}");
    }

    #[test]
    fn bad_strategy() {
        let cfg = parse("[drift]\nmodulus = 0.5\n[fabry_perot]\npeak_strategy = \"fft\"\n");
        assert!(fabry_perot_params_from_config(&cfg).is_err());
    }
}
