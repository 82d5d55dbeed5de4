#![warn(clippy::pedantic)]

use std::fs::{read_to_string, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use std::{env, thread};

use anyhow::{anyhow, Context};
use chrono::Local;
use log::{debug, info, warn};

use rustfp::configs;
use rustfp::util::find_file;
use rustfp::{AnalysisError, CostCurve, SimulatedFabryPerot};

fn dump_curve(path: &Path, curve: &CostCurve) -> anyhow::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut out, curve)?;
    out.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} {}",
                Local::now(),
                record.level(),
                record.args()
            )
        })
        .init();

    let cfg_name = env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let cfg_path = find_file(Path::new(&cfg_name))
        .ok_or_else(|| anyhow!("could not find config file {cfg_name}"))?;
    info!("Reading config file {}", cfg_path.display());

    let cfg_text = read_to_string(&cfg_path).context("Failed to open config file")?;
    let cfg: toml::Value = toml::from_str(&cfg_text).context("Failed to parse config file")?;
    let run = configs::run_from_config(&cfg);
    let mut fp = configs::fabry_perot_from_config(&cfg)
        .map_err(anyhow::Error::msg)
        .context("Failed to construct Fabry-Perot tracker from config file")?;
    let sim_setup = configs::simulation_from_config(&cfg)
        .map_err(anyhow::Error::msg)
        .context("Failed to read simulation setup from config file")?;
    let mut source = SimulatedFabryPerot::new(sim_setup)?;

    info!(
        "Peak strategy {}, threshold {} V, separation {} s, drift modulus {}",
        fp.params.strategy, fp.params.threshold_v, fp.params.separation_s, fp.params.drift.modulus
    );

    let period = Duration::from_secs_f64(source.setup().period_s);
    let stats_mask = (1u64 << run.stats_exponent) - 1;

    info!("Entering main loop...");
    loop {
        let started = Instant::now();
        match fp.run_cycle(&mut source) {
            Ok(report) => match &report.drift {
                Some(est) => info!(
                    "cycle {}: {} peaks, drift {:+.4}, cumulative {:+.4} (laser at {:+.4} GHz)",
                    report.cycle,
                    report.peaks.len(),
                    est.drift,
                    fp.cumulative_drift(),
                    source.offset_ghz()
                ),
                None => info!(
                    "cycle {}: {} peaks, reference sweep",
                    report.cycle,
                    report.peaks.len()
                ),
            },
            Err(AnalysisError::SourceExhausted) => {
                info!("Waveform source exhausted; stopping");
                break;
            }
            // already logged by the tracker
            Err(e) => debug!("cycle {} skipped: {e}", fp.cycle_counter),
        }

        if fp.cycle_counter & stats_mask == 0 {
            let stats = fp.stats.evaluate();
            info!(
                "average analysis time {} us, {:.2} peaks/sweep, drift {:+.4} +- {:.4} over {} \
                 estimates, {} failures",
                stats.avg_analysis_time_us,
                stats.avg_peak_count,
                stats.avg_drift,
                stats.variance_drift.sqrt(),
                stats.estimates,
                stats.failures
            );
            fp.stats.reset();
            if let (Some(path), Some(curve)) = (&run.curve_dump_path, fp.last_curve()) {
                match dump_curve(path, curve) {
                    Ok(()) => debug!("wrote cost curve to {}", path.display()),
                    Err(e) => warn!("Failed to write cost curve to {}: {e}", path.display()),
                }
            }
        }

        if run.max_cycles != 0 && fp.cycle_counter >= run.max_cycles {
            info!("Completed {} cycles", fp.cycle_counter);
            break;
        }
        if run.realtime {
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }
    if let Some((mean, var)) = fp.drift_log.mean_variance() {
        info!(
            "last {} drift estimates: mean {:+.4}, std {:.4}",
            fp.drift_log.len(),
            mean,
            var.sqrt()
        );
    }
    Ok(())
}
