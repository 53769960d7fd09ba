use anyhow::Result;
use std::time::Instant;
use std::fs::File;
use std::io::Write;
use log::{info, warn, error, debug, trace};

use biofilm_common::{EngineConfig, Snapshot};
use biofilm_engine::{geometry, BiofilmSimulation, UniformGrowth};

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting Biofilm Engine...");

    // --- Load Configuration ---
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = EngineConfig::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Geometry & Engine ---
    let geometry = geometry::generate(&config)?;
    let params = config.get_engine_params();
    debug!("Engine Parameters: {:#?}", params);
    let mut sim = match BiofilmSimulation::new(params, &geometry, config.redistribution.seed) {
        Ok(sim) => sim,
        Err(e) => {
            error!("Failed to initialise engine: {}", e);
            return Err(e.into());
        }
    };
    let growth = UniformGrowth { rate: config.growth.rate_per_step };

    let total_steps = config.timing.steps;
    let record_interval = config.timing.record_interval;
    let save_fields = config.output.save_fields_in_snapshot;
    info!("Starting simulation loop for {} steps, recording every {} steps.", total_steps, record_interval);

    let start_time = Instant::now();
    sim.record_snapshot(save_fields);

    for step in 0..total_steps {
        let step_start_time = Instant::now();
        let report = match sim.step(&growth) {
            Ok(report) => report,
            Err(e) => {
                error!("Fatal error during step {}: {}", step + 1, e);
                return Err(anyhow::anyhow!(e).context(format!("step {} failed", step + 1)));
            }
        };
        let step_duration = step_start_time.elapsed();

        let is_record_step = (step + 1) % record_interval == 0;
        let is_last_step = step + 1 == total_steps;
        if is_record_step || is_last_step {
            info!(
                "Step [{}/{}] | Biomass: {:.6e} | Sweeps: {} | Transfers: {} | +{} biofilm / +{} pore | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                total_steps,
                report.mass_after,
                report.redistribution.sweeps,
                report.redistribution.applied_transfers(),
                report.to_biofilm,
                report.to_pore,
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            sim.record_snapshot(save_fields);
        } else {
            trace!("Step [{}/{}] completed in {:.2} ms", step + 1, total_steps, step_duration.as_secs_f64() * 1000.0);
        }
    }

    let total_duration = start_time.elapsed();
    let metrics = sim.cumulative_metrics();
    info!(
        "Simulation finished in {:.3} seconds: {} sweeps, {} transfers ({} relayed, {} fallback), {} age refreshes.",
        total_duration.as_secs_f64(),
        metrics.sweeps,
        metrics.applied_transfers(),
        metrics.relayed_transfers,
        metrics.fallback_transfers,
        metrics.age_refreshes
    );

    // --- Save Recorded Data ---
    let base = &config.output.base_filename;
    if config.output.save_stats {
        let output_format = config.output.format.as_deref().unwrap_or("json");
        save_snapshots(sim.get_recorded_snapshots(), base, output_format)?;

        let metrics_file = format!("{}_metrics.json", base);
        let mut file = File::create(&metrics_file)?;
        file.write_all(serde_json::to_string_pretty(sim.cumulative_metrics())?.as_bytes())?;
        info!("Cumulative metrics saved to {}", metrics_file);
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if config.output.save_final_csv {
        save_final_csv(&sim, &config, &format!("{}_final.csv", base))?;
    } else {
        info!("Skipping final field CSV as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}

fn save_snapshots(snapshots: &Vec<Snapshot>, base: &str, format: &str) -> Result<()> {
    match format {
        "bincode" => {
            // Binary format (much more compact)
            let filename = format!("{}_snapshots.bin", base);
            let file = File::create(&filename)?;
            bincode::serialize_into(file, snapshots)?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base);
            let mut file = File::create(&filename)?;
            rmp_serde::encode::write(&mut file, snapshots)?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                warn!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base);
            let mut file = File::create(&filename)?;
            let json_string = serde_json::to_string(snapshots)?;
            file.write_all(json_string.as_bytes())?;
            info!("All snapshots saved to {} ({}MB)", filename, json_string.len() / 1_048_576);
        }
    }
    Ok(())
}

/// One row per non-excluded cell: coordinates, state, total, age, distance, then one column per species.
fn save_final_csv(sim: &BiofilmSimulation, config: &EngineConfig, filename: &str) -> Result<()> {
    let extents = sim.params().extents;
    let types = config.type_table();
    let ns = config.species.len();
    let fields = sim.gather_fields();
    let biomass = sim.gather_biomass();

    let mut writer = csv::Writer::from_path(filename)?;
    let mut header = vec!["x".to_string(), "y".into(), "z".into(), "type".into(), "total".into(), "age".into(), "distance".into()];
    header.extend(config.species.iter().map(|s| s.name.clone()));
    writer.write_record(&header)?;

    for (i, c) in extents.iter().enumerate() {
        let state = fields.state[i];
        if state.is_excluded() {
            continue;
        }
        let mut row = vec![
            c.x.to_string(),
            c.y.to_string(),
            c.z.to_string(),
            types.raw_id(state).to_string(),
            format!("{:.6e}", fields.total[i]),
            fields.age[i].to_string(),
            sim.distance_at(c).to_string(),
        ];
        row.extend(biomass[i * ns..(i + 1) * ns].iter().map(|b| format!("{:.6e}", b)));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!("Final fields saved to {}", filename);
    Ok(())
}
