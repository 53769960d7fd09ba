use biofilm_common::{CellFields, CellState, Coord, Direction, EngineParams, Snapshot};
use log::{debug, info, trace, warn};
use rand::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::{aggregate, AggregateReport};
use crate::decomposition::Decomposition;
use crate::error::EngineError;
use crate::front_age::{age_pass, age_sum};
use crate::geometry::Geometry;
use crate::growth::GrowthSource;
use crate::mask::{update_mask, MaskReport};
use crate::metrics::RedistributionMetrics;
use crate::redistribution::push_sweep;
use crate::relay::{apply_inbound, Outbox};
use crate::subdomain::{HaloValue, Subdomain};

/// Spreads worker ids across the seed space; worker 0 keeps the sweep seed as is.
const WORKER_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// What one call to `BiofilmSimulation::step` did.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StepReport {
    pub step: u32,
    /// Biomass added by the growth source (after clamping).
    pub mass_added: f64,
    /// Total biomass after growth, before redistribution.
    pub mass_before: f64,
    /// Total biomass at the end of the step.
    pub mass_after: f64,
    pub redistribution: RedistributionMetrics,
    pub to_biofilm: u64,
    pub to_pore: u64,
    pub max_total: f64,
}

/// Owns the partitioned grid and drives growth, redistribution,
/// reclassification and front-age refresh.
pub struct BiofilmSimulation {
    /// Runtime parameters.
    pub params: EngineParams,
    decomposition: Decomposition,
    /// One sub-domain per worker, indexed by worker id.
    workers: Vec<Subdomain>,
    /// Master RNG; each sweep draws a seed from it for the per-worker streams.
    rng: StdRng,
    /// The number of completed steps.
    pub current_step: u32,
    /// Metrics summed over every step since construction.
    cumulative: RedistributionMetrics,
    last_report: StepReport,
    recorded_snapshots: Vec<Snapshot>,
}

impl BiofilmSimulation {
    /// Partitions `geometry` according to `params.workers`. The master RNG uses
    /// `seed` when given, otherwise OS entropy.
    pub fn new(params: EngineParams, geometry: &Geometry, seed: Option<u64>) -> Result<Self, EngineError> {
        if geometry.extents != params.extents {
            return Err(EngineError::GeometryMismatch(format!(
                "geometry is {:?}, parameters expect {:?}",
                geometry.extents, params.extents
            )));
        }
        if geometry.num_species != params.num_species() {
            return Err(EngineError::GeometryMismatch(format!(
                "geometry carries {} species, parameters list {}",
                geometry.num_species, params.num_species()
            )));
        }

        let decomposition = Decomposition::new(params.extents, params.workers)?;
        let workers: Vec<Subdomain> = (0..decomposition.num_workers())
            .map(|id| Subdomain::new(id, &decomposition, geometry))
            .collect();
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        let mut sim = Self {
            params,
            decomposition,
            workers,
            rng,
            current_step: 0,
            cumulative: RedistributionMetrics::default(),
            last_report: StepReport::default(),
            recorded_snapshots: Vec::new(),
        };
        let report = sim.aggregate();
        sim.last_report.mass_after = report.total_biomass;
        sim.last_report.max_total = report.max_total;
        info!(
            "Partitioned {}x{}x{} grid over {} worker(s) {:?}; initial biomass {:.6e}",
            sim.params.extents.nx,
            sim.params.extents.ny,
            sim.params.extents.nz,
            sim.workers.len(),
            sim.params.workers,
            report.total_biomass
        );
        Ok(sim)
    }

    /// Advances by one step: growth, aggregation, redistribution when needed,
    /// reclassification, and a front-age refresh when the mask changed.
    pub fn step(&mut self, growth: &dyn GrowthSource) -> Result<StepReport, EngineError> {
        // --- 1. Growth increments ---
        let mass_added = self.apply_growth(growth);

        // --- 2. Aggregate & redistribute ---
        let before = self.aggregate();
        let mut metrics = if before.is_over_capacity(self.params.tolerance) {
            debug!(
                "Step {}: {} cell(s) over capacity (max excess {:.3e}), redistributing.",
                self.current_step, before.over_capacity, before.max_excess
            );
            self.redistribute()?
        } else {
            RedistributionMetrics::default()
        };

        // --- 3. Reclassify pore <-> biofilm ---
        let mask = self.update_mask()?;
        if mask.changed() {
            let iterations = self.refresh_front_age()?;
            metrics.age_refreshes += 1;
            metrics.age_iterations += iterations;
        }

        let after = self.aggregate();
        self.check_mass_balance(before.total_biomass, after.total_biomass);

        let report = StepReport {
            step: self.current_step,
            mass_added,
            mass_before: before.total_biomass,
            mass_after: after.total_biomass,
            redistribution: metrics,
            to_biofilm: mask.to_biofilm,
            to_pore: mask.to_pore,
            max_total: after.max_total,
        };
        self.cumulative.merge(&metrics);
        self.last_report = report;
        self.current_step += 1;
        Ok(report)
    }

    /// Adds the growth source's increments to every owned interior cell.
    /// Species that would go negative are clamped to zero. Returns the mass added.
    pub fn apply_growth(&mut self, growth: &dyn GrowthSource) -> f64 {
        let params = &self.params;
        let (added, clamped) = self
            .workers
            .par_iter_mut()
            .map(|w| {
                let mut added = 0.0;
                let mut clamped = 0u64;
                let mut delta = vec![0.0; w.num_species];
                let cells: Vec<usize> = w.interior_indices(params).collect();
                for li in cells {
                    let c = w.local.coord(li);
                    growth.increment(c, w.state[li], w.species(li), &mut delta);
                    for (b, d) in w.species_mut(li).iter_mut().zip(&delta) {
                        let next = *b + *d;
                        if next < 0.0 {
                            added -= *b;
                            *b = 0.0;
                            clamped += 1;
                        } else {
                            added += *d;
                            *b = next;
                        }
                    }
                }
                (added, clamped)
            })
            .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
        if clamped > 0 {
            warn!("Step {}: clamped {} negative species amount(s) to zero.", self.current_step, clamped);
        }
        added
    }

    /// Recomputes totals on every worker and refreshes the halos.
    pub fn aggregate(&mut self) -> AggregateReport {
        let params = &self.params;
        let report = self
            .workers
            .par_iter_mut()
            .map(|w| aggregate(w, params))
            .reduce(AggregateReport::default, |mut a, b| {
                a.merge(&b);
                a
            });
        exchange_halo(&mut self.workers);
        report
    }

    /// Runs push/pull sweeps until no interior cell exceeds capacity.
    ///
    /// The front age is refreshed after the first sweep and then every
    /// `age_refresh_interval` sweeps.
    pub fn redistribute(&mut self) -> Result<RedistributionMetrics, EngineError> {
        let mut metrics = RedistributionMetrics::default();
        let mut report = self.aggregate();
        let mut sweep = 0u32;

        while report.is_over_capacity(self.params.tolerance) {
            if sweep >= self.params.max_sweeps {
                return Err(EngineError::SweepLimitExceeded {
                    limit: self.params.max_sweeps,
                    max_excess: report.max_excess,
                    cell: report.max_excess_cell.unwrap_or_default(),
                });
            }
            let (swept, next) = self.push_pull_sweep()?;
            metrics.merge(&swept);
            report = next;
            sweep += 1;
            trace!(
                "Sweep {}: {} transfers ({} staged), {} cell(s) still over, max excess {:.3e}",
                sweep,
                swept.applied_transfers(),
                swept.staged_transfers,
                report.over_capacity,
                report.max_excess
            );

            if (sweep - 1) % self.params.age_refresh_interval == 0 {
                metrics.age_iterations += self.refresh_front_age()?;
                metrics.age_refreshes += 1;
            }
        }

        debug!(
            "Redistribution settled after {} sweep(s): {} transfers, {} fallback, {:.3e} moved",
            metrics.sweeps,
            metrics.applied_transfers(),
            metrics.fallback_transfers,
            metrics.mass_moved
        );
        Ok(metrics)
    }

    /// One full push/pull cycle: every worker pushes in parallel, then every worker
    /// applies what its neighbours staged for it, then totals and halos are refreshed.
    /// Each worker draws from its own stream, derived from a seed the master RNG
    /// hands out per sweep.
    pub fn push_pull_sweep(&mut self) -> Result<(RedistributionMetrics, AggregateReport), EngineError> {
        let sweep_seed: u64 = self.rng.random();
        let params = &self.params;

        // --- Phase A: push ---
        let pushed: Vec<RedistributionMetrics> = self
            .workers
            .par_iter_mut()
            .map(|w| {
                let mut rng = StdRng::seed_from_u64(sweep_seed ^ (w.id as u64).wrapping_mul(WORKER_SEED_MIX));
                push_sweep(w, params, &mut rng)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut metrics = RedistributionMetrics::default();
        for m in &pushed {
            metrics.merge(m);
        }

        // --- Phase B: pull ---
        let outboxes: Vec<Outbox> = self.workers.iter_mut().map(|w| std::mem::take(&mut w.outbox)).collect();
        let decomposition = &self.decomposition;
        let extents = params.extents;
        let pulled: Vec<(u64, f64)> = self
            .workers
            .par_iter_mut()
            .map(|w| {
                let id = w.id;
                let inbound = Direction::ALL
                    .iter()
                    .filter_map(|&d| decomposition.neighbor(id, d).map(|n| outboxes[n].slot(d.opposite())))
                    .flatten();
                apply_inbound(w, inbound, extents)
            })
            .collect::<Result<Vec<_>, _>>()?;
        for (count, _) in &pulled {
            metrics.relayed_transfers += count;
        }
        if metrics.relayed_transfers != metrics.staged_transfers {
            return Err(EngineError::InvalidDecomposition(format!(
                "{} transfers staged but {} relayed",
                metrics.staged_transfers, metrics.relayed_transfers
            )));
        }
        metrics.sweeps = 1;

        let report = self.aggregate();
        Ok((metrics, report))
    }

    /// Iterates the front-age pass until the grid-wide age sum stops changing.
    /// Returns the number of passes used.
    pub fn refresh_front_age(&mut self) -> Result<u32, EngineError> {
        let params = &self.params;
        let mut previous = total_age(&self.workers);
        for iteration in 1..=params.max_age_iterations {
            self.workers.par_iter_mut().for_each(|w| {
                age_pass(w, params);
            });
            exchange_halo(&mut self.workers);
            let sum = total_age(&self.workers);
            if sum == previous {
                trace!("Front age settled after {} pass(es), age sum {}", iteration, sum);
                return Ok(iteration);
            }
            previous = sum;
        }
        Err(EngineError::AgeRefreshLimitExceeded { limit: params.max_age_iterations })
    }

    /// Reclassifies cells whose totals crossed the biofilm threshold.
    pub fn update_mask(&mut self) -> Result<MaskReport, EngineError> {
        let params = &self.params;
        let reports = self
            .workers
            .par_iter_mut()
            .map(|w| update_mask(w, params))
            .collect::<Result<Vec<_>, _>>()?;
        exchange_halo(&mut self.workers);
        let mut report = MaskReport::default();
        for r in &reports {
            report.merge(r);
        }
        if report.changed() {
            debug!("Mask update: {} pore -> biofilm, {} biofilm -> pore", report.to_biofilm, report.to_pore);
        }
        Ok(report)
    }

    fn check_mass_balance(&self, before: f64, after: f64) {
        let drift = (after - before).abs();
        if drift > 1e-9 * before.abs().max(1.0) {
            warn!(
                "Step {}: mass balance drift {:.3e} (before {:.12e}, after {:.12e})",
                self.current_step, drift, before, after
            );
        } else {
            trace!("Step {}: mass balance ok (drift {:.3e})", self.current_step, drift);
        }
    }

    // --- Accessors ---

    fn locate(&self, c: Coord) -> (&Subdomain, usize) {
        let w = &self.workers[self.decomposition.owner_of(c)];
        (w, w.local.local_index(c))
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Aggregate total of `c` as of the last aggregation.
    pub fn total_at(&self, c: Coord) -> f64 {
        let (w, li) = self.locate(c);
        w.total[li]
    }

    pub fn biomass_at(&self, c: Coord) -> Vec<f64> {
        let (w, li) = self.locate(c);
        w.species(li).to_vec()
    }

    pub fn state_at(&self, c: Coord) -> CellState {
        let (w, li) = self.locate(c);
        w.state[li]
    }

    pub fn age_at(&self, c: Coord) -> u32 {
        let (w, li) = self.locate(c);
        w.age[li]
    }

    pub fn distance_at(&self, c: Coord) -> u32 {
        let (w, li) = self.locate(c);
        w.distance[li]
    }

    /// Sum of biomass over every non-excluded cell and species, read directly from
    /// the species fields.
    pub fn total_biomass(&self) -> f64 {
        self.workers
            .iter()
            .flat_map(|w| {
                w.owned_indices()
                    .iter()
                    .filter(|&&li| !w.state[li].is_excluded())
                    .map(move |&li| w.species(li).iter().sum::<f64>())
            })
            .sum()
    }

    /// Metrics summed over all steps so far.
    pub fn cumulative_metrics(&self) -> &RedistributionMetrics {
        &self.cumulative
    }

    /// Full-grid `total`, `state` and `age`, indexed by `Extents::index`.
    pub fn gather_fields(&self) -> CellFields {
        let extents = self.params.extents;
        let n = extents.num_cells();
        let mut fields = CellFields { total: vec![0.0; n], state: vec![CellState::Solid; n], age: vec![0; n] };
        for w in &self.workers {
            for &li in w.owned_indices() {
                let gi = extents.index(w.local.coord(li));
                fields.total[gi] = w.total[li];
                fields.state[gi] = w.state[li];
                fields.age[gi] = w.age[li];
            }
        }
        fields
    }

    /// Full-grid per-species biomass, `[cell * num_species + s]`.
    pub fn gather_biomass(&self) -> Vec<f64> {
        let extents = self.params.extents;
        let ns = self.params.num_species();
        let mut biomass = vec![0.0; extents.num_cells() * ns];
        for w in &self.workers {
            for &li in w.owned_indices() {
                let gi = extents.index(w.local.coord(li));
                biomass[gi * ns..(gi + 1) * ns].copy_from_slice(w.species(li));
            }
        }
        biomass
    }

    /// Collects grid statistics for the last completed step and stores them as a Snapshot.
    pub fn record_snapshot(&mut self, include_fields: bool) {
        let fields = self.gather_fields();
        let biofilm_cells = fields.state.iter().filter(|s| s.is_biofilm()).count() as u32;
        let pore_cells = fields.state.iter().filter(|s| s.is_pore()).count() as u32;
        let max_age = fields.age.iter().copied().max().unwrap_or(0);
        let max_total = fields.total.iter().copied().fold(0.0, f64::max);
        let total_biomass = self.total_biomass();

        debug!("Recording snapshot at step {}...", self.current_step);
        info!(
            "Snapshot step {}: biomass {:.6e} | biofilm {} | pore {} | max total {:.4} | max age {}",
            self.current_step, total_biomass, biofilm_cells, pore_cells, max_total, max_age
        );

        self.recorded_snapshots.push(Snapshot {
            step: self.current_step,
            extents: self.params.extents,
            total_biomass,
            biofilm_cells,
            pore_cells,
            max_total,
            max_age,
            sweeps: self.last_report.redistribution.sweeps,
            transfers: self.last_report.redistribution.applied_transfers(),
            fields: if include_fields { Some(fields) } else { None },
        });
    }

    /// Provides access to the recorded snapshots.
    pub fn get_recorded_snapshots(&self) -> &Vec<Snapshot> {
        &self.recorded_snapshots
    }
}

/// Copies each owner's `total`, `state` and `age` into the halos that mirror it.
fn exchange_halo(workers: &mut [Subdomain]) {
    if workers.len() < 2 {
        return;
    }
    let values: Vec<Vec<HaloValue>> = {
        let owners: &[Subdomain] = workers;
        owners
            .par_iter()
            .map(|w| {
                w.halo
                    .iter()
                    .map(|link| owners[link.owner].halo_value(link.owner_local, link.local))
                    .collect()
            })
            .collect()
    };
    workers
        .par_iter_mut()
        .zip(values.par_iter())
        .for_each(|(w, v)| w.apply_halo(v));
}

fn total_age(workers: &[Subdomain]) -> u64 {
    workers.par_iter().map(age_sum).sum()
}
