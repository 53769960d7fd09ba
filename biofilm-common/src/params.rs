use serde::{Deserialize, Serialize};
use crate::cell::{Coord, Extents, TypeTable};
use crate::config::PushPolicy;

/// Engine parameters derived from the configuration, used frequently during redistribution passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParams {
    // Grid
    pub extents: Extents,
    pub boundary_gap: usize, // inlet/outlet layers at each x end

    // Capacity
    pub bmax: f64,
    pub threshold_biomass: f64, // threshold_fraction * bmax
    pub tolerance: f64,

    // Redistribution
    pub push_policy: PushPolicy,
    pub half_push_fraction: f64,
    pub max_sweeps: u32,
    pub age_refresh_interval: u32,
    pub max_age_iterations: u32,

    // Species and classification
    pub species_biofilm_types: Vec<u16>,
    pub types: TypeTable,

    // Decomposition
    pub workers: [usize; 3],
}

impl EngineParams {
    /// Reference parameter set: full push, 2000 sweeps, age refresh every 50 sweeps,
    /// 1000 age iterations, threshold at 10% of `bmax`, a single worker.
    pub fn with_defaults(extents: Extents, species_biofilm_types: Vec<u16>, bmax: f64) -> Self {
        EngineParams {
            extents,
            boundary_gap: 0,
            bmax,
            threshold_biomass: 0.1 * bmax,
            tolerance: 1e-12,
            push_policy: PushPolicy::Full,
            half_push_fraction: 0.5,
            max_sweeps: 2000,
            age_refresh_interval: 50,
            max_age_iterations: 1000,
            species_biofilm_types,
            types: TypeTable::default(),
            workers: [1, 1, 1],
        }
    }

    pub fn num_species(&self) -> usize {
        self.species_biofilm_types.len()
    }

    /// True for cells that take part in redistribution and reclassification.
    #[inline(always)]
    pub fn is_interior(&self, c: Coord) -> bool {
        self.extents.contains(c)
            && c.x >= self.boundary_gap
            && c.x + self.boundary_gap < self.extents.nx
    }
}
