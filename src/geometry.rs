use std::collections::VecDeque;

use anyhow::Result;
use biofilm_common::{CellState, Coord, Direction, EngineConfig, Extents, TypeTable};
use log::{debug, info};
use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;

use crate::error::EngineError;

/// Distance assigned to cells that cannot reach any pore cell.
pub const UNREACHABLE: u32 = u32::MAX;

/// Global initial condition: cell classification, per-species biomass and the
/// static distance-from-pore field.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub extents: Extents,
    pub num_species: usize,
    pub state: Vec<CellState>,
    /// Species-major per cell: `biomass[cell * num_species + s]`.
    pub biomass: Vec<f64>,
    distance: Vec<u32>,
}

impl Geometry {
    /// Builds a geometry with zero biomass. The distance field is computed here
    /// and never changes afterwards.
    pub fn new(extents: Extents, state: Vec<CellState>, num_species: usize) -> Result<Self, EngineError> {
        if state.len() != extents.num_cells() {
            return Err(EngineError::GeometryMismatch(format!(
                "{} cell states for a {}x{}x{} grid",
                state.len(), extents.nx, extents.ny, extents.nz
            )));
        }
        if num_species == 0 {
            return Err(EngineError::GeometryMismatch("no species".to_string()));
        }
        let distance = compute_distance(extents, &state);
        Ok(Geometry {
            extents,
            num_species,
            biomass: vec![0.0; state.len() * num_species],
            state,
            distance,
        })
    }

    /// Classifies raw type ids (as read from a geometry file) through `types`.
    pub fn from_raw_types(
        extents: Extents,
        raw: &[u16],
        types: &TypeTable,
        num_species: usize,
    ) -> Result<Self, EngineError> {
        let state = raw.iter().map(|&t| types.classify(t)).collect();
        Geometry::new(extents, state, num_species)
    }

    pub fn state_at(&self, c: Coord) -> CellState {
        self.state[self.extents.index(c)]
    }

    pub fn distance_at(&self, c: Coord) -> u32 {
        self.distance[self.extents.index(c)]
    }

    pub fn biomass_at(&self, c: Coord) -> &[f64] {
        let i = self.extents.index(c) * self.num_species;
        &self.biomass[i..i + self.num_species]
    }

    pub fn set_biomass(&mut self, c: Coord, amounts: &[f64]) -> Result<(), EngineError> {
        if amounts.len() != self.num_species {
            return Err(EngineError::GeometryMismatch(format!(
                "{} species amounts for {} species",
                amounts.len(), self.num_species
            )));
        }
        if self.state_at(c).is_excluded() && amounts.iter().any(|&a| a != 0.0) {
            return Err(EngineError::GeometryMismatch(format!("biomass placed in excluded cell {}", c)));
        }
        let i = self.extents.index(c) * self.num_species;
        self.biomass[i..i + self.num_species].copy_from_slice(amounts);
        Ok(())
    }

    pub fn total_biomass(&self) -> f64 {
        self.biomass.iter().sum()
    }
}

/// Multi-source breadth-first search from every pore cell through non-excluded
/// cells. Pore cells are 0, cells with no path to a pore get `UNREACHABLE`.
pub fn compute_distance(extents: Extents, state: &[CellState]) -> Vec<u32> {
    let mut distance = vec![UNREACHABLE; extents.num_cells()];
    let mut queue = VecDeque::new();
    for (i, s) in state.iter().enumerate() {
        if s.is_pore() {
            distance[i] = 0;
            queue.push_back(i);
        }
    }
    while let Some(i) = queue.pop_front() {
        let c = extents.coord(i);
        let next = distance[i] + 1;
        for dir in Direction::ALL {
            if let Some(n) = c.step(dir, extents) {
                let ni = extents.index(n);
                if !state[ni].is_excluded() && distance[ni] == UNREACHABLE {
                    distance[ni] = next;
                    queue.push_back(ni);
                }
            }
        }
    }
    distance
}

/// Builds a synthetic porous medium: walls on the four y/z faces, spherical
/// grains with normally distributed radii, and a biofilm layer seeded on every
/// pore cell touching a grain. The medium is laid out as raw type ids, the way a
/// geometry file stores it, and classified through the config's type table.
pub fn generate(config: &EngineConfig) -> Result<Geometry> {
    let extents = Extents::new(config.grid.nx, config.grid.ny, config.grid.nz);
    let gcfg = &config.geometry;
    let types = config.type_table();
    let gap = config.grid.boundary_gap;
    let num_species = config.species.len();
    let mut rng = StdRng::seed_from_u64(gcfg.seed);

    let mut raw = vec![types.default_pore; extents.num_cells()];
    for c in extents.iter() {
        let on_y_face = extents.ny > 2 && (c.y == 0 || c.y == extents.ny - 1);
        let on_z_face = extents.nz > 2 && (c.z == 0 || c.z == extents.nz - 1);
        if on_y_face || on_z_face {
            raw[extents.index(c)] = types.wall;
        }
    }

    // --- Grains ---
    let radius_dist = Normal::new(gcfg.grain_radius_mean, gcfg.grain_radius_std)
        .map_err(|e| anyhow::anyhow!("invalid grain radius distribution: {}", e))?;
    let x_dist = Uniform::new(gap as f64, (extents.nx - gap) as f64)?;
    let y_dist = Uniform::new(0.0, extents.ny as f64)?;
    let z_dist = Uniform::new(0.0, extents.nz as f64)?;

    let target_solid = (gcfg.grain_fraction * extents.num_cells() as f64).round() as usize;
    let mut solid_count = 0usize;
    let mut grains = 0u32;
    let max_attempts = 10 * extents.num_cells().max(1);
    let mut attempts = 0;
    while solid_count < target_solid && attempts < max_attempts {
        attempts += 1;
        let center = (x_dist.sample(&mut rng), y_dist.sample(&mut rng), z_dist.sample(&mut rng));
        let radius: f64 = radius_dist.sample(&mut rng).max(0.5);
        let r2 = radius * radius;
        let reach = radius.ceil() as isize + 1;
        let cx = center.0.floor() as isize;
        let cy = center.1.floor() as isize;
        let cz = center.2.floor() as isize;
        for z in (cz - reach).max(0)..=(cz + reach).min(extents.nz as isize - 1) {
            for y in (cy - reach).max(0)..=(cy + reach).min(extents.ny as isize - 1) {
                for x in (cx - reach).max(gap as isize)..=(cx + reach).min((extents.nx - gap) as isize - 1) {
                    let dx = x as f64 + 0.5 - center.0;
                    let dy = y as f64 + 0.5 - center.1;
                    let dz = z as f64 + 0.5 - center.2;
                    if dx * dx + dy * dy + dz * dz <= r2 {
                        let i = extents.index(Coord::new(x as usize, y as usize, z as usize));
                        if types.pore.contains(&raw[i]) {
                            raw[i] = types.solid;
                            solid_count += 1;
                        }
                    }
                }
            }
        }
        grains += 1;
    }
    debug!("Placed {} grains ({} solid cells, target {}).", grains, solid_count, target_solid);

    // --- Biofilm seeds on grain surfaces ---
    let biofilm_type = config.species[0].biofilm_type;
    let seeds: Vec<usize> = (0..extents.num_cells())
        .filter(|&i| {
            let c = extents.coord(i);
            types.pore.contains(&raw[i])
                && c.x >= gap
                && c.x + gap < extents.nx
                && Direction::ALL
                    .iter()
                    .any(|&d| c.step(d, extents).is_some_and(|n| raw[extents.index(n)] == types.solid))
        })
        .collect();
    for &i in &seeds {
        raw[i] = biofilm_type;
    }

    let mut geometry = Geometry::from_raw_types(extents, &raw, &types, num_species)?;
    let per_species_seed = gcfg.seed_biomass / num_species as f64;
    let per_species_plankton = gcfg.planktonic_biomass / num_species as f64;
    for i in 0..extents.num_cells() {
        let c = extents.coord(i);
        if c.x < gap || c.x + gap >= extents.nx {
            continue;
        }
        let amount = match geometry.state[i] {
            CellState::Biofilm(_) => per_species_seed,
            CellState::Pore(_) => per_species_plankton,
            _ => continue,
        };
        let base = i * num_species;
        geometry.biomass[base..base + num_species].fill(amount);
    }

    info!(
        "Generated {}x{}x{} geometry: {} solid, {} biofilm seeds, initial biomass {:.4e}",
        extents.nx, extents.ny, extents.nz, solid_count, seeds.len(), geometry.total_biomass()
    );
    Ok(geometry)
}
