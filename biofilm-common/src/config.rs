use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::cell::{Extents, TypeTable};
use crate::params::EngineParams; // Use crate::params
use std::path::Path;

// Grid extents and the inlet/outlet layers excluded from redistribution
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    #[serde(default)]
    pub boundary_gap: usize,
}

// Capacity and reclassification settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BiomassConfig {
    pub bmax: f64,
    pub threshold_fraction: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PushPolicy {
    Full,
    Half,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RedistributionConfig {
    #[serde(default = "default_policy")]
    pub policy: PushPolicy,
    #[serde(default = "default_half_push_fraction")]
    pub half_push_fraction: f64,
    #[serde(default = "default_max_sweeps")]
    pub max_sweeps: u32,
    #[serde(default = "default_age_refresh_interval")]
    pub age_refresh_interval: u32,
    #[serde(default = "default_max_age_iterations")]
    pub max_age_iterations: u32,
    /// Fixed seed for neighbor shuffling; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PartitionConfig {
    #[serde(default = "default_workers")]
    pub workers: [usize; 3],
}

// Raw type ids recognised by the geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellTypesConfig {
    pub solid: u16,
    pub wall: u16,
    pub pore: Vec<u16>,
    pub default_pore: u16,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpeciesConfig {
    pub name: String,
    pub biofilm_type: u16,
}

// Synthetic porous medium used when no external geometry is supplied
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GeometryConfig {
    pub grain_fraction: f64,
    pub grain_radius_mean: f64,
    pub grain_radius_std: f64,
    pub seed_biomass: f64,
    /// Suspended biomass placed in every interior pore cell at start-up.
    #[serde(default)]
    pub planktonic_biomass: f64,
    pub seed: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GrowthConfig {
    pub rate_per_step: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub steps: u32,
    pub record_interval: u32,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_stats: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default)]
    pub save_fields_in_snapshot: bool,
    #[serde(default)]
    pub save_final_csv: bool,
}

// Main engine configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub biomass: BiomassConfig,
    #[serde(default)]
    pub redistribution: RedistributionConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    pub cell_types: CellTypesConfig,
    pub species: Vec<SpeciesConfig>,
    pub geometry: GeometryConfig,
    pub growth: GrowthConfig,
    pub timing: TimingConfig,
    pub output: OutputConfig,
}

impl Default for RedistributionConfig {
    fn default() -> Self {
        RedistributionConfig {
            policy: default_policy(),
            half_push_fraction: default_half_push_fraction(),
            max_sweeps: default_max_sweeps(),
            age_refresh_interval: default_age_refresh_interval(),
            max_age_iterations: default_max_age_iterations(),
            seed: None,
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        PartitionConfig { workers: default_workers() }
    }
}

impl EngineConfig {
    /// Loads the engine configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let g = &self.grid;
        if g.nx == 0 || g.ny == 0 || g.nz == 0 {
            anyhow::bail!("grid extents must be positive.");
        }
        if 2 * g.boundary_gap >= g.nx {
            anyhow::bail!("boundary_gap ({}) leaves no interior along x (nx = {}).", g.boundary_gap, g.nx);
        }
        if !(self.biomass.bmax > 0.0) {
            anyhow::bail!("bmax must be positive.");
        }
        if !(0.0..=1.0).contains(&self.biomass.threshold_fraction) {
            anyhow::bail!("threshold_fraction must lie in [0, 1].");
        }
        if !(self.biomass.tolerance >= 0.0) {
            anyhow::bail!("tolerance must be non-negative.");
        }
        let r = &self.redistribution;
        if !(r.half_push_fraction > 0.0 && r.half_push_fraction <= 1.0) {
            anyhow::bail!("half_push_fraction must lie in (0, 1].");
        }
        if r.max_sweeps == 0 || r.max_age_iterations == 0 {
            anyhow::bail!("max_sweeps and max_age_iterations must be greater than 0.");
        }
        if r.age_refresh_interval == 0 {
            anyhow::bail!("age_refresh_interval must be greater than 0.");
        }
        for (axis, (&p, n)) in self.partition.workers.iter().zip([g.nx, g.ny, g.nz]).enumerate() {
            if p == 0 || p > n {
                anyhow::bail!("partition.workers[{}] = {} must lie in 1..={}.", axis, p, n);
            }
        }
        let t = &self.cell_types;
        if t.pore.is_empty() {
            anyhow::bail!("at least one pore type id is required.");
        }
        if !t.pore.contains(&t.default_pore) {
            anyhow::bail!("default_pore ({}) is not one of the pore ids {:?}.", t.default_pore, t.pore);
        }
        if t.solid == t.wall || t.pore.contains(&t.solid) || t.pore.contains(&t.wall) {
            anyhow::bail!("solid, wall and pore type ids must be distinct.");
        }
        if self.species.is_empty() {
            anyhow::bail!("at least one [[species]] entry is required.");
        }
        for s in &self.species {
            let bt = s.biofilm_type;
            if bt == t.solid || bt == t.wall || t.pore.contains(&bt) {
                anyhow::bail!("species '{}' uses reserved type id {} as its biofilm type.", s.name, bt);
            }
        }
        if self.timing.record_interval == 0 {
            anyhow::bail!("record_interval must be greater than 0.");
        }
        Ok(())
    }

    pub fn type_table(&self) -> TypeTable {
        TypeTable {
            solid: self.cell_types.solid,
            wall: self.cell_types.wall,
            pore: self.cell_types.pore.clone(),
            default_pore: self.cell_types.default_pore,
        }
    }

    /// Converts the configuration into engine parameters used at runtime.
    pub fn get_engine_params(&self) -> EngineParams {
        let extents = Extents::new(self.grid.nx, self.grid.ny, self.grid.nz);
        let species_biofilm_types = self.species.iter().map(|s| s.biofilm_type).collect();

        EngineParams {
            extents,
            boundary_gap: self.grid.boundary_gap,
            bmax: self.biomass.bmax,
            threshold_biomass: self.biomass.threshold_fraction * self.biomass.bmax,
            tolerance: self.biomass.tolerance,
            push_policy: self.redistribution.policy,
            half_push_fraction: self.redistribution.half_push_fraction,
            max_sweeps: self.redistribution.max_sweeps,
            age_refresh_interval: self.redistribution.age_refresh_interval,
            max_age_iterations: self.redistribution.max_age_iterations,
            species_biofilm_types,
            types: self.type_table(),
            workers: self.partition.workers,
        }
    }
}

fn default_tolerance() -> f64 {
    1e-12
}

fn default_policy() -> PushPolicy {
    PushPolicy::Full
}

fn default_half_push_fraction() -> f64 {
    0.5
}

fn default_max_sweeps() -> u32 {
    2000
}

fn default_age_refresh_interval() -> u32 {
    50
}

fn default_max_age_iterations() -> u32 {
    1000
}

fn default_workers() -> [usize; 3] {
    [1, 1, 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [grid]
        nx = 8
        ny = 4
        nz = 4

        [biomass]
        bmax = 1.0
        threshold_fraction = 0.1

        [cell_types]
        solid = 0
        wall = 1
        pore = [2]
        default_pore = 2

        [[species]]
        name = "heterotroph"
        biofilm_type = 3

        [geometry]
        grain_fraction = 0.2
        grain_radius_mean = 1.5
        grain_radius_std = 0.3
        seed_biomass = 0.4
        seed = 7

        [growth]
        rate_per_step = 0.05

        [timing]
        steps = 10
        record_interval = 5

        [output]
        base_filename = "biofilm"
        save_stats = false
    "#;

    #[test]
    fn defaults_match_reference_limits() {
        let config = EngineConfig::from_toml_str(MINIMAL).unwrap();
        let params = config.get_engine_params();
        assert_eq!(params.max_sweeps, 2000);
        assert_eq!(params.max_age_iterations, 1000);
        assert_eq!(params.age_refresh_interval, 50);
        assert_eq!(params.push_policy, PushPolicy::Full);
        assert_eq!(params.workers, [1, 1, 1]);
        assert!((params.threshold_biomass - 0.1).abs() < 1e-15);
    }

    #[test]
    fn rejects_species_on_pore_type() {
        let bad = MINIMAL.replace("biofilm_type = 3", "biofilm_type = 2");
        assert!(EngineConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn rejects_oversplit_partition() {
        let bad = format!("{}\n[partition]\nworkers = [9, 1, 1]\n", MINIMAL);
        assert!(EngineConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn parses_half_policy() {
        let half = format!("{}\n[redistribution]\npolicy = \"half\"\nseed = 3\n", MINIMAL);
        let config = EngineConfig::from_toml_str(&half).unwrap();
        assert_eq!(config.redistribution.policy, PushPolicy::Half);
        assert_eq!(config.redistribution.seed, Some(3));
    }
}
