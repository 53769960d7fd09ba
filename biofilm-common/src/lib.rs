pub mod cell;
pub mod config;
pub mod params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use cell::{CellState, Coord, Direction, Extents, TypeTable};
pub use config::{EngineConfig, GridConfig, BiomassConfig, RedistributionConfig, PartitionConfig, CellTypesConfig, SpeciesConfig, GeometryConfig, GrowthConfig, TimingConfig, OutputConfig, PushPolicy};
pub use params::EngineParams;
pub use snapshot::{CellFields, Snapshot};
