//! Capacity-constrained biomass overflow redistribution on a partitioned 3-D grid.

pub mod aggregate;
pub mod decomposition;
pub mod error;
pub mod front_age;
pub mod geometry;
pub mod grid;
pub mod growth;
pub mod mask;
pub mod metrics;
pub mod redistribution;
pub mod relay;
pub mod simulation;
pub mod subdomain;

pub use error::EngineError;
pub use geometry::Geometry;
pub use growth::{GrowthSource, PointGrowth, UniformGrowth};
pub use metrics::RedistributionMetrics;
pub use simulation::{BiofilmSimulation, StepReport};
