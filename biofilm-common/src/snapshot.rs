use serde::{Serialize, Deserialize};
use crate::cell::{CellState, Extents};

/// Full-grid fields captured alongside a snapshot, indexed by `Extents::index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellFields {
    pub total: Vec<f64>,
    pub state: Vec<CellState>,
    pub age: Vec<u32>,
}

/// A snapshot of the engine state and metrics at a specific step.
#[derive(Debug, Clone, Serialize, Deserialize)] // Derive traits for easy saving/loading
pub struct Snapshot {
    /// The step after which the snapshot was taken.
    pub step: u32,
    /// Grid size, so readers can slice `fields`.
    pub extents: Extents,
    /// Sum of biomass over all non-excluded cells and species.
    pub total_biomass: f64,
    pub biofilm_cells: u32,
    pub pore_cells: u32,
    /// Largest per-cell total.
    pub max_total: f64,
    pub max_age: u32,
    /// Push/pull sweeps spent during this step.
    pub sweeps: u32,
    /// Transfers applied during this step (local + relayed).
    pub transfers: u64,
    /// Present only when `output.save_fields_in_snapshot` is set.
    pub fields: Option<CellFields>,
}
