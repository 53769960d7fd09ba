use serde::{Deserialize, Serialize};

/// Counters for one or more redistribution passes.
///
/// Passes return their own counts; the caller decides what to merge them into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RedistributionMetrics {
    /// Completed push/pull sweeps.
    pub sweeps: u32,
    /// Transfers applied directly inside a worker's owned region.
    pub local_transfers: u64,
    /// Transfers staged into an outbox for another worker.
    pub staged_transfers: u64,
    /// Staged transfers applied by their destination worker in the pull phase.
    pub relayed_transfers: u64,
    /// Placements made by the fallback pass (may overfill the recipient).
    pub fallback_transfers: u64,
    /// Over-capacity cells visited by push passes.
    pub sources: u64,
    /// Biomass moved, summed over species.
    pub mass_moved: f64,
    pub age_refreshes: u32,
    pub age_iterations: u32,
}

impl RedistributionMetrics {
    pub fn merge(&mut self, other: &RedistributionMetrics) {
        self.sweeps += other.sweeps;
        self.local_transfers += other.local_transfers;
        self.staged_transfers += other.staged_transfers;
        self.relayed_transfers += other.relayed_transfers;
        self.fallback_transfers += other.fallback_transfers;
        self.sources += other.sources;
        self.mass_moved += other.mass_moved;
        self.age_refreshes += other.age_refreshes;
        self.age_iterations += other.age_iterations;
    }

    /// Transfers that changed a recipient cell.
    pub fn applied_transfers(&self) -> u64 {
        self.local_transfers + self.relayed_transfers
    }
}
