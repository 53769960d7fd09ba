use biofilm_common::{Coord, EngineParams};

use crate::subdomain::Subdomain;

/// Result of one aggregation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateReport {
    /// Largest `total - bmax` over interior cells (0 when nothing is over).
    pub max_excess: f64,
    pub max_excess_cell: Option<Coord>,
    /// Interior cells whose excess is above tolerance.
    pub over_capacity: u64,
    /// Sum over owned non-excluded cells and all species.
    pub total_biomass: f64,
    pub max_total: f64,
}

impl AggregateReport {
    pub fn merge(&mut self, other: &AggregateReport) {
        if other.max_excess > self.max_excess {
            self.max_excess = other.max_excess;
            self.max_excess_cell = other.max_excess_cell;
        }
        self.over_capacity += other.over_capacity;
        self.total_biomass += other.total_biomass;
        self.max_total = self.max_total.max(other.max_total);
    }

    pub fn is_over_capacity(&self, tolerance: f64) -> bool {
        self.max_excess > tolerance
    }
}

/// Recomputes `total` for every owned non-excluded cell and scans for capacity violations.
pub fn aggregate(sub: &mut Subdomain, params: &EngineParams) -> AggregateReport {
    let mut report = AggregateReport::default();
    for k in 0..sub.owned_indices().len() {
        let li = sub.owned_indices()[k];
        if sub.state[li].is_excluded() {
            sub.total[li] = 0.0;
            continue;
        }
        let total: f64 = sub.species(li).iter().sum();
        sub.total[li] = total;
        report.total_biomass += total;
        report.max_total = report.max_total.max(total);

        let c = sub.local.coord(li);
        if !params.is_interior(c) {
            continue;
        }
        let excess = total - params.bmax;
        if excess > params.tolerance {
            report.over_capacity += 1;
        }
        if excess > report.max_excess {
            report.max_excess = excess;
            report.max_excess_cell = Some(c);
        }
    }
    report
}
