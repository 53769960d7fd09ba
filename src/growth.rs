use biofilm_common::{CellState, Coord};

/// Source of per-cell, per-species biomass increments applied before each
/// redistribution cycle. Implementations stand in for the kinetics solver.
pub trait GrowthSource: Sync {
    /// Writes the already time-integrated increment for each species of `cell`
    /// into `delta` (same length as `biomass`).
    fn increment(&self, cell: Coord, state: CellState, biomass: &[f64], delta: &mut [f64]);
}

/// First-order growth, `ΔB = rate · B`, in every non-excluded cell.
#[derive(Debug, Clone, Copy)]
pub struct UniformGrowth {
    pub rate: f64,
}

impl GrowthSource for UniformGrowth {
    fn increment(&self, _cell: Coord, state: CellState, biomass: &[f64], delta: &mut [f64]) {
        if state.is_excluded() {
            delta.fill(0.0);
            return;
        }
        for (d, b) in delta.iter_mut().zip(biomass) {
            *d = self.rate * b;
        }
    }
}

/// Fixed increments at listed cells; everything else stays unchanged.
#[derive(Debug, Clone, Default)]
pub struct PointGrowth {
    pub increments: Vec<(Coord, Vec<f64>)>,
}

impl GrowthSource for PointGrowth {
    fn increment(&self, cell: Coord, _state: CellState, _biomass: &[f64], delta: &mut [f64]) {
        delta.fill(0.0);
        for (c, inc) in &self.increments {
            if *c == cell {
                for (d, i) in delta.iter_mut().zip(inc) {
                    *d += i;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_growth_skips_excluded_cells() {
        let g = UniformGrowth { rate: 0.5 };
        let mut delta = [1.0, 1.0];
        g.increment(Coord::new(0, 0, 0), CellState::Solid, &[2.0, 4.0], &mut delta);
        assert_eq!(delta, [0.0, 0.0]);
        g.increment(Coord::new(0, 0, 0), CellState::Biofilm(3), &[2.0, 4.0], &mut delta);
        assert_eq!(delta, [1.0, 2.0]);
    }

    #[test]
    fn point_growth_targets_one_cell() {
        let g = PointGrowth { increments: vec![(Coord::new(1, 0, 0), vec![0.25])] };
        let mut delta = [9.0];
        g.increment(Coord::new(0, 0, 0), CellState::Pore(2), &[0.0], &mut delta);
        assert_eq!(delta, [0.0]);
        g.increment(Coord::new(1, 0, 0), CellState::Pore(2), &[0.0], &mut delta);
        assert_eq!(delta, [0.25]);
    }
}
