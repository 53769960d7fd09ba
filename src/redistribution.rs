use biofilm_common::{Coord, Direction, EngineParams, PushPolicy};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::EngineError;
use crate::grid::for_each_neighbor;
use crate::metrics::RedistributionMetrics;
use crate::relay::Transfer;
use crate::subdomain::Subdomain;

/// A face neighbor of a source cell: direction, global coordinate, local index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dir: Direction,
    coord: Coord,
    li: usize,
}

/// Amount a source cell tries to shed in one sweep.
#[inline(always)]
pub fn shed_amount(total: f64, params: &EngineParams) -> f64 {
    match params.push_policy {
        PushPolicy::Full => total - params.bmax,
        PushPolicy::Half => params.half_push_fraction * total,
    }
}

/// Runs the push phase of one sweep on one worker.
///
/// Sources and their excess come from the totals at the start of the sweep (halo
/// included), so every worker decides against the same picture of the grid.
/// Headroom is tracked in `claimed`, which starts from those totals and grows with
/// every credit this worker makes, staged or not. Credits inside the owned box
/// are applied to `biomass` immediately; the rest go to the outbox.
///
/// `total` is left stale; the caller re-aggregates after the pull phase.
pub fn push_sweep(
    sub: &mut Subdomain,
    params: &EngineParams,
    rng: &mut StdRng,
) -> Result<RedistributionMetrics, EngineError> {
    let mut metrics = RedistributionMetrics::default();
    let mut claimed = sub.total.clone();
    let sources: Vec<usize> = sub
        .interior_indices(params)
        .filter(|&li| sub.total[li] - params.bmax > params.tolerance)
        .collect();

    let mut candidates: Vec<Candidate> = Vec::with_capacity(6);
    for li in sources {
        let c = sub.local.coord(li);
        let total = sub.total[li];
        let excess = total - params.bmax;

        candidates.clear();
        for_each_neighbor(c, params, |dir, coord| {
            if let Some(ni) = sub.idx(coord) {
                candidates.push(Candidate { dir, coord, li: ni });
            }
        });
        if !candidates.iter().any(|cand| sub.state[cand.li].can_receive()) {
            return Err(EngineError::NoReceivingNeighbor { cell: c, excess });
        }
        candidates.shuffle(rng);
        metrics.sources += 1;

        // composition from the live biomass, which may include fallback credits from this sweep
        let live: f64 = sub.species(li).iter().sum();
        let fractions: Vec<f64> = sub.species(li).iter().map(|b| b / live).collect();
        let mut remaining = shed_amount(total, params);

        // Primary pass: capacity-respecting placement
        for cand in &candidates {
            if remaining <= params.tolerance {
                break;
            }
            if !sub.state[cand.li].can_receive() || claimed[cand.li] >= params.bmax {
                continue;
            }
            let amount = remaining.min(params.bmax - claimed[cand.li]);
            if amount <= params.tolerance {
                continue;
            }
            let moved = move_mass(sub, &mut claimed, li, *cand, amount, &fractions, params, &mut metrics);
            remaining -= moved;
        }

        // Fallback: dump what is left on one neighbor, ignoring its headroom
        if remaining > params.tolerance {
            if let Some(cand) = choose_fallback(sub, &candidates, li, rng) {
                move_mass(sub, &mut claimed, li, cand, remaining, &fractions, params, &mut metrics);
                metrics.fallback_transfers += 1;
            }
        }
    }
    Ok(metrics)
}

/// Fallback recipient among the receiving candidates: strictly closer to the pore
/// if any, else equally close, else any. Within the tier the youngest front age
/// wins, ties broken at random.
fn choose_fallback(sub: &Subdomain, candidates: &[Candidate], source: usize, rng: &mut StdRng) -> Option<Candidate> {
    let d0 = sub.distance[source];
    let pool: Vec<Candidate> = candidates.iter().copied().filter(|c| sub.state[c.li].can_receive()).collect();
    let closer: Vec<Candidate> = pool.iter().copied().filter(|c| sub.distance[c.li] < d0).collect();
    let tier = if !closer.is_empty() {
        closer
    } else {
        let equal: Vec<Candidate> = pool.iter().copied().filter(|c| sub.distance[c.li] == d0).collect();
        if !equal.is_empty() { equal } else { pool }
    };
    let youngest = tier.iter().map(|c| sub.age[c.li]).min()?;
    let ties: Vec<Candidate> = tier.into_iter().filter(|c| sub.age[c.li] == youngest).collect();
    Some(ties[rng.random_range(0..ties.len())])
}

/// Debits `amount` from `source` split by `fractions` and credits it to `cand`,
/// directly when owned, through the outbox otherwise. A transfer whose total is
/// at or below tolerance is dropped whole; above it every species share moves,
/// however small. Returns the mass actually moved.
#[allow(clippy::too_many_arguments)]
fn move_mass(
    sub: &mut Subdomain,
    claimed: &mut [f64],
    source: usize,
    cand: Candidate,
    amount: f64,
    fractions: &[f64],
    params: &EngineParams,
    metrics: &mut RedistributionMetrics,
) -> f64 {
    if amount <= params.tolerance {
        return 0.0;
    }
    let amounts: Vec<f64> = sub
        .species(source)
        .iter()
        .zip(fractions)
        .map(|(&b, &f)| (f * amount).min(b))
        .collect();
    let moved: f64 = amounts.iter().sum();
    if moved <= 0.0 {
        return 0.0;
    }

    for (b, a) in sub.species_mut(source).iter_mut().zip(&amounts) {
        *b -= *a;
    }
    claimed[cand.li] += moved;
    metrics.mass_moved += moved;

    if sub.owns(cand.coord) {
        for (b, a) in sub.species_mut(cand.li).iter_mut().zip(&amounts) {
            *b += *a;
        }
        metrics.local_transfers += 1;
    } else {
        let from = sub.local.coord(source);
        sub.outbox.stage(Transfer { from, direction: cand.dir, amounts });
        metrics.staged_transfers += 1;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::Decomposition;
    use crate::geometry::Geometry;
    use biofilm_common::{CellState, Extents};
    use rand::SeedableRng;

    /// 1-D row: pore | biofilm | source | biofilm | solid, source distance 2.
    fn row(source: f64, right: f64) -> (Subdomain, EngineParams) {
        let e = Extents::new(5, 1, 1);
        let state = vec![
            CellState::Pore(2),
            CellState::Biofilm(3),
            CellState::Biofilm(3),
            CellState::Biofilm(3),
            CellState::Solid,
        ];
        let mut g = Geometry::new(e, state, 1).unwrap();
        g.set_biomass(Coord::new(1, 0, 0), &[1.0]).unwrap();
        g.set_biomass(Coord::new(2, 0, 0), &[source]).unwrap();
        g.set_biomass(Coord::new(3, 0, 0), &[right]).unwrap();
        let d = Decomposition::new(e, [1, 1, 1]).unwrap();
        (Subdomain::new(0, &d, &g), EngineParams::with_defaults(e, vec![3], 1.0))
    }

    #[test]
    fn fallback_prefers_cell_closer_to_pore() {
        // Both neighbors full; the left one is closer to the pore.
        for seed in 0..8 {
            let (mut sub, params) = row(1.5, 1.0);
            let mut rng = StdRng::seed_from_u64(seed);
            let m = push_sweep(&mut sub, &params, &mut rng).unwrap();
            assert_eq!(m.fallback_transfers, 1);
            assert!((sub.species(1)[0] - 1.5).abs() < 1e-12);
            assert!((sub.species(3)[0] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn primary_pass_respects_headroom() {
        let (mut sub, params) = row(1.5, 0.8);
        let mut rng = StdRng::seed_from_u64(1);
        let m = push_sweep(&mut sub, &params, &mut rng).unwrap();
        assert_eq!(m.local_transfers, 2);
        assert_eq!(m.fallback_transfers, 1);
        // 0.2 fills the right cell, the remaining 0.3 goes toward the pore
        assert!((sub.species(3)[0] - 1.0).abs() < 1e-12);
        assert!((sub.species(1)[0] - 1.3).abs() < 1e-12);
        assert!((sub.species(2)[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn half_policy_sheds_fraction_of_total() {
        let (mut sub, mut params) = row(1.5, 0.0);
        params.push_policy = PushPolicy::Half;
        let mut rng = StdRng::seed_from_u64(3);
        push_sweep(&mut sub, &params, &mut rng).unwrap();
        assert!((sub.species(2)[0] - 0.75).abs() < 1e-12);
        assert!((sub.species(3)[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn cells_within_capacity_are_not_touched() {
        let (mut sub, params) = row(0.9, 0.2);
        let before = sub.biomass.clone();
        let mut rng = StdRng::seed_from_u64(0);
        let m = push_sweep(&mut sub, &params, &mut rng).unwrap();
        assert_eq!(m.applied_transfers(), 0);
        assert_eq!(sub.biomass, before);
    }
}
