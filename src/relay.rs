use biofilm_common::{Coord, Direction, Extents};

use crate::error::EngineError;
use crate::subdomain::Subdomain;

/// A staged cross-partition credit: `amounts[s]` of species `s` leaving `from`
/// toward its face neighbor in `direction`. The debit has already been applied
/// at the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub from: Coord,
    pub direction: Direction,
    pub amounts: Vec<f64>,
}

impl Transfer {
    pub fn target(&self, extents: Extents) -> Option<Coord> {
        self.from.step(self.direction, extents)
    }

    pub fn mass(&self) -> f64 {
        self.amounts.iter().sum()
    }
}

/// Per-face queues of staged transfers. A transfer from an owned cell whose
/// target lies outside the owned box always leaves through the face it points
/// at, so the slot is the transfer's own direction.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    slots: [Vec<Transfer>; 6],
}

impl Outbox {
    pub fn stage(&mut self, transfer: Transfer) {
        self.slots[transfer.direction.index()].push(transfer);
    }

    /// Transfers leaving through the face facing `dir`.
    pub fn slot(&self, dir: Direction) -> &[Transfer] {
        &self.slots[dir.index()]
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
    }
}

/// Applies inbound transfers to `sub`. Every transfer must land in a cell the
/// worker owns. Returns the number of credits applied and the mass they carried.
///
/// Totals are left stale; the caller re-aggregates after the pull phase.
pub fn apply_inbound<'a, I>(sub: &mut Subdomain, inbound: I, extents: Extents) -> Result<(u64, f64), EngineError>
where
    I: IntoIterator<Item = &'a Transfer>,
{
    let mut applied = 0u64;
    let mut mass = 0.0;
    for t in inbound {
        let target = t
            .target(extents)
            .filter(|&c| sub.owns(c))
            .ok_or(EngineError::MisroutedTransfer { from: t.from, direction: t.direction, worker: sub.id })?;
        let li = sub.local.local_index(target);
        for (b, a) in sub.species_mut(li).iter_mut().zip(&t.amounts) {
            *b += *a;
        }
        applied += 1;
        mass += t.mass();
    }
    Ok((applied, mass))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::Decomposition;
    use crate::geometry::Geometry;
    use biofilm_common::CellState;

    #[test]
    fn outbox_slots_by_direction() {
        let mut outbox = Outbox::default();
        outbox.stage(Transfer { from: Coord::new(1, 0, 0), direction: Direction::XPos, amounts: vec![0.5] });
        outbox.stage(Transfer { from: Coord::new(1, 0, 0), direction: Direction::YNeg, amounts: vec![0.1] });
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.slot(Direction::XPos).len(), 1);
        assert!(outbox.slot(Direction::XNeg).is_empty());
        outbox.clear();
        assert!(outbox.is_empty());
    }

    /// 4x1x1 biofilm row split in two; worker 0 owns x = 0..2.
    fn left_worker(num_species: usize) -> Subdomain {
        let e = Extents::new(4, 1, 1);
        let g = Geometry::new(e, vec![CellState::Biofilm(3); 4], num_species).unwrap();
        let d = Decomposition::new(e, [2, 1, 1]).unwrap();
        Subdomain::new(0, &d, &g)
    }

    #[test]
    fn inbound_credits_land_per_species_once() {
        let e = Extents::new(4, 1, 1);
        let mut sub = left_worker(2);
        let inbound = vec![Transfer { from: Coord::new(2, 0, 0), direction: Direction::XNeg, amounts: vec![0.3, 0.2] }];

        let (applied, mass) = apply_inbound(&mut sub, &inbound, e).unwrap();
        assert_eq!(applied, 1);
        assert!((mass - 0.5).abs() < 1e-15);
        let li = sub.local.local_index(Coord::new(1, 0, 0));
        assert_eq!(sub.species(li), &[0.3, 0.2]);
        let untouched = sub.local.local_index(Coord::new(0, 0, 0));
        assert_eq!(sub.species(untouched), &[0.0, 0.0]);
    }

    #[test]
    fn inbound_for_a_foreign_cell_is_rejected() {
        let e = Extents::new(4, 1, 1);
        let mut sub = left_worker(1);
        let stray = Transfer { from: Coord::new(2, 0, 0), direction: Direction::XPos, amounts: vec![0.4] };
        assert_eq!(
            apply_inbound(&mut sub, [&stray], e),
            Err(EngineError::MisroutedTransfer { from: Coord::new(2, 0, 0), direction: Direction::XPos, worker: 0 })
        );

        // off the grid entirely
        let lost = Transfer { from: Coord::new(0, 0, 0), direction: Direction::XNeg, amounts: vec![0.4] };
        assert!(matches!(apply_inbound(&mut sub, [&lost], e), Err(EngineError::MisroutedTransfer { .. })));
        assert!(sub.biomass.iter().all(|&b| b == 0.0));
    }
}
