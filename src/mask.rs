use biofilm_common::{CellState, EngineParams};

use crate::error::EngineError;
use crate::grid::find_first_neighbor;
use crate::subdomain::Subdomain;

/// Cells reclassified by one mask update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskReport {
    pub to_biofilm: u64,
    pub to_pore: u64,
}

impl MaskReport {
    pub fn merge(&mut self, other: &MaskReport) {
        self.to_biofilm += other.to_biofilm;
        self.to_pore += other.to_pore;
    }

    pub fn changed(&self) -> bool {
        self.to_biofilm + self.to_pore > 0
    }
}

/// Reclassifies owned interior cells whose total crossed the biofilm threshold.
///
/// Decisions read the states as they were before the update, so the result does
/// not depend on scan order or on how the grid is partitioned.
pub fn update_mask(sub: &mut Subdomain, params: &EngineParams) -> Result<MaskReport, EngineError> {
    let mut report = MaskReport::default();
    let mut changes = Vec::new();

    for li in sub.interior_indices(params) {
        let total = sub.total[li];
        match sub.state[li] {
            CellState::Pore(_) if total >= params.threshold_biomass && total > params.tolerance => {
                changes.push((li, CellState::Biofilm(biofilm_type_for(sub, li, params)?)));
                report.to_biofilm += 1;
            }
            CellState::Biofilm(_) if total < params.threshold_biomass => {
                changes.push((li, CellState::Pore(pore_type_for(sub, li, params))));
                report.to_pore += 1;
            }
            _ => {}
        }
    }

    for (li, state) in changes {
        sub.state[li] = state;
    }
    Ok(report)
}

fn biofilm_type_for(sub: &Subdomain, li: usize, params: &EngineParams) -> Result<u16, EngineError> {
    let mut candidates: Vec<u16> = Vec::with_capacity(params.num_species());
    for (&b, &t) in sub.species(li).iter().zip(&params.species_biofilm_types) {
        if b > params.tolerance && !candidates.contains(&t) {
            candidates.push(t);
        }
    }
    match candidates.as_slice() {
        [] => Err(EngineError::BiofilmTypeUndetermined { cell: sub.local.coord(li), total: sub.total[li] }),
        [only] => Ok(*only),
        [first, ..] => {
            let c = sub.local.coord(li);
            let neighbor_type = find_first_neighbor(c, params, |_, n| {
                matches!(sub.idx(n).map(|ni| sub.state[ni]), Some(CellState::Biofilm(t)) if candidates.contains(&t))
            })
            .and_then(|(_, n)| sub.idx(n))
            .and_then(|ni| match sub.state[ni] {
                CellState::Biofilm(t) => Some(t),
                _ => None,
            });
            Ok(neighbor_type.unwrap_or(*first))
        }
    }
}

fn pore_type_for(sub: &Subdomain, li: usize, params: &EngineParams) -> u16 {
    if params.types.pore.len() <= 1 {
        return params.types.default_pore;
    }
    let c = sub.local.coord(li);
    find_first_neighbor(c, params, |_, n| {
        matches!(sub.idx(n).map(|ni| sub.state[ni]), Some(CellState::Pore(_)))
    })
    .and_then(|(_, n)| sub.idx(n))
    .and_then(|ni| match sub.state[ni] {
        CellState::Pore(t) => Some(t),
        _ => None,
    })
    .unwrap_or(params.types.default_pore)
}
