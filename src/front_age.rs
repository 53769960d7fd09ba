use biofilm_common::EngineParams;

use crate::grid::for_each_neighbor;
use crate::subdomain::Subdomain;

/// Whether the cell at `li` may advance its front age by one this pass.
fn can_promote(sub: &Subdomain, li: usize, params: &EngineParams) -> bool {
    let at_capacity = params.bmax - params.tolerance;
    let c = sub.local.coord(li);
    let age = sub.age[li];
    match age {
        0 => true,
        1 => {
            // blocked by a younger-than-front cell on the pore side
            let mut blocked = false;
            for_each_neighbor(c, params, |_, n| {
                if let Some(ni) = sub.idx(n) {
                    if !sub.state[ni].is_excluded() && sub.distance[ni] < sub.distance[li] && sub.age[ni] == 0 {
                        blocked = true;
                    }
                }
            });
            !blocked
        }
        k => {
            let mut any = false;
            let mut all_settled = true;
            for_each_neighbor(c, params, |_, n| {
                if let Some(ni) = sub.idx(n) {
                    if sub.state[ni].is_excluded() {
                        return;
                    }
                    any = true;
                    if sub.total[ni] < at_capacity || sub.age[ni] < k {
                        all_settled = false;
                    }
                }
            });
            any && all_settled
        }
    }
}

/// One in-place pass over the worker's owned interior cells. Only cells at
/// capacity are aged. Returns the number of promotions.
pub fn age_pass(sub: &mut Subdomain, params: &EngineParams) -> u64 {
    let at_capacity = params.bmax - params.tolerance;
    let cells: Vec<usize> = sub.interior_indices(params).filter(|&li| sub.total[li] >= at_capacity).collect();
    let mut promoted = 0;
    for li in cells {
        if can_promote(sub, li, params) {
            sub.age[li] += 1;
            promoted += 1;
        }
    }
    promoted
}

/// Sum of front ages over owned cells.
pub fn age_sum(sub: &Subdomain) -> u64 {
    sub.owned_indices().iter().map(|&li| sub.age[li] as u64).sum()
}
