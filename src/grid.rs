use biofilm_common::{Coord, Direction, EngineParams};

/// Face neighbor of `c` in `dir`, if it lies inside the redistribution region
/// (the grid minus the inlet/outlet layers along x).
#[inline(always)]
pub fn interior_neighbor(c: Coord, dir: Direction, params: &EngineParams) -> Option<Coord> {
    let n = c.step(dir, params.extents)?;
    if params.is_interior(n) { Some(n) } else { None }
}

/// Helper to iterate over the face neighbors of a cell.
/// Calls `f` for each neighbor inside the redistribution region, in `Direction::ALL` order.
#[inline(always)]
pub fn for_each_neighbor<F>(c: Coord, params: &EngineParams, mut f: F)
where
    F: FnMut(Direction, Coord),
{
    for dir in Direction::ALL {
        if let Some(n) = interior_neighbor(c, dir, params) {
            f(dir, n);
        }
    }
}

/// Returns the *first* neighbor (in `Direction::ALL` order) for which `f` returns `true`.
#[inline(always)]
pub fn find_first_neighbor<F>(c: Coord, params: &EngineParams, mut f: F) -> Option<(Direction, Coord)>
where
    F: FnMut(Direction, Coord) -> bool,
{
    Direction::ALL.into_iter().find_map(|dir| {
        let n = interior_neighbor(c, dir, params)?;
        if f(dir, n) { Some((dir, n)) } else { None }
    })
}
