use biofilm_common::{Coord, Direction, Extents};
use crate::error::EngineError;

/// Axis-aligned box of cells, `lo` inclusive and `hi` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub lo: Coord,
    pub hi: Coord,
}

impl Region {
    pub fn new(lo: Coord, hi: Coord) -> Self {
        Region { lo, hi }
    }

    #[inline(always)]
    pub fn contains(&self, c: Coord) -> bool {
        c.x >= self.lo.x && c.x < self.hi.x
            && c.y >= self.lo.y && c.y < self.hi.y
            && c.z >= self.lo.z && c.z < self.hi.z
    }

    pub fn dims(&self) -> Extents {
        Extents::new(self.hi.x - self.lo.x, self.hi.y - self.lo.y, self.hi.z - self.lo.z)
    }

    pub fn num_cells(&self) -> usize {
        self.dims().num_cells()
    }

    /// Index of `c` in a buffer laid out over this region, x fastest.
    /// `c` must be contained in the region.
    #[inline(always)]
    pub fn local_index(&self, c: Coord) -> usize {
        let d = self.dims();
        d.index(Coord::new(c.x - self.lo.x, c.y - self.lo.y, c.z - self.lo.z))
    }

    #[inline(always)]
    pub fn coord(&self, local_idx: usize) -> Coord {
        let c = self.dims().coord(local_idx);
        Coord::new(c.x + self.lo.x, c.y + self.lo.y, c.z + self.lo.z)
    }

    /// Cells in buffer order.
    pub fn iter(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.num_cells()).map(move |i| self.coord(i))
    }

    /// Grows the box by `layers` cells on every side, clamped to `extents`.
    pub fn expanded(&self, layers: usize, extents: Extents) -> Region {
        Region {
            lo: Coord::new(
                self.lo.x.saturating_sub(layers),
                self.lo.y.saturating_sub(layers),
                self.lo.z.saturating_sub(layers),
            ),
            hi: Coord::new(
                (self.hi.x + layers).min(extents.nx),
                (self.hi.y + layers).min(extents.ny),
                (self.hi.z + layers).min(extents.nz),
            ),
        }
    }
}

/// Splits `n` cells over `parts` blocks: every block gets `n / parts`, the first
/// `n % parts` blocks one extra. Returns the block start offsets plus `n`.
fn split_axis(n: usize, parts: usize) -> Vec<usize> {
    let base = n / parts;
    let rem = n % parts;
    let mut bounds = Vec::with_capacity(parts + 1);
    let mut start = 0;
    bounds.push(start);
    for p in 0..parts {
        start += base + usize::from(p < rem);
        bounds.push(start);
    }
    bounds
}

/// Block decomposition of the grid into `px * py * pz` disjoint owned regions.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub extents: Extents,
    pub workers: [usize; 3],
    bounds: [Vec<usize>; 3],
}

impl Decomposition {
    pub fn new(extents: Extents, workers: [usize; 3]) -> Result<Self, EngineError> {
        let dims = [extents.nx, extents.ny, extents.nz];
        for axis in 0..3 {
            if workers[axis] == 0 || workers[axis] > dims[axis] {
                return Err(EngineError::InvalidDecomposition(format!(
                    "{} workers along axis {} for {} cells",
                    workers[axis], axis, dims[axis]
                )));
            }
        }
        let bounds = [
            split_axis(extents.nx, workers[0]),
            split_axis(extents.ny, workers[1]),
            split_axis(extents.nz, workers[2]),
        ];
        Ok(Decomposition { extents, workers, bounds })
    }

    pub fn num_workers(&self) -> usize {
        self.workers[0] * self.workers[1] * self.workers[2]
    }

    fn worker_id(&self, b: [usize; 3]) -> usize {
        (b[2] * self.workers[1] + b[1]) * self.workers[0] + b[0]
    }

    fn block_of(&self, id: usize) -> [usize; 3] {
        let bx = id % self.workers[0];
        let by = (id / self.workers[0]) % self.workers[1];
        let bz = id / (self.workers[0] * self.workers[1]);
        [bx, by, bz]
    }

    pub fn region(&self, id: usize) -> Region {
        let b = self.block_of(id);
        Region::new(
            Coord::new(self.bounds[0][b[0]], self.bounds[1][b[1]], self.bounds[2][b[2]]),
            Coord::new(self.bounds[0][b[0] + 1], self.bounds[1][b[1] + 1], self.bounds[2][b[2] + 1]),
        )
    }

    /// Worker that owns cell `c`.
    pub fn owner_of(&self, c: Coord) -> usize {
        let coords = [c.x, c.y, c.z];
        let mut b = [0; 3];
        for axis in 0..3 {
            // bounds[axis] is sorted; the owning block is the last start <= coordinate
            b[axis] = self.bounds[axis].partition_point(|&s| s <= coords[axis]) - 1;
            b[axis] = b[axis].min(self.workers[axis] - 1);
        }
        self.worker_id(b)
    }

    /// Adjacent worker across the face of `id` facing `dir`, if any.
    pub fn neighbor(&self, id: usize, dir: Direction) -> Option<usize> {
        let b = self.block_of(id);
        let (dx, dy, dz) = dir.offset();
        let nb = [
            b[0].checked_add_signed(dx)?,
            b[1].checked_add_signed(dy)?,
            b[2].checked_add_signed(dz)?,
        ];
        if nb[0] < self.workers[0] && nb[1] < self.workers[1] && nb[2] < self.workers[2] {
            Some(self.worker_id(nb))
        } else {
            None
        }
    }
}
