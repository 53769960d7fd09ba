use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer lattice coordinate of a grid cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Coord { x, y, z }
    }

    /// Moves one cell in `dir`, returning `None` if that would leave `extents`.
    pub fn step(self, dir: Direction, extents: Extents) -> Option<Coord> {
        let (dx, dy, dz) = dir.offset();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        let z = self.z.checked_add_signed(dz)?;
        let c = Coord { x, y, z };
        if extents.contains(c) { Some(c) } else { None }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Size of the full grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extents {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Extents {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Extents { nx, ny, nz }
    }

    pub fn num_cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline(always)]
    pub fn contains(&self, c: Coord) -> bool {
        c.x < self.nx && c.y < self.ny && c.z < self.nz
    }

    /// Row-major index, x fastest.
    #[inline(always)]
    pub fn index(&self, c: Coord) -> usize {
        (c.z * self.ny + c.y) * self.nx + c.x
    }

    #[inline(always)]
    pub fn coord(&self, idx: usize) -> Coord {
        let x = idx % self.nx;
        let y = (idx / self.nx) % self.ny;
        let z = idx / (self.nx * self.ny);
        Coord { x, y, z }
    }

    pub fn iter(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.num_cells()).map(move |i| self.coord(i))
    }
}

/// The six face directions, in +x, -x, +y, -y, +z, -z order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    XPos,
    XNeg,
    YPos,
    YNeg,
    ZPos,
    ZNeg,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::XPos,
        Direction::XNeg,
        Direction::YPos,
        Direction::YNeg,
        Direction::ZPos,
        Direction::ZNeg,
    ];

    #[inline(always)]
    pub fn offset(self) -> (isize, isize, isize) {
        match self {
            Direction::XPos => (1, 0, 0),
            Direction::XNeg => (-1, 0, 0),
            Direction::YPos => (0, 1, 0),
            Direction::YNeg => (0, -1, 0),
            Direction::ZPos => (0, 0, 1),
            Direction::ZNeg => (0, 0, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::XPos => Direction::XNeg,
            Direction::XNeg => Direction::XPos,
            Direction::YPos => Direction::YNeg,
            Direction::YNeg => Direction::YPos,
            Direction::ZPos => Direction::ZNeg,
            Direction::ZNeg => Direction::ZPos,
        }
    }

    /// Position in `Direction::ALL`.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Classification of a grid cell.
///
/// `Solid` and `Wall` cells are excluded from the biomass bookkeeping entirely.
/// `Pore` cells may hold biomass but never receive overflow; only `Biofilm`
/// cells can be the recipient of a redistribution transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    Solid,
    Wall,
    Pore(u16),
    Biofilm(u16),
}

impl CellState {
    #[inline(always)]
    pub fn is_excluded(self) -> bool {
        matches!(self, CellState::Solid | CellState::Wall)
    }

    #[inline(always)]
    pub fn can_receive(self) -> bool {
        matches!(self, CellState::Biofilm(_))
    }

    #[inline(always)]
    pub fn is_pore(self) -> bool {
        matches!(self, CellState::Pore(_))
    }

    #[inline(always)]
    pub fn is_biofilm(self) -> bool {
        matches!(self, CellState::Biofilm(_))
    }
}

/// Maps raw geometry type ids onto `CellState`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeTable {
    pub solid: u16,
    pub wall: u16,
    pub pore: Vec<u16>,
    pub default_pore: u16,
}

impl TypeTable {
    /// Anything that is not solid, wall or a pore id is biofilm.
    pub fn classify(&self, raw: u16) -> CellState {
        if raw == self.solid {
            CellState::Solid
        } else if raw == self.wall {
            CellState::Wall
        } else if self.pore.contains(&raw) {
            CellState::Pore(raw)
        } else {
            CellState::Biofilm(raw)
        }
    }

    pub fn raw_id(&self, state: CellState) -> u16 {
        match state {
            CellState::Solid => self.solid,
            CellState::Wall => self.wall,
            CellState::Pore(t) | CellState::Biofilm(t) => t,
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable { solid: 0, wall: 1, pore: vec![2], default_pore: 2 }
    }
}
