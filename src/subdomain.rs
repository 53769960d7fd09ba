use biofilm_common::{CellState, Coord, EngineParams};

use crate::decomposition::{Decomposition, Region};
use crate::geometry::Geometry;
use crate::relay::Outbox;

/// One halo cell and where its authoritative copy lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaloLink {
    /// Index into this worker's local buffers.
    pub local: usize,
    pub owner: usize,
    /// Index into the owner's local buffers.
    pub owner_local: usize,
}

/// Values copied from an owner into a neighbour's halo.
#[derive(Debug, Clone, Copy)]
pub struct HaloValue {
    pub local: usize,
    pub total: f64,
    pub state: CellState,
    pub age: u32,
}

/// Holds one worker's view of the grid: its owned box plus one halo layer,
/// laid out as structure-of-arrays over `local`.
#[derive(Debug)]
pub struct Subdomain {
    pub id: usize,
    pub owned: Region,
    /// `owned` grown by one layer, clamped to the grid.
    pub local: Region,
    pub num_species: usize,

    // --- Per-cell fields over `local` ---
    pub state: Vec<CellState>,
    /// Species-major per cell: `biomass[i * num_species + s]`. Only owned entries are meaningful.
    pub biomass: Vec<f64>,
    pub total: Vec<f64>,
    pub age: Vec<u32>,
    /// Static; halo entries are copied once at construction.
    pub distance: Vec<u32>,

    // --- Cross-partition plumbing ---
    pub outbox: Outbox,
    pub halo: Vec<HaloLink>,
    /// Local indices of owned cells, in owned-region order.
    owned_indices: Vec<usize>,
}

impl Subdomain {
    /// Creates the worker `id` of `decomposition`, copying its slice of `geometry`.
    pub fn new(id: usize, decomposition: &Decomposition, geometry: &Geometry) -> Self {
        let extents = geometry.extents;
        let owned = decomposition.region(id);
        let local = owned.expanded(1, extents);
        let ns = geometry.num_species;
        let n = local.num_cells();

        let mut state = Vec::with_capacity(n);
        let mut biomass = Vec::with_capacity(n * ns);
        let mut total = Vec::with_capacity(n);
        let mut distance = Vec::with_capacity(n);
        let mut halo = Vec::new();

        for (li, c) in local.iter().enumerate() {
            let s = geometry.state_at(c);
            let b = geometry.biomass_at(c);
            state.push(s);
            biomass.extend_from_slice(b);
            total.push(if s.is_excluded() { 0.0 } else { b.iter().sum() });
            distance.push(geometry.distance_at(c));
            if !owned.contains(c) {
                let owner = decomposition.owner_of(c);
                let owner_local = decomposition.region(owner).expanded(1, extents).local_index(c);
                halo.push(HaloLink { local: li, owner, owner_local });
            }
        }

        let owned_indices = owned.iter().map(|c| local.local_index(c)).collect();

        Subdomain {
            id,
            owned,
            local,
            num_species: ns,
            state,
            biomass,
            total,
            age: vec![0; n],
            distance,
            outbox: Outbox::default(),
            halo,
            owned_indices,
        }
    }

    #[inline(always)]
    pub fn owns(&self, c: Coord) -> bool {
        self.owned.contains(c)
    }

    /// Local index of `c` if it is owned or in the halo.
    #[inline(always)]
    pub fn idx(&self, c: Coord) -> Option<usize> {
        if self.local.contains(c) { Some(self.local.local_index(c)) } else { None }
    }

    pub fn owned_indices(&self) -> &[usize] {
        &self.owned_indices
    }

    #[inline(always)]
    pub fn species(&self, li: usize) -> &[f64] {
        let ns = self.num_species;
        &self.biomass[li * ns..(li + 1) * ns]
    }

    #[inline(always)]
    pub fn species_mut(&mut self, li: usize) -> &mut [f64] {
        let ns = self.num_species;
        &mut self.biomass[li * ns..(li + 1) * ns]
    }

    /// Owned cells that take part in redistribution and reclassification.
    pub fn interior_indices<'a>(&'a self, params: &'a EngineParams) -> impl Iterator<Item = usize> + 'a {
        self.owned_indices
            .iter()
            .copied()
            .filter(move |&li| params.is_interior(self.local.coord(li)) && !self.state[li].is_excluded())
    }

    /// Values a neighbour needs for the halo cell mirrored at `owner_local`.
    pub fn halo_value(&self, owner_local: usize, local: usize) -> HaloValue {
        HaloValue {
            local,
            total: self.total[owner_local],
            state: self.state[owner_local],
            age: self.age[owner_local],
        }
    }

    pub fn apply_halo(&mut self, values: &[HaloValue]) {
        for v in values {
            self.total[v.local] = v.total;
            self.state[v.local] = v.state;
            self.age[v.local] = v.age;
        }
    }
}
