use biofilm_common::{CellState, Coord, EngineParams, Extents};
use biofilm_engine::{BiofilmSimulation, Geometry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SOURCE: Coord = Coord { x: 1, y: 1, z: 1 };
const TARGET: Coord = Coord { x: 2, y: 1, z: 1 };

/// 4x3x3 grid, solid except a biofilm row along x at y = z = 1. The source's only
/// receiving neighbor is across the x = 2 split.
fn row_geometry(source: &[f64]) -> Geometry {
    let e = Extents::new(4, 3, 3);
    let state = e
        .iter()
        .map(|c| if c.y == 1 && c.z == 1 && c.x >= 1 { CellState::Biofilm(3) } else { CellState::Solid })
        .collect();
    let mut g = Geometry::new(e, state, source.len()).unwrap();
    g.set_biomass(SOURCE, source).unwrap();
    g
}

fn run(geometry: &Geometry, types: Vec<u16>, workers: [usize; 3], seed: u64) -> BiofilmSimulation {
    let mut params = EngineParams::with_defaults(geometry.extents, types, 1.0);
    params.workers = workers;
    BiofilmSimulation::new(params, geometry, Some(seed)).unwrap()
}

#[test]
fn split_push_matches_unpartitioned_run() {
    let g = row_geometry(&[1.5]);
    let mut whole = run(&g, vec![3], [1, 1, 1], 17);
    let mut split = run(&g, vec![3], [2, 1, 1], 17);
    assert_eq!(split.num_workers(), 2);

    let (mw, _) = whole.push_pull_sweep().unwrap();
    let (ms, _) = split.push_pull_sweep().unwrap();

    assert_eq!(mw.local_transfers, 1);
    assert_eq!(mw.staged_transfers, 0);
    assert_eq!(ms.staged_transfers, 1);
    assert_eq!(ms.relayed_transfers, 1);
    assert_eq!(whole.gather_biomass(), split.gather_biomass());
    assert!((split.total_at(TARGET) - 0.5).abs() < 1e-12);
    assert!((split.total_at(SOURCE) - 1.0).abs() < 1e-12);
}

#[test]
fn split_push_preserves_species_split() {
    let g = row_geometry(&[0.9, 0.6]);
    let mut whole = run(&g, vec![3, 4], [1, 1, 1], 5);
    let mut split = run(&g, vec![3, 4], [2, 1, 1], 5);

    whole.redistribute().unwrap();
    split.redistribute().unwrap();

    assert_eq!(whole.gather_biomass(), split.gather_biomass());
    let moved = split.biomass_at(TARGET);
    assert!((moved[0] - 0.3).abs() < 1e-12);
    assert!((moved[1] - 0.2).abs() < 1e-12);
}

#[test]
fn relayed_transfer_is_applied_once() {
    let g = row_geometry(&[1.5]);
    let mut split = run(&g, vec![3], [2, 1, 1], 1);

    split.push_pull_sweep().unwrap();
    let after_first = split.gather_biomass();
    // Nothing is over capacity any more; a second cycle must not replay the message.
    let (m, report) = split.push_pull_sweep().unwrap();
    assert_eq!(m.relayed_transfers, 0);
    assert_eq!(m.staged_transfers, 0);
    assert_eq!(split.gather_biomass(), after_first);
    assert!((report.total_biomass - 1.5).abs() < 1e-12);
}

#[test]
fn halo_sees_neighbor_worker_state() {
    // The target starts full: the source must fall back onto it through the halo
    // and the next sweep must push the overflow further along the row.
    let mut g = row_geometry(&[1.5]);
    g.set_biomass(TARGET, &[1.0]).unwrap();
    let mut whole = run(&g, vec![3], [1, 1, 1], 8);
    let mut split = run(&g, vec![3], [2, 1, 1], 8);

    let (mw, _) = whole.push_pull_sweep().unwrap();
    let (ms, _) = split.push_pull_sweep().unwrap();
    assert_eq!(mw.fallback_transfers, 1);
    assert_eq!(ms.fallback_transfers, 1);
    assert_eq!(whole.gather_biomass(), split.gather_biomass());
    assert!((split.total_at(TARGET) - 1.5).abs() < 1e-12);

    split.redistribute().unwrap();
    assert!((split.total_at(Coord::new(3, 1, 1)) - 0.5).abs() < 1e-12);
    assert!((split.total_biomass() - 2.5).abs() < 1e-12);
}

#[test]
fn invariants_hold_for_every_decomposition() {
    let e = Extents::new(6, 6, 4);
    let state = e.iter().map(|c| if c.z == 0 { CellState::Pore(2) } else { CellState::Biofilm(3) }).collect();
    let mut g = Geometry::new(e, state, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    for c in e.iter().filter(|c| c.z > 0) {
        let b: f64 = rng.random_range(0.0..1.3);
        g.set_biomass(c, &[b]).unwrap();
    }
    let mass = g.total_biomass();

    for workers in [[1, 1, 1], [2, 1, 1], [3, 2, 1], [2, 2, 2], [6, 1, 4]] {
        let mut sim = run(&g, vec![3], workers, 31);
        sim.redistribute().unwrap();
        assert!((sim.total_biomass() - mass).abs() < 1e-9, "mass drift with workers {:?}", workers);
        for c in e.iter() {
            assert!(sim.total_at(c) <= 1.0 + 1e-9);
        }
    }
}

#[test]
fn sub_tolerance_amounts_are_never_staged() {
    // empty | source | nearly full, with the nearly full cell on the second worker
    let e = Extents::new(3, 1, 1);
    let mut g = Geometry::new(e, vec![CellState::Biofilm(3); 3], 1).unwrap();
    let near_full = 1.0 - 0.5e-12;
    g.set_biomass(Coord::new(1, 0, 0), &[1.5]).unwrap();
    g.set_biomass(Coord::new(2, 0, 0), &[near_full]).unwrap();

    for seed in 0..8 {
        let mut sim = run(&g, vec![3], [2, 1, 1], seed);
        let m = sim.redistribute().unwrap();
        assert_eq!(m.staged_transfers, 0);
        assert_eq!(m.relayed_transfers, 0);
        assert!((sim.total_at(Coord::new(0, 0, 0)) - 0.5).abs() < 1e-12);
        assert_eq!(sim.biomass_at(Coord::new(2, 0, 0)), vec![near_full]);
    }
}

#[test]
fn noise_level_excess_is_not_redistributed() {
    let e = Extents::new(2, 1, 1);
    let mut g = Geometry::new(e, vec![CellState::Biofilm(3); 2], 1).unwrap();
    g.set_biomass(Coord::new(0, 0, 0), &[1.0 + 0.5e-12]).unwrap();
    let before = g.biomass.clone();

    let mut sim = run(&g, vec![3], [2, 1, 1], 3);
    let m = sim.redistribute().unwrap();
    assert_eq!(m.sweeps, 0);
    assert_eq!(m.staged_transfers, 0);
    assert_eq!(sim.gather_biomass(), before);
}
