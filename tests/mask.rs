use biofilm_common::{CellState, Coord, EngineParams, Extents, TypeTable};
use biofilm_engine::{BiofilmSimulation, EngineError, Geometry, PointGrowth};

fn sim_for(state: Vec<CellState>, biomass: &[(usize, Vec<f64>)], types: Vec<u16>, gap: usize) -> BiofilmSimulation {
    let e = Extents::new(state.len(), 1, 1);
    let mut g = Geometry::new(e, state, types.len()).unwrap();
    for (x, b) in biomass {
        g.set_biomass(Coord::new(*x, 0, 0), b).unwrap();
    }
    let mut params = EngineParams::with_defaults(e, types, 1.0);
    params.boundary_gap = gap;
    BiofilmSimulation::new(params, &g, Some(0)).unwrap()
}

#[test]
fn pore_over_threshold_becomes_biofilm() {
    let mut sim = sim_for(
        vec![CellState::Biofilm(3), CellState::Pore(2), CellState::Pore(2)],
        &[(0, vec![0.5]), (1, vec![0.2])],
        vec![3],
        0,
    );
    let report = sim.update_mask().unwrap();
    assert_eq!(report.to_biofilm, 1);
    assert_eq!(report.to_pore, 0);
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Biofilm(3));
    assert_eq!(sim.state_at(Coord::new(2, 0, 0)), CellState::Pore(2));
}

#[test]
fn mixed_species_follow_neighbor_biofilm_type() {
    // +x neighbor is pore, -x neighbor carries the second species' type
    let mut sim = sim_for(
        vec![CellState::Biofilm(4), CellState::Pore(2), CellState::Pore(2)],
        &[(0, vec![0.0, 0.5]), (1, vec![0.1, 0.1])],
        vec![3, 4],
        0,
    );
    sim.update_mask().unwrap();
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Biofilm(4));
}

#[test]
fn mixed_species_without_biofilm_neighbor_take_first_species_type() {
    let mut sim = sim_for(
        vec![CellState::Pore(2), CellState::Pore(2), CellState::Pore(2)],
        &[(1, vec![0.1, 0.1])],
        vec![3, 4],
        0,
    );
    sim.update_mask().unwrap();
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Biofilm(3));
}

#[test]
fn single_relevant_species_ignores_neighbors() {
    let mut sim = sim_for(
        vec![CellState::Biofilm(3), CellState::Pore(2)],
        &[(0, vec![0.5, 0.0]), (1, vec![0.0, 0.3])],
        vec![3, 4],
        0,
    );
    sim.update_mask().unwrap();
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Biofilm(4));
}

#[test]
fn biofilm_below_threshold_reverts_to_default_pore() {
    let mut sim = sim_for(
        vec![CellState::Biofilm(3), CellState::Biofilm(3)],
        &[(0, vec![0.05]), (1, vec![0.5])],
        vec![3],
        0,
    );
    let report = sim.update_mask().unwrap();
    assert_eq!(report.to_pore, 1);
    assert_eq!(sim.state_at(Coord::new(0, 0, 0)), CellState::Pore(2));
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Biofilm(3));
}

#[test]
fn reverting_cell_takes_neighbor_pore_type() {
    let e = Extents::new(3, 1, 1);
    let mut g = Geometry::new(e, vec![CellState::Pore(2), CellState::Biofilm(3), CellState::Pore(5)], 1).unwrap();
    g.set_biomass(Coord::new(1, 0, 0), &[0.01]).unwrap();
    let mut params = EngineParams::with_defaults(e, vec![3], 1.0);
    params.types = TypeTable { solid: 0, wall: 1, pore: vec![2, 5], default_pore: 2 };
    let mut sim = BiofilmSimulation::new(params, &g, Some(0)).unwrap();

    sim.update_mask().unwrap();
    // +x is scanned first
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Pore(5));
}

#[test]
fn boundary_gap_cells_are_never_reclassified() {
    let mut sim = sim_for(
        vec![CellState::Pore(2), CellState::Pore(2), CellState::Pore(2)],
        &[(0, vec![0.5]), (1, vec![0.5]), (2, vec![0.5])],
        vec![3],
        1,
    );
    let report = sim.update_mask().unwrap();
    assert_eq!(report.to_biofilm, 1);
    assert_eq!(sim.state_at(Coord::new(0, 0, 0)), CellState::Pore(2));
    assert_eq!(sim.state_at(Coord::new(1, 0, 0)), CellState::Biofilm(3));
    assert_eq!(sim.state_at(Coord::new(2, 0, 0)), CellState::Pore(2));
}

#[test]
fn step_grows_redistributes_and_reclassifies() {
    // pore | full biofilm | thin biofilm | pore: the overflow can only go right,
    // and the planktonic pore on the right grows past the threshold.
    let e = Extents::new(4, 1, 1);
    let state = vec![CellState::Pore(2), CellState::Biofilm(3), CellState::Biofilm(3), CellState::Pore(2)];
    let mut g = Geometry::new(e, state, 1).unwrap();
    g.set_biomass(Coord::new(1, 0, 0), &[1.0]).unwrap();
    g.set_biomass(Coord::new(2, 0, 0), &[0.02]).unwrap();
    g.set_biomass(Coord::new(3, 0, 0), &[0.05]).unwrap();
    let params = EngineParams::with_defaults(e, vec![3], 1.0);
    let mut sim = BiofilmSimulation::new(params, &g, Some(9)).unwrap();

    let feed = PointGrowth { increments: vec![(Coord::new(1, 0, 0), vec![0.3]), (Coord::new(3, 0, 0), vec![0.1])] };
    let report = sim.step(&feed).unwrap();

    assert!(report.redistribution.sweeps >= 1);
    assert!((report.mass_after - 1.47).abs() < 1e-12);
    assert!((report.mass_added - 0.4).abs() < 1e-12);
    assert!((sim.total_at(Coord::new(1, 0, 0)) - 1.0).abs() < 1e-12);
    assert!((sim.total_at(Coord::new(2, 0, 0)) - 0.32).abs() < 1e-12);
    // the right-hand pore crossed the threshold, the middle cell is still biofilm
    assert_eq!(sim.state_at(Coord::new(3, 0, 0)), CellState::Biofilm(3));
    assert_eq!(sim.state_at(Coord::new(2, 0, 0)), CellState::Biofilm(3));
    assert_eq!(report.to_biofilm, 1);
    assert_eq!(sim.current_step, 1);
}

#[test]
fn pore_with_only_trace_species_cannot_pick_a_biofilm_type() {
    // With a zero threshold the cell qualifies on its total, yet no single species is above tolerance.
    let mut sim = sim_for(
        vec![CellState::Pore(2), CellState::Pore(2)],
        &[(0, vec![0.8e-12, 0.8e-12])],
        vec![3, 4],
        0,
    );
    sim.params.threshold_biomass = 0.0;
    assert!(matches!(
        sim.update_mask(),
        Err(EngineError::BiofilmTypeUndetermined { cell, .. }) if cell == Coord::new(0, 0, 0)
    ));
}
