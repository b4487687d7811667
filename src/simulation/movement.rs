use rand::Rng;

use crate::{
    atom::{Atom, AtomType},
    displacement::DisplacementMatrix,
    floating_type_mod::FT,
    grid::{quantize, CellAccess},
    regions::Region,
    simulation_parameters::SimulationParams,
    vec2f, IT, V2,
};

/// Uniformly distributed in `[-1, 1)`.
pub fn random_unit<R: Rng>(rng: &mut R) -> FT {
    rng.gen_range(-1.0..1.0)
}

/// Either `-1` or `1`.
pub fn random_direction<R: Rng>(rng: &mut R) -> FT {
    if rng.gen::<bool>() {
        1.
    } else {
        -1.
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Displacement {
    /// The atom now lives in cell `(x, y)`; the former occupant took its old cell.
    Moved { x: usize, y: usize },

    /// The target was outside of the grid and the atom was removed.
    Vanished,

    Blocked,
}

impl Displacement {
    pub fn is_success(&self) -> bool {
        !matches!(self, Displacement::Blocked)
    }
}

/// Moves the atom in cell `(x, y)` to the cell containing `target`.
///
/// Targets outside of the grid delete the atom. Falling powder and liquid never get here with
/// a target below the floor, see `process_cell`. Targets on the border ring, outside of the
/// accessor's writable columns or occupied by an atom that cannot be displaced leave both
/// cells untouched.
pub fn do_move<C: CellAccess>(
    cells: &mut C,
    matrix: &DisplacementMatrix,
    x: usize,
    y: usize,
    target: V2,
) -> Displacement {
    let tx = quantize(target.x);
    let ty = quantize(target.y);

    if !cells.in_bounds(tx, ty) {
        let atom = cells.atom_mut(x, y);
        atom.atom_type = AtomType::None;
        atom.velocity = V2::zeros();
        return Displacement::Vanished;
    }

    let (tx, ty) = (tx as usize, ty as usize);
    if !cells.is_interior(tx, ty) || !cells.is_writable(tx) {
        return Displacement::Blocked;
    }

    let attacker = cells.atom(x, y).atom_type;
    let occupant = cells.atom(tx, ty).atom_type;
    if !matrix.can_displace(attacker, occupant) {
        return Displacement::Blocked;
    }

    cells.swap_atoms((x, y), (tx, ty));
    cells.atom_mut(tx, ty).position = target;
    if (tx, ty) != (x, y) {
        cells.atom_mut(x, y).position = vec2f(x as FT, y as FT);
    }

    Displacement::Moved { x: tx, y: ty }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Empty,
    AlreadyProcessed,

    /// Surrounded by atoms it cannot displace, velocity was reset.
    Enclosed,

    /// Solid, or too slow to move.
    Frozen,

    /// The target quantized to the current cell.
    Stayed,

    Moved,

    /// The direct move failed but one of the fallback moves succeeded.
    Deflected,

    Vanished,

    /// Every move failed, velocity was damped.
    Blocked,
}

/// Counters over one scan of a region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStatistics {
    pub live_atoms: usize,
    pub processed: usize,
    pub moved: usize,
    pub vanished: usize,
    pub blocked: usize,
}

impl RegionStatistics {
    pub fn record(&mut self, outcome: MoveOutcome) {
        match outcome {
            MoveOutcome::Empty => return,
            MoveOutcome::AlreadyProcessed => {}
            MoveOutcome::Enclosed | MoveOutcome::Frozen | MoveOutcome::Stayed => self.processed += 1,
            MoveOutcome::Moved | MoveOutcome::Deflected => {
                self.processed += 1;
                self.moved += 1;
            }
            MoveOutcome::Vanished => {
                self.processed += 1;
                self.vanished += 1;
            }
            MoveOutcome::Blocked => {
                self.processed += 1;
                self.blocked += 1;
            }
        }
        self.live_atoms += 1;
    }

    pub fn accumulate(&mut self, other: &RegionStatistics) {
        self.live_atoms += other.live_atoms;
        self.processed += other.processed;
        self.moved += other.moved;
        self.vanished += other.vanished;
        self.blocked += other.blocked;
    }
}

fn apply_forces<R: Rng>(atom: &mut Atom, simulation_params: &SimulationParams, rng: &mut R) {
    let atom_type = atom.atom_type;

    if matches!(atom_type, AtomType::Gas | AtomType::Powder | AtomType::Liquid) {
        atom.velocity *= simulation_params.velocity_decay;
    }

    if matches!(atom_type, AtomType::Powder | AtomType::Liquid) {
        atom.velocity.y += simulation_params.gravity;
    }

    if atom_type == AtomType::Gas {
        atom.velocity.x += simulation_params.diffusion * random_unit(rng);
        atom.velocity.y += simulation_params.diffusion * random_unit(rng);
    }

    if atom_type == AtomType::Liquid {
        let diffusion = simulation_params.diffusion * simulation_params.liquid_diffusion_scale;
        atom.velocity.x += diffusion * random_unit(rng);
        atom.velocity.y += diffusion * random_unit(rng);
    }
}

struct Neighborhood {
    space: usize,
    diverse: usize,
    blocking: bool,
}

fn scan_neighborhood<C: CellAccess>(
    cells: &C,
    matrix: &DisplacementMatrix,
    x: usize,
    y: usize,
    atom_type: AtomType,
) -> Neighborhood {
    let mut n = Neighborhood {
        space: 0,
        diverse: 0,
        blocking: true,
    };

    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if (nx, ny) == (x, y) {
                continue;
            }

            let neighbour = cells.atom(nx, ny).atom_type;
            if neighbour == AtomType::None {
                n.space += 1;
            }
            if neighbour != atom_type {
                n.diverse += 1;
            }
            // the border ring is never an escape route
            if cells.is_interior(nx, ny) && matrix.can_displace(atom_type, neighbour) {
                n.blocking = false;
            }
        }
    }

    n
}

fn damp_at<C: CellAccess>(cells: &mut C, x: usize, y: usize, factor: V2) {
    let velocity = &mut cells.atom_mut(x, y).velocity;
    velocity.component_mul_assign(&factor);
}

/// Runs one frame of physics for the atom in cell `(x, y)`.
///
/// `generation` is the flag of the current frame. The atom is stamped with it before anything
/// else happens, so an atom moved further down the scan order is not processed twice.
pub fn process_cell<C: CellAccess, R: Rng>(
    cells: &mut C,
    x: usize,
    y: usize,
    generation: bool,
    simulation_params: &SimulationParams,
    rng: &mut R,
) -> MoveOutcome {
    let matrix = simulation_params.displacement_rules.matrix();
    let floor = cells.height() - 2;

    let atom = cells.atom_mut(x, y);
    if atom.is_empty() {
        return MoveOutcome::Empty;
    }
    if atom.generation == generation {
        return MoveOutcome::AlreadyProcessed;
    }
    atom.generation = generation;

    apply_forces(atom, simulation_params, rng);

    let atom_type = atom.atom_type;
    let neighborhood = scan_neighborhood(cells, matrix, x, y, atom_type);

    let atom = cells.atom_mut(x, y);
    if simulation_params.fully_blocking_check && neighborhood.blocking {
        atom.velocity = V2::zeros();
        return MoveOutcome::Enclosed;
    }

    let eps = simulation_params.freeze_epsilon;
    if atom_type == AtomType::Solid || (atom.velocity.x.abs() <= eps && atom.velocity.y.abs() <= eps) {
        return MoveOutcome::Frozen;
    }

    let position = atom.position;
    let velocity = atom.velocity;

    // TODO: interpolate along the path for atoms moving more than one cell per frame
    let mut result = position + velocity;

    // falling matter lands on the last interior row instead of dropping out of the grid
    if matches!(atom_type, AtomType::Powder | AtomType::Liquid) && quantize(result.y) > floor as IT {
        result.y = floor as FT;
        atom.velocity.y = 0.;
    }

    let result_x = quantize(result.x);
    let result_y = quantize(result.y);
    let (grid_x, grid_y) = (x as IT, y as IT);

    if result_x == grid_x && result_y == grid_y {
        return MoveOutcome::Stayed;
    }

    match do_move(cells, matrix, x, y, result) {
        Displacement::Moved { .. } => return MoveOutcome::Moved,
        Displacement::Vanished => return MoveOutcome::Vanished,
        Displacement::Blocked => {}
    }

    let loss = simulation_params.collision_loss;

    match atom_type {
        AtomType::Gas => {
            let offset = simulation_params.bounce_offset;

            let mirror_x = vec2f(offset + (2 * grid_x - result_x) as FT, offset + result_y as FT);
            match do_move(cells, matrix, x, y, mirror_x) {
                Displacement::Moved { x, y } => {
                    damp_at(cells, x, y, vec2f(loss, 1.));
                    return MoveOutcome::Deflected;
                }
                Displacement::Vanished => return MoveOutcome::Vanished,
                Displacement::Blocked => {}
            }

            let mirror_y = vec2f(offset + result_x as FT, offset + (2 * grid_y - result_y) as FT);
            match do_move(cells, matrix, x, y, mirror_y) {
                Displacement::Moved { x, y } => {
                    damp_at(cells, x, y, vec2f(1., loss));
                    return MoveOutcome::Deflected;
                }
                Displacement::Vanished => return MoveOutcome::Vanished,
                Displacement::Blocked => {}
            }
        }
        AtomType::Liquid | AtomType::Powder => {
            let mut attempts: [Option<V2>; 4] = [None; 4];

            if result_x != grid_x {
                attempts[0] = Some(vec2f(result.x, y as FT));
            }
            if result_y != grid_y {
                attempts[1] = Some(vec2f(x as FT, result.y));
            }

            // slip sideways, first rotated one way, then the other
            let direction = random_direction(rng);
            if neighborhood.diverse > 0 || neighborhood.space > 0 {
                let mut d = vec2f(velocity.x - velocity.y * direction, velocity.y + velocity.x * direction);
                d /= d.x.abs().max(d.y.abs());
                attempts[2] = Some(position + d);
                attempts[3] = Some(position + vec2f(d.y * direction, -d.x * direction));
            }

            for target in attempts.iter().flatten() {
                match do_move(cells, matrix, x, y, *target) {
                    Displacement::Moved { x, y } => {
                        damp_at(cells, x, y, vec2f(loss, loss));
                        return MoveOutcome::Deflected;
                    }
                    Displacement::Vanished => return MoveOutcome::Vanished,
                    Displacement::Blocked => {}
                }
            }
        }
        _ => {
            // particles keep their velocity and wait for the path to clear
            return MoveOutcome::Blocked;
        }
    }

    damp_at(cells, x, y, vec2f(loss, loss));
    MoveOutcome::Blocked
}

/// Processes every simulated cell of `region` in row-major order. The border ring is skipped.
pub fn simulate_region<C: CellAccess, R: Rng>(
    cells: &mut C,
    region: Region,
    generation: bool,
    simulation_params: &SimulationParams,
    rng: &mut R,
) -> RegionStatistics {
    let (width, height) = (cells.width(), cells.height());
    let mut statistics = RegionStatistics::default();

    for y in region.rows() {
        if y == 0 || y >= height - 1 {
            continue;
        }
        for x in region.columns() {
            if x == 0 || x >= width - 1 {
                continue;
            }
            statistics.record(process_cell(cells, x, y, generation, simulation_params, rng));
        }
    }

    statistics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        atom::ALL_ATOM_TYPES,
        displacement::DisplacementRules,
        grid::Grid,
        simulation::assert_ft_approx_eq,
    };
    use rand::{rngs::StdRng, SeedableRng};

    fn full_region(grid: &Grid) -> Region {
        Region {
            x: 0,
            y: 0,
            w: grid.width(),
            h: grid.height(),
        }
    }

    fn run_frames(grid: &mut Grid, frames: usize, params: &SimulationParams, rng: &mut StdRng) -> Vec<RegionStatistics> {
        let region = full_region(grid);
        let mut generation = true;
        (0..frames)
            .map(|_| {
                let s = simulate_region(grid, region, generation, params, rng);
                generation = !generation;
                s
            })
            .collect()
    }

    fn place(grid: &mut Grid, atom_type: AtomType, x: usize, y: usize) {
        grid.set(x, y, Atom::new(atom_type, x, y, false));
    }

    #[test]
    fn test_move_swaps_instead_of_copying() {
        let matrix = DisplacementRules::Layered.matrix();
        let mut grid = Grid::new(10, 10);
        place(&mut grid, AtomType::Powder, 4, 4);
        place(&mut grid, AtomType::Liquid, 4, 5);

        let result = do_move(&mut grid, matrix, 4, 4, vec2f(4.2, 5.1));
        assert_eq!(result, Displacement::Moved { x: 4, y: 5 });
        assert_eq!(grid.get(4, 5).atom_type, AtomType::Powder);
        assert_eq!(grid.get(4, 5).position, vec2f(4.2, 5.1));
        assert_eq!(grid.get(4, 4).atom_type, AtomType::Liquid);
        assert_eq!(grid.get(4, 4).position, vec2f(4., 4.));
        assert_eq!(grid.live_atoms(), 2);
    }

    #[test]
    fn test_move_out_of_grid_vanishes() {
        let matrix = DisplacementRules::Strict.matrix();
        for target in [vec2f(-0.6, 3.), vec2f(3., 9.5), vec2f(12., 3.), vec2f(3., -4.)] {
            let mut grid = Grid::new(10, 10);
            place(&mut grid, AtomType::Particle, 3, 3);
            place(&mut grid, AtomType::Powder, 4, 4);

            assert_eq!(do_move(&mut grid, matrix, 3, 3, target), Displacement::Vanished);
            assert!(grid.get(3, 3).is_empty());
            assert_eq!(grid.live_atoms(), 1);
            assert_eq!(grid.get(4, 4).atom_type, AtomType::Powder);
        }
    }

    #[test]
    fn test_border_ring_is_not_entered() {
        let matrix = DisplacementRules::Strict.matrix();
        let mut grid = Grid::new(10, 10);
        place(&mut grid, AtomType::Powder, 1, 8);

        assert_eq!(do_move(&mut grid, matrix, 1, 8, vec2f(1., 9.)), Displacement::Blocked);
        assert_eq!(do_move(&mut grid, matrix, 1, 8, vec2f(0., 8.)), Displacement::Blocked);
        assert_eq!(grid.get(1, 8).atom_type, AtomType::Powder);
    }

    #[test]
    fn test_move_succeeds_iff_displacement_is_legal() {
        for rules in [DisplacementRules::Strict, DisplacementRules::Layered] {
            let matrix = rules.matrix();
            for &attacker in ALL_ATOM_TYPES.iter().filter(|t| !t.is_empty()) {
                for &occupant in ALL_ATOM_TYPES.iter() {
                    let mut grid = Grid::new(6, 6);
                    place(&mut grid, attacker, 2, 2);
                    place(&mut grid, occupant, 3, 2);

                    let result = do_move(&mut grid, matrix, 2, 2, vec2f(3., 2.));
                    let legal = matrix.can_displace(attacker, occupant);
                    assert_eq!(result.is_success(), legal, "{:?} into {:?}", attacker, occupant);

                    if legal {
                        assert_eq!(grid.get(3, 2).atom_type, attacker);
                        assert_eq!(grid.get(2, 2).atom_type, occupant);
                    } else {
                        assert_eq!(grid.get(2, 2).atom_type, attacker);
                        assert_eq!(grid.get(3, 2).atom_type, occupant);
                    }
                }
            }
        }
    }

    #[test]
    fn test_slow_atom_only_gets_stamped() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut grid = Grid::new(10, 10);
        grid.set(5, 5, Atom::new(AtomType::Particle, 5, 5, false).with_velocity(vec2f(0.01, -0.005)));
        let before = grid.clone();

        let outcome = process_cell(&mut grid, 5, 5, true, &params, &mut rng);
        assert_eq!(outcome, MoveOutcome::Frozen);

        let mut expected = *before.get(5, 5);
        expected.generation = true;
        assert_eq!(*grid.get(5, 5), expected);
        for (idx, atom) in grid.atoms().iter().enumerate() {
            if grid.coords(idx) != (5, 5) {
                assert_eq!(atom, &before.atoms()[idx]);
            }
        }
    }

    /// Every falling grain gets gravity applied once per processing. With no velocity decay a
    /// grain starting at `vy = 4` ends the frame with `vy = 5`, or `2.5` if it was damped once.
    /// Processing a grain twice would leave any other value.
    fn assert_grains_processed_once(grid: &Grid, generation: bool) {
        for (idx, atom) in grid.atoms().iter().enumerate() {
            if atom.atom_type != AtomType::Powder {
                continue;
            }
            let (x, y) = grid.coords(idx);
            assert_eq!(atom.generation, generation, "grain at ({}, {}) was not processed", x, y);
            assert!(
                atom.velocity.y == 5. || atom.velocity.y == 2.5,
                "grain at ({}, {}) has vy {}",
                x,
                y,
                atom.velocity.y
            );
        }
    }

    fn once_per_frame_params() -> SimulationParams {
        SimulationParams {
            gravity: 1.,
            velocity_decay: 1.,
            collision_loss: 0.5,
            ..SimulationParams::default()
        }
    }

    /// One grain per column at scattered rows, falling fast enough to overtake later rows.
    fn place_falling_grains(grid: &mut Grid) {
        for x in 1..grid.width() - 1 {
            let y = 2 + (x * 7) % 11;
            let vx = if x % 3 == 0 { 1. } else { 0. };
            grid.set(x, y, Atom::new(AtomType::Powder, x, y, false).with_velocity(vec2f(vx, 4.)));
        }
    }

    #[test]
    fn test_atoms_are_processed_at_most_once_per_frame() {
        let params = once_per_frame_params();
        let mut rng = StdRng::seed_from_u64(11);
        let mut grid = Grid::new(24, 40);
        place_falling_grains(&mut grid);
        let live = grid.live_atoms();

        let region = full_region(&grid);
        let first = simulate_region(&mut grid, region, true, &params, &mut rng);
        assert_eq!(first.processed, live);
        assert!(first.moved > 0);
        assert_grains_processed_once(&grid, true);

        // same generation again: nothing left to do
        let second = simulate_region(&mut grid, region, true, &params, &mut rng);
        assert_eq!(second.processed, 0);
        assert_eq!(second.live_atoms, grid.live_atoms());
    }

    #[test]
    fn test_atoms_are_processed_once_across_region_groups() {
        use crate::simulation::SimulationEngine;

        let simulation_params = SimulationParams {
            width: 64,
            height: 40,
            thread_count: 4,
            group_count: 2,
            seed: Some(21),
            ..once_per_frame_params()
        };
        let mut engine = SimulationEngine::new(simulation_params, false).unwrap();
        place_falling_grains(engine.grid_mut());

        for _ in 0..3 {
            for atom in engine.grid_mut().atoms_mut().iter_mut().filter(|a| !a.is_empty()) {
                atom.velocity.y = 4.;
            }
            let live = engine.grid().live_atoms();
            let generation = engine.generation();

            let statistics = engine.step().unwrap();
            assert_eq!(statistics.processed, live);
            assert_eq!(statistics.vanished, 0);
            assert_grains_processed_once(engine.grid(), generation);
        }
    }

    #[test]
    fn test_solids_never_move() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut grid = Grid::new(12, 12);
        place(&mut grid, AtomType::Solid, 5, 5);
        place(&mut grid, AtomType::Solid, 6, 5);
        grid.get_mut(6, 5).velocity = vec2f(3., 3.);

        run_frames(&mut grid, 50, &params, &mut rng);

        assert_eq!(grid.live_atoms(), 2);
        assert_eq!(grid.get(5, 5).atom_type, AtomType::Solid);
        assert_eq!(grid.get(6, 5).atom_type, AtomType::Solid);
        assert_eq!(grid.get(5, 5).position, vec2f(5., 5.));
        assert_eq!(grid.get(6, 5).position, vec2f(6., 5.));
    }

    #[test]
    fn test_enclosed_gas_stays_put() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut grid = Grid::new(12, 12);
        for y in 4..=6 {
            for x in 4..=6 {
                place(&mut grid, AtomType::Solid, x, y);
            }
        }
        grid.set(5, 5, Atom::new(AtomType::Gas, 5, 5, false).with_velocity(vec2f(2., -1.)));

        let stats = run_frames(&mut grid, 40, &params, &mut rng);

        let gas = grid.get(5, 5);
        assert_eq!(gas.atom_type, AtomType::Gas);
        assert_eq!(gas.velocity, vec2f(0., 0.));
        assert_eq!(gas.position, vec2f(5., 5.));
        assert!(stats.iter().all(|s| s.moved == 0 && s.vanished == 0));
    }

    #[test]
    fn test_enclosure_check_can_be_disabled() {
        let mut params = SimulationParams::default();
        params.fully_blocking_check = false;
        let mut rng = StdRng::seed_from_u64(9);
        let mut grid = Grid::new(12, 12);
        for y in 4..=6 {
            for x in 4..=6 {
                place(&mut grid, AtomType::Solid, x, y);
            }
        }
        grid.set(5, 5, Atom::new(AtomType::Gas, 5, 5, false).with_velocity(vec2f(1., 0.)));

        let outcome = process_cell(&mut grid, 5, 5, true, &params, &mut rng);
        assert_eq!(outcome, MoveOutcome::Blocked);
        assert_eq!(grid.get(5, 5).atom_type, AtomType::Gas);
        // velocity is damped instead of reset
        assert!(grid.get(5, 5).velocity.x > 0.);
        assert!(grid.get(5, 5).velocity.x < 0.12);
    }

    #[test]
    fn test_powder_falls_and_comes_to_rest_above_the_border() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut grid = Grid::new(10, 6);
        place(&mut grid, AtomType::Powder, 5, 1);

        let region = full_region(&grid);
        let mut generation = true;
        let mut last_row = 1;
        for _ in 0..30 {
            simulate_region(&mut grid, region, generation, &params, &mut rng);
            generation = !generation;

            assert_eq!(grid.count(AtomType::Powder), 1);
            let idx = grid.atoms().iter().position(|a| a.atom_type == AtomType::Powder).unwrap();
            let (_, row) = grid.coords(idx);
            assert!(row >= last_row, "powder moved up from {} to {}", last_row, row);
            last_row = row;
        }
        assert_eq!(last_row, grid.height() - 2);
    }

    #[test]
    fn test_powder_lands_on_the_floor_of_a_tall_column() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(8);
        let mut grid = Grid::new(10, 64);
        place(&mut grid, AtomType::Powder, 5, 1);

        let region = full_region(&grid);
        let mut generation = true;
        let mut last_row = 1;
        for _ in 0..200 {
            let statistics = simulate_region(&mut grid, region, generation, &params, &mut rng);
            generation = !generation;
            assert_eq!(statistics.vanished, 0);

            let idx = grid
                .atoms()
                .iter()
                .position(|a| a.atom_type == AtomType::Powder)
                .expect("powder fell out of the grid");
            let (column, row) = grid.coords(idx);
            assert_eq!(column, 5);
            assert!(row >= last_row, "powder moved up from {} to {}", last_row, row);
            last_row = row;
        }
        assert_eq!(last_row, grid.height() - 2);
    }

    #[test]
    fn test_fast_particle_still_leaves_through_the_floor() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(8);
        let mut grid = Grid::new(10, 10);
        grid.set(5, 6, Atom::new(AtomType::Particle, 5, 6, false).with_velocity(vec2f(0., 5.)));

        assert_eq!(process_cell(&mut grid, 5, 6, true, &params, &mut rng), MoveOutcome::Vanished);
        assert_eq!(grid.live_atoms(), 0);
    }

    #[test]
    fn test_powder_slides_horizontally_when_diagonal_is_blocked() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(12);
        let mut grid = Grid::new(12, 12);
        grid.set(5, 5, Atom::new(AtomType::Powder, 5, 5, false).with_velocity(vec2f(1., 1.)));
        place(&mut grid, AtomType::Solid, 6, 6);

        // v = (0.99, 1.49) after decay and gravity, the target (6, 6) is taken
        assert_eq!(process_cell(&mut grid, 5, 5, true, &params, &mut rng), MoveOutcome::Deflected);
        assert!(grid.get(5, 5).is_empty());

        let atom = grid.get(6, 5);
        assert_eq!(atom.atom_type, AtomType::Powder);
        assert_ft_approx_eq(atom.position.x, 5.99, 1e-5, || "x".to_string());
        assert_ft_approx_eq(atom.position.y, 5., 1e-5, || "y".to_string());
        assert_ft_approx_eq(atom.velocity.x, 0.99 * params.collision_loss, 1e-5, || "damped vx".to_string());
        assert_ft_approx_eq(atom.velocity.y, 1.49 * params.collision_loss, 1e-5, || "damped vy".to_string());
    }

    #[test]
    fn test_powder_drops_vertically_when_sideways_is_blocked() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(12);
        let mut grid = Grid::new(12, 12);
        grid.set(5, 5, Atom::new(AtomType::Powder, 5, 5, false).with_velocity(vec2f(1., 1.)));
        place(&mut grid, AtomType::Solid, 6, 6);
        place(&mut grid, AtomType::Solid, 6, 5);

        assert_eq!(process_cell(&mut grid, 5, 5, true, &params, &mut rng), MoveOutcome::Deflected);
        assert!(grid.get(5, 5).is_empty());

        let atom = grid.get(5, 6);
        assert_eq!(atom.atom_type, AtomType::Powder);
        assert_ft_approx_eq(atom.position.x, 5., 1e-5, || "x".to_string());
        assert_ft_approx_eq(atom.position.y, 6.49, 1e-5, || "y".to_string());
        assert_ft_approx_eq(atom.velocity.x, 0.99 * params.collision_loss, 1e-5, || "damped vx".to_string());
        assert_ft_approx_eq(atom.velocity.y, 1.49 * params.collision_loss, 1e-5, || "damped vy".to_string());
    }

    #[test]
    fn test_gas_bounces_off_a_ceiling() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(4);
        let mut grid = Grid::new(12, 12);
        grid.set(5, 5, Atom::new(AtomType::Gas, 5, 5, false).with_velocity(vec2f(0., 3.)));
        place(&mut grid, AtomType::Solid, 5, 8);

        assert_eq!(process_cell(&mut grid, 5, 5, true, &params, &mut rng), MoveOutcome::Deflected);
        assert!(grid.get(5, 5).is_empty());

        // x mirror lands on the solid again, y mirror: 2 * 5 - 8 = 2
        let gas = grid.get(5, 2);
        assert_eq!(gas.atom_type, AtomType::Gas);
        assert_eq!(gas.position, vec2f(5.25, 2.25));
        // vy was 2.97 plus up to 0.2 jitter before the damping
        assert!(gas.velocity.y > 2.7 * params.collision_loss && gas.velocity.y < 3.2 * params.collision_loss);
        assert!(gas.velocity.x.abs() <= params.diffusion);
        assert_eq!(grid.get(5, 8).atom_type, AtomType::Solid);
    }

    #[test]
    fn test_powder_slips_off_an_obstacle() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut grid = Grid::new(10, 10);
        place(&mut grid, AtomType::Powder, 5, 3);
        place(&mut grid, AtomType::Solid, 5, 4);

        let outcome = process_cell(&mut grid, 5, 3, true, &params, &mut rng);
        assert_eq!(outcome, MoveOutcome::Deflected);
        assert!(grid.get(5, 3).is_empty());

        let landed = [(4, 4), (6, 4)]
            .iter()
            .copied()
            .find(|&(x, y)| grid.get(x, y).atom_type == AtomType::Powder)
            .expect("powder did not slip diagonally");
        let atom = grid.get(landed.0, landed.1);
        assert_ft_approx_eq(atom.velocity.y, 0.5 * params.collision_loss, 1e-6, || "damped vy".to_string());
        assert!(atom.generation);
    }

    #[test]
    fn test_gas_bounces_off_a_wall() {
        let params = SimulationParams::default();
        let mut rng = StdRng::seed_from_u64(4);
        let mut grid = Grid::new(12, 12);
        grid.set(5, 5, Atom::new(AtomType::Gas, 5, 5, false).with_velocity(vec2f(3., 0.)));
        place(&mut grid, AtomType::Solid, 8, 5);

        let outcome = process_cell(&mut grid, 5, 5, true, &params, &mut rng);
        assert_eq!(outcome, MoveOutcome::Deflected);

        // mirrored on x: 2 * 5 - 8 = 2
        let gas = grid.get(2, 5);
        assert_eq!(gas.atom_type, AtomType::Gas);
        assert_eq!(gas.position, vec2f(2.25, 5.25));
        assert!(gas.velocity.x > 0. && gas.velocity.x < 0.35);
        assert_eq!(grid.get(8, 5).atom_type, AtomType::Solid);
    }

    #[test]
    fn test_powder_sinks_through_liquid_with_layered_rules() {
        let mut params = SimulationParams::default();
        params.displacement_rules = DisplacementRules::Layered;
        let mut rng = StdRng::seed_from_u64(6);
        let mut grid = Grid::new(8, 8);
        place(&mut grid, AtomType::Powder, 3, 3);
        place(&mut grid, AtomType::Liquid, 3, 4);

        assert_eq!(process_cell(&mut grid, 3, 3, true, &params, &mut rng), MoveOutcome::Moved);
        assert_eq!(grid.get(3, 4).atom_type, AtomType::Powder);
        assert_eq!(grid.get(3, 3).atom_type, AtomType::Liquid);
        // the liquid was not processed yet
        assert!(!grid.get(3, 3).generation);
    }
}
