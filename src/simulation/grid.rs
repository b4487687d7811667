use rand::Rng;

use crate::{
    atom::{Atom, AtomType, ALL_ATOM_TYPES, NUM_ATOM_TYPES},
    concurrency::par_iter_reduce1,
    floating_type_mod::FT,
    movement::random_unit,
    vec2f, IT,
};

/// Quantizes a continuous grid coordinate to the nearest cell (round half up).
#[inline(always)]
pub fn quantize(v: FT) -> IT {
    (v + 0.5).floor() as IT
}

/// Read/write access to the cells of a grid.
///
/// Implemented by the full [`Grid`] and by the windowed views handed to worker threads.
/// Coordinates are always full-grid coordinates.
pub trait CellAccess {
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    fn atom(&self, x: usize, y: usize) -> &Atom;
    fn atom_mut(&mut self, x: usize, y: usize) -> &mut Atom;

    /// Exchanges the full contents of two cells.
    fn swap_atoms(&mut self, a: (usize, usize), b: (usize, usize));

    /// Whether this accessor is allowed to write to column `x`.
    fn is_writable(&self, _x: usize) -> bool {
        true
    }

    fn in_bounds(&self, x: IT, y: IT) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }

    /// Cells outside the one-cell border ring are simulated; the ring itself stays empty.
    fn is_interior(&self, x: usize, y: usize) -> bool {
        x > 0 && y > 0 && x + 1 < self.width() && y + 1 < self.height()
    }
}

/// Row-major `width × height` array of atoms.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    atoms: Vec<Atom>,
}

pub const MIN_GRID_SIZE: usize = 3;

impl Grid {
    pub fn new(width: usize, height: usize) -> Grid {
        assert!(
            width >= MIN_GRID_SIZE && height >= MIN_GRID_SIZE,
            "grid of {}x{} has no interior",
            width,
            height
        );
        Grid {
            width,
            height,
            atoms: vec![Atom::default(); width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline(always)]
    pub fn index(&self, x: usize, y: usize) -> usize {
        x + y * self.width
    }

    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.width, idx / self.width)
    }

    pub fn get(&self, x: usize, y: usize) -> &Atom {
        &self.atoms[self.index(x, y)]
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut Atom {
        let idx = self.index(x, y);
        &mut self.atoms[idx]
    }

    /// Overwrites a cell. Intended for scene setup between frames.
    pub fn set(&mut self, x: usize, y: usize, atom: Atom) {
        *self.get_mut(x, y) = atom;
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn count(&self, atom_type: AtomType) -> usize {
        self.atoms.iter().filter(|a| a.atom_type == atom_type).count()
    }

    /// Number of atoms per type, indexed by `AtomType::index()`.
    pub fn type_histogram(&self) -> [usize; NUM_ATOM_TYPES] {
        par_iter_reduce1(
            &self.atoms,
            || [0; NUM_ATOM_TYPES],
            |mut a, b| {
                for i in 0..NUM_ATOM_TYPES {
                    a[i] += b[i];
                }
                a
            },
            |atom| {
                let mut h = [0; NUM_ATOM_TYPES];
                h[atom.atom_type.index()] = 1;
                h
            },
        )
    }

    pub fn live_atoms(&self) -> usize {
        let histogram = self.type_histogram();
        ALL_ATOM_TYPES
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| histogram[t.index()])
            .sum()
    }
}

impl CellAccess for Grid {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn atom(&self, x: usize, y: usize) -> &Atom {
        self.get(x, y)
    }

    fn atom_mut(&mut self, x: usize, y: usize) -> &mut Atom {
        self.get_mut(x, y)
    }

    fn swap_atoms(&mut self, a: (usize, usize), b: (usize, usize)) {
        let ia = self.index(a.0, a.1);
        let ib = self.index(b.0, b.1);
        self.atoms.swap(ia, ib);
    }
}

/// Overwrites every interior cell within `radius` of `(center_x, center_y)` with a fresh atom.
///
/// `unprocessed` must differ from the generation flag of the next frame so the new atoms are
/// simulated right away. Particles start with a random velocity of up to `particle_speed` per
/// axis. Must not run while a frame is in progress.
pub fn spawn_region<R: Rng>(
    grid: &mut Grid,
    center_x: IT,
    center_y: IT,
    radius: IT,
    atom_type: AtomType,
    unprocessed: bool,
    particle_speed: FT,
    rng: &mut R,
) -> usize {
    // i64 so that huge radii or centers from scene files cannot overflow
    let (cx, cy) = (center_x as i64, center_y as i64);
    let radius = (radius as i64).max(0);
    let mut num_spawned = 0;

    let (x_min, x_max) = ((cx - radius).max(1), (cx + radius).min(grid.width() as i64 - 2));
    let (y_min, y_max) = ((cy - radius).max(1), (cy + radius).min(grid.height() as i64 - 2));

    for y in y_min..=y_max {
        for x in x_min..=x_max {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy > radius * radius {
                continue;
            }

            let (x, y) = (x as usize, y as usize);
            let mut atom = Atom::new(atom_type, x, y, unprocessed);
            if atom_type == AtomType::Particle {
                atom.velocity = vec2f(random_unit(rng) * particle_speed, random_unit(rng) * particle_speed);
            }
            grid.set(x, y, atom);
            num_spawned += 1;
        }
    }

    num_spawned
}
