use serde::{Deserialize, Serialize};

use crate::{floating_type_mod::FT, vec2f, V2};

pub const NUM_ATOM_TYPES: usize = 6;

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[repr(u8)]
pub enum AtomType {
    None = 0,
    Solid = 1,
    Powder = 2,
    Liquid = 3,
    Gas = 4,
    Particle = 5,
}

pub const ALL_ATOM_TYPES: [AtomType; NUM_ATOM_TYPES] = [
    AtomType::None,
    AtomType::Solid,
    AtomType::Powder,
    AtomType::Liquid,
    AtomType::Gas,
    AtomType::Particle,
];

impl AtomType {
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_empty(self) -> bool {
        self == AtomType::None
    }

    pub fn as_str_lowercase(&self) -> &'static str {
        match self {
            &Self::None => "none",
            &Self::Solid => "solid",
            &Self::Powder => "powder",
            &Self::Liquid => "liquid",
            &Self::Gas => "gas",
            &Self::Particle => "particle",
        }
    }
}

impl Default for AtomType {
    fn default() -> Self {
        AtomType::None
    }
}

/// Content of a single grid cell.
///
/// `position` is the sub-cell position of the atom in grid coordinates. It always quantizes
/// to the cell the atom is stored in. `generation` is the frame parity that last processed
/// the atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atom {
    pub atom_type: AtomType,
    pub velocity: V2,
    pub position: V2,
    pub generation: bool,
}

impl Default for Atom {
    fn default() -> Self {
        Atom {
            atom_type: AtomType::None,
            velocity: V2::zeros(),
            position: V2::zeros(),
            generation: false,
        }
    }
}

impl Atom {
    /// A resting atom centered in cell `(x, y)`.
    pub fn new(atom_type: AtomType, x: usize, y: usize, generation: bool) -> Atom {
        Atom {
            atom_type,
            velocity: V2::zeros(),
            position: vec2f(x as FT, y as FT),
            generation,
        }
    }

    pub fn with_velocity(mut self, velocity: V2) -> Atom {
        self.velocity = velocity;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.atom_type.is_empty()
    }
}
