use serde::{Deserialize, Serialize};

use crate::atom::{AtomType, NUM_ATOM_TYPES};

/// `table[attacker][target]` is true if an atom of type `attacker` may move into a cell
/// occupied by `target`. Both cells swap their contents on such a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplacementMatrix {
    table: [[bool; NUM_ATOM_TYPES]; NUM_ATOM_TYPES],
}

const T: bool = true;
const F: bool = false;

// columns: none, solid, powder, liquid, gas, particle
static STRICT: DisplacementMatrix = DisplacementMatrix {
    table: [
        [F, F, F, F, F, F], // none
        [F, F, F, F, F, F], // solid
        [T, F, F, F, F, F], // powder
        [T, F, F, F, F, F], // liquid
        [T, F, F, F, F, F], // gas
        [T, F, T, T, T, T], // particle
    ],
};

static LAYERED: DisplacementMatrix = DisplacementMatrix {
    table: [
        [F, F, F, F, F, F], // none
        [F, F, F, F, F, F], // solid
        [T, F, F, T, T, F], // powder
        [T, F, F, F, T, F], // liquid
        [T, F, F, F, T, F], // gas
        [T, F, T, T, T, T], // particle
    ],
};

impl DisplacementMatrix {
    pub const fn new(table: [[bool; NUM_ATOM_TYPES]; NUM_ATOM_TYPES]) -> Self {
        DisplacementMatrix { table }
    }

    #[inline(always)]
    pub fn can_displace(&self, attacker: AtomType, target: AtomType) -> bool {
        self.table[attacker.index()][target.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplacementRules {
    /// Atoms only move into empty cells. Particles push through everything but solids.
    Strict,

    /// Like `Strict`, but denser matter sinks: powder through liquid and gas, liquid through gas.
    /// Gas mixes with gas.
    Layered,
}

impl Default for DisplacementRules {
    fn default() -> Self {
        DisplacementRules::Strict
    }
}

impl DisplacementRules {
    pub fn matrix(self) -> &'static DisplacementMatrix {
        match self {
            DisplacementRules::Strict => &STRICT,
            DisplacementRules::Layered => &LAYERED,
        }
    }
}
