/*!
Region-partitioned parallel simulation of a 2D grid of typed atoms.

The grid is split into vertical stripes which are bucketed into groups of
mutually non-adjacent stripes. A persistent worker pool processes one group at
a time, every worker owning exactly one stripe of the group.
*/

mod platform;
mod simulation;

pub use simulation::*;

pub use platform::start;
