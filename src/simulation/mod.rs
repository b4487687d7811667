pub mod atom;
pub mod color_map;
pub mod colors;
pub mod concurrency;
pub mod displacement;
pub mod grid;
pub mod movement;
pub mod region_view;
pub mod regions;
pub mod scene;
pub mod simulation;
pub mod simulation_parameters;
pub mod worker_pool;

pub type IT = i32;

// velocity and position math is single precision on purpose
pub mod floating_type_mod {
    pub type FT = f32;
}

use floating_type_mod::FT;

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type V2 = V<FT, 2>;
pub type V3 = V<FT, 3>;

pub fn vec2f(x: FT, y: FT) -> V2 {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use colors::VisualizedAttribute;
pub use scene::{apply_scene_events, init_engine, SceneConfig};
pub use simulation::*;
