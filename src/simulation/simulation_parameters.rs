use serde::{Deserialize, Serialize};

use crate::{displacement::DisplacementRules, floating_type_mod::FT, grid::MIN_GRID_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub width: usize,
    pub height: usize,

    pub thread_count: usize,
    // capped by the thread count
    pub group_count: usize,

    // added to vy of powder and liquid every frame (positive y points down)
    pub gravity: FT,
    pub velocity_decay: FT,
    pub diffusion: FT,
    // liquids jitter with `diffusion * liquid_diffusion_scale`
    pub liquid_diffusion_scale: FT,
    pub collision_loss: FT,
    // sub-cell offset of the mirrored gas targets
    pub bounce_offset: FT,
    pub freeze_epsilon: FT,
    pub particle_spawn_speed: FT,

    // stop atoms which cannot displace any of their 8 neighbours
    pub fully_blocking_check: bool,

    pub displacement_rules: DisplacementRules,

    // `None` seeds every run differently
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            width: 800,
            height: 600,
            thread_count: 4,
            group_count: 2,
            gravity: 0.5,
            velocity_decay: 0.99,
            diffusion: 0.2,
            liquid_diffusion_scale: 0.1,
            collision_loss: 0.1,
            bounce_offset: 0.25,
            freeze_epsilon: 0.01,
            particle_spawn_speed: 5.0,
            fully_blocking_check: true,
            displacement_rules: DisplacementRules::Strict,
            seed: None,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.width < MIN_GRID_SIZE || self.height < MIN_GRID_SIZE {
            return Err(format!(
                "grid must be at least {}x{} (got {}x{})",
                MIN_GRID_SIZE, MIN_GRID_SIZE, self.width, self.height
            ));
        }

        let constants = [
            ("gravity", self.gravity),
            ("velocity_decay", self.velocity_decay),
            ("diffusion", self.diffusion),
            ("liquid_diffusion_scale", self.liquid_diffusion_scale),
            ("collision_loss", self.collision_loss),
            ("bounce_offset", self.bounce_offset),
            ("freeze_epsilon", self.freeze_epsilon),
            ("particle_spawn_speed", self.particle_spawn_speed),
        ];
        for (name, value) in constants.iter() {
            if !value.is_finite() {
                return Err(format!("{} must be finite (got {})", name, value));
            }
        }
        if self.freeze_epsilon < 0. {
            return Err(format!("freeze_epsilon must not be negative (got {})", self.freeze_epsilon));
        }

        Ok(())
    }
}
