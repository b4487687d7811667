use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    atom::{Atom, AtomType},
    simulation::{EngineError, SimulationEngine},
    simulation_parameters::SimulationParams,
    IT,
};

/// Rectangle of solid cells placed before the first frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneWall {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

/// Disk of atoms spawned at `frame`, and again every frame up to `until_frame` if given.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneSpawn {
    #[serde(default)]
    frame: usize,
    until_frame: Option<usize>,
    x: IT,
    y: IT,
    radius: IT,
    atom_type: AtomType,
}

impl SceneSpawn {
    fn is_active(&self, frame: usize) -> bool {
        match self.until_frame {
            Some(until_frame) => (self.frame..=until_frame).contains(&frame),
            None => self.frame == frame,
        }
    }
}

/// Switch to a different worker layout before `frame` is simulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SceneReconfiguration {
    frame: usize,
    thread_count: usize,
    group_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    walls: Vec<SceneWall>,
    #[serde(default)]
    spawns: Vec<SceneSpawn>,
    #[serde(default)]
    reconfigurations: Vec<SceneReconfiguration>,
}

impl SceneConfig {
    /// Last frame at which the scene still changes something.
    pub fn last_event_frame(&self) -> usize {
        let spawns = self.spawns.iter().map(|s| s.until_frame.unwrap_or(s.frame));
        let reconfigurations = self.reconfigurations.iter().map(|r| r.frame);
        spawns.chain(reconfigurations).max().unwrap_or(0)
    }
}

pub fn init_engine(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    counters_enabled: bool,
) -> Result<SimulationEngine, EngineError> {
    let mut engine = SimulationEngine::new(simulation_params, counters_enabled)?;

    let unprocessed = !engine.generation();
    let grid = engine.grid_mut();
    let mut num_solids = 0;
    for wall in &scene_config.walls {
        for y in wall.y..(wall.y + wall.h).min(grid.height() - 1) {
            for x in wall.x..(wall.x + wall.w).min(grid.width() - 1) {
                if x == 0 || y == 0 {
                    continue;
                }
                grid.set(x, y, Atom::new(AtomType::Solid, x, y, unprocessed));
                num_solids += 1;
            }
        }
    }

    info!(
        "initialized scene with {} solid cells, {} spawns and {} reconfigurations",
        num_solids,
        scene_config.spawns.len(),
        scene_config.reconfigurations.len()
    );

    apply_scene_events(&mut engine, scene_config)?;
    Ok(engine)
}

/// Applies everything the scene schedules for the next frame of `engine`.
pub fn apply_scene_events(engine: &mut SimulationEngine, scene_config: &SceneConfig) -> Result<(), EngineError> {
    let frame = engine.frame_number();

    for reconfiguration in scene_config.reconfigurations.iter().filter(|r| r.frame == frame) {
        engine.reconfigure(reconfiguration.thread_count, reconfiguration.group_count)?;
    }

    for spawn in scene_config.spawns.iter().filter(|s| s.is_active(frame)) {
        engine.spawn_region(spawn.x, spawn.y, spawn.radius, spawn.atom_type);
    }

    Ok(())
}
