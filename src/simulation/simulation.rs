use std::{
    collections::HashMap,
    fmt::{Display, Write},
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use num_traits::Float;
use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;

use crate::{
    atom::AtomType,
    floating_type_mod::FT,
    grid::{spawn_region, Grid},
    movement::RegionStatistics,
    regions::{RegionSchedule, ScheduleError},
    simulation_parameters::SimulationParams,
    worker_pool::WorkerPool,
    IT,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid simulation parameters: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("worker {slot} panicked during the frame")]
    WorkerPanicked { slot: usize },

    #[error("a previous frame failed, reconfigure the engine before stepping again")]
    Poisoned,
}

#[derive(Clone)]
struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}
impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }
    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }
}
impl Counter<FT> {
    fn avg(&self) -> FT {
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }
    fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::max_value(), FT::min)
    }
    fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::min_value(), FT::max)
    }
}
impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    fn avg(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>() / self.values.len().max(1) as u32
    }

    fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

struct ValueCounters {
    counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}
impl ValueCounters {
    fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

struct PerformanceCounters {
    counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}
impl PerformanceCounters {
    fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }

    fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            }
        }
    }
}

/// Summary of one simulated frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStatistics {
    pub frame: usize,
    pub live_atoms: usize,
    pub processed: usize,
    pub moved: usize,
    pub vanished: usize,
    pub blocked: usize,
    pub duration: Duration,
}

/// Owns the grid and the worker pool and advances the simulation frame by frame.
///
/// A frame runs the groups of the current schedule one after another. All regions of a group
/// are processed concurrently, one per worker. The generation flag flips after every frame.
pub struct SimulationEngine {
    grid: Grid,
    simulation_params: SimulationParams,

    // `None` only while reconfiguring or after a failed reconfiguration
    pool: Option<WorkerPool>,
    poisoned: bool,

    generation: bool,
    frame_number: usize,
    spawn_rng: StdRng,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl SimulationEngine {
    pub fn new(simulation_params: SimulationParams, counters_enabled: bool) -> Result<SimulationEngine, EngineError> {
        simulation_params.validate().map_err(EngineError::InvalidParams)?;

        let schedule = RegionSchedule::build(
            simulation_params.width,
            simulation_params.height,
            simulation_params.thread_count,
            simulation_params.group_count,
        )?;
        let pool = WorkerPool::new(schedule, simulation_params)?;

        let spawn_rng = match simulation_params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "created {}x{} grid with {} threads in {} groups",
            simulation_params.width,
            simulation_params.height,
            pool.thread_count(),
            pool.schedule().effective_group_count()
        );

        Ok(SimulationEngine {
            grid: Grid::new(simulation_params.width, simulation_params.height),
            simulation_params,
            pool: Some(pool),
            poisoned: false,
            generation: true,
            frame_number: 0,
            spawn_rng,
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Direct access to the cells between frames.
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn simulation_params(&self) -> &SimulationParams {
        &self.simulation_params
    }

    pub fn schedule(&self) -> Option<&RegionSchedule> {
        self.pool.as_ref().map(|pool| pool.schedule())
    }

    /// The flag atoms are stamped with during the next frame.
    pub fn generation(&self) -> bool {
        self.generation
    }

    pub fn frame_number(&self) -> usize {
        self.frame_number
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned || self.pool.is_none()
    }

    /// Simulates one frame.
    ///
    /// Fails if a worker panics. The grid is left in whatever state the frame reached and the
    /// engine refuses to step until `reconfigure` succeeded.
    pub fn step(&mut self) -> Result<FrameStatistics, EngineError> {
        if self.is_poisoned() {
            return Err(EngineError::Poisoned);
        }
        let pool = self.pool.as_ref().ok_or(EngineError::Poisoned)?;

        let start = Instant::now();
        self.pcounters.begin("frame");

        let mut statistics = RegionStatistics::default();
        for group in 0..pool.schedule().effective_group_count() {
            self.pcounters.begin("group");
            let result = pool.run_group(&mut self.grid, group, self.generation);
            self.pcounters.end("group");

            match result {
                Ok(group_statistics) => statistics.accumulate(&group_statistics),
                Err(err) => {
                    warn!("frame {} aborted in group {}: {}", self.frame_number, group, err);
                    self.poisoned = true;
                    return Err(err);
                }
            }
        }

        self.pcounters.end("frame");
        self.generation = !self.generation;
        self.frame_number += 1;

        let frame_statistics = FrameStatistics {
            frame: self.frame_number,
            live_atoms: self.grid.live_atoms(),
            processed: statistics.processed,
            moved: statistics.moved,
            vanished: statistics.vanished,
            blocked: statistics.blocked,
            duration: start.elapsed(),
        };

        self.vcounters.add_value("live-atoms", frame_statistics.live_atoms as FT);
        self.vcounters.add_value("processed", frame_statistics.processed as FT);
        self.vcounters.add_value("moved", frame_statistics.moved as FT);
        self.vcounters.add_value("vanished", frame_statistics.vanished as FT);

        debug!(
            "frame {}: {} live, {} moved, {} vanished, {} blocked",
            frame_statistics.frame,
            frame_statistics.live_atoms,
            frame_statistics.moved,
            frame_statistics.vanished,
            frame_statistics.blocked
        );

        Ok(frame_statistics)
    }

    /// Replaces the worker pool with one for `thread_count` workers and `group_count` groups.
    ///
    /// The new schedule is validated first; on failure the running pool is kept. Otherwise the
    /// old workers are stopped and joined before any new worker is spawned.
    pub fn reconfigure(&mut self, thread_count: usize, group_count: usize) -> Result<(), EngineError> {
        let schedule = RegionSchedule::build(
            self.simulation_params.width,
            self.simulation_params.height,
            thread_count,
            group_count,
        )?;

        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }

        self.simulation_params.thread_count = thread_count;
        self.simulation_params.group_count = group_count;

        let pool = WorkerPool::new(schedule, self.simulation_params)?;
        info!(
            "reconfigured to {} threads in {} groups (stripe width {})",
            thread_count,
            pool.schedule().effective_group_count(),
            pool.schedule().stripe_width()
        );

        self.pool = Some(pool);
        self.poisoned = false;
        Ok(())
    }

    pub fn set_thread_count(&mut self, thread_count: usize) -> Result<(), EngineError> {
        self.reconfigure(thread_count, self.simulation_params.group_count)
    }

    pub fn set_group_count(&mut self, group_count: usize) -> Result<(), EngineError> {
        self.reconfigure(self.simulation_params.thread_count, group_count)
    }

    /// Replaces the physics constants. The grid size is fixed for the lifetime of the engine;
    /// a different thread or group count reconfigures the pool.
    pub fn set_params(&mut self, simulation_params: SimulationParams) -> Result<(), EngineError> {
        simulation_params.validate().map_err(EngineError::InvalidParams)?;
        if (simulation_params.width, simulation_params.height)
            != (self.simulation_params.width, self.simulation_params.height)
        {
            return Err(EngineError::InvalidParams(format!(
                "grid size cannot change from {}x{} to {}x{}",
                self.simulation_params.width,
                self.simulation_params.height,
                simulation_params.width,
                simulation_params.height
            )));
        }

        let layout_changed = (simulation_params.thread_count, simulation_params.group_count)
            != (self.simulation_params.thread_count, self.simulation_params.group_count);

        if layout_changed {
            // validate the new layout before touching anything
            RegionSchedule::build(
                simulation_params.width,
                simulation_params.height,
                simulation_params.thread_count,
                simulation_params.group_count,
            )?;
        }

        self.simulation_params = simulation_params;
        if layout_changed {
            self.reconfigure(simulation_params.thread_count, simulation_params.group_count)
        } else {
            if let Some(pool) = &self.pool {
                pool.set_params(simulation_params);
            }
            Ok(())
        }
    }

    /// Fills a disk of interior cells with fresh atoms which are simulated in the next frame.
    /// Spawning `AtomType::None` erases. Returns the number of overwritten cells.
    pub fn spawn_region(&mut self, center_x: IT, center_y: IT, radius: IT, atom_type: AtomType) -> usize {
        let num_spawned = spawn_region(
            &mut self.grid,
            center_x,
            center_y,
            radius,
            atom_type,
            !self.generation,
            self.simulation_params.particle_spawn_speed,
            &mut self.spawn_rng,
        );
        debug!(
            "spawned {} {} atoms around ({}, {})",
            num_spawned,
            atom_type.as_str_lowercase(),
            center_x,
            center_y
        );
        num_spawned
    }
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

pub fn write_statistics(engine: &SimulationEngine) -> String {
    let mut s = String::new();

    let simulation_time = engine
        .pcounters
        .counters
        .get("frame")
        .map(|c| c.sum())
        .unwrap_or_default();

    writeln!(s, "frames: {}", engine.frame_number()).unwrap();
    writeln!(s, "simulation-time: {}ms", simulation_time.as_secs_f64() * 1000.).unwrap();
    if engine.frame_number() > 0 {
        writeln!(
            s,
            "frames-per-second: {:.1}",
            engine.frame_number() as f64 / simulation_time.as_secs_f64().max(1e-9)
        )
        .unwrap();
    }
    writeln!(s).unwrap();

    let mut v = engine.pcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, pcounter) in v {
        writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.).unwrap();
    }
    writeln!(s).unwrap();

    let mut v = engine.vcounters.counters.iter().collect::<Vec<_>>();
    v.sort_by(|x, y| x.0.cmp(y.0));
    for (label, vcounter) in v {
        writeln!(
            s,
            "{}: min:{} max:{} avg:{}",
            label,
            vcounter.min(),
            vcounter.max(),
            vcounter.avg()
        )
        .unwrap();
    }
    writeln!(s).unwrap();

    let histogram = engine.grid().type_histogram();
    for atom_type in crate::atom::ALL_ATOM_TYPES.iter().filter(|t| !t.is_empty()) {
        writeln!(s, "{}: {}", atom_type.as_str_lowercase(), histogram[atom_type.index()]).unwrap();
    }

    s
}
