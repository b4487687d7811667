use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    ptr,
    sync::{
        atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    thread::{self, JoinHandle},
};

use crossbeam_utils::Backoff;
use log::{debug, error, info, warn};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    atom::Atom,
    grid::Grid,
    movement::{simulate_region, RegionStatistics},
    region_view::{GridPtr, RegionView},
    regions::{Region, RegionSchedule},
    simulation::EngineError,
    simulation_parameters::SimulationParams,
};

/// Single-consumer start signal.
///
/// `open` releases exactly one pass through `wait`. The waiter spins with exponential backoff
/// and parks once the backoff is exhausted, so whoever opens the gate should also unpark the
/// waiting thread.
#[derive(Debug, Default)]
pub struct SpinGate {
    open: AtomicBool,
}

impl SpinGate {
    pub fn new() -> SpinGate {
        SpinGate::default()
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Blocks until the gate is open and closes it again.
    pub fn wait(&self) {
        let backoff = Backoff::new();
        loop {
            if self
                .open
                .compare_exchange_weak(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }

            if backoff.is_completed() {
                thread::park();
            } else {
                backoff.snooze();
            }
        }
    }
}

/// Work done by a worker for its region of the current group.
pub type RegionJob = fn(&mut RegionView, Region, bool, &SimulationParams, &mut StdRng) -> RegionStatistics;

fn simulate_job(
    view: &mut RegionView,
    region: Region,
    generation: bool,
    simulation_params: &SimulationParams,
    rng: &mut StdRng,
) -> RegionStatistics {
    simulate_region(view, region, generation, simulation_params, rng)
}

/// Random generator of a worker slot. Seeded runs reproduce as long as the schedule is unchanged.
pub fn worker_rng(seed: Option<u64>, slot: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ (slot as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}

const NO_PANIC: usize = usize::MAX;

struct PoolShared {
    schedule: RegionSchedule,
    params: RwLock<SimulationParams>,
    job: RegionJob,

    width: usize,
    height: usize,

    // written by the driver before the gates open
    grid: AtomicPtr<Atom>,
    group: AtomicUsize,
    generation: AtomicBool,

    gates: Vec<SpinGate>,
    completed: AtomicUsize,
    exiting: AtomicBool,

    statistics: Mutex<RegionStatistics>,
    panicked_slot: AtomicUsize,
}

impl PoolShared {
    fn params(&self) -> SimulationParams {
        *self.params.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_statistics(&self, statistics: &RegionStatistics) {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accumulate(statistics);
    }

    fn take_statistics(&self) -> RegionStatistics {
        std::mem::take(&mut *self.statistics.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn worker_loop(shared: Arc<PoolShared>, slot: usize) {
    let mut rng = worker_rng(shared.params().seed, slot);
    debug!("worker {} started", slot);

    loop {
        shared.gates[slot].wait();
        if shared.exiting.load(Ordering::Acquire) {
            break;
        }

        let group = shared.group.load(Ordering::Relaxed);
        let generation = shared.generation.load(Ordering::Relaxed);
        let region = shared.schedule.region(group, slot);
        let params = shared.params();
        let grid_ptr = shared.grid.load(Ordering::Acquire);

        let result = catch_unwind(AssertUnwindSafe(|| {
            assert!(!grid_ptr.is_null(), "worker {} was started without a grid", slot);

            // !!! the schedule guarantees that no other worker touches this window in the current group !!!
            let grid = unsafe { GridPtr::from_raw(grid_ptr, shared.width, shared.height) };
            let mut view = unsafe { RegionView::new(grid, region) };
            (shared.job)(&mut view, region, generation, &params, &mut rng)
        }));

        match result {
            Ok(statistics) => shared.add_statistics(&statistics),
            Err(_) => {
                error!("worker {} panicked while processing region {:?}", slot, region);
                let _ = shared
                    .panicked_slot
                    .compare_exchange(NO_PANIC, slot, Ordering::AcqRel, Ordering::Acquire);
            }
        }

        // a panicking worker still reports, otherwise the driver would wait forever
        shared.completed.fetch_add(1, Ordering::AcqRel);
    }

    debug!("worker {} exiting", slot);
}

/// Fixed set of threads, one per schedule slot, which process one group of regions whenever
/// the driver opens their gates.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(schedule: RegionSchedule, simulation_params: SimulationParams) -> Result<WorkerPool, EngineError> {
        Self::with_job(schedule, simulation_params, simulate_job)
    }

    pub fn with_job(
        schedule: RegionSchedule,
        simulation_params: SimulationParams,
        job: RegionJob,
    ) -> Result<WorkerPool, EngineError> {
        let thread_count = schedule.thread_count();

        let shared = Arc::new(PoolShared {
            width: simulation_params.width,
            height: simulation_params.height,
            schedule,
            params: RwLock::new(simulation_params),
            job,
            grid: AtomicPtr::new(ptr::null_mut()),
            group: AtomicUsize::new(0),
            generation: AtomicBool::new(false),
            gates: (0..thread_count).map(|_| SpinGate::new()).collect(),
            completed: AtomicUsize::new(0),
            exiting: AtomicBool::new(false),
            statistics: Mutex::new(RegionStatistics::default()),
            panicked_slot: AtomicUsize::new(NO_PANIC),
        });

        let mut pool = WorkerPool {
            shared,
            workers: Vec::with_capacity(thread_count),
        };

        for slot in 0..thread_count {
            let shared = pool.shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("grid-worker-{}", slot))
                .spawn(move || worker_loop(shared, slot));

            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(err) => {
                    // dropping the pool joins the workers spawned so far
                    return Err(EngineError::Spawn(err.to_string()));
                }
            }
        }

        info!(
            "started {} workers ({} groups, {} regions)",
            thread_count,
            pool.shared.schedule.effective_group_count(),
            pool.shared.schedule.region_count()
        );

        Ok(pool)
    }

    pub fn schedule(&self) -> &RegionSchedule {
        &self.shared.schedule
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Replaces the physics constants used from the next group on. Grid size and thread layout
    /// of `simulation_params` are ignored.
    pub fn set_params(&self, simulation_params: SimulationParams) {
        *self.shared.params.write().unwrap_or_else(PoisonError::into_inner) = simulation_params;
    }

    /// Processes every region of `group` concurrently and returns once all workers reported back.
    pub fn run_group(
        &self,
        grid: &mut Grid,
        group: usize,
        generation: bool,
    ) -> Result<RegionStatistics, EngineError> {
        let shared = &self.shared;
        assert_eq!((grid.width(), grid.height()), (shared.width, shared.height));
        assert!(group < shared.schedule.effective_group_count());

        shared.grid.store(grid.atoms_mut().as_mut_ptr(), Ordering::Release);
        shared.group.store(group, Ordering::Relaxed);
        shared.generation.store(generation, Ordering::Relaxed);
        shared.completed.store(0, Ordering::Release);

        for (gate, worker) in shared.gates.iter().zip(self.workers.iter()) {
            gate.open();
            worker.thread().unpark();
        }

        let backoff = Backoff::new();
        while shared.completed.load(Ordering::Acquire) < self.workers.len() {
            backoff.snooze();
        }

        shared.grid.store(ptr::null_mut(), Ordering::Release);
        let statistics = shared.take_statistics();

        let slot = shared.panicked_slot.load(Ordering::Acquire);
        if slot != NO_PANIC {
            return Err(EngineError::WorkerPanicked { slot });
        }

        Ok(statistics)
    }

    /// Stops and joins all workers. Called on drop.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.shared.exiting.store(true, Ordering::Release);
        for (gate, worker) in self.shared.gates.iter().zip(self.workers.iter()) {
            gate.open();
            worker.thread().unpark();
        }

        let worker_count = self.workers.len();
        for (slot, worker) in self.workers.drain(..).enumerate() {
            if worker.join().is_err() {
                warn!("worker {} terminated abnormally", slot);
            }
        }

        debug!("stopped {} workers", worker_count);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
