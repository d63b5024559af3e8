//! The session-scoped simulation contract.
//!
//! A transport (or the C ABI in `ffi/`) exposes exactly these operations for
//! one simulation per session. `Session` is the in-process implementation.

use crate::automaton::{
    Frame, GridSnapshot, Point, RunStatus, SchedulerState, SimulationScheduler, StepOutcome,
    StopStatus,
};
use crate::config::SimConfig;
use crate::error::{CompileError, GridError, SimError};
use crate::rule::{LoadReport, RuleSpec};

pub trait CaService: Send + Sync {
    /// Load a rule. Blanks the grid if the new rule has fewer states.
    fn init_ca(&self, spec: RuleSpec) -> Result<LoadReport, CompileError>;

    /// Replace the grid with a blank one in the default state; generation goes to 0.
    fn init_grid_blank(&self, width: i32, height: i32) -> Result<(), GridError>;

    /// Replace the grid with `grid`; generation goes to 0.
    fn init_grid(&self, grid: GridSnapshot) -> Result<(), GridError>;

    fn get_grid(&self) -> GridSnapshot;

    fn get_cell_state(&self, point: Point) -> u32;

    /// Queue a write for the next apply. Ignored before a rule is loaded.
    fn set_cell_state(&self, point: Point, state: u32);

    fn get_num_neighbors(&self, point: Point, state: u32) -> usize;

    fn step(&self) -> Result<StepOutcome, SimError>;

    fn run(&self, throttled: bool) -> Result<RunStatus, SimError>;

    /// Blocks until the background loop has exited.
    fn stop(&self) -> StopStatus;

    /// Apply queued writes now; with `add_to_updated` they are also published as a frame.
    fn update_grid(&self, add_to_updated: bool) -> Result<usize, SimError>;

    /// Next frame, if one is ready. Never blocks.
    fn get_updated(&self) -> Option<Frame>;

    fn get_num_states(&self) -> u32;

    fn get_default_state(&self) -> u32;

    fn get_generation(&self) -> u64;
}

/// One simulation and everything it owns. Dropping it stops the loop.
pub struct Session {
    scheduler: SimulationScheduler,
}

impl Session {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        Ok(Session {
            scheduler: SimulationScheduler::new(config)?,
        })
    }

    pub fn scheduler(&self) -> &SimulationScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Cell count of the next frame, if any.
    pub fn next_frame_len(&self) -> Option<usize> {
        self.scheduler.frames().front_len()
    }

    /// Pop the next frame only if `accept` agrees.
    pub fn next_frame_if(&self, accept: impl FnOnce(&Frame) -> bool) -> Option<Frame> {
        self.scheduler.frames().try_pop_if(accept)
    }
}

impl CaService for Session {
    fn init_ca(&self, spec: RuleSpec) -> Result<LoadReport, CompileError> {
        self.scheduler.load_rule(spec).map_err(|err| {
            log::warn!("rule rejected: {err}");
            err
        })
    }

    fn init_grid_blank(&self, width: i32, height: i32) -> Result<(), GridError> {
        self.scheduler.reinitialize(width, height)
    }

    fn init_grid(&self, grid: GridSnapshot) -> Result<(), GridError> {
        self.scheduler.replace(grid)
    }

    fn get_grid(&self) -> GridSnapshot {
        self.scheduler.grid().snapshot()
    }

    fn get_cell_state(&self, point: Point) -> u32 {
        self.scheduler.grid().get(point)
    }

    fn set_cell_state(&self, point: Point, state: u32) {
        self.scheduler.set_state(point, state);
    }

    fn get_num_neighbors(&self, point: Point, state: u32) -> usize {
        self.scheduler.num_neighbors(point, state)
    }

    fn step(&self) -> Result<StepOutcome, SimError> {
        self.scheduler.step()
    }

    fn run(&self, throttled: bool) -> Result<RunStatus, SimError> {
        self.scheduler.run(throttled)
    }

    fn stop(&self) -> StopStatus {
        self.scheduler.stop()
    }

    fn update_grid(&self, add_to_updated: bool) -> Result<usize, SimError> {
        self.scheduler.update_grid(add_to_updated)
    }

    fn get_updated(&self) -> Option<Frame> {
        self.scheduler.frames().try_pop()
    }

    fn get_num_states(&self) -> u32 {
        self.scheduler.num_states()
    }

    fn get_default_state(&self) -> u32 {
        self.scheduler.default_state()
    }

    fn get_generation(&self) -> u64 {
        self.scheduler.generation()
    }
}
