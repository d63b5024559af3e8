//! Generation stepping, edits and the background run loop.
//!
//! One generation: snapshot the loaded rule, evaluate either every cell or
//! the sealed dirty set on the worker pool, submit the proposed writes, then
//! cross the generation boundary (take the pending batch and seal the dirty
//! set together), apply the batch and publish it as a frame.
//!
//! Boundaries (step, explicit update, grid swap, rule load) are serialized by
//! `step_lock`. Edits only take the shared side of `gate`, so they never wait
//! on an evaluation pass, only on the short boundary swap.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;

use super::cell::{Cell, Point};
use super::frames::{Frame, FrameKind, FrameQueue};
use super::grid::{count_neighbors, GridSnapshot, GridStore, NeighborhoodView};
use super::incremental::DirtySetTracker;
use super::pacing::PacingController;
use super::pending::PendingChangeBuffer;
use crate::config::SimConfig;
use crate::error::{CompileError, GridError, SimError};
use crate::rule::{LoadReport, LoadedRule, RuleEngine, RuleSpec};
use crate::sync::{lock, LoopHandle, StopSignal};

/// Dirty candidates handed to one worker at a time.
const CANDIDATE_CHUNK: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// No rule loaded.
    Idle,
    /// A rule is loaded and the loop is not running.
    Configured,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced { generation: u64, writes: usize },
    NoRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    AlreadyRunning,
    NoRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    AlreadyStopped,
}

struct Shared {
    config: SimConfig,
    grid: GridStore,
    rules: RuleEngine,
    dirty: DirtySetTracker,
    pending: PendingChangeBuffer,
    frames: FrameQueue,
    generation: AtomicU64,
    /// Set by a rule load; the next step evaluates every cell.
    full_sweep: AtomicBool,
    step_lock: Mutex<()>,
    gate: RwLock<()>,
    pool: rayon::ThreadPool,
    pacing: Mutex<PacingController>,
}

pub struct SimulationScheduler {
    shared: Arc<Shared>,
    runner: Mutex<Option<LoopHandle>>,
}

impl SimulationScheduler {
    /// Build a scheduler with a blank grid of the configured size and no rule.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ca-worker-{i}"))
            .build()?;
        let grid = GridStore::new(config.grid_width, config.grid_height, 0)?;
        log::info!(
            "simulation ready: {}x{} grid, {} worker thread(s)",
            config.grid_width,
            config.grid_height,
            workers
        );

        let pacing = PacingController::new(config.pacing.clone());
        Ok(SimulationScheduler {
            shared: Arc::new(Shared {
                config,
                grid,
                rules: RuleEngine::new(),
                dirty: DirtySetTracker::new(),
                pending: PendingChangeBuffer::new(),
                frames: FrameQueue::new(),
                generation: AtomicU64::new(0),
                full_sweep: AtomicBool::new(true),
                step_lock: Mutex::new(()),
                gate: RwLock::new(()),
                pool,
                pacing: Mutex::new(pacing),
            }),
            runner: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    pub fn grid(&self) -> &GridStore {
        &self.shared.grid
    }

    pub fn frames(&self) -> &FrameQueue {
        &self.shared.frames
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    pub fn num_states(&self) -> u32 {
        self.shared.rules.num_states()
    }

    pub fn default_state(&self) -> u32 {
        self.shared.rules.default_state()
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_running() {
            SchedulerState::Running
        } else if self.shared.rules.is_loaded() {
            SchedulerState::Configured
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Load a rule. A rule with fewer states than the current one also blanks
    /// the grid to the new default state.
    pub fn load_rule(&self, spec: RuleSpec) -> Result<LoadReport, CompileError> {
        self.shared.load_rule(spec)
    }

    pub fn step(&self) -> Result<StepOutcome, SimError> {
        self.shared.step()
    }

    /// Queue one write for the next boundary. Ignored until a rule is loaded.
    pub fn set_state(&self, point: Point, state: u32) {
        self.shared.set_state(point, state);
    }

    /// Apply queued writes now, outside a step. Returns how many were applied.
    pub fn update_grid(&self, add_to_updated: bool) -> Result<usize, SimError> {
        self.shared.update_grid(add_to_updated)
    }

    pub fn reinitialize(&self, width: i32, height: i32) -> Result<(), GridError> {
        let fill = self.shared.rules.default_state();
        self.shared
            .swap_grid(|grid| grid.reinitialize(width, height, fill))
    }

    pub fn replace(&self, snapshot: GridSnapshot) -> Result<(), GridError> {
        self.shared.swap_grid(|grid| grid.replace(snapshot))
    }

    /// Neighbors of `point` in `state` under the loaded neighborhood.
    pub fn num_neighbors(&self, point: Point, state: u32) -> usize {
        self.shared.rules.current().map_or(0, |rule| {
            count_neighbors(&self.shared.grid.read(), rule.neighborhood(), point, state)
        })
    }

    /// Start stepping on a background thread until `stop`.
    pub fn run(&self, throttled: bool) -> Result<RunStatus, SimError> {
        let mut runner = lock(&self.runner);
        match runner.take() {
            Some(handle) if !handle.is_finished() => {
                *runner = Some(handle);
                return Ok(RunStatus::AlreadyRunning);
            }
            // The previous loop ended on its own; reap it
            Some(handle) => handle.stop(),
            None => {}
        }
        if !self.shared.rules.is_loaded() {
            log::warn!("run requested before a rule was loaded");
            return Ok(RunStatus::NoRule);
        }

        lock(&self.shared.pacing).set_throttled(throttled);
        let shared = Arc::clone(&self.shared);
        *runner = Some(LoopHandle::spawn("ca-simulation", move |stop| {
            shared.run_loop(stop)
        })?);
        log::info!("simulation loop started (throttled: {throttled})");
        Ok(RunStatus::Started)
    }

    /// Stop the background loop and wait for it. The current step finishes first.
    pub fn stop(&self) -> StopStatus {
        let handle = lock(&self.runner).take();
        match handle {
            Some(handle) => {
                handle.stop();
                lock(&self.shared.pacing).reset();
                log::info!("simulation loop stopped at generation {}", self.generation());
                StopStatus::Stopped
            }
            None => StopStatus::AlreadyStopped,
        }
    }
}

impl Drop for SimulationScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Shared {
    fn edit_side(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn boundary_side(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, point: Point, state: u32) {
        let Some(rule) = self.rules.current() else {
            log::warn!("ignoring write at ({}, {}): no rule loaded", point.x, point.y);
            return;
        };
        let _edit = self.edit_side();
        let (width, height) = self.grid.dimensions();
        let cell = Cell::at(point, state).wrapped(width, height);
        self.pending.push(cell);
        self.dirty
            .mark_dirty(cell.point(), rule.reverse_neighborhood(), width, height);
    }

    /// Queue a generation's proposals exactly like edits.
    fn submit(&self, writes: &[Cell], rule: &LoadedRule) {
        let _edit = self.edit_side();
        let (width, height) = self.grid.dimensions();
        self.pending.extend(writes);
        self.dirty
            .mark_writes(writes, rule.reverse_neighborhood(), width, height);
    }

    /// Generation boundary: everything submitted so far goes into this batch,
    /// and its marks become the next generation's candidates.
    fn take_batch(&self) -> Vec<Cell> {
        let _boundary = self.boundary_side();
        let batch = self.pending.take();
        self.dirty.seal();
        batch
    }

    fn step(&self) -> Result<StepOutcome, SimError> {
        let _serial = lock(&self.step_lock);
        let Some(rule) = self.rules.current() else {
            return Ok(StepOutcome::NoRule);
        };

        let forced = self.full_sweep.swap(false, Ordering::SeqCst);
        let sweep = forced
            || self.generation.load(Ordering::SeqCst) == 0
            || rule.neighborhood().is_empty()
            || !self.config.incremental;
        let candidates = self.dirty.drain_for_next_generation();

        let proposals = {
            let grid = self.grid.read();
            let view = NeighborhoodView::new(&grid, rule.neighborhood());
            let (width, height) = grid.dimensions();
            let rule = &*rule;
            let view = &view;
            self.pool.install(|| {
                let chunks: Vec<Vec<Cell>> = if sweep {
                    (0..height)
                        .into_par_iter()
                        .map(|y| {
                            let mut out = Vec::new();
                            for x in 0..width {
                                rule.evaluate(Point::new(x, y), view, &mut out);
                            }
                            out
                        })
                        .collect()
                } else {
                    candidates
                        .par_chunks(CANDIDATE_CHUNK)
                        .map(|chunk| {
                            let mut out = Vec::new();
                            for &point in chunk {
                                rule.evaluate(point, view, &mut out);
                            }
                            out
                        })
                        .collect()
                };
                chunks.concat()
            })
        };

        self.submit(&proposals, &rule);
        let batch = self.take_batch();
        let writes = self.grid.apply_batch(&batch)?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.frames.push(Frame::new(FrameKind::Step, generation, batch));

        log::debug!(
            "generation {generation}: {} evaluated, {} proposed, {writes} applied",
            if sweep { "all cells".to_string() } else { format!("{} candidates", candidates.len()) },
            proposals.len()
        );
        Ok(StepOutcome::Advanced { generation, writes })
    }

    fn update_grid(&self, add_to_updated: bool) -> Result<usize, SimError> {
        let _serial = lock(&self.step_lock);
        let batch = self.take_batch();
        let applied = self.grid.apply_batch(&batch)?;
        if add_to_updated && !batch.is_empty() {
            let generation = self.generation.load(Ordering::SeqCst);
            self.frames.push(Frame::new(FrameKind::Edit, generation, batch));
        }
        Ok(applied)
    }

    fn load_rule(&self, spec: RuleSpec) -> Result<LoadReport, CompileError> {
        let _serial = lock(&self.step_lock);
        let report = self.rules.load(spec)?;
        if report.downgraded() {
            let (width, height) = self.grid.dimensions();
            log::info!(
                "rule has fewer states ({} < {}), blanking grid",
                report.num_states,
                report.previous_num_states
            );
            if let Err(err) =
                self.reset_grid(|grid| grid.reinitialize(width, height, report.default_state))
            {
                log::error!("failed to blank grid after rule load: {err}");
            }
        }
        self.full_sweep.store(true, Ordering::SeqCst);
        Ok(report)
    }

    fn swap_grid(
        &self,
        swap: impl FnOnce(&GridStore) -> Result<(), GridError>,
    ) -> Result<(), GridError> {
        let _serial = lock(&self.step_lock);
        self.reset_grid(swap)
    }

    /// Swap the grid and forget everything tied to the old one. Caller holds `step_lock`.
    fn reset_grid(
        &self,
        swap: impl FnOnce(&GridStore) -> Result<(), GridError>,
    ) -> Result<(), GridError> {
        {
            let _boundary = self.boundary_side();
            swap(&self.grid)?;
            self.pending.clear();
            self.dirty.clear();
        }
        self.frames.clear();
        self.generation.store(0, Ordering::SeqCst);
        let (width, height) = self.grid.dimensions();
        log::info!("grid reset to {width}x{height}");
        Ok(())
    }

    fn run_loop(&self, stop: &StopSignal) {
        while !stop.is_raised() {
            if let Err(err) = self.step() {
                log::error!("step failed, leaving simulation loop: {err}");
                return;
            }
            let backlog = self.frames.len();
            let delay = lock(&self.pacing).adjust(backlog);
            log::trace!("backlog {backlog}, next step in {delay:?}");
            if stop.wait_timeout(delay) {
                return;
            }
        }
    }
}
