//! Consumer side of the frame stream.
//!
//! Three cooperative loops over one `CaService`:
//! - retrieval (only while streaming) starts the service's run loop and
//!   polls frames into a local inbox, backing off when the inbox grows;
//! - apply (always) moves frames from the inbox into the `GridMirror`;
//! - refresh (only while frames may be skipped) posts a redraw on a timer.
//!
//! Without frame skipping the apply loop posts a redraw for every frame
//! itself and the refresh loop is not running.

pub mod display;
pub mod mirror;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::automaton::{Cell, FrameQueue, GridSnapshot, Point, RunStatus, StepOutcome, StopStatus};
use crate::config::ClientConfig;
use crate::error::{CompileError, GridError, SimError};
use crate::rule::{LoadReport, RuleSpec};
use crate::session::CaService;
use crate::sync::{lock, LoopHandle, StopSignal};

pub use display::{DisplayQueue, RefreshRequest};
pub use mirror::GridMirror;

/// What a click on a cell does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellEdit {
    /// Advance to the next state, wrapping to 0.
    Cycle,
    /// Back to the rule's default state.
    Reset,
}

struct ClientShared {
    service: Arc<dyn CaService>,
    config: ClientConfig,
    skip_frames: AtomicBool,
    refresh_period_ms: AtomicU64,
    update_delay_ms: AtomicU64,
    inbox: FrameQueue,
    mirror: GridMirror,
    display: DisplayQueue,
}

pub struct ClientSyncPipeline {
    shared: Arc<ClientShared>,
    retrieval: Mutex<Option<LoopHandle>>,
    apply: Mutex<Option<LoopHandle>>,
    refresh: Mutex<Option<LoopHandle>>,
}

impl ClientSyncPipeline {
    /// Mirror the service's current grid and start the apply (and, when
    /// skipping frames, refresh) loops. The receiver gets every redraw request.
    pub fn new(
        service: Arc<dyn CaService>,
        config: ClientConfig,
    ) -> Result<(Self, Receiver<RefreshRequest>), SimError> {
        let (display, receiver) = DisplayQueue::channel();
        let mirror = GridMirror::new(service.get_grid(), service.get_generation());
        let shared = Arc::new(ClientShared {
            skip_frames: AtomicBool::new(config.skip_frames),
            refresh_period_ms: AtomicU64::new(config.refresh_period_ms),
            update_delay_ms: AtomicU64::new(config.max_update_delay_ms),
            service,
            config,
            inbox: FrameQueue::new(),
            mirror,
            display,
        });

        let apply_shared = Arc::clone(&shared);
        let apply = LoopHandle::spawn("ca-client-apply", move |stop| apply_shared.apply_loop(stop))?;
        let pipeline = ClientSyncPipeline {
            shared,
            retrieval: Mutex::new(None),
            apply: Mutex::new(Some(apply)),
            refresh: Mutex::new(None),
        };
        if pipeline.frame_skipping() {
            pipeline.spawn_refresh()?;
        }
        Ok((pipeline, receiver))
    }

    pub fn mirror(&self) -> &GridMirror {
        &self.shared.mirror
    }

    pub fn service(&self) -> &Arc<dyn CaService> {
        &self.shared.service
    }

    /// Frames retrieved but not yet applied to the mirror.
    pub fn backlog(&self) -> usize {
        self.shared.inbox.len()
    }

    pub fn frame_skipping(&self) -> bool {
        self.shared.skip_frames.load(Ordering::SeqCst)
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.shared.refresh_period_ms.load(Ordering::SeqCst))
    }

    /// Current adaptive sleep of the apply loop while skipping frames.
    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.shared.update_delay_ms.load(Ordering::SeqCst))
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.retrieval)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn is_refreshing(&self) -> bool {
        lock(&self.refresh).is_some()
    }

    pub fn set_refresh_period(&self, period: Duration) {
        let ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self.shared.refresh_period_ms.store(ms, Ordering::SeqCst);
    }

    /// Turning skipping off stops and joins the refresh loop; turning it on starts it again.
    pub fn set_frame_skipping(&self, skip: bool) -> Result<(), SimError> {
        let was = self.shared.skip_frames.swap(skip, Ordering::SeqCst);
        match (was, skip) {
            (true, false) => {
                if let Some(handle) = lock(&self.refresh).take() {
                    handle.stop();
                }
                log::info!("frame skipping disabled");
            }
            (false, true) => {
                self.spawn_refresh()?;
                log::info!("frame skipping enabled");
            }
            _ => {}
        }
        Ok(())
    }

    fn spawn_refresh(&self) -> Result<(), SimError> {
        let mut refresh = lock(&self.refresh);
        if refresh.is_none() {
            let shared = Arc::clone(&self.shared);
            *refresh = Some(LoopHandle::spawn("ca-client-refresh", move |stop| {
                shared.refresh_loop(stop)
            })?);
        }
        Ok(())
    }

    /// Ask the service to run and start pulling frames.
    pub fn start_streaming(&self) -> Result<RunStatus, SimError> {
        let mut retrieval = lock(&self.retrieval);
        if let Some(handle) = retrieval.take() {
            if !handle.is_finished() {
                *retrieval = Some(handle);
                return Ok(RunStatus::AlreadyRunning);
            }
            handle.stop();
        }

        let throttled = !self.frame_skipping();
        let status = self.shared.service.run(throttled)?;
        if status == RunStatus::NoRule {
            return Ok(status);
        }
        // Pull whatever the service produces from here on
        self.shared.update_delay_ms.store(0, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = LoopHandle::spawn("ca-client-retrieval", move |stop| {
            shared.retrieval_loop(stop)
        });
        match handle {
            Ok(handle) => *retrieval = Some(handle),
            Err(err) => {
                self.shared.service.stop();
                return Err(err);
            }
        }
        Ok(status)
    }

    /// Stop the retrieval loop, which stops the service and drains its remaining frames.
    pub fn stop_streaming(&self) -> StopStatus {
        let handle = lock(&self.retrieval).take();
        match handle {
            Some(handle) => {
                handle.stop();
                self.shared
                    .update_delay_ms
                    .store(self.shared.config.max_update_delay_ms, Ordering::SeqCst);
                StopStatus::Stopped
            }
            None => StopStatus::AlreadyStopped,
        }
    }

    /// Advance one generation and queue the resulting frames for the mirror.
    pub fn step_once(&self) -> Result<StepOutcome, SimError> {
        let outcome = self.shared.service.step()?;
        self.shared.pull_all();
        Ok(outcome)
    }

    /// Edit one cell on the service and in the mirror. Returns the state written.
    pub fn edit_cell(&self, point: Point, edit: CellEdit) -> Result<u32, SimError> {
        let service = &self.shared.service;
        let state = match edit {
            CellEdit::Cycle => {
                let next = service.get_cell_state(point).saturating_add(1);
                if next >= service.get_num_states() {
                    0
                } else {
                    next
                }
            }
            CellEdit::Reset => service.get_default_state(),
        };
        service.set_cell_state(point, state);
        if service.update_grid(false)? > 0 {
            self.shared.mirror.set(Cell::at(point, state));
            self.shared.display.post(self.shared.mirror.generation());
        } else {
            log::warn!("edit at ({}, {}) was not applied", point.x, point.y);
        }
        Ok(state)
    }

    /// Load a rule; if the service blanked its grid, re-sync the mirror.
    pub fn load_rule(&self, spec: RuleSpec) -> Result<LoadReport, CompileError> {
        let report = self.shared.service.init_ca(spec)?;
        if report.downgraded() {
            self.sync_from_service();
        }
        Ok(report)
    }

    /// Resize, keeping the overlapping top-left region and filling the rest
    /// with the default state.
    pub fn resize(&self, width: i32, height: i32) -> Result<(), GridError> {
        let old = self.shared.service.get_grid();
        let mut grid = GridSnapshot::blank(width, height, self.shared.service.get_default_state())?;
        let (old_width, old_height) = old.dimensions();
        for y in 0..height.min(old_height) {
            for x in 0..width.min(old_width) {
                grid.set(Cell::new(x, y, old.get(Point::new(x, y))));
            }
        }
        self.load_grid(grid)
    }

    pub fn load_grid(&self, grid: GridSnapshot) -> Result<(), GridError> {
        self.shared.service.init_grid(grid.clone())?;
        self.shared.inbox.clear();
        self.shared.mirror.replace(grid, 0);
        self.shared.display.post(0);
        Ok(())
    }

    /// Blank the service grid at its current size.
    pub fn clear(&self) -> Result<(), GridError> {
        let (width, height) = self.shared.mirror.dimensions();
        self.shared.service.init_grid_blank(width, height)?;
        self.sync_from_service();
        Ok(())
    }

    /// Drop queued frames and copy the service's grid into the mirror.
    pub fn sync_from_service(&self) {
        self.shared.inbox.clear();
        let generation = self.shared.service.get_generation();
        self.shared
            .mirror
            .replace(self.shared.service.get_grid(), generation);
        self.shared.display.post(generation);
    }

    /// Stop streaming and every client loop.
    pub fn shutdown(&self) {
        self.stop_streaming();
        for slot in [&self.refresh, &self.apply] {
            if let Some(handle) = lock(slot).take() {
                handle.stop();
            }
        }
    }
}

impl Drop for ClientSyncPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ClientShared {
    fn skip_frames(&self) -> bool {
        self.skip_frames.load(Ordering::SeqCst)
    }

    fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms.load(Ordering::SeqCst))
    }

    fn pull_all(&self) {
        while let Some(frame) = self.service.get_updated() {
            self.inbox.push(frame);
        }
    }

    fn retrieval_loop(&self, stop: &StopSignal) {
        loop {
            let frame = self.service.get_updated();
            let arrived = frame.is_some();
            if let Some(frame) = frame {
                self.inbox.push(frame);
            }

            let backlog = self.inbox.len();
            let skip = self.skip_frames();
            let pause = if skip && backlog > self.config.retrieval_backlog_limit {
                self.config.max_update_delay()
            } else if !skip && backlog >= self.config.unskipped_backlog_limit {
                self.refresh_period() * 2
            } else if !arrived {
                self.config.poll_interval()
            } else {
                Duration::ZERO
            };
            if stop.wait_timeout(pause) {
                break;
            }
        }

        self.service.stop();
        self.pull_all();
        log::debug!("retrieval finished with {} frame(s) queued", self.inbox.len());
    }

    fn apply_loop(&self, stop: &StopSignal) {
        let max_delay = self.config.max_update_delay_ms;
        loop {
            let skip = self.skip_frames();
            if let Some(frame) = self.inbox.try_pop() {
                self.mirror.apply_frame(&frame);
                if !skip {
                    self.display.post(self.mirror.generation());
                } else if self.inbox.len() > self.config.speedup_threshold {
                    let _ = self.update_delay_ms.fetch_update(
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                        |delay| delay.checked_sub(1),
                    );
                }
            }

            let pause = if skip {
                Duration::from_millis(self.update_delay_ms.load(Ordering::SeqCst))
            } else {
                self.refresh_period()
            };
            if stop.wait_timeout(pause) {
                return;
            }
            if skip && self.inbox.is_empty() {
                let _ = self.update_delay_ms.fetch_update(
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    |delay| (delay < max_delay).then_some(delay + 1),
                );
            }
        }
    }

    fn refresh_loop(&self, stop: &StopSignal) {
        loop {
            self.display.post(self.mirror.generation());
            if stop.wait_timeout(self.refresh_period()) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::rule::{moore_neighborhood, RuleBody};
    use crate::session::Session;
    use std::thread;
    use std::time::Instant;

    fn service(width: i32, height: i32) -> Arc<dyn CaService> {
        let session = Session::new(SimConfig {
            grid_width: width,
            grid_height: height,
            worker_threads: 2,
            ..SimConfig::default()
        })
        .unwrap();
        Arc::new(session)
    }

    fn fast_config(skip_frames: bool) -> ClientConfig {
        ClientConfig {
            skip_frames,
            refresh_period_ms: 2,
            max_update_delay_ms: 2,
            ..ClientConfig::default()
        }
    }

    fn conway() -> RuleSpec {
        RuleSpec::new(
            2,
            0,
            moore_neighborhood(true),
            RuleBody::life_like("B3/S23").unwrap(),
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    fn glider(pipeline: &ClientSyncPipeline) {
        for (x, y) in [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)] {
            pipeline.service().set_cell_state(Point::new(x, y), 1);
        }
        pipeline.service().update_grid(true).unwrap();
    }

    #[test]
    fn test_streaming_keeps_mirror_in_sync() {
        let (pipeline, _refreshes) = ClientSyncPipeline::new(service(12, 12), fast_config(true)).unwrap();
        pipeline.load_rule(conway()).unwrap();
        glider(&pipeline);

        assert_eq!(pipeline.start_streaming().unwrap(), RunStatus::Started);
        assert_eq!(pipeline.start_streaming().unwrap(), RunStatus::AlreadyRunning);
        assert!(pipeline.is_streaming());
        assert!(wait_for(|| pipeline.mirror().generation() >= 10));

        assert_eq!(pipeline.stop_streaming(), StopStatus::Stopped);
        assert_eq!(pipeline.stop_streaming(), StopStatus::AlreadyStopped);
        assert!(!pipeline.is_streaming());

        let target = pipeline.service().get_generation();
        assert!(wait_for(|| pipeline.backlog() == 0
            && pipeline.mirror().generation() == target));
        assert_eq!(pipeline.mirror().snapshot(), pipeline.service().get_grid());
        assert_eq!(pipeline.mirror().snapshot().count_state(1), 5);
    }

    #[test]
    fn test_streaming_without_rule_does_not_start() {
        let (pipeline, _refreshes) = ClientSyncPipeline::new(service(4, 4), fast_config(true)).unwrap();
        assert_eq!(pipeline.start_streaming().unwrap(), RunStatus::NoRule);
        assert!(!pipeline.is_streaming());
        assert_eq!(pipeline.stop_streaming(), StopStatus::AlreadyStopped);
    }

    #[test]
    fn test_disabling_skipping_joins_refresh_loop() {
        let (pipeline, refreshes) = ClientSyncPipeline::new(service(8, 8), fast_config(true)).unwrap();
        assert!(pipeline.is_refreshing());
        // The timer posts redraws on its own
        assert!(refreshes.recv_timeout(Duration::from_secs(5)).is_ok());

        pipeline.set_frame_skipping(false).unwrap();
        assert!(!pipeline.frame_skipping());
        assert!(!pipeline.is_refreshing());
        while refreshes.try_recv().is_ok() {}

        // Now each applied frame posts its own redraw
        pipeline.load_rule(conway()).unwrap();
        glider(&pipeline);
        pipeline.step_once().unwrap();
        let request = refreshes.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(request.generation <= 1);
        assert!(wait_for(|| pipeline.mirror().generation() == 1));

        pipeline.set_frame_skipping(true).unwrap();
        assert!(pipeline.is_refreshing());
    }

    #[test]
    fn test_edit_cell_cycles_and_resets() {
        let (pipeline, _refreshes) = ClientSyncPipeline::new(service(4, 4), fast_config(true)).unwrap();
        let point = Point::new(1, 2);

        // Nothing is applied before a rule is loaded
        assert_eq!(pipeline.edit_cell(point, CellEdit::Cycle).unwrap(), 1);
        assert_eq!(pipeline.mirror().get(point), 0);

        pipeline
            .load_rule(RuleSpec::new(3, 2, Vec::new(), RuleBody::Script(String::new())))
            .unwrap();
        assert_eq!(pipeline.edit_cell(point, CellEdit::Cycle).unwrap(), 1);
        assert_eq!(pipeline.edit_cell(point, CellEdit::Cycle).unwrap(), 2);
        assert_eq!(pipeline.edit_cell(point, CellEdit::Cycle).unwrap(), 0);
        assert_eq!(pipeline.service().get_cell_state(point), 0);
        assert_eq!(pipeline.edit_cell(point, CellEdit::Reset).unwrap(), 2);
        assert_eq!(pipeline.mirror().get(point), 2);
        assert_eq!(pipeline.service().get_cell_state(point), 2);
    }

    #[test]
    fn test_resize_keeps_overlap() {
        let (pipeline, _refreshes) = ClientSyncPipeline::new(service(4, 4), fast_config(false)).unwrap();
        pipeline
            .load_rule(RuleSpec::new(4, 0, Vec::new(), RuleBody::Script(String::new())))
            .unwrap();
        pipeline.edit_cell(Point::new(1, 1), CellEdit::Cycle).unwrap();
        pipeline.edit_cell(Point::new(3, 3), CellEdit::Cycle).unwrap();

        pipeline.resize(6, 2).unwrap();
        let grid = pipeline.service().get_grid();
        assert_eq!(grid.dimensions(), (6, 2));
        assert_eq!(grid.get(Point::new(1, 1)), 1);
        assert_eq!(grid.count_state(1), 1);
        assert_eq!(pipeline.mirror().snapshot(), grid);

        pipeline.clear().unwrap();
        assert_eq!(pipeline.mirror().snapshot().count_state(0), 12);
        assert!(pipeline.resize(0, 2).is_err());
    }

    #[test]
    fn test_refresh_period_is_adjustable() {
        let (pipeline, _refreshes) = ClientSyncPipeline::new(service(4, 4), fast_config(true)).unwrap();
        pipeline.set_refresh_period(Duration::from_millis(40));
        assert_eq!(pipeline.refresh_period(), Duration::from_millis(40));
        pipeline.shutdown();
        assert!(!pipeline.is_refreshing());
    }
}
