use crate::config::{ConfigError, FixationGrid, RunConfig, RunLimits, Settings};
use crate::hardware::RecordSink;
use crate::rig::Rig;
use crate::task::Task;
use crate::trial::run_trial;
use fixrig_core::{Outcome, TrialRecord};
use fixrig_timing::Clock;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const HISTORY_LEN: usize = 100;
const PAUSE_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("task declined to start")]
    PreStartRejected,
    #[error("task pre-start failed: {0:#}")]
    PreStart(anyhow::Error),
}

#[derive(Debug, Default)]
struct HandleState {
    stop: AtomicBool,
    paused: AtomicBool,
    abort: AtomicBool,
}

/// Remote control for a running session; safe to use from another thread.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    inner: Arc<HandleState>,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends the run after aborting the current trial. A stop requested
    /// between runs cancels the next one. The flag clears when a run ends.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.abort.store(true, Ordering::Release);
    }

    /// Takes effect between trials.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    /// Aborts the current trial only; the run carries on.
    pub fn abort_trial(&self) {
        self.inner.abort.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    pub(crate) fn take_abort(&self) -> bool {
        self.inner.abort.swap(false, Ordering::AcqRel)
    }

    /// Forgets a served stop request and any abort it left behind.
    pub(crate) fn clear_stop(&self) {
        self.inner.stop.store(false, Ordering::Release);
        self.inner.abort.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Requested,
    MaxTrials,
    MaxCorrect,
    MaxUninitiated,
}

/// Counts since run start. Aborted trials are not counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub trials: usize,
    pub corrects: usize,
    pub errors: usize,
    pub uninitiated: usize,
    pub consecutive_uninitiated: usize,
    pub aborted: usize,
}

impl RunStatistics {
    pub fn record(&mut self, outcome: Outcome) {
        if outcome.is_abort() {
            self.aborted += 1;
            return;
        }
        self.trials += 1;
        if outcome == Outcome::Uninitiated {
            self.uninitiated += 1;
            self.consecutive_uninitiated += 1;
        } else {
            self.consecutive_uninitiated = 0;
        }
        if outcome.is_correct() {
            self.corrects += 1;
        } else if outcome.is_error() {
            self.errors += 1;
        }
    }

    pub fn limit_reached(&self, limits: &RunLimits) -> Option<StopReason> {
        let crossed = |limit: Option<usize>, count: usize| limit.is_some_and(|n| count >= n);
        if crossed(limits.max_trials, self.trials) {
            Some(StopReason::MaxTrials)
        } else if crossed(limits.max_correct, self.corrects) {
            Some(StopReason::MaxCorrect)
        } else if crossed(limits.max_uninitiated, self.consecutive_uninitiated) {
            Some(StopReason::MaxUninitiated)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub stop: StopReason,
    pub stats: RunStatistics,
    /// Outcome codes of the last trials, oldest first.
    pub recent: String,
}

/// Fixation locations dealt out in shuffled blocks.
#[derive(Debug, Clone, Default)]
pub struct GridSchedule {
    points: Vec<(f32, f32)>,
    block: VecDeque<(f32, f32)>,
    requeue_failed: bool,
}

impl GridSchedule {
    pub fn new(grid: &FixationGrid) -> Self {
        let points = if grid.enabled {
            grid.points.clone()
        } else {
            Vec::new()
        };
        Self {
            points,
            block: VecDeque::new(),
            requeue_failed: grid.requeue_failed,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.points.is_empty()
    }

    /// Next location; starts a fresh shuffled block when the current one is
    /// used up.
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> Option<(f32, f32)> {
        if !self.is_active() {
            return None;
        }
        if self.block.is_empty() {
            let mut block = self.points.clone();
            block.shuffle(rng);
            self.block.extend(block);
        }
        self.block.pop_front()
    }

    /// Puts a failed location back at the end of the current block.
    pub fn requeue(&mut self, point: (f32, f32)) {
        if self.requeue_failed {
            self.block.push_back(point);
        }
    }

    pub fn remaining_in_block(&self) -> usize {
        self.block.len()
    }
}

/// Runs trials back to back until a stop condition is met.
pub struct RunController<C: Clock, T: Task, R: Rng> {
    rig: Rig<C>,
    task: T,
    config: RunConfig,
    rng: R,
    sink: Box<dyn RecordSink>,
    stats: RunStatistics,
    history: VecDeque<char>,
    pending_hold: Option<Duration>,
    grid: GridSchedule,
    next_trial: usize,
}

impl<C: Clock, T: Task, R: Rng> RunController<C, T, R> {
    pub fn new(rig: Rig<C>, task: T, config: RunConfig, rng: R, sink: Box<dyn RecordSink>) -> Self {
        Self {
            rig,
            task,
            config,
            rng,
            sink,
            stats: RunStatistics::default(),
            history: VecDeque::with_capacity(HISTORY_LEN),
            pending_hold: None,
            grid: GridSchedule::default(),
            next_trial: 0,
        }
    }

    pub fn handle(&self) -> RunHandle {
        self.rig.handle()
    }

    pub fn rig(&self) -> &Rig<C> {
        &self.rig
    }

    pub fn rig_mut(&mut self) -> &mut Rig<C> {
        &mut self.rig
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn trials(&self) -> usize {
        self.stats.trials
    }

    pub fn corrects(&self) -> usize {
        self.stats.corrects
    }

    pub fn errors(&self) -> usize {
        self.stats.errors
    }

    pub fn uninitiated(&self) -> usize {
        self.stats.uninitiated
    }

    pub fn consecutive_uninitiated(&self) -> usize {
        self.stats.consecutive_uninitiated
    }

    pub fn recent_codes(&self) -> String {
        self.history.iter().collect()
    }

    /// Hold time the next trial is forced to, if the last one failed.
    pub fn pending_hold(&self) -> Option<Duration> {
        self.pending_hold
    }

    pub fn start_run(&mut self) -> Result<RunSummary, RunError> {
        let settings = self.config.merge()?;
        match self.task.pre_start(&settings) {
            Ok(true) => {}
            Ok(false) => return Err(RunError::PreStartRejected),
            Err(err) => return Err(RunError::PreStart(err)),
        }
        self.grid = GridSchedule::new(&settings.grid);
        self.stats = RunStatistics::default();
        self.history.clear();
        self.pending_hold = None;
        self.next_trial = 0;
        info!(
            task = self.task.name(),
            grid_points = settings.grid.points.len(),
            limits = ?settings.limits,
            "run start"
        );

        let handle = self.handle();
        let stop = loop {
            if !self.wait_while_paused(&handle) {
                break StopReason::Requested;
            }
            self.run_one(&settings);
            if handle.is_stopped() {
                break StopReason::Requested;
            }
            if let Some(reason) = self.stats.limit_reached(&settings.limits) {
                break reason;
            }
        };

        handle.clear_stop();
        self.task.post_start(&settings);
        let flips = self.rig.flip_stats();
        info!(
            ?stop,
            trials = self.stats.trials,
            corrects = self.stats.corrects,
            errors = self.stats.errors,
            uninitiated = self.stats.uninitiated,
            frame_ms = flips.average_frame_time_ms,
            jitter_ms = flips.jitter_ms,
            "run end"
        );
        Ok(RunSummary {
            stop,
            stats: self.stats.clone(),
            recent: self.recent_codes(),
        })
    }

    /// Returns false when the run was stopped instead of resumed.
    fn wait_while_paused(&mut self, handle: &RunHandle) -> bool {
        if handle.is_paused() && !handle.is_stopped() {
            info!("run paused");
            while handle.is_paused() && !handle.is_stopped() {
                self.rig.clock().sleep(PAUSE_POLL);
            }
            info!("run resumed");
        }
        !handle.is_stopped()
    }

    fn run_one(&mut self, settings: &Settings) {
        let mut params = settings.sample(&mut self.rng);
        let retried = self.pending_hold.take();
        if let Some(hold) = retried {
            params.hold_ms = hold.as_millis() as u64;
        }
        let location = self.grid.next(&mut self.rng);
        if let Some((x, y)) = location {
            params.fix_x = x;
            params.fix_y = y;
        }
        let params = self.task.pre_run_trial(params);

        let number = self.next_trial;
        self.next_trial += 1;
        let mut record = run_trial(&mut self.rig, &mut self.task, &params, number, &mut self.rng);
        let archived = std::mem::take(&mut record.params);
        record.params = self.task.post_run_trial(archived);

        let outcome = record.outcome;
        if outcome.is_error() && params.repeat_hold_on_error {
            self.pending_hold = Some(Duration::from_millis(params.hold_ms));
        } else if outcome == Outcome::Uninitiated || outcome.is_abort() {
            // The hold was never tested.
            self.pending_hold = retried;
        }
        if let Some(point) = location {
            if !outcome.is_correct() && !outcome.is_abort() {
                self.grid.requeue(point);
            }
        }

        self.stats.record(outcome);
        if !outcome.is_abort() {
            if self.history.len() == HISTORY_LEN {
                self.history.pop_front();
            }
            self.history.push_back(outcome.code());
        }
        if number == 0 {
            self.log_calibration();
        }
        self.write(&record);
    }

    fn write(&mut self, record: &TrialRecord) {
        if let Err(err) = self.sink.write(record) {
            warn!(trial = record.trial, error = %format!("{err:#}"), "record sink write failed");
        }
    }

    fn log_calibration(&self) {
        let stats = self.rig.flip_stats();
        if stats.effective_fps > 0.0 {
            info!(
                frame_ms = stats.average_frame_time_ms,
                fps = stats.effective_fps,
                jitter_ms = stats.jitter_ms,
                "display calibration, reaction times quantized to about one frame"
            );
        }
    }
}
