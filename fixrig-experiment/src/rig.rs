use crate::hardware::{Display, Hardware};
use crate::interrupt::{Delivered, InterruptClass, InterruptLatch, InterruptSource};
use crate::monitor::{GazeWindow, ResponseBar};
use crate::run::RunHandle;
use fixrig_cache::tag_code;
use fixrig_core::{
    tags, Event, GazeSample, Outcome, Rgba, Sprite, TrialParameters, TrialPhase, TrialRecord,
    FIX_SPOT,
};
use fixrig_timing::{CalibrationStats, Clock, DeadlineQueue, FlipLog, Timer};
use thiserror::Error;
use tracing::debug;

/// Non-local exits out of a trial phase. Everything except `Fault` is a
/// normal, expected way for a trial to end.
#[derive(Debug, Error)]
pub enum Raised {
    #[error("bar transition at {t_ms} ms")]
    BarTransition { t_ms: u64 },
    #[error("fixation break at {t_ms} ms")]
    FixBreak { t_ms: u64 },
    #[error("no response before deadline")]
    NoResponse,
    #[error("alarm")]
    Alarm,
    #[error("user abort")]
    UserAbort,
    #[error("trial fault: {0:#}")]
    Fault(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadlineAction {
    /// Swap the fixation spot for its dimmed version: the go-cue.
    Dim(Sprite),
    /// Latch the deadline interrupt; delivered as `Raised::NoResponse`.
    NoResponse,
}

/// Per-frame work run once at the end of every quiet idle tick.
pub type FrameHook = Box<dyn FnMut(&mut dyn Display, u64)>;

/// The trial's view of the rig: hardware, monitors, interrupt latch,
/// deadline queue and event log, all advanced by `idle_tick`.
///
/// Times are milliseconds on the trial clock, which restarts with every
/// trial.
pub struct Rig<C: Clock> {
    clock: C,
    timer: Timer<C>,
    latch: InterruptLatch,
    deadlines: DeadlineQueue<DeadlineAction>,
    fixwin: GazeWindow,
    hw: Hardware,
    flips: FlipLog,
    events: Vec<Event>,
    trace: Vec<GazeSample>,
    recording: bool,
    last_gaze: Option<GazeSample>,
    dimmed_at: Option<u64>,
    background: Rgba,
    phase: TrialPhase,
    handle: RunHandle,
    frame_hook: Option<FrameHook>,
    ticks: u64,
}

impl<C: Clock> Rig<C> {
    pub fn new(clock: C, hw: Hardware) -> Self {
        Self {
            timer: Timer::new(clock.clone()),
            clock,
            latch: InterruptLatch::new(),
            deadlines: DeadlineQueue::new(),
            fixwin: GazeWindow::default(),
            hw,
            flips: FlipLog::new(),
            events: Vec::new(),
            trace: Vec::new(),
            recording: false,
            last_gaze: None,
            dimmed_at: None,
            background: TrialParameters::default().background,
            phase: TrialPhase::default(),
            handle: RunHandle::new(),
            frame_hook: None,
            ticks: 0,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Trial clock reading.
    pub fn now(&self) -> u64 {
        self.timer.elapsed_ms()
    }

    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn latch(&self) -> &InterruptLatch {
        &self.latch
    }

    pub fn interrupt_source(&self) -> InterruptSource {
        self.latch.source()
    }

    pub fn bar(&self) -> &ResponseBar {
        &self.hw.bar
    }

    pub fn fixwin(&self) -> &GazeWindow {
        &self.fixwin
    }

    pub fn last_gaze(&self) -> Option<GazeSample> {
        self.last_gaze
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_frame_hook(&mut self, hook: Option<FrameHook>) {
        self.frame_hook = hook;
    }

    pub(crate) fn enter(&mut self, phase: TrialPhase) {
        if phase != self.phase {
            debug!(
                from = self.phase.as_str(),
                to = phase.as_str(),
                nominal = self.phase.next() == Some(phase),
                t_ms = self.now(),
                "phase"
            );
            self.phase = phase;
        }
    }

    // Display

    pub fn display(&mut self) -> &mut dyn Display {
        self.hw.display.as_mut()
    }

    pub fn show(&mut self, id: &'static str, sprite: Sprite) {
        self.hw.display.show(id, sprite);
    }

    pub fn hide(&mut self, id: &'static str) {
        self.hw.display.hide(id);
    }

    /// Presents the frame and logs the flip time.
    pub fn flip(&mut self) -> u64 {
        let t = self.hw.display.flip(self.now());
        self.flips.record(t);
        t
    }

    pub fn set_background(&mut self, color: Rgba) {
        self.hw.display.set_background(color);
    }

    pub fn flip_stats(&self) -> CalibrationStats {
        self.flips.calibration_stats()
    }

    // Event log

    /// Appends `tag` to the trial log at the current trial time and strobes
    /// it out to the event sink.
    pub fn encode(&mut self, tag: &str) {
        let t_ms = self.now();
        self.hw.events.encode(tag_code(tag), tag, t_ms);
        self.events.push(Event {
            t_ms,
            tag: tag.to_string(),
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn start_recording(&mut self) {
        self.recording = true;
    }

    pub fn stop_recording(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    // Arming

    pub fn arm_bar(&mut self, on: bool) {
        self.hw.bar.arm(on);
        self.latch.arm(InterruptClass::Bar, on);
    }

    pub fn arm_fixwin(&mut self, on: bool) {
        self.fixwin.arm(on);
        self.latch.arm(InterruptClass::FixWin, on);
    }

    pub fn arm_alarm(&mut self, on: bool) {
        self.latch.arm(InterruptClass::Alarm, on);
    }

    pub fn disarm_all(&mut self) {
        self.hw.bar.arm(false);
        self.fixwin.arm(false);
        self.latch.disarm_all();
    }

    /// Bar is in the state a trial must start from.
    pub fn bar_ready(&self, resp_down: bool) -> bool {
        self.hw.bar.is_down() == resp_down
    }

    // Deadlines

    pub fn schedule_dim(&mut self, at_ms: u64, dimmed: Sprite) {
        self.deadlines.schedule(at_ms, DeadlineAction::Dim(dimmed));
    }

    pub fn schedule_no_response(&mut self, at_ms: u64) {
        self.latch.arm(InterruptClass::Deadline, true);
        self.deadlines.schedule(at_ms, DeadlineAction::NoResponse);
    }

    pub fn pending_deadlines(&self) -> usize {
        self.deadlines.len()
    }

    pub fn clear_deadlines(&mut self) {
        self.deadlines.clear();
    }

    /// Shows the dimmed target now. The nominal dim time is kept for the
    /// reaction-time measurement, which refines it against the flip log.
    pub fn dim(&mut self, dimmed: Sprite) {
        let nominal = self.now();
        self.show(FIX_SPOT, dimmed);
        self.flip();
        self.dimmed_at = Some(nominal);
        self.encode(tags::DIM);
    }

    pub fn dimmed_at(&self) -> Option<u64> {
        self.dimmed_at
    }

    /// Go-cue time corrected to the first page flip at or after the
    /// nominal dim.
    pub fn go_cue_ms(&self) -> Option<u64> {
        self.dimmed_at
            .map(|nominal| self.flips.at_or_after(nominal).unwrap_or(nominal))
    }

    // Actuators

    pub fn deliver_reward(&mut self, duration_ms: u64) {
        self.hw.juicer.deliver(duration_ms);
    }

    pub fn beep(&mut self) {
        self.hw.speaker.beep();
    }

    // Idle tick

    /// The only suspension point. Yields to the clock, then in order:
    /// user abort, at most one due deadline action, monitor scan, at most
    /// one latched interrupt, frame hook.
    pub fn idle_tick(&mut self) -> Result<(), Raised> {
        self.clock.idle();
        self.ticks += 1;
        let now = self.now();

        if self.handle.take_abort() {
            return Err(Raised::UserAbort);
        }
        if let Some(action) = self.deadlines.take_due(now) {
            self.fire(action, now);
        }
        self.scan(now);
        if let Some(delivered) = self.latch.poll() {
            return Err(self.raise(delivered, now));
        }
        if let Some(hook) = self.frame_hook.as_mut() {
            hook(self.hw.display.as_mut(), now);
        }
        Ok(())
    }

    /// Idles for `ms` on the trial clock.
    pub fn idle_wait(&mut self, ms: u64) -> Result<(), Raised> {
        let until = self.now().saturating_add(ms);
        while self.now() < until {
            self.idle_tick()?;
        }
        Ok(())
    }

    /// Idles until something is raised. Callers must have a deadline or an
    /// armed interrupt pending.
    pub fn idle_until_raised(&mut self) -> Raised {
        loop {
            if let Err(raised) = self.idle_tick() {
                return raised;
            }
        }
    }

    fn fire(&mut self, action: DeadlineAction, now: u64) {
        debug!(?action, t_ms = now, "deadline");
        match action {
            DeadlineAction::Dim(sprite) => self.dim(sprite),
            DeadlineAction::NoResponse => {
                self.latch.signal(InterruptClass::Deadline, Some(now));
            }
        }
    }

    fn scan(&mut self, now: u64) {
        let broke = match self.hw.gaze.sample(now) {
            Some(sample) => {
                if self.recording && self.trace.last().map(|s| s.t_ms) != Some(sample.t_ms) {
                    self.trace.push(sample);
                }
                self.last_gaze = Some(sample);
                self.fixwin.update(sample.x, sample.y)
            }
            None => self.fixwin.lose(),
        };
        if broke {
            self.latch.signal(InterruptClass::FixWin, Some(now));
        }
        if self.hw.bar.take_transition() {
            self.latch.signal(InterruptClass::Bar, Some(now));
        }
    }

    fn raise(&self, delivered: Delivered, now: u64) -> Raised {
        let t_ms = delivered.t_ms.unwrap_or(now);
        debug!(class = delivered.class.as_str(), t_ms, "interrupt");
        match delivered.class {
            InterruptClass::Bar => Raised::BarTransition { t_ms },
            InterruptClass::FixWin => Raised::FixBreak { t_ms },
            InterruptClass::Deadline => Raised::NoResponse,
            InterruptClass::Alarm => Raised::Alarm,
        }
    }

    // Trial lifecycle

    pub(crate) fn begin_trial(&mut self, params: &TrialParameters) {
        self.timer.reset();
        self.handle.take_abort();
        self.events.clear();
        self.trace.clear();
        self.flips.new_epoch();
        self.deadlines.clear();
        self.dimmed_at = None;
        self.background = params.background;
        self.fixwin.move_to((params.fix_x, params.fix_y));
        self.fixwin.set(params.fix_win_radius, params.fix_win_vbias);
        self.phase = TrialPhase::Iti;
    }

    /// Leaves the rig idle: nothing armed, nothing scheduled, nothing on
    /// screen. Runs on every exit path out of a trial.
    pub(crate) fn cleanup(&mut self, outcome: Option<Outcome>) {
        self.enter(TrialPhase::Cleanup);
        self.disarm_all();
        self.deadlines.clear();
        self.hw.display.clear();
        self.hw.display.set_background(self.background);
        self.flip();
        self.recording = false;
        match outcome {
            Some(outcome) => self.encode(&format!("outcome {outcome}")),
            None => self.encode("outcome unresolved"),
        }
        self.encode(tags::TRIAL_END);
    }

    pub(crate) fn take_record(
        &mut self,
        trial: usize,
        outcome: Outcome,
        reaction_time_ms: i64,
        params: &TrialParameters,
    ) -> TrialRecord {
        let mut record = TrialRecord::new(trial, outcome, reaction_time_ms, params.clone());
        record.events = std::mem::take(&mut self.events);
        record.gaze_trace = std::mem::take(&mut self.trace);
        self.timer.reset();
        record
    }
}
