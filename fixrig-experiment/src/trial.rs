//! The trial state machine.
//!
//! ITI -> wait for fixation (with grace period) -> response window ->
//! outcome -> cleanup. Each phase returns `Result<_, Raised>`; whatever is
//! raised unwinds straight to `execute`, which classifies it. Cleanup lives
//! in `Drop` for `Trial`, so it also runs when task code panics; the panic
//! is then caught in `run_trial` and the trial recorded as a fault.

use crate::rig::{Raised, Rig};
use crate::task::Task;
use fixrig_core::{
    tags, AbortKind, EarlyKind, Outcome, TrialParameters, TrialPhase, TrialRecord, FIX_SPOT,
};
use fixrig_timing::{Clock, Timer};
use rand::Rng;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resolution {
    outcome: Outcome,
    reaction_time_ms: i64,
}

impl Resolution {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            reaction_time_ms: -1,
        }
    }
}

/// Runs one trial to completion and returns its record. Never fails: every
/// way a trial can end, including faults in task code, becomes an outcome.
pub fn run_trial<C: Clock, T: Task, R: Rng>(
    rig: &mut Rig<C>,
    task: &mut T,
    params: &TrialParameters,
    number: usize,
    rng: &mut R,
) -> TrialRecord {
    rig.begin_trial(params);
    rig.encode(tags::TRIAL_START);
    info!(trial = number, hold_ms = params.hold_ms, "trial start");

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut trial = Trial {
            rig: &mut *rig,
            task,
            params,
            outcome: None,
        };
        let resolution = trial.execute(rng);
        trial.outcome = Some(resolution.outcome);
        resolution
    }));
    let resolution = outcome.unwrap_or_else(|payload| {
        error!(
            trial = number,
            panic = panic_message(payload.as_ref()),
            "trial panicked, trial aborted"
        );
        Resolution::new(Outcome::UserAbort(AbortKind::Fault))
    });

    info!(
        trial = number,
        result = %resolution.outcome,
        rt_ms = resolution.reaction_time_ms,
        "trial end"
    );
    rig.take_record(
        number,
        resolution.outcome,
        resolution.reaction_time_ms,
        params,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

struct Trial<'a, C: Clock, T: Task> {
    rig: &'a mut Rig<C>,
    task: &'a mut T,
    params: &'a TrialParameters,
    outcome: Option<Outcome>,
}

impl<C: Clock, T: Task> Drop for Trial<'_, C, T> {
    fn drop(&mut self) {
        if self.outcome.is_none() && std::thread::panicking() {
            self.rig.encode(tags::FAULT);
            self.outcome = Some(Outcome::UserAbort(AbortKind::Fault));
        }
        self.task.post_fixation();
        self.rig.cleanup(self.outcome);
    }
}

impl<C: Clock, T: Task> Trial<'_, C, T> {
    fn execute<R: Rng>(&mut self, rng: &mut R) -> Resolution {
        let resolution = match self.body() {
            Ok(resolution) => resolution,
            Err(raised) => self.classify(raised),
        };
        self.rig.enter(TrialPhase::Outcome);
        self.consequences(resolution.outcome, rng);
        resolution
    }

    fn body(&mut self) -> Result<Resolution, Raised> {
        let p = self.params;
        self.rig.encode(tags::ITI_START);
        self.rig.set_background(p.background);
        self.rig.flip();
        self.rig.idle_wait(p.iti_ms)?;

        self.rig.enter(TrialPhase::WaitFixation);
        self.rig.show(FIX_SPOT, p.fix_spot());
        self.rig.flip();
        self.rig.encode(tags::FIX_ON);
        self.rig.start_recording();
        if !self.acquire()? {
            return Ok(Resolution::new(Outcome::Uninitiated));
        }

        self.rig.enter(TrialPhase::ResponseWindow);
        Err(self.respond())
    }

    /// Waits for the bar in its start state and, when a gaze window is
    /// configured, for gaze to stay inside it for the grace period. Leaving
    /// during the grace period, or letting go of the bar, restarts the wait
    /// from the next entry. `Ok(false)` means the acquisition timeout ran
    /// out, grace period included.
    fn acquire(&mut self) -> Result<bool, Raised> {
        let p = self.params;
        let deadline = self.rig.now().saturating_add(p.max_acquire_ms);
        loop {
            self.rig.idle_tick()?;
            if self.rig.now() >= deadline {
                self.rig.encode(tags::ACQUIRE_TIMEOUT);
                return Ok(false);
            }
            if !self.rig.bar_ready(p.resp_down) {
                continue;
            }
            if !p.gaze_window_enabled() {
                return Ok(true);
            }
            if !self.rig.fixwin().inside() {
                continue;
            }

            self.rig.enter(TrialPhase::FixatingGrace);
            self.rig.encode(tags::FIX_ENTER);
            let entered = self.rig.now();
            let held = loop {
                if !self.rig.fixwin().inside() {
                    break false;
                }
                if self.rig.now() - entered >= p.grace_ms {
                    break true;
                }
                self.rig.idle_tick()?;
                if self.rig.now() >= deadline {
                    self.rig.encode(tags::ACQUIRE_TIMEOUT);
                    return Ok(false);
                }
            };
            if !held {
                self.rig.encode(tags::FIX_EXIT);
            } else if !self.rig.bar_ready(p.resp_down) {
                self.rig.encode(tags::BAR_NOT_READY);
            } else {
                self.rig.encode(tags::FIX_ACQUIRED);
                self.rig.arm_fixwin(true);
                return Ok(true);
            }
            self.rig.enter(TrialPhase::WaitFixation);
        }
    }

    /// The response window always ends by something being raised: a
    /// response, a break, the no-response deadline or an abort.
    fn respond(&mut self) -> Raised {
        self.rig.arm_bar(true);
        self.rig.arm_alarm(true);
        self.rig.encode(tags::WINDOW_OPEN);
        let scheduled = if self.params.stim_to_end {
            self.run_queued()
        } else {
            self.run_sequential()
        };
        match scheduled {
            Ok(()) => self.rig.idle_until_raised(),
            Err(raised) => raised,
        }
    }

    /// Dim and miss deadlines are queued up front and the stimulus runs
    /// until one of them, or an interrupt, ends the window. The dim is
    /// quantized to the idle tick and refined against the flip log later.
    fn run_queued(&mut self) -> Result<(), Raised> {
        let p = self.params;
        let opened = self.rig.now();
        self.rig
            .schedule_dim(opened + p.hold_ms, p.dimmed_spot());
        self.rig
            .schedule_no_response(opened + p.hold_ms + p.max_rt_ms);
        self.stimulate(p.hold_ms + p.max_rt_ms)
    }

    /// Stimulus for the hold minus delay and dim gap, then a clean screen,
    /// the gap, the dim, and only then the miss deadline.
    fn run_sequential(&mut self) -> Result<(), Raised> {
        let p = self.params;
        self.rig.idle_wait(p.stim_delay_ms)?;
        let duration = p
            .hold_ms
            .saturating_sub(p.stim_delay_ms)
            .saturating_sub(p.dim_gap_ms);
        self.stimulate(duration)?;

        self.rig.display().clear();
        self.rig.show(FIX_SPOT, p.fix_spot());
        self.rig.flip();
        self.rig.idle_wait(p.dim_gap_ms)?;

        self.rig.dim(p.dimmed_spot());
        let dimmed = self.rig.now();
        self.rig.schedule_no_response(dimmed + p.max_rt_ms);
        Ok(())
    }

    fn stimulate(&mut self, duration_ms: u64) -> Result<(), Raised> {
        let timer = Timer::new(self.rig.clock().clone());
        self.rig.encode(tags::STIM_ON);
        let result = self
            .task
            .stimulate(&mut *self.rig, self.params, &timer, duration_ms);
        self.rig.encode(tags::STIM_OFF);
        result
    }

    fn classify(&mut self, raised: Raised) -> Resolution {
        let p = self.params;
        match raised {
            Raised::BarTransition { t_ms } => match self.rig.go_cue_ms() {
                Some(go) if t_ms >= go && t_ms - go >= p.min_rt_ms => {
                    self.rig.encode(tags::RESPONSE);
                    Resolution {
                        outcome: Outcome::Correct,
                        reaction_time_ms: (t_ms - go) as i64,
                    }
                }
                go => {
                    if let Some(go) = go {
                        debug!(t_ms, go_ms = go, "release faster than minimum RT");
                    }
                    self.rig.encode(tags::EARLY_RELEASE);
                    Resolution::new(Outcome::EarlyRelease(EarlyKind::PreTarget))
                }
            },
            Raised::FixBreak { .. } => {
                self.rig.encode(tags::FIX_LOST);
                Resolution::new(Outcome::EarlyRelease(EarlyKind::FixBreak))
            }
            Raised::NoResponse | Raised::Alarm => {
                self.rig.encode(tags::NO_RESPONSE);
                Resolution::new(Outcome::MaxRtExceeded)
            }
            Raised::UserAbort => {
                self.rig.encode(tags::USER_ABORT);
                Resolution::new(Outcome::UserAbort(AbortKind::User))
            }
            Raised::Fault(err) => {
                error!(error = %format!("{err:#}"), phase = self.rig.phase().as_str(), "trial fault, trial aborted");
                self.rig.encode(tags::FAULT);
                Resolution::new(Outcome::UserAbort(AbortKind::Fault))
            }
        }
    }

    /// Reward, or error signal plus penalty pause. Nothing is armed while
    /// this runs, so only a user abort can cut it short.
    fn consequences<R: Rng>(&mut self, outcome: Outcome, rng: &mut R) {
        let p = self.params;
        self.rig.disarm_all();
        self.rig.clear_deadlines();

        let pause_ms = match outcome {
            Outcome::Correct => {
                self.rig.squirt(p, rng);
                0
            }
            Outcome::EarlyRelease(_) | Outcome::MaxRtExceeded => {
                if let Err(raised) = self.rig.errorsig(p) {
                    return self.cut_short(raised);
                }
                p.timeout_ms
            }
            Outcome::Uninitiated => p.uninit_timeout_ms,
            Outcome::UserAbort(_) => 0,
        };
        if pause_ms > 0 {
            self.rig.encode(tags::PENALTY);
            debug!(pause_ms, "penalty pause");
            if let Err(raised) = self.rig.idle_wait(pause_ms) {
                self.cut_short(raised);
            }
        }
    }

    fn cut_short(&mut self, raised: Raised) {
        match raised {
            Raised::UserAbort => info!("penalty cut short by user abort"),
            other => warn!(raised = %other, "unexpected interrupt during penalty"),
        }
    }
}
