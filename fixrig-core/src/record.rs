use crate::outcome::Outcome;
use crate::params::TrialParameters;
use serde::{Deserialize, Serialize};

/// Event tags written by the trial state machine.
pub mod tags {
    pub const TRIAL_START: &str = "trial_start";
    pub const ITI_START: &str = "iti_start";
    pub const FIX_ON: &str = "fix_on";
    pub const FIX_ENTER: &str = "fix_enter";
    pub const FIX_EXIT: &str = "fix_exit";
    pub const FIX_ACQUIRED: &str = "fix_acquired";
    pub const BAR_NOT_READY: &str = "bar_not_ready";
    pub const ACQUIRE_TIMEOUT: &str = "acquire_timeout";
    pub const WINDOW_OPEN: &str = "window_open";
    pub const STIM_ON: &str = "stim_on";
    pub const STIM_OFF: &str = "stim_off";
    pub const DIM: &str = "dim";
    pub const RESPONSE: &str = "response";
    pub const EARLY_RELEASE: &str = "early_release";
    pub const FIX_LOST: &str = "fix_lost";
    pub const NO_RESPONSE: &str = "no_response";
    pub const USER_ABORT: &str = "user_abort";
    pub const FAULT: &str = "fault";
    pub const REWARD: &str = "reward";
    pub const SHAM_REWARD: &str = "sham_reward";
    pub const ERROR_FLASH: &str = "error_flash";
    pub const PENALTY: &str = "penalty";
    pub const TRIAL_END: &str = "trial_end";
}

/// One timestamped entry of the per-trial event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub t_ms: u64,
    pub tag: String,
}

/// Most recent gaze position reported by the acquisition layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub t_ms: u64,
    pub x: f32,
    pub y: f32,
}

/// Everything archived about one completed trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: usize,
    pub result: char,
    pub outcome: Outcome,
    /// Milliseconds from go-cue to response; -1 unless the trial was correct.
    pub reaction_time_ms: i64,
    pub params: TrialParameters,
    pub events: Vec<Event>,
    pub gaze_trace: Vec<GazeSample>,
}

impl TrialRecord {
    pub fn new(trial: usize, outcome: Outcome, reaction_time_ms: i64, params: TrialParameters) -> Self {
        Self {
            trial,
            result: outcome.code(),
            outcome,
            reaction_time_ms: if outcome.is_correct() { reaction_time_ms } else { -1 },
            params,
            events: Vec::new(),
            gaze_trace: Vec::new(),
        }
    }

    pub fn event_time(&self, tag: &str) -> Option<u64> {
        self.events.iter().find(|e| e.tag == tag).map(|e| e.t_ms)
    }

    pub fn has_event(&self, tag: &str) -> bool {
        self.event_time(tag).is_some()
    }

    /// Position of the first `tag` in the log.
    pub fn event_index(&self, tag: &str) -> Option<usize> {
        self.events.iter().position(|e| e.tag == tag)
    }
}
