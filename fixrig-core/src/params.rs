use crate::stimulus::{Rgba, Sprite};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Concrete, frozen settings for one trial. Randomized quantities have
/// already been drawn; nothing here changes while the trial body runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParameters {
    pub iti_ms: u64,
    /// Time from window open to the target dim (the go-cue).
    pub hold_ms: u64,
    pub stim_delay_ms: u64,
    pub dim_gap_ms: u64,
    pub max_rt_ms: u64,
    pub min_rt_ms: u64,
    pub max_acquire_ms: u64,
    pub grace_ms: u64,
    /// Penalty pause after an error outcome.
    pub timeout_ms: u64,
    /// Pause after an uninitiated trial.
    pub uninit_timeout_ms: u64,

    pub fix_x: f32,
    pub fix_y: f32,
    /// Gaze window radius in pixels; `<= 0` disables the gaze requirement.
    pub fix_win_radius: f32,
    /// Vertical scale of the window; `> 1` stretches it into a tall ellipse.
    pub fix_win_vbias: f32,
    pub fix_size: f32,

    /// Bar must be held down (true) or up (false) before the trial starts.
    pub resp_down: bool,
    /// Queued-deadline mode: stimulate until one of the two deadlines fires.
    pub stim_to_end: bool,
    pub repeat_hold_on_error: bool,

    pub reward_ms: u64,
    pub reward_sigma_ms: u64,
    pub reward_min_ms: u64,
    pub reward_max_ms: u64,
    /// Probability that a reward opens the solenoid; the rest are sham clicks.
    pub reward_freq: f64,

    pub beep: bool,
    pub error_color: Rgba,
    pub error_flash_ms: u64,
    pub background: Rgba,
    pub fix_color: Rgba,
    pub dim_color: Rgba,

    /// Task-specific fields, archived with the trial record.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl TrialParameters {
    pub fn fix_spot(&self) -> Sprite {
        Sprite::spot((self.fix_x, self.fix_y), self.fix_size, self.fix_color)
    }

    pub fn dimmed_spot(&self) -> Sprite {
        self.fix_spot().with_color(self.dim_color)
    }

    pub fn gaze_window_enabled(&self) -> bool {
        self.fix_win_radius > 0.0
    }
}

impl Default for TrialParameters {
    fn default() -> Self {
        Self {
            iti_ms: 1000,
            hold_ms: 2000,
            stim_delay_ms: 0,
            dim_gap_ms: 0,
            max_rt_ms: 600,
            min_rt_ms: 100,
            max_acquire_ms: 1000,
            grace_ms: 100,
            timeout_ms: 2000,
            uninit_timeout_ms: 500,
            fix_x: 0.0,
            fix_y: 0.0,
            fix_win_radius: 50.0,
            fix_win_vbias: 1.0,
            fix_size: 5.0,
            resp_down: true,
            stim_to_end: false,
            repeat_hold_on_error: true,
            reward_ms: 80,
            reward_sigma_ms: 10,
            reward_min_ms: 20,
            reward_max_ms: 200,
            reward_freq: 1.0,
            beep: true,
            error_color: [255, 0, 0, 255],
            error_flash_ms: 250,
            background: [128, 128, 128, 255],
            fix_color: [255, 255, 255, 255],
            dim_color: [100, 100, 100, 255],
            extra: Map::new(),
        }
    }
}
