use crate::rig::{Raised, Rig};
use fixrig_core::{tags, TrialParameters};
use fixrig_timing::Clock;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Draws a reward duration: normal around `reward_ms`, clamped to the
/// configured bounds.
pub fn reward_duration<R: Rng>(params: &TrialParameters, rng: &mut R) -> u64 {
    let mean = params.reward_ms as f64;
    let drawn = match Normal::new(mean, params.reward_sigma_ms as f64) {
        Ok(dist) if params.reward_sigma_ms > 0 => dist.sample(rng),
        _ => mean,
    };
    (drawn.round().max(0.0) as u64)
        .max(params.reward_min_ms)
        .min(params.reward_max_ms)
}

impl<C: Clock> Rig<C> {
    /// Delivers (or, with probability `1 - reward_freq`, fakes) a reward.
    /// The reward event is logged either way. Returns the duration drawn.
    pub fn squirt<R: Rng>(&mut self, params: &TrialParameters, rng: &mut R) -> u64 {
        let duration = reward_duration(params, rng);
        let real = rng.random::<f64>() < params.reward_freq;
        if real {
            self.deliver_reward(duration);
        } else {
            self.encode(tags::SHAM_REWARD);
        }
        self.encode(tags::REWARD);
        debug!(duration_ms = duration, sham = !real, "reward");
        duration
    }

    /// Error feedback: optional beep, then the screen flashes the error
    /// colour. The background is restored even if the flash is cut short.
    pub fn errorsig(&mut self, params: &TrialParameters) -> Result<(), Raised> {
        if params.beep {
            self.beep();
        }
        self.display().clear();
        self.set_background(params.error_color);
        self.flip();
        self.encode(tags::ERROR_FLASH);
        let flashed = self.idle_wait(params.error_flash_ms);
        self.set_background(params.background);
        self.flip();
        flashed
    }
}
