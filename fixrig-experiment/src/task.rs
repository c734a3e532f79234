use crate::config::Settings;
use crate::rig::{Raised, Rig};
use fixrig_core::TrialParameters;
use fixrig_timing::{Clock, Timer};

/// An experimental paradigm plugged into the run loop. Every hook has a
/// default, so the plain fixate-and-release task is `FixationTask`.
pub trait Task {
    fn name(&self) -> &str {
        "fixation"
    }

    /// Called once before the first trial. `Ok(false)` cancels the run;
    /// an error is a configuration problem reported to the host.
    fn pre_start(&mut self, _settings: &Settings) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn post_start(&mut self, _settings: &Settings) {}

    fn pre_run_trial(&mut self, params: TrialParameters) -> TrialParameters {
        params
    }

    /// May inject fields into the parameters archived with the record.
    fn post_run_trial(&mut self, params: TrialParameters) -> TrialParameters {
        params
    }

    /// Cleanup hook run as a trial winds down. May run more than once per
    /// trial; must be idempotent.
    fn post_fixation(&mut self) {}

    /// Owns all stimulus drawing for the response window. Must return once
    /// `timer.elapsed_ms() >= duration_ms`, may only return earlier by
    /// propagating a `Raised`, and must call `rig.idle_tick()` on every
    /// iteration.
    fn stimulate<C: Clock>(
        &mut self,
        rig: &mut Rig<C>,
        _params: &TrialParameters,
        timer: &Timer<C>,
        duration_ms: u64,
    ) -> Result<(), Raised> {
        while timer.elapsed_ms() < duration_ms {
            rig.idle_tick()?;
        }
        Ok(())
    }
}

/// Hold fixation and the bar, release when the spot dims.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixationTask;

impl Task for FixationTask {}
