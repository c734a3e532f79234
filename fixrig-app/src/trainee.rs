use fixrig_core::TrialParameters;
use fixrig_experiment::sim::{Behavior, Response, SimSubject};
use fixrig_experiment::{Raised, Rig, Settings, Task};
use fixrig_timing::{Clock, Timer};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::debug;

/// Wraps a task and scripts the simulated subject before every trial:
/// correct with probability `accuracy`, otherwise one of the error modes.
pub struct Trainee<T> {
    inner: T,
    subject: SimSubject,
    accuracy: f64,
    rng: StdRng,
}

impl<T: Task> Trainee<T> {
    pub fn new(inner: T, subject: SimSubject, accuracy: f64, rng: StdRng) -> Self {
        Self {
            inner,
            subject,
            accuracy,
            rng,
        }
    }

    fn draw(&mut self, params: &TrialParameters) -> Behavior {
        let base = Behavior {
            resp_down: params.resp_down,
            gaze_latency_ms: self.rng.random_range(100..=300),
            ..Behavior::default()
        };
        if self.rng.random_bool(self.accuracy) {
            let lo = params.min_rt_ms + 50;
            let hi = (params.max_rt_ms * 3 / 4).max(lo);
            return Behavior {
                response: Response::AfterDim(self.rng.random_range(lo..=hi)),
                ..base
            };
        }
        match self.rng.random_range(0..4) {
            0 => Behavior {
                response: Response::AfterWindowOpen(self.rng.random_range(50..=params.hold_ms.max(50))),
                ..base
            },
            1 => Behavior {
                break_after_acquired_ms: Some(self.rng.random_range(100..=params.hold_ms.max(100))),
                ..base
            },
            2 => Behavior {
                response: Response::Never,
                ..base
            },
            _ => Behavior {
                fixates: false,
                ..base
            },
        }
    }
}

impl<T: Task> Task for Trainee<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn pre_start(&mut self, settings: &Settings) -> anyhow::Result<bool> {
        self.inner.pre_start(settings)
    }

    fn post_start(&mut self, settings: &Settings) {
        self.inner.post_start(settings)
    }

    fn pre_run_trial(&mut self, params: TrialParameters) -> TrialParameters {
        let params = self.inner.pre_run_trial(params);
        let behavior = self.draw(&params);
        debug!(?behavior, "subject scripted");
        self.subject.set_behavior(behavior);
        params
    }

    fn post_run_trial(&mut self, params: TrialParameters) -> TrialParameters {
        self.inner.post_run_trial(params)
    }

    fn post_fixation(&mut self) {
        self.inner.post_fixation()
    }

    fn stimulate<C: Clock>(
        &mut self,
        rig: &mut Rig<C>,
        params: &TrialParameters,
        timer: &Timer<C>,
        duration_ms: u64,
    ) -> Result<(), Raised> {
        self.inner.stimulate(rig, params, timer, duration_ms)
    }
}
