#![allow(dead_code)]

use fixrig_core::{TrialParameters, TrialRecord};
use fixrig_experiment::sim::{Behavior, CountingSpeaker, RecordingDisplay, RecordingJuicer, SimSubject};
use fixrig_experiment::{run_trial, Display, FrameHook, InterruptClass, Raised, Rig, Task};
use fixrig_timing::{Clock, SimClock, Timer};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Refresh period of the simulated display.
pub const FRAME_MS: u64 = 16;

pub struct Harness {
    pub rig: Rig<SimClock>,
    pub clock: SimClock,
    pub subject: SimSubject,
    pub display: RecordingDisplay,
    pub juicer: RecordingJuicer,
    pub speaker: CountingSpeaker,
    pub rng: StdRng,
}

impl Harness {
    pub fn new(behavior: Behavior) -> Self {
        let clock = SimClock::new();
        let subject = SimSubject::new(behavior);
        let display = RecordingDisplay::new(FRAME_MS);
        let juicer = RecordingJuicer::new();
        let speaker = CountingSpeaker::new();
        let hw = subject.hardware(display.clone(), juicer.clone(), speaker.clone());
        Self {
            rig: Rig::new(clock.clone(), hw),
            clock,
            subject,
            display,
            juicer,
            speaker,
            rng: StdRng::seed_from_u64(42),
        }
    }

    pub fn run<T: Task>(&mut self, task: &mut T, params: &TrialParameters) -> TrialRecord {
        run_trial(&mut self.rig, task, params, 0, &mut self.rng)
    }

    /// Observable state every trial must leave behind.
    pub fn assert_cleaned_up(&self) {
        for class in InterruptClass::PRIORITY {
            assert!(!self.rig.latch().is_armed(class), "{} still armed", class.as_str());
            assert!(!self.rig.latch().is_pending(class), "{} still latched", class.as_str());
        }
        assert!(!self.rig.bar().armed());
        assert!(!self.rig.fixwin().armed());
        assert_eq!(self.rig.pending_deadlines(), 0);
        assert_eq!(self.display.sprite_count(), 0);
        assert!(!self.rig.is_recording());
    }
}

/// Frame hook that sees only the trial clock.
pub fn on_tick(mut f: impl FnMut(u64) + 'static) -> Option<FrameHook> {
    Some(Box::new(move |_: &mut dyn Display, now: u64| f(now)))
}

/// Fixed timings so event times can be checked exactly.
pub fn params() -> TrialParameters {
    TrialParameters {
        iti_ms: 100,
        hold_ms: 3000,
        max_rt_ms: 600,
        min_rt_ms: 100,
        max_acquire_ms: 1000,
        grace_ms: 100,
        timeout_ms: 2000,
        uninit_timeout_ms: 500,
        reward_ms: 80,
        reward_sigma_ms: 0,
        reward_freq: 1.0,
        ..TrialParameters::default()
    }
}

pub fn queued(params: TrialParameters) -> TrialParameters {
    TrialParameters {
        stim_to_end: true,
        ..params
    }
}

pub fn time_of(record: &TrialRecord, tag: &str) -> u64 {
    record
        .event_time(tag)
        .unwrap_or_else(|| panic!("no `{tag}` event in {:?}", record.events))
}

pub fn count_of(record: &TrialRecord, tag: &str) -> usize {
    record.events.iter().filter(|e| e.tag == tag).count()
}

/// Counts hook calls and otherwise behaves like the plain fixation task.
#[derive(Debug, Default)]
pub struct CountingTask {
    pub stimulated: usize,
    pub post_fixation: usize,
}

impl Task for CountingTask {
    fn post_fixation(&mut self) {
        self.post_fixation += 1;
    }

    fn stimulate<C: Clock>(
        &mut self,
        rig: &mut Rig<C>,
        _params: &TrialParameters,
        timer: &Timer<C>,
        duration_ms: u64,
    ) -> Result<(), Raised> {
        self.stimulated += 1;
        while timer.elapsed_ms() < duration_ms {
            rig.idle_tick()?;
        }
        Ok(())
    }
}
