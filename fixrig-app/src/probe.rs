use anyhow::Context;
use fixrig_core::{Rgba, Sprite, TrialParameters};
use fixrig_experiment::{Raised, Rig, Settings, Task};
use fixrig_timing::{Clock, Timer};
use serde_json::{json, Value};
use std::f32::consts::TAU;

/// Display slot of the peripheral probe.
pub const PROBE: &str = "probe";

/// Fixation task that flashes probes in turn on a ring around the
/// fixation spot while the subject holds.
///
/// Reads `probe_count` and `probe_eccentricity` from the task's `extra`
/// configuration.
#[derive(Debug, Clone)]
pub struct ProbeTask {
    count: usize,
    eccentricity: f32,
    size: f32,
    color: Rgba,
    shown: usize,
}

impl Default for ProbeTask {
    fn default() -> Self {
        Self {
            count: 4,
            eccentricity: 200.0,
            size: 20.0,
            color: [255, 255, 255, 255],
            shown: 0,
        }
    }
}

impl ProbeTask {
    fn probe(&self, params: &TrialParameters, k: usize) -> Sprite {
        let angle = TAU * k as f32 / self.count as f32;
        let pos = (
            params.fix_x + self.eccentricity * angle.cos(),
            params.fix_y + self.eccentricity * angle.sin(),
        );
        Sprite::square(pos, self.size, self.color)
    }
}

fn field<'a>(settings: &'a Settings, key: &str) -> Option<&'a Value> {
    settings.extra.get(key)
}

impl Task for ProbeTask {
    fn name(&self) -> &str {
        "probe"
    }

    fn pre_start(&mut self, settings: &Settings) -> anyhow::Result<bool> {
        if let Some(v) = field(settings, "probe_count") {
            self.count = v
                .as_u64()
                .context("probe_count must be a non-negative integer")? as usize;
        }
        if let Some(v) = field(settings, "probe_eccentricity") {
            let ecc = v.as_f64().context("probe_eccentricity must be a number")?;
            anyhow::ensure!(ecc > 0.0, "probe_eccentricity must be positive, got {ecc}");
            self.eccentricity = ecc as f32;
        }
        Ok(true)
    }

    fn pre_run_trial(&mut self, params: TrialParameters) -> TrialParameters {
        self.shown = 0;
        params
    }

    fn post_run_trial(&mut self, mut params: TrialParameters) -> TrialParameters {
        params.extra.insert("probes_shown".into(), json!(self.shown));
        params
    }

    fn stimulate<C: Clock>(
        &mut self,
        rig: &mut Rig<C>,
        params: &TrialParameters,
        timer: &Timer<C>,
        duration_ms: u64,
    ) -> Result<(), Raised> {
        let slot = match self.count {
            0 => u64::MAX,
            n => (duration_ms / n as u64).max(1),
        };
        let mut current = None;
        while timer.elapsed_ms() < duration_ms {
            if self.count > 0 {
                let k = ((timer.elapsed_ms() / slot) as usize).min(self.count - 1);
                if current != Some(k) {
                    rig.show(PROBE, self.probe(params, k));
                    rig.flip();
                    current = Some(k);
                    self.shown += 1;
                }
            }
            rig.idle_tick()?;
        }
        if current.is_some() {
            rig.hide(PROBE);
            rig.flip();
        }
        Ok(())
    }
}
