use fixrig_core::{Rgba, TrialParameters};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: range minimum {min} exceeds maximum {max}")]
    InvertedRange { name: &'static str, min: u64, max: u64 },
    #[error("{name}: probability {value} outside [0, 1]")]
    Probability { name: &'static str, value: f64 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("min_rt_ms {min} must be below max_rt_ms {max}")]
    RtBounds { min: u64, max: u64 },
    #[error("fixation grid enabled but no grid points supplied")]
    EmptyGrid,
    #[error("task `extra` overrides must be a JSON object")]
    ExtraNotObject,
    #[error("invalid parameter: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rig-wide defaults shared by every task. Randomized quantities are
/// `(min, max)` ranges drawn uniformly per trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommonParams {
    pub iti_ms: (u64, u64),
    pub hold_ms: (u64, u64),
    pub stim_delay_ms: u64,
    pub dim_gap_ms: u64,
    pub max_rt_ms: u64,
    pub min_rt_ms: u64,
    pub max_acquire_ms: u64,
    pub grace_ms: u64,
    pub timeout_ms: u64,
    pub uninit_timeout_ms: u64,
    pub fix_x: f32,
    pub fix_y: f32,
    pub fix_win_radius: f32,
    pub fix_win_vbias: f32,
    pub fix_size: f32,
    pub resp_down: bool,
    pub stim_to_end: bool,
    pub repeat_hold_on_error: bool,
    pub reward_ms: u64,
    pub reward_sigma_ms: u64,
    pub reward_min_ms: u64,
    pub reward_max_ms: u64,
    pub reward_freq: f64,
    pub beep: bool,
    pub error_color: Rgba,
    pub error_flash_ms: u64,
    pub background: Rgba,
    pub fix_color: Rgba,
    pub dim_color: Rgba,
}

impl Default for CommonParams {
    fn default() -> Self {
        let p = TrialParameters::default();
        Self {
            iti_ms: (1000, 2000),
            hold_ms: (1000, 3000),
            stim_delay_ms: p.stim_delay_ms,
            dim_gap_ms: p.dim_gap_ms,
            max_rt_ms: p.max_rt_ms,
            min_rt_ms: p.min_rt_ms,
            max_acquire_ms: p.max_acquire_ms,
            grace_ms: p.grace_ms,
            timeout_ms: p.timeout_ms,
            uninit_timeout_ms: p.uninit_timeout_ms,
            fix_x: p.fix_x,
            fix_y: p.fix_y,
            fix_win_radius: p.fix_win_radius,
            fix_win_vbias: p.fix_win_vbias,
            fix_size: p.fix_size,
            resp_down: p.resp_down,
            stim_to_end: p.stim_to_end,
            repeat_hold_on_error: p.repeat_hold_on_error,
            reward_ms: p.reward_ms,
            reward_sigma_ms: p.reward_sigma_ms,
            reward_min_ms: p.reward_min_ms,
            reward_max_ms: p.reward_max_ms,
            reward_freq: p.reward_freq,
            beep: p.beep,
            error_color: p.error_color,
            error_flash_ms: p.error_flash_ms,
            background: p.background,
            fix_color: p.fix_color,
            dim_color: p.dim_color,
        }
    }
}

/// Stopping thresholds; `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunLimits {
    pub max_trials: Option<usize>,
    pub max_correct: Option<usize>,
    /// Consecutive uninitiated trials before the run gives up.
    pub max_uninitiated: Option<usize>,
}

/// Fixation locations visited in shuffled blocks, one per trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FixationGrid {
    pub enabled: bool,
    pub points: Vec<(f32, f32)>,
    /// Put a failed trial's location back at the end of the current block.
    pub requeue_failed: bool,
}

impl Default for FixationGrid {
    fn default() -> Self {
        Self {
            enabled: false,
            points: Vec::new(),
            requeue_failed: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub common: CommonParams,
    /// Task-specific overrides of `common` fields by name. Fields the task
    /// adds for itself go under the `extra` key.
    pub task: Map<String, Value>,
    pub limits: RunLimits,
    pub grid: FixationGrid,
}

impl RunConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Folds the task overrides into the common defaults and validates.
    pub fn merge(&self) -> Result<Settings, ConfigError> {
        let mut merged = serde_json::to_value(&self.common)?;
        let mut extra = Map::new();
        if let Value::Object(fields) = &mut merged {
            for (key, value) in &self.task {
                if key == "extra" {
                    match value {
                        Value::Object(m) => extra.extend(m.clone()),
                        _ => return Err(ConfigError::ExtraNotObject),
                    }
                } else {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }
        let params: CommonParams = serde_json::from_value(merged)?;
        let settings = Settings {
            params,
            extra,
            limits: self.limits.clone(),
            grid: self.grid.clone(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Validated, merged configuration for a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub params: CommonParams,
    pub extra: Map<String, Value>,
    pub limits: RunLimits,
    pub grid: FixationGrid,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.params;
        for (name, (min, max)) in [("iti_ms", p.iti_ms), ("hold_ms", p.hold_ms)] {
            if min > max {
                return Err(ConfigError::InvertedRange { name, min, max });
            }
        }
        if p.reward_min_ms > p.reward_max_ms {
            return Err(ConfigError::InvertedRange {
                name: "reward_ms",
                min: p.reward_min_ms,
                max: p.reward_max_ms,
            });
        }
        if !(0.0..=1.0).contains(&p.reward_freq) {
            return Err(ConfigError::Probability {
                name: "reward_freq",
                value: p.reward_freq,
            });
        }
        if p.max_rt_ms == 0 {
            return Err(ConfigError::NotPositive {
                name: "max_rt_ms",
                value: 0.0,
            });
        }
        if p.min_rt_ms >= p.max_rt_ms {
            return Err(ConfigError::RtBounds {
                min: p.min_rt_ms,
                max: p.max_rt_ms,
            });
        }
        if p.fix_win_vbias <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "fix_win_vbias",
                value: p.fix_win_vbias as f64,
            });
        }
        if self.grid.enabled && self.grid.points.is_empty() {
            return Err(ConfigError::EmptyGrid);
        }
        Ok(())
    }

    /// Draws the parameters of one trial.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> TrialParameters {
        let p = &self.params;
        TrialParameters {
            iti_ms: rng.random_range(p.iti_ms.0..=p.iti_ms.1),
            hold_ms: rng.random_range(p.hold_ms.0..=p.hold_ms.1),
            stim_delay_ms: p.stim_delay_ms,
            dim_gap_ms: p.dim_gap_ms,
            max_rt_ms: p.max_rt_ms,
            min_rt_ms: p.min_rt_ms,
            max_acquire_ms: p.max_acquire_ms,
            grace_ms: p.grace_ms,
            timeout_ms: p.timeout_ms,
            uninit_timeout_ms: p.uninit_timeout_ms,
            fix_x: p.fix_x,
            fix_y: p.fix_y,
            fix_win_radius: p.fix_win_radius,
            fix_win_vbias: p.fix_win_vbias,
            fix_size: p.fix_size,
            resp_down: p.resp_down,
            stim_to_end: p.stim_to_end,
            repeat_hold_on_error: p.repeat_hold_on_error,
            reward_ms: p.reward_ms,
            reward_sigma_ms: p.reward_sigma_ms,
            reward_min_ms: p.reward_min_ms,
            reward_max_ms: p.reward_max_ms,
            reward_freq: p.reward_freq,
            beep: p.beep,
            error_color: p.error_color,
            error_flash_ms: p.error_flash_ms,
            background: p.background,
            fix_color: p.fix_color,
            dim_color: p.dim_color,
            extra: self.extra.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    #[test]
    fn defaults_merge_cleanly() {
        let settings = RunConfig::default().merge().unwrap();
        assert_eq!(settings.params, CommonParams::default());
        assert!(settings.extra.is_empty());
    }

    #[test]
    fn task_overrides_win_over_common() {
        let cfg = RunConfig::from_json(
            r#"{
                "common": { "max_rt_ms": 800 },
                "task": { "hold_ms": [3000, 3000], "stim_to_end": true,
                          "extra": { "probe_count": 4 } }
            }"#,
        )
        .unwrap();
        let settings = cfg.merge().unwrap();
        assert_eq!(settings.params.max_rt_ms, 800);
        assert_eq!(settings.params.hold_ms, (3000, 3000));
        assert!(settings.params.stim_to_end);
        assert_eq!(settings.extra["probe_count"], json!(4));

        let p = settings.sample(&mut StdRng::seed_from_u64(1));
        assert_eq!(p.hold_ms, 3000);
        assert_eq!(p.extra["probe_count"], json!(4));
    }

    #[test]
    fn unknown_override_is_rejected_at_merge() {
        let mut cfg = RunConfig::default();
        cfg.task.insert("hold_msec".into(), json!(10));
        assert!(matches!(cfg.merge(), Err(ConfigError::Json(_))));
    }

    #[test]
    fn wrongly_typed_override_is_rejected() {
        let mut cfg = RunConfig::default();
        cfg.task.insert("resp_down".into(), json!("yes"));
        assert!(cfg.merge().is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut cfg = RunConfig::default();
        cfg.common.iti_ms = (500, 100);
        assert!(matches!(
            cfg.merge(),
            Err(ConfigError::InvertedRange { name: "iti_ms", .. })
        ));
    }

    #[test]
    fn reward_probability_bounds() {
        let mut cfg = RunConfig::default();
        cfg.task.insert("reward_freq".into(), json!(1.5));
        assert!(matches!(cfg.merge(), Err(ConfigError::Probability { .. })));
    }

    #[test]
    fn grid_without_points_is_a_config_error() {
        let mut cfg = RunConfig::default();
        cfg.grid.enabled = true;
        assert!(matches!(cfg.merge(), Err(ConfigError::EmptyGrid)));
    }

    #[test]
    fn samples_stay_inside_ranges() {
        let settings = RunConfig::default().merge().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = settings.sample(&mut rng);
            assert!((1000..=2000).contains(&p.iti_ms));
            assert!((1000..=3000).contains(&p.hold_ms));
        }
    }
}
