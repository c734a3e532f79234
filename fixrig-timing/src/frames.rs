use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ms: f64,
    pub jitter_ms: f64,
    pub min_frame_time_ms: f64,
    pub max_frame_time_ms: f64,
    pub effective_fps: f64,
}

/// Page-flip timestamps for the current epoch (one trial) plus a bounded
/// history of flip-to-flip intervals that survives epochs.
#[derive(Debug, Clone)]
pub struct FlipLog {
    flips: Vec<u64>,
    intervals: VecDeque<u64>,
    max_samples: usize,
}

impl FlipLog {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            flips: Vec::new(),
            intervals: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Starts a new time base; flip timestamps from before are forgotten.
    pub fn new_epoch(&mut self) {
        self.flips.clear();
    }

    pub fn record(&mut self, t_ms: u64) {
        if let Some(&prev) = self.flips.last() {
            if t_ms > prev {
                if self.intervals.len() >= self.max_samples {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(t_ms - prev);
            }
        }
        self.flips.push(t_ms);
    }

    pub fn last(&self) -> Option<u64> {
        self.flips.last().copied()
    }

    /// First flip at or after `t_ms`.
    pub fn at_or_after(&self, t_ms: u64) -> Option<u64> {
        self.flips.iter().copied().filter(|&f| f >= t_ms).min()
    }

    pub fn len(&self) -> usize {
        self.flips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flips.is_empty()
    }

    pub fn calibration_stats(&self) -> CalibrationStats {
        if self.intervals.is_empty() {
            return CalibrationStats {
                average_frame_time_ms: 0.0,
                jitter_ms: 0.0,
                min_frame_time_ms: 0.0,
                max_frame_time_ms: 0.0,
                effective_fps: 0.0,
            };
        }
        let times: Vec<f64> = self.intervals.iter().map(|&d| d as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ms: avg,
            jitter_ms: var.sqrt(),
            min_frame_time_ms: min,
            max_frame_time_ms: max,
            effective_fps: if avg > 0.0 { 1000.0 / avg } else { 0.0 },
        }
    }
}

impl Default for FlipLog {
    fn default() -> Self {
        Self::new()
    }
}
