//! Gaze window and response bar monitors. Both do their own edge
//! detection and report transitions; the rig turns those into latched
//! interrupts while the monitor is armed.

use crate::hardware::BarSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Circular (or vertically stretched) region the gaze must stay inside.
#[derive(Debug, Clone, PartialEq)]
pub struct GazeWindow {
    center: (f32, f32),
    radius: f32,
    vbias: f32,
    inside: bool,
    armed: bool,
    broken: bool,
}

impl GazeWindow {
    pub fn new(center: (f32, f32), radius: f32, vbias: f32) -> Self {
        Self {
            center,
            radius,
            vbias,
            inside: false,
            armed: false,
            broken: false,
        }
    }

    pub fn move_to(&mut self, center: (f32, f32)) {
        self.center = center;
    }

    pub fn set(&mut self, radius: f32, vbias: f32) {
        self.radius = radius;
        self.vbias = vbias;
    }

    pub fn enabled(&self) -> bool {
        self.radius > 0.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        if !self.enabled() {
            return false;
        }
        let dx = x - self.center.0;
        let dy = (y - self.center.1) / self.vbias;
        dx * dx + dy * dy <= self.radius * self.radius
    }

    /// Feeds a gaze position. Returns true exactly when an armed window is
    /// broken by this sample.
    pub fn update(&mut self, x: f32, y: f32) -> bool {
        self.inside = self.contains(x, y);
        if self.armed && !self.inside && !self.broken {
            self.broken = true;
            return true;
        }
        false
    }

    /// Gaze lost (no sample): counts as outside.
    pub fn lose(&mut self) -> bool {
        self.inside = false;
        if self.armed && !self.broken {
            self.broken = true;
            return true;
        }
        false
    }

    pub fn inside(&self) -> bool {
        self.inside
    }

    pub fn center(&self) -> (f32, f32) {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Whether fixation has been broken since the window was last armed.
    pub fn broken(&self) -> bool {
        self.broken
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn arm(&mut self, on: bool) {
        self.armed = on;
        self.broken = false;
    }
}

impl Default for GazeWindow {
    fn default() -> Self {
        Self::new((0.0, 0.0), 0.0, 1.0)
    }
}

struct BarState {
    source: Box<dyn BarSource>,
    flip: AtomicBool,
    armed: AtomicBool,
    baseline: AtomicBool,
}

/// The rig's single response bar. Clones share the same device.
#[derive(Clone)]
pub struct ResponseBar {
    inner: Arc<BarState>,
}

impl ResponseBar {
    pub fn new(source: Box<dyn BarSource>) -> Self {
        Self {
            inner: Arc::new(BarState {
                source,
                flip: AtomicBool::new(false),
                armed: AtomicBool::new(false),
                baseline: AtomicBool::new(false),
            }),
        }
    }

    /// Inverts the sense of the raw input (for bars wired active-low).
    pub fn set_polarity_flip(&self, flip: bool) {
        self.inner.flip.store(flip, Ordering::Release);
    }

    pub fn is_down(&self) -> bool {
        self.inner.source.raw_down() ^ self.inner.flip.load(Ordering::Acquire)
    }

    /// Arming snapshots the current state; the next change from it is a
    /// transition.
    pub fn arm(&self, on: bool) {
        self.inner.baseline.store(self.is_down(), Ordering::Release);
        self.inner.armed.store(on, Ordering::Release);
    }

    pub fn armed(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }

    /// Reports a change from the armed baseline once, then re-baselines.
    pub fn take_transition(&self) -> bool {
        if !self.armed() {
            return false;
        }
        let now = self.is_down();
        let was = self.inner.baseline.swap(now, Ordering::AcqRel);
        now != was
    }
}

impl std::fmt::Debug for ResponseBar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBar")
            .field("down", &self.is_down())
            .field("armed", &self.armed())
            .finish()
    }
}
