//! Asynchronous-to-synchronous bridge for hardware and timer interrupts.
//!
//! Signals may arrive from any thread at any time. They only set a sticky
//! latch; nothing is delivered until the trial logic polls from its idle
//! tick, so a break or bar transition can never land in the middle of code
//! that is not ready to unwind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptClass {
    /// Response bar changed state.
    Bar = 0,
    /// Gaze left the armed fixation window.
    FixWin = 1,
    /// A deadline-queue alarm (the no-response deadline).
    Deadline = 2,
    /// Generic alarm from outside the deadline queue.
    Alarm = 3,
}

impl InterruptClass {
    /// Delivery priority when several latches are set at once.
    pub const PRIORITY: [InterruptClass; 4] = [
        InterruptClass::Bar,
        InterruptClass::FixWin,
        InterruptClass::Deadline,
        InterruptClass::Alarm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptClass::Bar => "bar",
            InterruptClass::FixWin => "fixwin",
            InterruptClass::Deadline => "deadline",
            InterruptClass::Alarm => "alarm",
        }
    }
}

const CLASSES: usize = 4;
const UNSTAMPED: u64 = u64::MAX;

/// A latched interrupt handed to the trial logic by `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub class: InterruptClass,
    /// Time stamp supplied with the first signal of this latch period.
    pub t_ms: Option<u64>,
}

#[derive(Debug)]
struct LatchState {
    enabled: AtomicBool,
    armed: [AtomicBool; CLASSES],
    latched: [AtomicBool; CLASSES],
    stamp: [AtomicU64; CLASSES],
}

/// Sticky per-class flags shared between signal producers and the poller.
#[derive(Debug, Clone)]
pub struct InterruptLatch {
    inner: Arc<LatchState>,
}

impl InterruptLatch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LatchState {
                enabled: AtomicBool::new(true),
                armed: Default::default(),
                latched: Default::default(),
                stamp: [
                    AtomicU64::new(UNSTAMPED),
                    AtomicU64::new(UNSTAMPED),
                    AtomicU64::new(UNSTAMPED),
                    AtomicU64::new(UNSTAMPED),
                ],
            }),
        }
    }

    /// Enables or disables generation of `class`. Both directions discard
    /// any pending latch, so a stale signal from an earlier arming period
    /// can never be delivered.
    pub fn arm(&self, class: InterruptClass, enabled: bool) {
        let i = class as usize;
        if enabled {
            self.discard(i);
            self.inner.armed[i].store(true, Ordering::Release);
        } else {
            self.inner.armed[i].store(false, Ordering::Release);
            self.discard(i);
        }
    }

    pub fn disarm_all(&self) {
        for class in InterruptClass::PRIORITY {
            self.arm(class, false);
        }
    }

    pub fn is_armed(&self, class: InterruptClass) -> bool {
        self.inner.armed[class as usize].load(Ordering::Acquire)
    }

    pub fn any_armed(&self) -> bool {
        InterruptClass::PRIORITY.iter().any(|&c| self.is_armed(c))
    }

    pub fn is_pending(&self, class: InterruptClass) -> bool {
        self.inner.latched[class as usize].load(Ordering::Acquire)
    }

    /// Raw signal arrival. Ignored unless `class` is armed; repeated
    /// signals before the next poll collapse into one latch that keeps the
    /// first stamp.
    pub fn signal(&self, class: InterruptClass, t_ms: Option<u64>) -> bool {
        let i = class as usize;
        if !self.inner.armed[i].load(Ordering::Acquire) {
            return false;
        }
        if !self.inner.latched[i].load(Ordering::Acquire) {
            self.inner.stamp[i].store(t_ms.unwrap_or(UNSTAMPED), Ordering::Release);
            self.inner.latched[i].store(true, Ordering::Release);
        }
        true
    }

    /// While disabled, signals still latch but `poll` delivers nothing.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Clears and returns at most one latched interrupt, highest priority
    /// first. Other latched classes stay set for a later poll.
    pub fn poll(&self) -> Option<Delivered> {
        if !self.is_enabled() {
            return None;
        }
        InterruptClass::PRIORITY.into_iter().find_map(|class| {
            let i = class as usize;
            if self.inner.latched[i].swap(false, Ordering::AcqRel) {
                let stamp = self.inner.stamp[i].swap(UNSTAMPED, Ordering::AcqRel);
                Some(Delivered {
                    class,
                    t_ms: (stamp != UNSTAMPED).then_some(stamp),
                })
            } else {
                None
            }
        })
    }

    /// Signal-only handle for a hardware thread.
    pub fn source(&self) -> InterruptSource {
        InterruptSource {
            latch: self.clone(),
        }
    }

    fn discard(&self, i: usize) {
        self.inner.latched[i].store(false, Ordering::Release);
        self.inner.stamp[i].store(UNSTAMPED, Ordering::Release);
    }
}

impl Default for InterruptLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable entry point for asynchronous signal producers.
#[derive(Debug, Clone)]
pub struct InterruptSource {
    latch: InterruptLatch,
}

impl InterruptSource {
    pub fn signal(&self, class: InterruptClass) -> bool {
        self.latch.signal(class, None)
    }

    pub fn signal_at(&self, class: InterruptClass, t_ms: u64) -> bool {
        self.latch.signal(class, Some(t_ms))
    }
}
