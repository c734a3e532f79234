use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic millisecond time source driving every wait in a trial.
pub trait Clock: Clone + Send + Sync {
    /// Milliseconds since the clock was created. Never decreases.
    fn now_ms(&self) -> u64;
    fn sleep(&self, d: Duration);
    /// Called once per idle tick; gives up the CPU for one polling period.
    fn idle(&self);
}

/// Wall clock backed by `Instant`, with a platform high-precision sleep.
#[derive(Debug, Clone)]
pub struct HighPrecisionClock {
    start: Instant,
    idle_period: Duration,
}

impl HighPrecisionClock {
    pub fn new() -> Self {
        Self::with_idle_period(Duration::from_micros(250))
    }

    /// A zero period makes `idle` a plain `yield_now`, i.e. a busy poll.
    pub fn with_idle_period(idle_period: Duration) -> Self {
        Self {
            start: Instant::now(),
            idle_period,
        }
    }
}

impl Default for HighPrecisionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for HighPrecisionClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn sleep(&self, d: Duration) {
        high_precision_sleep(d)
    }

    fn idle(&self) {
        if self.idle_period.is_zero() {
            std::thread::yield_now();
        } else {
            high_precision_sleep(self.idle_period);
        }
    }
}

/// Sleep against the monotonic clock where the platform offers it.
pub fn high_precision_sleep(duration: Duration) {
    #[cfg(target_os = "linux")]
    linux_sleep(duration);
    #[cfg(not(target_os = "linux"))]
    std::thread::sleep(duration);
}

#[cfg(target_os = "linux")]
fn linux_sleep(duration: Duration) {
    use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

    let req = timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    };

    unsafe {
        clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
    }
}

/// Simulated time: sleeps advance the counter instantly and every idle tick
/// advances it by `step_ms`. Clones share the same counter.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Arc<AtomicU64>,
    step_ms: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::with_step(1)
    }

    pub fn with_step(step_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
            step_ms,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }

    pub fn step_ms(&self) -> u64 {
        self.step_ms
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.as_millis() as u64);
    }

    fn idle(&self) {
        self.advance(self.step_ms);
    }
}
