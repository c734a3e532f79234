use crate::clock::Clock;

/// Elapsed milliseconds from a resettable reference point.
#[derive(Debug, Clone)]
pub struct Timer<C: Clock> {
    clock: C,
    origin_ms: u64,
}

impl<C: Clock> Timer<C> {
    pub fn new(clock: C) -> Self {
        let origin_ms = clock.now_ms();
        Self { clock, origin_ms }
    }

    pub fn reset(&mut self) {
        self.origin_ms = self.clock.now_ms();
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.origin_ms)
    }

    /// Clock reading at the last reset.
    pub fn origin_ms(&self) -> u64 {
        self.origin_ms
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimClock;
    use std::time::Duration;

    #[test]
    fn reset_moves_reference_point() {
        let clock = SimClock::new();
        let mut timer = Timer::new(clock.clone());
        clock.sleep(Duration::from_millis(40));
        assert_eq!(timer.elapsed_ms(), 40);
        timer.reset();
        assert_eq!(timer.elapsed_ms(), 0);
        clock.advance(5);
        assert_eq!(timer.elapsed_ms(), 5);
        assert_eq!(timer.origin_ms(), 40);
    }
}
