/// Pending (deadline, action) pairs, consumed at most once each.
///
/// The queue never runs anything itself: `take_due` hands back the earliest
/// action whose deadline has passed and forgets it, so an action can only be
/// delivered once. Entries with equal deadlines come out in scheduling order.
#[derive(Debug, Clone)]
pub struct DeadlineQueue<A> {
    entries: Vec<Entry<A>>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
struct Entry<A> {
    at_ms: u64,
    seq: u64,
    action: A,
}

impl<A> DeadlineQueue<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, at_ms: u64, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { at_ms, seq, action });
    }

    /// Removes and returns the earliest action due at `now_ms`, if any.
    pub fn take_due(&mut self, now_ms: u64) -> Option<A> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.at_ms <= now_ms)
            .min_by_key(|(_, e)| (e.at_ms, e.seq))
            .map(|(i, _)| i)?;
        Some(self.entries.swap_remove(idx).action)
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.at_ms).min()
    }

    /// Drops every pending entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<A> Default for DeadlineQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_first_poll_at_deadline_and_never_again() {
        let mut q = DeadlineQueue::new();
        let t0 = 1_000;
        q.schedule(t0 + 250, "miss");
        for now in t0..t0 + 250 {
            assert_eq!(q.take_due(now), None, "fired early at {now}");
        }
        assert_eq!(q.take_due(t0 + 250), Some("miss"));
        for now in t0 + 250..t0 + 1_000 {
            assert_eq!(q.take_due(now), None);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn late_poll_still_fires_once() {
        let mut q = DeadlineQueue::new();
        q.schedule(10, 1);
        assert_eq!(q.take_due(500), Some(1));
        assert_eq!(q.take_due(501), None);
    }

    #[test]
    fn one_action_per_poll_in_deadline_order() {
        let mut q = DeadlineQueue::new();
        q.schedule(30, "second");
        q.schedule(20, "first");
        q.schedule(30, "third");
        assert_eq!(q.next_deadline(), Some(20));
        assert_eq!(q.take_due(100), Some("first"));
        assert_eq!(q.take_due(100), Some("second"));
        assert_eq!(q.take_due(100), Some("third"));
        assert_eq!(q.take_due(100), None);
    }

    #[test]
    fn clear_drops_stale_entries() {
        let mut q = DeadlineQueue::new();
        q.schedule(5, ());
        q.schedule(6, ());
        q.clear();
        assert_eq!(q.len(), 0);
        assert_eq!(q.take_due(u64::MAX), None);
    }
}
