//! Per-component timer lists.
//!
//! Every component owns the timers it schedules; cancellation and
//! `close()` can therefore enumerate and drop them without reaching into
//! any shared scheduler. `poll_timeout()` surfaces the earliest deadline
//! to the caller, `handle_timeout(now)` drains what is due.

use std::time::Instant;

/// Identifier for a scheduled timer, unique within one [`TimerQueue`].
pub(crate) type TimerId = u64;

#[derive(Debug)]
struct TimerEntry<K> {
    id: TimerId,
    deadline: Instant,
    kind: K,
}

/// An owned list of pending timers, keyed by a component-specific kind.
#[derive(Debug)]
pub(crate) struct TimerQueue<K> {
    entries: Vec<TimerEntry<K>>,
    next_id: TimerId,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl<K> TimerQueue<K> {
    pub(crate) fn schedule(&mut self, deadline: Instant, kind: K) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(TimerEntry { id, deadline, kind });
        id
    }

    pub(crate) fn cancel(&mut self, id: TimerId) {
        self.entries.retain(|e| e.id != id);
    }

    pub(crate) fn cancel_all(&mut self, ids: &[TimerId]) {
        self.entries.retain(|e| !ids.contains(&e.id));
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove and return every timer due at `now`, earliest first.
    /// Timers with equal deadlines come back in scheduling order.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<(TimerId, K)> {
        let mut due: Vec<TimerEntry<K>> = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].deadline <= now {
                due.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|e| (e.deadline, e.id));
        due.into_iter().map(|e| (e.id, e.kind)).collect()
    }
}
