//! Virtual-time timer queue for swap and settle delays.
//!
//! Time only moves when the owner advances it, so the same queue serves a
//! synchronous host, the tokio driver and deterministic tests.

use std::collections::BTreeMap;

/// Handle of a scheduled entry, usable to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    due_ms: u64,
    seq: u64,
}

impl TimerKey {
    #[inline]
    pub const fn due_ms(self) -> u64 {
        self.due_ms
    }
}

/// Pending entries ordered by deadline, then by scheduling order.
#[derive(Debug)]
pub struct TimerQueue<T> {
    now_ms: u64,
    next_seq: u64,
    pending: BTreeMap<TimerKey, T>,
}

impl<T> TimerQueue<T> {
    pub const fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    #[inline]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue `item` to fire `delay_ms` after the current time.
    pub fn schedule_after(&mut self, delay_ms: u64, item: T) -> TimerKey {
        let key = TimerKey {
            due_ms: self.now_ms.saturating_add(delay_ms),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(key, item);
        key
    }

    /// Remove an entry that has not fired yet.
    pub fn cancel(&mut self, key: TimerKey) -> Option<T> {
        self.pending.remove(&key)
    }

    /// Entries still waiting, earliest first.
    pub fn pending(&self) -> impl Iterator<Item = &T> {
        self.pending.values()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.keys().next().map(|key| key.due_ms)
    }

    /// Pop the earliest entry due at or before `limit_ms`, moving the clock
    /// to its deadline. Entries scheduled while handling it are measured from
    /// there.
    pub fn pop_next_before(&mut self, limit_ms: u64) -> Option<T> {
        let key = *self.pending.keys().next()?;
        if key.due_ms > limit_ms {
            return None;
        }
        self.now_ms = self.now_ms.max(key.due_ms);
        self.pending.remove(&key)
    }

    /// Move the clock forward. It never goes back.
    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
