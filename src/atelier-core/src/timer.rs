// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Cancellable one-shot timers owned by states or by the controller.
//!
//! Timers never run callbacks on their own. The controller sleeps until
//! [`TimerQueue::next_deadline`], pops the expired entries and routes them
//! to the active state, which lets the state machine discard any timer whose
//! owning activation has already exited.

use std::time::Duration;

use tokio::time::Instant;

use crate::owner::Owner;

/// Name a state gives its timer; handed back in `State::on_timer`.
pub type TimerTag = &'static str;

/// Handle used to cancel a pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// A timer that reached its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub handle: TimerHandle,
    pub owner: Owner,
    pub tag: TimerTag,
    pub deadline: Instant,
}

#[derive(Debug)]
struct Entry {
    handle: TimerHandle,
    owner: Owner,
    tag: TimerTag,
    deadline: Instant,
}

/// Pending timers ordered by deadline, then by creation order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<Entry>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, owner: Owner, deadline: Instant, tag: TimerTag) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let pos = self
            .entries
            .partition_point(|entry| entry.deadline <= deadline);
        self.entries.insert(
            pos,
            Entry {
                handle,
                owner,
                tag,
                deadline,
            },
        );
        handle
    }

    pub fn schedule(
        &mut self,
        owner: Owner,
        now: Instant,
        delay: Duration,
        tag: TimerTag,
    ) -> TimerHandle {
        self.schedule_at(owner, now + delay, tag)
    }

    /// Cancel one timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        self.entries.len() != before
    }

    /// Cancel every timer started by `owner`; returns how many were pending.
    pub fn cancel_owned_by(&mut self, owner: Owner) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.owner != owner);
        before - self.entries.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|entry| entry.deadline)
    }

    /// Remove and return the earliest timer due at `now`, if any.
    pub fn pop_next_expired(&mut self, now: Instant) -> Option<Expired> {
        if self.entries.first()?.deadline > now {
            return None;
        }
        let entry = self.entries.remove(0);
        Some(Expired {
            handle: entry.handle,
            owner: entry.owner,
            tag: entry.tag,
            deadline: entry.deadline,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_in_deadline_order() {
        let mut timers = TimerQueue::new();
        let start = Instant::now();
        timers.schedule(Owner::State(1), start, Duration::from_millis(300), "late");
        timers.schedule(Owner::State(1), start, Duration::from_millis(100), "early");
        timers.schedule(Owner::Controller, start, Duration::from_millis(100), "tie");

        assert_eq!(timers.next_deadline(), Some(start + Duration::from_millis(100)));
        let now = start + Duration::from_millis(150);
        let fired: Vec<_> = std::iter::from_fn(|| timers.pop_next_expired(now))
            .map(|e| e.tag)
            .collect();
        assert_eq!(fired, vec!["early", "tie"]);
        assert_eq!(timers.len(), 1);
        assert!(timers
            .pop_next_expired(start + Duration::from_millis(299))
            .is_none());
        assert_eq!(
            timers
                .pop_next_expired(start + Duration::from_millis(300))
                .map(|e| e.tag),
            Some("late")
        );
        assert!(timers.is_empty());
    }

    #[test]
    fn cancel_single_and_by_owner() {
        let mut timers = TimerQueue::new();
        let start = Instant::now();
        let a = timers.schedule(Owner::State(1), start, Duration::from_millis(10), "a");
        timers.schedule(Owner::State(1), start, Duration::from_millis(20), "b");
        timers.schedule(Owner::State(2), start, Duration::from_millis(30), "c");

        assert!(timers.cancel(a));
        assert!(!timers.cancel(a));
        assert_eq!(timers.cancel_owned_by(Owner::State(1)), 1);
        let later = start + Duration::from_secs(1);
        let fired = timers.pop_next_expired(later).expect("owner 2 timer");
        assert_eq!(fired.owner, Owner::State(2));
        assert!(timers.pop_next_expired(later).is_none());
    }

    #[test]
    fn pop_next_expired_one_at_a_time() {
        let mut timers = TimerQueue::new();
        let start = Instant::now();
        timers.schedule(Owner::State(1), start, Duration::from_millis(10), "first");
        timers.schedule(Owner::State(1), start, Duration::from_millis(20), "second");

        assert!(timers.pop_next_expired(start).is_none());
        let now = start + Duration::from_millis(25);
        assert_eq!(timers.pop_next_expired(now).map(|e| e.tag), Some("first"));
        assert_eq!(timers.pop_next_expired(now).map(|e| e.tag), Some("second"));
        assert!(timers.pop_next_expired(now).is_none());
    }
}
