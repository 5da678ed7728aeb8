// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Delegate dispatch table.
//!
//! Maps `(source, event kind)` to named handlers that translate a
//! [`PeripheralEvent`] into an [`Input`] for the active state. Handlers are
//! owned by the controller or by one state activation; the latter are dropped
//! when that activation exits.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fsm::Input;
use crate::owner::Owner;
use crate::peripheral::{EventKind, PeripheralEvent, SourceId};

/// Unique identifier for a registered delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId(u64);

impl DelegateId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Translates one peripheral event into state input, or `None` to ignore it.
pub type DelegateHandler = Rc<dyn Fn(&PeripheralEvent) -> Option<Input>>;

struct Delegate {
    id: DelegateId,
    source: SourceId,
    kind: EventKind,
    owner: Owner,
    name: String,
    handler: DelegateHandler,
}

/// A handler captured by [`DelegateTable::snapshot`].
#[derive(Clone)]
pub struct Bound {
    pub id: DelegateId,
    pub name: String,
    pub handler: DelegateHandler,
}

/// Registered delegates, in registration order.
#[derive(Default)]
pub struct DelegateTable {
    delegates: Vec<Delegate>,
}

impl DelegateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `(source, kind)`.
    /// Returns an ID that can be used to unregister it.
    pub fn register<F>(
        &mut self,
        source: impl Into<SourceId>,
        kind: EventKind,
        owner: Owner,
        name: impl Into<String>,
        handler: F,
    ) -> DelegateId
    where
        F: Fn(&PeripheralEvent) -> Option<Input> + 'static,
    {
        let id = DelegateId::new();
        self.delegates.push(Delegate {
            id,
            source: source.into(),
            kind,
            owner,
            name: name.into(),
            handler: Rc::new(handler),
        });
        id
    }

    pub fn unregister(&mut self, id: DelegateId) -> bool {
        let before = self.delegates.len();
        self.delegates.retain(|d| d.id != id);
        self.delegates.len() != before
    }

    /// Drop every delegate registered by `owner`; returns how many were removed.
    pub fn unregister_all_for(&mut self, owner: Owner) -> usize {
        let before = self.delegates.len();
        self.delegates.retain(|d| d.owner != owner);
        before - self.delegates.len()
    }

    pub fn clear(&mut self) {
        self.delegates.clear();
    }

    pub fn is_registered(&self, id: DelegateId) -> bool {
        self.delegates.iter().any(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    /// Handlers bound to the event's `(source, kind)`, in registration order.
    ///
    /// Callers invoke the returned handlers after the borrow of the table
    /// ends, so handlers (and whatever they trigger) may register or
    /// unregister freely. Check [`is_registered`](Self::is_registered) before
    /// each call to skip delegates removed mid-dispatch.
    pub fn snapshot(&self, event: &PeripheralEvent) -> Vec<Bound> {
        self.delegates
            .iter()
            .filter(|d| d.kind == event.kind() && d.source == *event.source())
            .map(|d| Bound {
                id: d.id,
                name: d.name.clone(),
                handler: Rc::clone(&d.handler),
            })
            .collect()
    }

    /// Run every live handler for `event` and collect the inputs they produce.
    pub fn dispatch(&self, event: &PeripheralEvent) -> Vec<Input> {
        self.snapshot(event)
            .into_iter()
            .filter_map(|bound| (bound.handler)(event))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::Payload;
    use std::cell::RefCell;
    use tokio::time::Instant;

    fn event(source: &str, kind: EventKind) -> PeripheralEvent {
        PeripheralEvent::new(SourceId::new(source), kind, Payload::None, Instant::now())
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let mut table = DelegateTable::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3usize {
            let order = order.clone();
            table.register("start", EventKind::Press, Owner::Controller, "press", move |_| {
                order.borrow_mut().push(i);
                Some(Input::Button(i))
            });
        }
        let inputs = table.dispatch(&event("start", EventKind::Press));
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(
            inputs,
            vec![Input::Button(0), Input::Button(1), Input::Button(2)]
        );
    }

    #[test]
    fn unmatched_event_is_dropped() {
        let mut table = DelegateTable::new();
        table.register("start", EventKind::Press, Owner::Controller, "press", |_| {
            Some(Input::Button(0))
        });
        assert!(table.dispatch(&event("start", EventKind::Release)).is_empty());
        assert!(table.dispatch(&event("other", EventKind::Press)).is_empty());
    }

    #[test]
    fn unregister_by_owner() {
        let mut table = DelegateTable::new();
        table.register("a", EventKind::Press, Owner::Controller, "ctl", |_| None);
        table.register("a", EventKind::Press, Owner::State(3), "s3", |_| None);
        let id = table.register("b", EventKind::Press, Owner::State(3), "s3b", |_| None);
        assert_eq!(table.unregister_all_for(Owner::State(3)), 2);
        assert!(!table.is_registered(id));
        assert_eq!(table.len(), 1);
        assert!(!table.unregister(id));
    }

    #[test]
    fn snapshot_survives_mutation() {
        let mut table = DelegateTable::new();
        let first = table.register("a", EventKind::Press, Owner::State(1), "first", |_| {
            Some(Input::Button(1))
        });
        let second = table.register("a", EventKind::Press, Owner::State(1), "second", |_| {
            Some(Input::Button(2))
        });
        let ev = event("a", EventKind::Press);
        let snapshot = table.snapshot(&ev);
        assert_eq!(snapshot.len(), 2);

        // Simulate the first handler's effect removing the second delegate.
        assert_eq!((snapshot[0].handler)(&ev), Some(Input::Button(1)));
        table.unregister(second);
        table.register("a", EventKind::Press, Owner::State(2), "late", |_| None);

        let live: Vec<_> = snapshot
            .iter()
            .filter(|bound| table.is_registered(bound.id))
            .map(|bound| bound.name.as_str())
            .collect();
        assert_eq!(live, vec!["first"]);
        assert!(table.is_registered(first));
    }
}
