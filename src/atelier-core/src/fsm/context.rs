// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::VecDeque;
use std::time::Duration;

use atelier_protocol::OutboundMessage;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::State;
use super::{Input, Step};
use crate::actuator::{ActuatorBank, ActuatorCommand};
use crate::dispatch::{DelegateId, DelegateTable};
use crate::owner::Owner;
use crate::peripheral::{EventKind, PeripheralEvent, SourceId};
use crate::timer::{TimerHandle, TimerQueue, TimerTag};

/// Sink for outbound messages. Implemented by the session client.
pub trait Outbox {
    /// Queue a message without blocking.
    fn send(&mut self, message: OutboundMessage);
}

impl Outbox for Vec<OutboundMessage> {
    fn send(&mut self, message: OutboundMessage) {
        self.push(message);
    }
}

/// Controller resources lent to the state machine for one call.
pub struct Env<'e> {
    pub now: Instant,
    pub timers: &'e mut TimerQueue,
    pub delegates: &'e mut DelegateTable,
    pub actuators: &'e mut ActuatorBank,
    pub outbox: &'e mut dyn Outbox,
}

pub(crate) enum Transition<S: Step> {
    Swap(Box<dyn State<S>>),
    Finish,
}

/// Handle through which a state acts on the controller.
///
/// Timers and delegates created here belong to the calling activation and
/// are released when it exits. Requested transitions take effect right after
/// the current hook returns.
pub struct StateContext<'a, 'e, S: Step> {
    env: &'a mut Env<'e>,
    epoch: u64,
    pending: &'a mut VecDeque<Transition<S>>,
}

impl<'a, 'e, S: Step> StateContext<'a, 'e, S> {
    pub(crate) fn new(
        env: &'a mut Env<'e>,
        epoch: u64,
        pending: &'a mut VecDeque<Transition<S>>,
    ) -> Self {
        Self {
            env,
            epoch,
            pending,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn now(&self) -> Instant {
        self.env.now
    }

    fn owner(&self) -> Owner {
        Owner::State(self.epoch)
    }

    pub fn swap_state(&mut self, next: Box<dyn State<S>>) {
        debug!("Queued swap to {}", next.step().name());
        self.pending.push_back(Transition::Swap(next));
    }

    pub fn swap_to<T: State<S> + 'static>(&mut self, next: T) {
        self.swap_state(Box::new(next));
    }

    /// Exit the current state without a successor.
    pub fn finish(&mut self) {
        self.pending.push_back(Transition::Finish);
    }

    pub fn send(&mut self, message: OutboundMessage) {
        self.env.outbox.send(message);
    }

    /// Announce `step` as `{"<field>": "<step name>"}`.
    pub fn send_state(&mut self, field: &str, step: S) {
        self.send(OutboundMessage::state_update(field, step.name()));
    }

    pub fn start_timer(&mut self, delay: Duration, tag: TimerTag) -> TimerHandle {
        let owner = self.owner();
        self.env.timers.schedule(owner, self.env.now, delay, tag)
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) -> bool {
        self.env.timers.cancel(handle)
    }

    /// Drive an actuator. Failures are logged and reported as `false`.
    pub fn actuate(&mut self, name: &str, command: ActuatorCommand) -> bool {
        match self.env.actuators.command(name, command) {
            Ok(()) => true,
            Err(e) => {
                warn!("Actuator '{}' rejected {}: {}", name, command, e);
                false
            }
        }
    }

    /// Bind a handler to `(source, kind)` for the lifetime of this activation.
    pub fn subscribe<F>(
        &mut self,
        source: impl Into<SourceId>,
        kind: EventKind,
        name: impl Into<String>,
        handler: F,
    ) -> DelegateId
    where
        F: Fn(&PeripheralEvent) -> Option<Input> + 'static,
    {
        let owner = self.owner();
        self.env
            .delegates
            .register(source, kind, owner, name, handler)
    }

    pub fn unsubscribe(&mut self, id: DelegateId) -> bool {
        self.env.delegates.unregister(id)
    }
}
