// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::context::{Env, StateContext, Transition};
use super::state::{HandlerResult, State, StateError};
use super::{Input, Step};
use crate::owner::Owner;
use crate::timer::Expired;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Before the first `enter`.
    Entry,
    Running,
    /// Finished or stopped; no state is active.
    Terminal,
}

/// Owns the active state and applies transitions.
pub struct StateMachine<S: Step> {
    active: Option<Box<dyn State<S>>>,
    phase: Phase,
    epoch: u64,
    pending: VecDeque<Transition<S>>,
}

impl<S: Step> Default for StateMachine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Step> StateMachine<S> {
    pub fn new() -> Self {
        Self {
            active: None,
            phase: Phase::Entry,
            epoch: 0,
            pending: VecDeque::new(),
        }
    }

    /// Enter the initial state.
    pub fn start(&mut self, initial: Box<dyn State<S>>, env: &mut Env<'_>) {
        self.swap_state(initial, env);
    }

    /// Replace the active state: `exit` the current one, then `enter` `next`,
    /// then apply whatever transitions those hooks queued.
    pub fn swap_state(&mut self, next: Box<dyn State<S>>, env: &mut Env<'_>) {
        self.pending.push_back(Transition::Swap(next));
        self.run_transitions(env);
    }

    /// Route one input to the active state.
    ///
    /// Returns `Ok(false)` when no state is active and the input was dropped.
    pub fn dispatch(&mut self, input: Input, env: &mut Env<'_>) -> Result<bool, StateError> {
        self.with_active(env, |state, ctx| match &input {
            Input::Button(index) => state.handle_button(ctx, *index),
            Input::LongPress(index) => state.handle_long_press(ctx, *index),
            Input::Rfid(uid) => state.handle_rfid(ctx, uid),
            Input::CardLost => state.handle_card_lost(ctx),
            Input::Light(value) => state.handle_light(ctx, *value),
            Input::Message(message) => state.handle_message(ctx, message),
            Input::Timer(tag) => state.on_timer(ctx, *tag),
            Input::Update => state.update(ctx),
            Input::Connected => state.on_connected(ctx),
        })
    }

    /// Route an expired state timer. Timers owned by an activation that has
    /// already exited are discarded.
    pub fn dispatch_timer(
        &mut self,
        expired: &Expired,
        env: &mut Env<'_>,
    ) -> Result<bool, StateError> {
        if self.active.is_none() || expired.owner != Owner::State(self.epoch) {
            debug!(
                "Discarding timer '{}' owned by {} (epoch {})",
                expired.tag, expired.owner, self.epoch
            );
            return Ok(false);
        }
        self.dispatch(Input::Timer(expired.tag), env)
    }

    /// Exit the active state without a successor. Transitions queued by its
    /// `exit` are discarded. Idempotent.
    pub fn stop(&mut self, env: &mut Env<'_>) -> bool {
        self.pending.clear();
        let stopped = self.exit_active(env);
        self.pending.clear();
        self.phase = Phase::Terminal;
        stopped
    }

    pub fn active_step(&self) -> Option<S> {
        self.active.as_ref().map(|state| state.step())
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::Entry
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn with_active<F>(&mut self, env: &mut Env<'_>, hook: F) -> Result<bool, StateError>
    where
        F: FnOnce(&mut dyn State<S>, &mut StateContext<'_, '_, S>) -> HandlerResult,
    {
        let Some(mut state) = self.active.take() else {
            return Ok(false);
        };
        let result = {
            let mut ctx = StateContext::new(env, self.epoch, &mut self.pending);
            hook(state.as_mut(), &mut ctx)
        };
        self.active = Some(state);
        self.run_transitions(env);
        result.map(|()| true)
    }

    fn run_transitions(&mut self, env: &mut Env<'_>) {
        while let Some(transition) = self.pending.pop_front() {
            let from = self.active_step();
            self.exit_active(env);
            match transition {
                Transition::Swap(mut next) => {
                    self.epoch += 1;
                    self.phase = Phase::Running;
                    info!(
                        "State {} -> {}",
                        from.map(|step| step.name()).unwrap_or("entry"),
                        next.step().name()
                    );
                    let entered = {
                        let mut ctx = StateContext::new(env, self.epoch, &mut self.pending);
                        next.enter(&mut ctx)
                    };
                    if let Err(e) = entered {
                        warn!("{} enter failed: {}", next.step().name(), e);
                    }
                    self.active = Some(next);
                }
                Transition::Finish => {
                    info!(
                        "State {} -> terminal",
                        from.map(|step| step.name()).unwrap_or("entry")
                    );
                    self.phase = Phase::Terminal;
                }
            }
        }
    }

    /// Run `exit` on the active state and release everything its activation
    /// owns.
    fn exit_active(&mut self, env: &mut Env<'_>) -> bool {
        let Some(mut state) = self.active.take() else {
            return false;
        };
        let exited = {
            let mut ctx = StateContext::new(env, self.epoch, &mut self.pending);
            state.exit(&mut ctx)
        };
        if let Err(e) = exited {
            warn!("{} exit failed: {}", state.step().name(), e);
        }
        let owner = Owner::State(self.epoch);
        let timers = env.timers.cancel_owned_by(owner);
        let delegates = env.delegates.unregister_all_for(owner);
        debug!(
            "Released {} timer(s) and {} delegate(s) of {}",
            timers,
            delegates,
            state.step().name()
        );
        true
    }
}
