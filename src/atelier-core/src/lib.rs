// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller runtime building blocks for atelier workshop nodes.
//!
//! Everything here is transport-agnostic: peripheral sources, the delegate
//! dispatch table, the state machine engine, timers, actuators and retry
//! policies. The node crate composes them with a WebSocket session into a
//! running controller.

pub mod actuator;
pub mod dispatch;
pub mod fsm;
pub mod owner;
pub mod peripheral;
pub mod policies;
pub mod timer;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use actuator::{Actuator, ActuatorBank, ActuatorCommand, LogActuator};
pub use dispatch::{DelegateId, DelegateTable};
pub use fsm::{
    Env, HandlerResult, Input, Outbox, State, StateContext, StateError, StateMachine, Step,
};
pub use owner::Owner;
pub use peripheral::{
    event_queue, EventKind, EventQueue, EventSender, Payload, PeripheralError, PeripheralEvent,
    PeripheralSource, SourceId,
};
pub use policies::{BackoffStep, ExponentialBackoff, ReconnectBackoff, RetryPolicy};
pub use timer::{Expired, TimerHandle, TimerQueue, TimerTag};
