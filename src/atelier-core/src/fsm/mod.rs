// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Generic workshop state machine.
//!
//! A workshop defines a closed step enum (implementing [`Step`]) and one type
//! per step implementing [`State`]. The [`StateMachine`] owns exactly one
//! active state and performs swap-on-transition: `exit` of the old state
//! completes before `enter` of the new one, and no input is routed in
//! between. States talk back to the controller only through the
//! [`StateContext`] passed into every hook.

pub mod context;
pub mod machine;
pub mod state;

use std::fmt;

use atelier_protocol::InboundMessage;

use crate::timer::TimerTag;

pub use context::{Env, Outbox, StateContext};
pub use machine::StateMachine;
pub use state::{HandlerResult, State, StateError};

/// Stable identifier of a workshop step.
pub trait Step: Copy + Eq + fmt::Debug + 'static {
    /// Name announced to the coordinator (e.g. `"inactive"`).
    fn name(self) -> &'static str;
}

/// Input routed to the active state.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Button pressed; carries the configured button index.
    Button(usize),
    LongPress(usize),
    /// RFID card read; carries the UID.
    Rfid(String),
    CardLost,
    /// Analog reading.
    Light(f64),
    /// Parsed inbound frame.
    Message(InboundMessage),
    /// A timer owned by the active state expired.
    Timer(TimerTag),
    /// Periodic update tick.
    Update,
    /// The session (re)connected.
    Connected,
}

impl Input {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Button(_) => "button",
            Self::LongPress(_) => "long_press",
            Self::Rfid(_) => "rfid",
            Self::CardLost => "card_lost",
            Self::Light(_) => "light",
            Self::Message(_) => "message",
            Self::Timer(_) => "timer",
            Self::Update => "update",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Button(i) => write!(f, "button {}", i),
            Self::LongPress(i) => write!(f, "long_press {}", i),
            Self::Rfid(uid) => write!(f, "rfid {}", uid),
            Self::Light(v) => write!(f, "light {}", v),
            Self::Message(msg) => write!(f, "message {}", msg.to_value()),
            Self::Timer(tag) => write!(f, "timer {}", tag),
            other => f.write_str(other.label()),
        }
    }
}
