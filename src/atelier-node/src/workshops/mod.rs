// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Reference workshops.

pub mod lost;
pub mod stranger;

use atelier_protocol::InboundMessage;

/// Coordinator command that starts a workshop run.
pub const START_SYSTEM: &str = "start_system";
/// Coordinator command that returns a workshop to its first step.
pub const RESET_SYSTEM: &str = "reset_system";

pub(crate) fn is_start(message: &InboundMessage) -> bool {
    message.flag(START_SYSTEM) || message.kind() == Some(START_SYSTEM)
}

pub(crate) fn is_reset(message: &InboundMessage) -> bool {
    message.flag(RESET_SYSTEM) || message.kind() == Some(RESET_SYSTEM)
}

#[cfg(test)]
pub(crate) mod testing {
    use atelier_core::{ActuatorBank, DelegateTable, Env, TimerQueue};
    use atelier_protocol::{parse_frame, InboundMessage, OutboundMessage};
    use tokio::time::Instant;

    /// Controller resources for driving a state machine directly.
    pub struct Rig {
        pub timers: TimerQueue,
        pub delegates: DelegateTable,
        pub actuators: ActuatorBank,
        pub sent: Vec<OutboundMessage>,
        pub now: Instant,
    }

    impl Rig {
        pub fn new() -> Self {
            Self {
                timers: TimerQueue::new(),
                delegates: DelegateTable::new(),
                actuators: ActuatorBank::new(),
                sent: Vec::new(),
                now: Instant::now(),
            }
        }

        pub fn env(&mut self) -> Env<'_> {
            Env {
                now: self.now,
                timers: &mut self.timers,
                delegates: &mut self.delegates,
                actuators: &mut self.actuators,
                outbox: &mut self.sent,
            }
        }
    }

    pub fn message(text: &str) -> InboundMessage {
        parse_frame(text).expect("test frame")
    }
}
