// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use atelier_protocol::InboundMessage;
use thiserror::Error;

use super::context::StateContext;
use super::Step;
use crate::timer::TimerTag;

/// Error returned by a state hook. The input that caused it is dropped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("invalid payload in '{field}': {reason}")]
    InvalidPayload { field: String, reason: String },

    #[error("{0}")]
    Unexpected(String),
}

impl StateError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type HandlerResult = Result<(), StateError>;

/// Contract every workshop step implements. All hooks default to no-op.
pub trait State<S: Step> {
    fn step(&self) -> S;

    fn enter(&mut self, _ctx: &mut StateContext<'_, '_, S>) -> HandlerResult {
        Ok(())
    }

    fn exit(&mut self, _ctx: &mut StateContext<'_, '_, S>) -> HandlerResult {
        Ok(())
    }

    fn handle_button(&mut self, _ctx: &mut StateContext<'_, '_, S>, _index: usize) -> HandlerResult {
        Ok(())
    }

    fn handle_long_press(
        &mut self,
        _ctx: &mut StateContext<'_, '_, S>,
        _index: usize,
    ) -> HandlerResult {
        Ok(())
    }

    fn handle_rfid(&mut self, _ctx: &mut StateContext<'_, '_, S>, _uid: &str) -> HandlerResult {
        Ok(())
    }

    fn handle_card_lost(&mut self, _ctx: &mut StateContext<'_, '_, S>) -> HandlerResult {
        Ok(())
    }

    fn handle_light(&mut self, _ctx: &mut StateContext<'_, '_, S>, _value: f64) -> HandlerResult {
        Ok(())
    }

    fn handle_message(
        &mut self,
        _ctx: &mut StateContext<'_, '_, S>,
        _message: &InboundMessage,
    ) -> HandlerResult {
        Ok(())
    }

    fn on_timer(&mut self, _ctx: &mut StateContext<'_, '_, S>, _tag: TimerTag) -> HandlerResult {
        Ok(())
    }

    /// Periodic tick.
    fn update(&mut self, _ctx: &mut StateContext<'_, '_, S>) -> HandlerResult {
        Ok(())
    }

    /// Called after every (re)connection of the session.
    fn on_connected(&mut self, _ctx: &mut StateContext<'_, '_, S>) -> HandlerResult {
        Ok(())
    }
}
