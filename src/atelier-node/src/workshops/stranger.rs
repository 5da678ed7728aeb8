// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! "Stranger" workshop: a button (or a timeout) opens the door once the
//! coordinator has started the run.

use std::rc::Rc;
use std::time::Duration;

use atelier_core::{
    ActuatorCommand, HandlerResult, State, StateContext, StateError, Step, TimerTag,
};
use atelier_protocol::InboundMessage;
use serde_json::Value;
use tracing::{debug, info};

use super::{is_reset, is_start};
use crate::config::WorkshopConfig;

pub const STATE_FIELD: &str = "stranger_state";

const AUTO_ADVANCE: TimerTag = "auto_advance";
const ACTIVE_COLOR: ActuatorCommand = ActuatorCommand::Color { r: 255, g: 48, b: 0 };
const DOOR_CLOSED: f32 = 0.0;
const DOOR_OPEN: f32 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrangerStep {
    Inactive,
    Active,
    Done,
}

impl Step for StrangerStep {
    fn name(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrangerSettings {
    pub auto_advance: Option<Duration>,
    pub strip: String,
    pub door: String,
}

impl StrangerSettings {
    pub fn from_config(config: &WorkshopConfig) -> Self {
        Self {
            auto_advance: config.auto_advance_ms.map(Duration::from_millis),
            strip: config.strip.clone(),
            door: config.door.clone(),
        }
    }
}

impl Default for StrangerSettings {
    fn default() -> Self {
        Self::from_config(&WorkshopConfig::default())
    }
}

pub fn initial(settings: StrangerSettings) -> Box<dyn State<StrangerStep>> {
    Box::new(Inactive {
        settings: Rc::new(settings),
    })
}

type Ctx<'a, 'e> = StateContext<'a, 'e, StrangerStep>;

fn announce(ctx: &mut Ctx<'_, '_>, step: StrangerStep) -> HandlerResult {
    ctx.send_state(STATE_FIELD, step);
    Ok(())
}

fn reset(ctx: &mut Ctx<'_, '_>, settings: &Rc<StrangerSettings>, message: &InboundMessage) -> bool {
    if !is_reset(message) {
        return false;
    }
    info!("Stranger: reset requested");
    ctx.swap_to(Inactive {
        settings: Rc::clone(settings),
    });
    true
}

struct Inactive {
    settings: Rc<StrangerSettings>,
}

impl State<StrangerStep> for Inactive {
    fn step(&self) -> StrangerStep {
        StrangerStep::Inactive
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.actuate(&self.settings.strip, ActuatorCommand::Off);
        ctx.actuate(&self.settings.door, ActuatorCommand::Angle(DOOR_CLOSED));
        announce(ctx, self.step())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        if is_start(message) {
            ctx.swap_to(Active {
                settings: Rc::clone(&self.settings),
            });
        }
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        announce(ctx, self.step())
    }
}

struct Active {
    settings: Rc<StrangerSettings>,
}

impl Active {
    fn advance(&self, ctx: &mut Ctx<'_, '_>) {
        ctx.swap_to(Done {
            settings: Rc::clone(&self.settings),
        });
    }
}

/// `{"r": 0-255, "g": 0-255, "b": 0-255}`
fn parse_color(value: Option<&Value>) -> Result<ActuatorCommand, StateError> {
    let object = value
        .and_then(Value::as_object)
        .ok_or_else(|| StateError::invalid("value", "expected an object with r, g, b"))?;
    let channel = |name: &str| -> Result<u8, StateError> {
        object
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| StateError::invalid(name, "expected an integer in 0..=255"))
    };
    Ok(ActuatorCommand::Color {
        r: channel("r")?,
        g: channel("g")?,
        b: channel("b")?,
    })
}

impl State<StrangerStep> for Active {
    fn step(&self) -> StrangerStep {
        StrangerStep::Active
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.actuate(&self.settings.strip, ACTIVE_COLOR);
        if let Some(delay) = self.settings.auto_advance {
            ctx.start_timer(delay, AUTO_ADVANCE);
        }
        announce(ctx, self.step())
    }

    fn handle_button(&mut self, ctx: &mut Ctx<'_, '_>, index: usize) -> HandlerResult {
        debug!("Stranger: button {} pressed", index);
        self.advance(ctx);
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        if reset(ctx, &self.settings, message) {
            return Ok(());
        }
        if message.kind() == Some("set_color") {
            let color = parse_color(message.value())?;
            ctx.actuate(&self.settings.strip, color);
        }
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut Ctx<'_, '_>, tag: TimerTag) -> HandlerResult {
        if tag == AUTO_ADVANCE {
            info!("Stranger: auto-advancing");
            self.advance(ctx);
        }
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        announce(ctx, self.step())
    }
}

struct Done {
    settings: Rc<StrangerSettings>,
}

impl State<StrangerStep> for Done {
    fn step(&self) -> StrangerStep {
        StrangerStep::Done
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.actuate(&self.settings.door, ActuatorCommand::Angle(DOOR_OPEN));
        announce(ctx, self.step())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        reset(ctx, &self.settings, message);
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        announce(ctx, self.step())
    }
}
