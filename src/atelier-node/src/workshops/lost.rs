// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! "Lost" workshop: players search for a tagged object; presenting a
//! recognised card to the reader completes the run.

use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use atelier_app::normalize_uid;
use atelier_core::{ActuatorCommand, HandlerResult, State, StateContext, Step, TimerTag};
use atelier_protocol::{InboundMessage, MessageClass, OutboundMessage};
use serde_json::json;
use tracing::{debug, info};

use super::{is_reset, is_start};
use crate::config::WorkshopConfig;

pub const STATE_FIELD: &str = "lost_state";

const FOUND_HOLD: TimerTag = "found_hold";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostStep {
    Inactive,
    Searching,
    Found,
    Done,
}

impl Step for LostStep {
    fn name(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Searching => "searching",
            Self::Found => "found",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LostSettings {
    /// Normalised UIDs that count as "found".
    pub recognised: HashSet<String>,
    pub found_hold: Duration,
    pub strip: String,
    pub door: String,
}

impl LostSettings {
    pub fn from_config(config: &WorkshopConfig) -> Self {
        Self {
            recognised: config
                .recognised_uids
                .iter()
                .map(|uid| normalize_uid(uid))
                .filter(|uid| !uid.is_empty())
                .collect(),
            found_hold: Duration::from_millis(config.found_hold_ms),
            strip: config.strip.clone(),
            door: config.door.clone(),
        }
    }

    pub fn is_recognised(&self, uid: &str) -> bool {
        self.recognised.contains(&normalize_uid(uid))
    }
}

pub fn initial(settings: LostSettings) -> Box<dyn State<LostStep>> {
    Box::new(Inactive {
        settings: Rc::new(settings),
    })
}

type Ctx<'a, 'e> = StateContext<'a, 'e, LostStep>;

fn go_inactive(ctx: &mut Ctx<'_, '_>, settings: &Rc<LostSettings>, message: &InboundMessage) {
    if is_reset(message) {
        info!("Lost: reset requested");
        ctx.swap_to(Inactive {
            settings: Rc::clone(settings),
        });
    }
}

struct Inactive {
    settings: Rc<LostSettings>,
}

impl State<LostStep> for Inactive {
    fn step(&self) -> LostStep {
        LostStep::Inactive
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.actuate(&self.settings.strip, ActuatorCommand::Off);
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        if is_start(message) {
            ctx.swap_to(Searching {
                settings: Rc::clone(&self.settings),
            });
        }
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }
}

struct Searching {
    settings: Rc<LostSettings>,
}

impl State<LostStep> for Searching {
    fn step(&self) -> LostStep {
        LostStep::Searching
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.actuate(&self.settings.strip, ActuatorCommand::Level(64));
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }

    fn handle_rfid(&mut self, ctx: &mut Ctx<'_, '_>, uid: &str) -> HandlerResult {
        if !self.settings.is_recognised(uid) {
            debug!("Lost: ignoring unrecognised card {}", uid);
            return Ok(());
        }
        ctx.swap_to(Found {
            settings: Rc::clone(&self.settings),
            uid: normalize_uid(uid),
        });
        Ok(())
    }

    fn handle_light(&mut self, ctx: &mut Ctx<'_, '_>, value: f64) -> HandlerResult {
        ctx.send(OutboundMessage::typed(
            MessageClass::Ephemeral,
            "light",
            json!(value),
        ));
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        go_inactive(ctx, &self.settings, message);
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }
}

struct Found {
    settings: Rc<LostSettings>,
    uid: String,
}

impl State<LostStep> for Found {
    fn step(&self) -> LostStep {
        LostStep::Found
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        info!("Lost: card {} found", self.uid);
        ctx.actuate(&self.settings.strip, ActuatorCommand::On);
        ctx.send_state(STATE_FIELD, self.step());
        ctx.send(OutboundMessage::typed(
            MessageClass::Reliable,
            "card_found",
            json!({ "uid": self.uid }),
        ));
        ctx.start_timer(self.settings.found_hold, FOUND_HOLD);
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        go_inactive(ctx, &self.settings, message);
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut Ctx<'_, '_>, tag: TimerTag) -> HandlerResult {
        if tag == FOUND_HOLD {
            ctx.swap_to(Done {
                settings: Rc::clone(&self.settings),
            });
        }
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }
}

struct Done {
    settings: Rc<LostSettings>,
}

impl State<LostStep> for Done {
    fn step(&self) -> LostStep {
        LostStep::Done
    }

    fn enter(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.actuate(&self.settings.door, ActuatorCommand::Angle(90.0));
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }

    fn handle_message(&mut self, ctx: &mut Ctx<'_, '_>, message: &InboundMessage) -> HandlerResult {
        go_inactive(ctx, &self.settings, message);
        Ok(())
    }

    fn on_connected(&mut self, ctx: &mut Ctx<'_, '_>) -> HandlerResult {
        ctx.send_state(STATE_FIELD, self.step());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workshops::testing::{message, Rig};
    use atelier_core::{Input, StateMachine};

    fn settings() -> LostSettings {
        LostSettings::from_config(&WorkshopConfig {
            recognised_uids: vec!["04:a1:b2:c3".into()],
            found_hold_ms: 2000,
            ..WorkshopConfig::default()
        })
    }

    fn searching() -> (StateMachine<LostStep>, Rig) {
        let mut rig = Rig::new();
        let mut machine = StateMachine::new();
        machine.start(initial(settings()), &mut rig.env());
        let start = message(r#"{"type": "start_system"}"#);
        machine.dispatch(Input::Message(start), &mut rig.env()).unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Searching));
        (machine, rig)
    }

    #[test]
    fn recognised_card_found_then_done() {
        let (mut machine, mut rig) = searching();
        machine
            .dispatch(Input::Rfid("04A1B2C3".into()), &mut rig.env())
            .unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Found));
        let found = rig
            .sent
            .iter()
            .find(|m| m.payload["type"] == "card_found")
            .expect("card_found sent");
        assert!(found.is_reliable());
        assert_eq!(found.payload["value"]["uid"], "04A1B2C3");

        // a second read of the same card changes nothing
        machine
            .dispatch(Input::Rfid("04A1B2C3".into()), &mut rig.env())
            .unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Found));

        let expired = rig
            .timers
            .pop_next_expired(rig.now + Duration::from_secs(2))
            .expect("hold timer");
        machine.dispatch_timer(&expired, &mut rig.env()).unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Done));
    }

    #[test]
    fn unrecognised_card_is_ignored() {
        let (mut machine, mut rig) = searching();
        let before = rig.sent.len();
        machine
            .dispatch(Input::Rfid("DEADBEEF".into()), &mut rig.env())
            .unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Searching));
        assert_eq!(rig.sent.len(), before);
    }

    #[test]
    fn cards_ignored_before_start() {
        let mut rig = Rig::new();
        let mut machine = StateMachine::new();
        machine.start(initial(settings()), &mut rig.env());
        machine
            .dispatch(Input::Rfid("04A1B2C3".into()), &mut rig.env())
            .unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Inactive));
    }

    #[test]
    fn light_forwarded_as_ephemeral() {
        let (mut machine, mut rig) = searching();
        machine.dispatch(Input::Light(412.5), &mut rig.env()).unwrap();
        let last = rig.sent.last().expect("telemetry");
        assert!(!last.is_reliable());
        assert_eq!(last.payload, json!({ "type": "light", "value": 412.5 }));
    }

    #[test]
    fn reset_from_found_drops_hold_timer() {
        let (mut machine, mut rig) = searching();
        machine
            .dispatch(Input::Rfid("04a1b2c3".into()), &mut rig.env())
            .unwrap();
        assert_eq!(rig.timers.len(), 1);
        let reset = message(r#"{"reset_system": true}"#);
        machine.dispatch(Input::Message(reset), &mut rig.env()).unwrap();
        assert_eq!(machine.active_step(), Some(LostStep::Inactive));
        assert!(rig.timers.is_empty());
    }
}
