// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Output peripherals (servos, LED strips, relays).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{info, warn};

use crate::peripheral::PeripheralError;

/// A command sent to an actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    /// Servo angle in degrees.
    Angle(f32),
    /// LED strip color.
    Color { r: u8, g: u8, b: u8 },
    /// Brightness or duty level, 0-255.
    Level(u8),
    On,
    Off,
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Angle(deg) => write!(f, "angle {:.1}", deg),
            Self::Color { r, g, b } => write!(f, "color #{:02x}{:02x}{:02x}", r, g, b),
            Self::Level(level) => write!(f, "level {}", level),
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Output driver interface.
pub trait Actuator {
    fn name(&self) -> &str;

    fn apply(&mut self, command: &ActuatorCommand) -> Result<(), PeripheralError>;

    /// Bring the output to a safe idle position.
    fn stop(&mut self) -> Result<(), PeripheralError> {
        self.apply(&ActuatorCommand::Off)
    }
}

/// Actuator without hardware: logs each command and keeps a shared record.
pub struct LogActuator {
    name: String,
    recorder: Rc<RefCell<Vec<ActuatorCommand>>>,
}

impl LogActuator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recorder: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Shared view of every command applied so far.
    pub fn recorder(&self) -> Rc<RefCell<Vec<ActuatorCommand>>> {
        Rc::clone(&self.recorder)
    }
}

impl Actuator for LogActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&mut self, command: &ActuatorCommand) -> Result<(), PeripheralError> {
        info!("Actuator {}: {}", self.name, command);
        self.recorder.borrow_mut().push(*command);
        Ok(())
    }
}

/// Named actuators owned by the controller.
#[derive(Default)]
pub struct ActuatorBank {
    actuators: Vec<Box<dyn Actuator>>,
}

impl ActuatorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an actuator. A later actuator with the same name replaces the
    /// earlier one.
    pub fn add(&mut self, actuator: Box<dyn Actuator>) {
        if let Some(pos) = self
            .actuators
            .iter()
            .position(|a| a.name() == actuator.name())
        {
            warn!("Replacing actuator '{}'", actuator.name());
            self.actuators[pos] = actuator;
        } else {
            self.actuators.push(actuator);
        }
    }

    pub fn command(&mut self, name: &str, command: ActuatorCommand) -> Result<(), PeripheralError> {
        let actuator = self
            .actuators
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| PeripheralError::UnknownActuator(name.to_string()))?;
        actuator.apply(&command)
    }

    /// Stop every actuator, continuing past failures.
    pub fn stop_all(&mut self) -> Vec<(String, PeripheralError)> {
        let mut failures = Vec::new();
        for actuator in &mut self.actuators {
            if let Err(e) = actuator.stop() {
                failures.push((actuator.name().to_string(), e));
            }
        }
        failures
    }

    pub fn names(&self) -> Vec<&str> {
        self.actuators.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Jammed;

    impl Actuator for Jammed {
        fn name(&self) -> &str {
            "jammed"
        }

        fn apply(&mut self, _command: &ActuatorCommand) -> Result<(), PeripheralError> {
            Err(PeripheralError::Write("stall".into()))
        }
    }

    #[test]
    fn commands_reach_named_actuator() {
        let servo = LogActuator::new("door");
        let record = servo.recorder();
        let mut bank = ActuatorBank::new();
        bank.add(Box::new(servo));

        bank.command("door", ActuatorCommand::Angle(90.0)).unwrap();
        assert_eq!(*record.borrow(), vec![ActuatorCommand::Angle(90.0)]);
        assert_eq!(
            bank.command("strip", ActuatorCommand::On),
            Err(PeripheralError::UnknownActuator("strip".into()))
        );
    }

    #[test]
    fn stop_all_continues_past_failures() {
        let strip = LogActuator::new("strip");
        let record = strip.recorder();
        let mut bank = ActuatorBank::new();
        bank.add(Box::new(Jammed));
        bank.add(Box::new(strip));

        let failures = bank.stop_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "jammed");
        assert_eq!(*record.borrow(), vec![ActuatorCommand::Off]);
    }

    #[test]
    fn same_name_replaces() {
        let mut bank = ActuatorBank::new();
        bank.add(Box::new(LogActuator::new("strip")));
        bank.add(Box::new(LogActuator::new("strip")));
        assert_eq!(bank.names(), vec!["strip"]);
    }
}
