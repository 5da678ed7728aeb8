// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated peripheral drivers.
//!
//! A [`SimBoard`] hands out driver handles that read shared levels instead
//! of hardware registers. The console (or a test) sets those levels from any
//! thread; the controller samples them through the regular polling sources,
//! so debounce and presence tracking behave as they would on a real board.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use atelier_core::peripheral::{AnalogInput, CardReader, DigitalInput};
use atelier_core::PeripheralError;

#[derive(Debug, Clone, Default)]
pub struct SimButton(Arc<AtomicBool>);

impl DigitalInput for SimButton {
    fn read(&mut self) -> Result<bool, PeripheralError> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimReader(Arc<Mutex<Option<String>>>);

impl CardReader for SimReader {
    fn read(&mut self) -> Result<Option<String>, PeripheralError> {
        self.0
            .lock()
            .map(|card| card.clone())
            .map_err(|_| PeripheralError::Read("reader state poisoned".into()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimSensor(Arc<Mutex<Option<f64>>>);

impl AnalogInput for SimSensor {
    fn read(&mut self) -> Result<f64, PeripheralError> {
        match self.0.lock() {
            Ok(guard) => guard.ok_or_else(|| PeripheralError::Read("no sample yet".into())),
            Err(_) => Err(PeripheralError::Read("sensor state poisoned".into())),
        }
    }
}

#[derive(Debug, Default)]
struct Handles {
    buttons: HashMap<String, SimButton>,
    readers: HashMap<String, SimReader>,
    sensors: HashMap<String, SimSensor>,
}

/// Registry of simulated drivers, shared between the controller thread and
/// whoever drives the inputs.
#[derive(Debug, Clone, Default)]
pub struct SimBoard {
    handles: Arc<Mutex<Handles>>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver for button `id`, created on first use.
    pub fn button(&self, id: &str) -> SimButton {
        self.with_handles(|h| h.buttons.entry(id.to_string()).or_default().clone())
            .unwrap_or_default()
    }

    pub fn reader(&self, id: &str) -> SimReader {
        self.with_handles(|h| h.readers.entry(id.to_string()).or_default().clone())
            .unwrap_or_default()
    }

    pub fn sensor(&self, id: &str) -> SimSensor {
        self.with_handles(|h| h.sensors.entry(id.to_string()).or_default().clone())
            .unwrap_or_default()
    }

    /// Set the contact level of a known button. Returns `false` for unknown ids.
    pub fn set_button(&self, id: &str, pressed: bool) -> bool {
        match self.with_handles(|h| h.buttons.get(id).cloned()).flatten() {
            Some(button) => {
                button.0.store(pressed, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Place (`Some`) or remove (`None`) a card on a known reader.
    pub fn set_card(&self, id: &str, uid: Option<String>) -> bool {
        let Some(reader) = self.with_handles(|h| h.readers.get(id).cloned()).flatten() else {
            return false;
        };
        let stored = match reader.0.lock() {
            Ok(mut card) => {
                *card = uid;
                true
            }
            Err(_) => false,
        };
        stored
    }

    pub fn set_level(&self, id: &str, value: f64) -> bool {
        let Some(sensor) = self.with_handles(|h| h.sensors.get(id).cloned()).flatten() else {
            return false;
        };
        let stored = match sensor.0.lock() {
            Ok(mut level) => {
                *level = Some(value);
                true
            }
            Err(_) => false,
        };
        stored
    }

    /// Names of every registered input, sorted.
    pub fn inputs(&self) -> Vec<String> {
        let mut names = self
            .with_handles(|h| {
                h.buttons
                    .keys()
                    .chain(h.readers.keys())
                    .chain(h.sensors.keys())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn with_handles<T>(&self, f: impl FnOnce(&mut Handles) -> T) -> Option<T> {
        self.handles.lock().ok().map(|mut guard| f(&mut guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_state_with_board() {
        let board = SimBoard::new();
        let mut button = board.button("start");
        let mut reader = board.reader("reader");
        let mut sensor = board.sensor("ambient");

        assert_eq!(button.read(), Ok(false));
        assert!(board.set_button("start", true));
        assert_eq!(button.read(), Ok(true));

        assert_eq!(reader.read(), Ok(None));
        assert!(board.set_card("reader", Some("04A1".into())));
        assert_eq!(reader.read(), Ok(Some("04A1".into())));

        assert!(sensor.read().is_err());
        assert!(board.set_level("ambient", 300.0));
        assert_eq!(sensor.read(), Ok(300.0));

        assert_eq!(board.inputs(), vec!["ambient", "reader", "start"]);
    }

    #[test]
    fn unknown_inputs_are_rejected() {
        let board = SimBoard::new();
        assert!(!board.set_button("nope", true));
        assert!(!board.set_card("nope", None));
        assert!(!board.set_level("nope", 1.0));
    }
}
