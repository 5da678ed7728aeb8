// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::time::Instant;
use tracing::trace;

use super::{EventKind, Payload, PeripheralError, PeripheralEvent, PeripheralSource, SourceId};

/// Analog input driver (light sensor, potentiometer, ...).
pub trait AnalogInput {
    fn read(&mut self) -> Result<f64, PeripheralError>;
}

/// Reports a `ValueChange` when the reading moves at least `threshold` away
/// from the last reported value. The first successful reading is always
/// reported.
pub struct LightSource<A> {
    id: SourceId,
    input: A,
    threshold: f64,
    last_reported: Option<f64>,
}

impl<A: AnalogInput> LightSource<A> {
    pub fn new(id: impl Into<SourceId>, input: A, threshold: f64) -> Self {
        Self {
            id: id.into(),
            input,
            threshold: threshold.abs(),
            last_reported: None,
        }
    }

    pub fn last_reported(&self) -> Option<f64> {
        self.last_reported
    }
}

impl<A: AnalogInput> PeripheralSource for LightSource<A> {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn poll(&mut self, now: Instant) -> Option<PeripheralEvent> {
        let value = match self.input.read() {
            Ok(value) if value.is_finite() => value,
            Ok(value) => {
                trace!("Light {}: discarding non-finite reading {}", self.id, value);
                return None;
            }
            Err(e) => {
                trace!("Light {}: {}", self.id, e);
                return None;
            }
        };

        if let Some(last) = self.last_reported {
            if (value - last).abs() < self.threshold {
                return None;
            }
        }
        self.last_reported = Some(value);
        Some(PeripheralEvent::new(
            self.id.clone(),
            EventKind::ValueChange,
            Payload::Value(value),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Script(VecDeque<Result<f64, PeripheralError>>);

    impl AnalogInput for Script {
        fn read(&mut self) -> Result<f64, PeripheralError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(PeripheralError::Read("no sample".into())))
        }
    }

    #[test]
    fn reports_only_significant_changes() {
        let readings = [500.0, 510.0, 540.0, 545.0, 480.0];
        let mut light = LightSource::new(
            "ambient",
            Script(readings.iter().map(|v| Ok(*v)).collect()),
            25.0,
        );
        let now = Instant::now();
        let values: Vec<f64> = (0..readings.len())
            .filter_map(|_| light.poll(now))
            .filter_map(|e| e.value())
            .collect();
        assert_eq!(values, vec![500.0, 540.0, 480.0]);
    }

    #[test]
    fn faults_and_nan_are_silent() {
        let mut light = LightSource::new(
            "ambient",
            Script(VecDeque::from(vec![
                Err(PeripheralError::Read("adc busy".into())),
                Ok(f64::NAN),
            ])),
            1.0,
        );
        let now = Instant::now();
        assert!(light.poll(now).is_none());
        assert!(light.poll(now).is_none());
        assert!(light.last_reported().is_none());
    }
}
