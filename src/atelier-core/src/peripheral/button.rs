// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::{EventKind, Payload, PeripheralError, PeripheralEvent, PeripheralSource, SourceId};

/// Digital input driver. `true` means the contact is active (pressed).
pub trait DigitalInput {
    fn read(&mut self) -> Result<bool, PeripheralError>;
}

/// Debounced push button.
///
/// A level change must hold for the debounce window before it becomes an
/// edge. A press held for `long_press` emits one `LongPress`.
pub struct ButtonSource<I> {
    id: SourceId,
    input: I,
    debounce: Duration,
    long_press: Option<Duration>,
    stable: bool,
    candidate: Option<(bool, Instant)>,
    pressed_at: Option<Instant>,
    long_fired: bool,
}

impl<I: DigitalInput> ButtonSource<I> {
    pub fn new(id: impl Into<SourceId>, input: I, debounce: Duration) -> Self {
        Self {
            id: id.into(),
            input,
            debounce,
            long_press: None,
            stable: false,
            candidate: None,
            pressed_at: None,
            long_fired: false,
        }
    }

    pub fn with_long_press(mut self, hold: Duration) -> Self {
        self.long_press = Some(hold);
        self
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    fn event(&self, kind: EventKind, now: Instant) -> PeripheralEvent {
        PeripheralEvent::new(self.id.clone(), kind, Payload::None, now)
    }
}

impl<I: DigitalInput> PeripheralSource for ButtonSource<I> {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn poll(&mut self, now: Instant) -> Option<PeripheralEvent> {
        let level = match self.input.read() {
            Ok(level) => level,
            Err(e) => {
                trace!("Button {}: {}", self.id, e);
                return None;
            }
        };

        if level != self.stable {
            let since = match self.candidate {
                Some((pending, since)) if pending == level => since,
                _ => {
                    self.candidate = Some((level, now));
                    now
                }
            };
            if now.duration_since(since) < self.debounce {
                return None;
            }
            self.candidate = None;
            self.stable = level;
            return if level {
                self.pressed_at = Some(now);
                self.long_fired = false;
                Some(self.event(EventKind::Press, now))
            } else {
                self.pressed_at = None;
                Some(self.event(EventKind::Release, now))
            };
        }
        self.candidate = None;

        if let (Some(hold), Some(at)) = (self.long_press, self.pressed_at) {
            if self.stable && !self.long_fired && now.duration_since(at) >= hold {
                self.long_fired = true;
                return Some(self.event(EventKind::LongPress, now));
            }
        }
        None
    }
}
