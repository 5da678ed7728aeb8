// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Peripheral event sources.
//!
//! A source turns raw driver readings into discrete [`PeripheralEvent`]s.
//! Sources come in two shapes: polling sources implement
//! [`PeripheralSource`] and are sampled by the controller, and background
//! producers (threads doing blocking reads) hand events over through an
//! [`EventSender`] drained by the controller loop.

pub mod button;
pub mod light;
pub mod rfid;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

pub use button::{ButtonSource, DigitalInput};
pub use light::{AnalogInput, LightSource};
pub use rfid::{CardReader, RfidSource};

/// Stable identifier of a peripheral source (e.g. `"start"`, `"reader"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&SourceId> for SourceId {
    fn from(value: &SourceId) -> Self {
        value.clone()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a peripheral event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Press,
    LongPress,
    Release,
    CardRead,
    CardLost,
    ValueChange,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Press => "press",
            Self::LongPress => "long_press",
            Self::Release => "release",
            Self::CardRead => "card_read",
            Self::CardLost => "card_lost",
            Self::ValueChange => "value_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "press" => Some(Self::Press),
            "long_press" => Some(Self::LongPress),
            "release" => Some(Self::Release),
            "card_read" => Some(Self::CardRead),
            "card_lost" => Some(Self::CardLost),
            "value_change" => Some(Self::ValueChange),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Uid(String),
    Value(f64),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "-"),
            Self::Uid(uid) => write!(f, "uid={}", uid),
            Self::Value(value) => write!(f, "value={}", value),
        }
    }
}

/// One discrete event produced by a peripheral source. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PeripheralEvent {
    source: SourceId,
    kind: EventKind,
    payload: Payload,
    timestamp: Instant,
}

impl PeripheralEvent {
    pub fn new(source: SourceId, kind: EventKind, payload: Payload, timestamp: Instant) -> Self {
        Self {
            source,
            kind,
            payload,
            timestamp,
        }
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn uid(&self) -> Option<&str> {
        match &self.payload {
            Payload::Uid(uid) => Some(uid),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self.payload {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for PeripheralEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.source, self.kind, self.payload)
    }
}

/// Error reported by peripheral drivers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PeripheralError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("unknown actuator '{0}'")]
    UnknownActuator(String),
}

/// A polling event source sampled by the controller.
///
/// Implementations own their debounce/sampling policy and must not emit
/// duplicate events for one physical transition. Driver failures yield
/// `None`, never an error.
pub trait PeripheralSource {
    fn id(&self) -> &SourceId;

    fn poll(&mut self, now: Instant) -> Option<PeripheralEvent>;
}

/// Create the bounded queue background producers use to hand events to the
/// controller loop.
pub fn event_queue(capacity: usize) -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventQueue { rx })
}

/// Producer half of the peripheral event queue.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<PeripheralEvent>,
}

impl EventSender {
    /// Enqueue without waiting. A full queue drops the event with a warning.
    /// Returns `false` once the controller side has gone away.
    pub fn push(&self, event: PeripheralEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Peripheral queue full, dropping {}", event);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Enqueue from a plain (non-async) thread, waiting for room.
    /// Must not be called from within the runtime.
    pub fn blocking_push(&self, event: PeripheralEvent) -> bool {
        self.tx.blocking_send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the peripheral event queue, owned by the controller.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::Receiver<PeripheralEvent>,
}

impl EventQueue {
    /// Wait for the next event. Cancel-safe.
    pub async fn recv(&mut self) -> Option<PeripheralEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PeripheralEvent> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(source: &str) -> PeripheralEvent {
        PeripheralEvent::new(
            SourceId::new(source),
            EventKind::Press,
            Payload::None,
            Instant::now(),
        )
    }

    #[test]
    fn queue_preserves_order() {
        let (tx, mut rx) = event_queue(8);
        assert!(tx.push(press("a")));
        assert!(tx.push(press("b")));
        assert_eq!(rx.try_recv().map(|e| e.source().to_string()), Some("a".into()));
        assert_eq!(rx.try_recv().map(|e| e.source().to_string()), Some("b".into()));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn full_queue_drops_newest() {
        let (tx, mut rx) = event_queue(1);
        assert!(tx.push(press("a")));
        assert!(tx.push(press("b")));
        assert_eq!(rx.try_recv().map(|e| e.source().to_string()), Some("a".into()));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn closed_queue_reports_false() {
        let (tx, rx) = event_queue(1);
        drop(rx);
        assert!(!tx.push(press("a")));
        assert!(tx.is_closed());
    }

    #[test]
    fn event_kind_names() {
        for kind in [
            EventKind::Press,
            EventKind::LongPress,
            EventKind::Release,
            EventKind::CardRead,
            EventKind::CardLost,
            EventKind::ValueChange,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("wave"), None);
    }
}
