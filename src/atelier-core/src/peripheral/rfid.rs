// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use super::{EventKind, Payload, PeripheralError, PeripheralEvent, PeripheralSource, SourceId};

/// RFID reader driver. `Ok(None)` means no card is in the field.
pub trait CardReader {
    fn read(&mut self) -> Result<Option<String>, PeripheralError>;
}

/// RFID card source.
///
/// Emits `CardRead` when a card appears, suppressing the same UID while it
/// stays in the field and when it is presented again within the debounce
/// window. Emits `CardLost` once the card has been absent for `lost_after`.
pub struct RfidSource<R> {
    id: SourceId,
    reader: R,
    debounce: Duration,
    lost_after: Duration,
    last_uid: Option<String>,
    last_read_at: Option<Instant>,
    last_seen: Option<Instant>,
    present: bool,
}

impl<R: CardReader> RfidSource<R> {
    pub fn new(id: impl Into<SourceId>, reader: R, debounce: Duration) -> Self {
        Self {
            id: id.into(),
            reader,
            debounce,
            lost_after: Duration::from_millis(500),
            last_uid: None,
            last_read_at: None,
            last_seen: None,
            present: false,
        }
    }

    pub fn with_lost_after(mut self, lost_after: Duration) -> Self {
        self.lost_after = lost_after;
        self
    }

    fn is_duplicate(&self, uid: &str, now: Instant) -> bool {
        if self.last_uid.as_deref() != Some(uid) {
            return false;
        }
        self.present
            || self
                .last_read_at
                .map(|at| now.duration_since(at) < self.debounce)
                .unwrap_or(false)
    }
}

impl<R: CardReader> PeripheralSource for RfidSource<R> {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn poll(&mut self, now: Instant) -> Option<PeripheralEvent> {
        let read = match self.reader.read() {
            Ok(read) => read,
            Err(e) => {
                trace!("RFID {}: {}", self.id, e);
                return None;
            }
        };

        match read {
            Some(uid) => {
                self.last_seen = Some(now);
                if self.is_duplicate(&uid, now) {
                    self.present = true;
                    return None;
                }
                self.present = true;
                self.last_read_at = Some(now);
                self.last_uid = Some(uid.clone());
                Some(PeripheralEvent::new(
                    self.id.clone(),
                    EventKind::CardRead,
                    Payload::Uid(uid),
                    now,
                ))
            }
            None => {
                let gone = self
                    .last_seen
                    .map(|seen| now.duration_since(seen) >= self.lost_after)
                    .unwrap_or(false);
                if !self.present || !gone {
                    return None;
                }
                self.present = false;
                let payload = self
                    .last_uid
                    .clone()
                    .map(Payload::Uid)
                    .unwrap_or(Payload::None);
                Some(PeripheralEvent::new(
                    self.id.clone(),
                    EventKind::CardLost,
                    payload,
                    now,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Script(VecDeque<Option<&'static str>>);

    impl CardReader for Script {
        fn read(&mut self) -> Result<Option<String>, PeripheralError> {
            Ok(self.0.pop_front().flatten().map(str::to_string))
        }
    }

    fn source(reads: &[Option<&'static str>]) -> RfidSource<Script> {
        RfidSource::new("reader", Script(reads.iter().copied().collect()), Duration::from_secs(1))
            .with_lost_after(Duration::from_millis(200))
    }

    fn at(start: Instant, ms: u64) -> Instant {
        start + Duration::from_millis(ms)
    }

    #[test]
    fn held_card_reads_once() {
        let mut rfid = source(&[Some("04A1"), Some("04A1"), Some("04A1")]);
        let start = Instant::now();
        let first = rfid.poll(at(start, 0)).expect("card read");
        assert_eq!(first.kind(), EventKind::CardRead);
        assert_eq!(first.uid(), Some("04A1"));
        assert!(rfid.poll(at(start, 100)).is_none());
        assert!(rfid.poll(at(start, 2_000)).is_none());
    }

    #[test]
    fn represented_within_window_is_suppressed() {
        let mut rfid = source(&[Some("04A1"), None, Some("04A1")]);
        let start = Instant::now();
        assert!(rfid.poll(at(start, 0)).is_some());
        let lost = rfid.poll(at(start, 300)).expect("card lost");
        assert_eq!(lost.kind(), EventKind::CardLost);
        assert!(rfid.poll(at(start, 600)).is_none());
    }

    #[test]
    fn represented_after_window_reads_again() {
        let mut rfid = source(&[Some("04A1"), None, Some("04A1")]);
        let start = Instant::now();
        assert!(rfid.poll(at(start, 0)).is_some());
        assert!(rfid.poll(at(start, 300)).is_some());
        let again = rfid.poll(at(start, 1_500)).expect("second read");
        assert_eq!(again.kind(), EventKind::CardRead);
    }

    #[test]
    fn different_card_reads_immediately() {
        let mut rfid = source(&[Some("04A1"), Some("BEEF")]);
        let start = Instant::now();
        assert!(rfid.poll(at(start, 0)).is_some());
        let other = rfid.poll(at(start, 10)).expect("other card");
        assert_eq!(other.uid(), Some("BEEF"));
    }

    #[test]
    fn short_gap_is_not_lost() {
        let mut rfid = source(&[Some("04A1"), None, Some("04A1")]);
        let start = Instant::now();
        assert!(rfid.poll(at(start, 0)).is_some());
        assert!(rfid.poll(at(start, 50)).is_none());
        assert!(rfid.poll(at(start, 100)).is_none());
    }
}
