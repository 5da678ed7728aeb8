// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Line-oriented console for driving simulated peripherals from stdin.
//!
//! Level commands (`press`, `card`, `light`, ...) change the simulated
//! driver readings, so events go through the same debounce and presence
//! tracking as hardware would. `push` bypasses the sources and hands a raw
//! event to the controller queue.

use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use atelier_core::{EventKind, EventSender, Payload, PeripheralEvent, SourceId};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::sim::SimBoard;

pub const HELP: &str = "\
commands:
  press <button>             hold a button down
  release <button>           let a button go
  tap <button>               press and release
  card <reader> <uid>        place a card on a reader
  remove <reader>            take the card away
  light <sensor> <value>     set a sensor reading
  push <source> <kind> [arg] inject a raw event (kind: press, long_press,
                             release, card_read, card_lost, value_change)
  inputs                     list simulated inputs
  help                       show this text";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Press(String),
    Release(String),
    Tap(String),
    Card { reader: String, uid: String },
    Remove(String),
    Light { sensor: String, value: f64 },
    Push {
        source: String,
        kind: EventKind,
        payload: Payload,
    },
    Inputs,
    Help,
}

/// Parse one console line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = words.collect();

    let command = match (verb.as_str(), args.as_slice()) {
        ("press", [id]) => ConsoleCommand::Press(id.to_string()),
        ("release", [id]) => ConsoleCommand::Release(id.to_string()),
        ("tap", [id]) => ConsoleCommand::Tap(id.to_string()),
        ("card", [reader, uid]) => ConsoleCommand::Card {
            reader: reader.to_string(),
            uid: uid.to_string(),
        },
        ("remove", [reader]) => ConsoleCommand::Remove(reader.to_string()),
        ("light", [sensor, value]) => ConsoleCommand::Light {
            sensor: sensor.to_string(),
            value: parse_value(value)?,
        },
        ("push", [source, kind, rest @ ..]) => {
            let kind = EventKind::parse(kind).ok_or_else(|| format!("unknown event kind '{kind}'"))?;
            ConsoleCommand::Push {
                source: source.to_string(),
                kind,
                payload: parse_payload(kind, rest)?,
            }
        }
        ("inputs", []) => ConsoleCommand::Inputs,
        ("help" | "?", _) => ConsoleCommand::Help,
        (
            "press" | "release" | "tap" | "card" | "remove" | "light" | "push" | "inputs",
            _,
        ) => return Err(format!("wrong arguments for '{verb}' (try 'help')")),
        _ => return Err(format!("unknown command '{verb}' (try 'help')")),
    };
    Ok(Some(command))
}

fn parse_value(text: &str) -> Result<f64, String> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid number '{text}'"))
}

fn parse_payload(kind: EventKind, args: &[&str]) -> Result<Payload, String> {
    match (kind, args) {
        (EventKind::CardRead, [uid]) => Ok(Payload::Uid(uid.to_string())),
        (EventKind::CardLost, []) => Ok(Payload::None),
        (EventKind::CardLost, [uid]) => Ok(Payload::Uid(uid.to_string())),
        (EventKind::ValueChange, [value]) => Ok(Payload::Value(parse_value(value)?)),
        (EventKind::Press | EventKind::LongPress | EventKind::Release, []) => Ok(Payload::None),
        _ => Err(format!("wrong payload for {kind}")),
    }
}

/// Applies console commands to a [`SimBoard`] and the controller queue.
#[derive(Debug, Clone)]
pub struct Console {
    board: SimBoard,
    events: EventSender,
    tap_hold: Duration,
}

impl Console {
    pub fn new(board: SimBoard, events: EventSender, tap_hold: Duration) -> Self {
        Self {
            board,
            events,
            tap_hold,
        }
    }

    /// Apply one command. Blocks for `tap_hold` on `tap`, so call it from a
    /// plain thread, never from inside the runtime.
    pub fn apply(&self, command: ConsoleCommand) -> Result<(), String> {
        debug!("Console: {:?}", command);
        let known = match command {
            ConsoleCommand::Press(id) => self.board.set_button(&id, true).then_some(()).ok_or(id),
            ConsoleCommand::Release(id) => {
                self.board.set_button(&id, false).then_some(()).ok_or(id)
            }
            ConsoleCommand::Tap(id) => {
                if !self.board.set_button(&id, true) {
                    return Err(format!("unknown input '{id}'"));
                }
                thread::sleep(self.tap_hold);
                self.board.set_button(&id, false);
                Ok(())
            }
            ConsoleCommand::Card { reader, uid } => {
                self.board.set_card(&reader, Some(uid)).then_some(()).ok_or(reader)
            }
            ConsoleCommand::Remove(reader) => {
                self.board.set_card(&reader, None).then_some(()).ok_or(reader)
            }
            ConsoleCommand::Light { sensor, value } => {
                self.board.set_level(&sensor, value).then_some(()).ok_or(sensor)
            }
            ConsoleCommand::Push {
                source,
                kind,
                payload,
            } => {
                let event = PeripheralEvent::new(SourceId::from(source), kind, payload, Instant::now());
                if !self.events.blocking_push(event) {
                    return Err("controller is gone".to_string());
                }
                Ok(())
            }
            ConsoleCommand::Inputs => {
                println!("{}", self.board.inputs().join(" "));
                Ok(())
            }
            ConsoleCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
        };
        known.map_err(|id| format!("unknown input '{id}'"))
    }
}

/// Read commands from stdin on a background thread until EOF or until the
/// controller drops its queue.
pub fn spawn_console(console: Console) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            info!("Console ready, type 'help' for commands");
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Console: error reading stdin: {}", e);
                        break;
                    }
                };
                if console.events.is_closed() {
                    break;
                }
                match parse_command(&line).and_then(|cmd| match cmd {
                    Some(cmd) => console.apply(cmd),
                    None => Ok(()),
                }) {
                    Ok(()) => {}
                    Err(e) => warn!("Console: {}", e),
                }
            }
            debug!("Console: stdin closed");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::event_queue;

    #[test]
    fn parses_level_commands() {
        assert_eq!(
            parse_command("press start"),
            Ok(Some(ConsoleCommand::Press("start".into())))
        );
        assert_eq!(
            parse_command("  CARD reader 04A1B2C3 "),
            Ok(Some(ConsoleCommand::Card {
                reader: "reader".into(),
                uid: "04A1B2C3".into()
            }))
        );
        assert_eq!(
            parse_command("light ambient 420"),
            Ok(Some(ConsoleCommand::Light {
                sensor: "ambient".into(),
                value: 420.0
            }))
        );
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("# note"), Ok(None));
    }

    #[test]
    fn parses_push() {
        assert_eq!(
            parse_command("push reader card_read 04A1"),
            Ok(Some(ConsoleCommand::Push {
                source: "reader".into(),
                kind: EventKind::CardRead,
                payload: Payload::Uid("04A1".into()),
            }))
        );
        assert_eq!(
            parse_command("push start long_press"),
            Ok(Some(ConsoleCommand::Push {
                source: "start".into(),
                kind: EventKind::LongPress,
                payload: Payload::None,
            }))
        );
        assert!(parse_command("push start wave").is_err());
        assert!(parse_command("push ambient value_change bright").is_err());
        assert!(parse_command("push reader card_read").is_err());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("press").is_err());
        assert!(parse_command("light ambient NaN").is_err());
        assert!(parse_command("dance start").is_err());
    }

    #[test]
    fn apply_drives_board_and_queue() {
        let board = SimBoard::new();
        let _ = board.button("start");
        let _ = board.reader("reader");
        let (tx, mut rx) = event_queue(4);
        let console = Console::new(board.clone(), tx, Duration::from_millis(1));

        let mut button = board.button("start");
        console.apply(ConsoleCommand::Press("start".into())).unwrap();
        assert_eq!(atelier_core::peripheral::DigitalInput::read(&mut button), Ok(true));
        console.apply(ConsoleCommand::Tap("start".into())).unwrap();
        assert_eq!(atelier_core::peripheral::DigitalInput::read(&mut button), Ok(false));

        assert!(console
            .apply(ConsoleCommand::Remove("nowhere".into()))
            .is_err());

        console
            .apply(ConsoleCommand::Push {
                source: "start".into(),
                kind: EventKind::Press,
                payload: Payload::None,
            })
            .unwrap();
        let event = rx.try_recv().expect("pushed event");
        assert_eq!(event.source().as_str(), "start");
        assert_eq!(event.kind(), EventKind::Press);
    }
}
