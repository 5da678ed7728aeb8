// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller loop for one workshop node.
//!
//! The controller owns every runtime resource: the state machine, the
//! peripheral sources, the delegate table, timers, actuators and the
//! session. One loop turn services exactly one of: shutdown, a pushed
//! peripheral event, an expired timer, session progress, source sampling or
//! the periodic update hook. All of it runs on the current thread.

use std::future;
use std::time::Duration;

use atelier_app::ConfigError;
use atelier_core::peripheral::{ButtonSource, LightSource, RfidSource};
use atelier_core::{
    event_queue, ActuatorBank, DelegateId, DelegateTable, Env, EventKind, EventQueue,
    EventSender, Input, LogActuator, Owner, PeripheralEvent, PeripheralSource, State,
    StateMachine, Step, TimerQueue,
};
use atelier_protocol::parse_frame;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::session::{sleep_until_opt, SessionClient, SessionError, SessionUpdate};
use crate::sim::SimBoard;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("session: {0}")]
    Session(#[from] SessionError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("controller has already been cleaned up")]
    CleanedUp,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub device_id: String,
    /// Period at which polling sources are sampled.
    pub sample_interval: Duration,
    /// Period of the `update()` hook; `None` disables it.
    pub update_interval: Option<Duration>,
    /// Capacity of the queue background producers push into.
    pub event_queue_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            device_id: "atelier-node".to_string(),
            sample_interval: Duration::from_millis(10),
            update_interval: Some(Duration::from_secs(1)),
            event_queue_capacity: 64,
        }
    }
}

/// Everything the state machine may touch while handling an input.
struct Resources {
    timers: TimerQueue,
    delegates: DelegateTable,
    actuators: ActuatorBank,
    session: SessionClient,
}

impl Resources {
    fn env(&mut self, now: Instant) -> Env<'_> {
        Env {
            now,
            timers: &mut self.timers,
            delegates: &mut self.delegates,
            actuators: &mut self.actuators,
            outbox: &mut self.session,
        }
    }
}

pub struct Controller<S: Step> {
    settings: ControllerSettings,
    machine: StateMachine<S>,
    initial: Option<Box<dyn State<S>>>,
    sources: Vec<Box<dyn PeripheralSource>>,
    resources: Resources,
    events_tx: EventSender,
    events_rx: EventQueue,
    cleaned_up: bool,
}

impl<S: Step> Controller<S> {
    pub fn new(
        settings: ControllerSettings,
        session: SessionClient,
        initial: Box<dyn State<S>>,
    ) -> Self {
        let (events_tx, events_rx) = event_queue(settings.event_queue_capacity);
        Self {
            settings,
            machine: StateMachine::new(),
            initial: Some(initial),
            sources: Vec::new(),
            resources: Resources {
                timers: TimerQueue::new(),
                delegates: DelegateTable::new(),
                actuators: ActuatorBank::new(),
                session,
            },
            events_tx,
            events_rx,
            cleaned_up: false,
        }
    }

    /// Build a controller whose inputs are simulated by `board` and whose
    /// actuators only log, wired from the `[peripherals]` section.
    pub fn from_config(
        config: &NodeConfig,
        url: String,
        board: &SimBoard,
        initial: Box<dyn State<S>>,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let session = SessionClient::new(config.session_settings(url))?;
        let mut controller = Self::new(config.controller_settings(), session, initial);
        let peripherals = &config.peripherals;

        for (index, button) in peripherals.buttons.iter().enumerate() {
            let mut source = ButtonSource::new(
                button.id.as_str(),
                board.button(&button.id),
                Duration::from_millis(button.debounce_ms),
            );
            if let Some(hold) = button.long_press_ms {
                source = source.with_long_press(Duration::from_millis(hold));
            }
            controller.add_source(Box::new(source));
            controller.bind_button(&button.id, index);
        }
        for reader in &peripherals.rfid {
            let source = RfidSource::new(
                reader.id.as_str(),
                board.reader(&reader.id),
                Duration::from_millis(reader.debounce_ms),
            )
            .with_lost_after(Duration::from_millis(reader.lost_after_ms));
            controller.add_source(Box::new(source));
            controller.bind_rfid(&reader.id);
        }
        for sensor in &peripherals.light {
            let source = LightSource::new(
                sensor.id.as_str(),
                board.sensor(&sensor.id),
                sensor.threshold,
            );
            controller.add_source(Box::new(source));
            controller.bind_light(&sensor.id);
        }
        for actuator in &peripherals.actuators {
            controller.add_actuator(Box::new(LogActuator::new(actuator.name.as_str())));
        }

        info!(
            "Controller {}: {} source(s), {} actuator(s)",
            controller.settings.device_id,
            controller.sources.len(),
            controller.resources.actuators.len()
        );
        Ok(controller)
    }

    pub fn add_source(&mut self, source: Box<dyn PeripheralSource>) {
        debug!("Adding source {}", source.id());
        self.sources.push(source);
    }

    pub fn add_actuator(&mut self, actuator: Box<dyn atelier_core::Actuator>) {
        self.resources.actuators.add(actuator);
    }

    /// Route presses of button `id` to the state as `Button(index)` and
    /// long presses as `LongPress(index)`.
    pub fn bind_button(&mut self, id: &str, index: usize) -> [DelegateId; 2] {
        let delegates = &mut self.resources.delegates;
        [
            delegates.register(id, EventKind::Press, Owner::Controller, "button", move |_| {
                Some(Input::Button(index))
            }),
            delegates.register(
                id,
                EventKind::LongPress,
                Owner::Controller,
                "long_press",
                move |_| Some(Input::LongPress(index)),
            ),
        ]
    }

    pub fn bind_rfid(&mut self, id: &str) -> [DelegateId; 2] {
        let delegates = &mut self.resources.delegates;
        [
            delegates.register(id, EventKind::CardRead, Owner::Controller, "rfid", |event| {
                event.uid().map(|uid| Input::Rfid(uid.to_string()))
            }),
            delegates.register(id, EventKind::CardLost, Owner::Controller, "card_lost", |_| {
                Some(Input::CardLost)
            }),
        ]
    }

    pub fn bind_light(&mut self, id: &str) -> DelegateId {
        self.resources.delegates.register(
            id,
            EventKind::ValueChange,
            Owner::Controller,
            "light",
            |event| event.value().map(Input::Light),
        )
    }

    /// Sender for background producers (hardware threads, the console).
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn session(&self) -> &SessionClient {
        &self.resources.session
    }

    pub fn active_step(&self) -> Option<S> {
        self.machine.active_step()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up
    }

    /// Start the session and enter the initial state. Idempotent; called by
    /// [`run`](Self::run).
    pub fn startup(&mut self) -> Result<(), ControllerError> {
        if self.cleaned_up {
            return Err(ControllerError::CleanedUp);
        }
        let Some(initial) = self.initial.take() else {
            return Ok(());
        };
        info!(
            "Controller {}: starting, session {}",
            self.settings.device_id,
            self.resources.session.url()
        );
        self.resources.session.start();
        self.machine
            .start(initial, &mut self.resources.env(Instant::now()));
        Ok(())
    }

    /// Run until `shutdown` flips to `true`, the state machine finishes, or
    /// a fatal error occurs. Always cleans up before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ControllerError> {
        let result = self.run_loop(&mut shutdown).await;
        if let Err(e) = &result {
            warn!("Controller {}: stopping on error: {}", self.settings.device_id, e);
        }
        self.cleanup();
        result
    }

    async fn run_loop(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ControllerError> {
        self.startup()?;

        let mut sample = time::interval(self.settings.sample_interval);
        sample.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut update_tick = self.settings.update_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            if *shutdown.borrow() {
                info!("Controller {}: shutdown requested", self.settings.device_id);
                return Ok(());
            }
            if self.machine.is_terminal() {
                info!("Controller {}: state machine finished", self.settings.device_id);
                return Ok(());
            }
            let next_timer = self.resources.timers.next_deadline();

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Controller {}: shutdown channel closed", self.settings.device_id);
                        return Ok(());
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_peripheral_event(event);
                }
                _ = sleep_until_opt(next_timer) => {
                    self.fire_timers(Instant::now());
                }
                session_update = self.resources.session.next_update() => {
                    self.handle_session_update(session_update)?;
                }
                _ = sample.tick() => {
                    self.poll_sources(Instant::now());
                }
                _ = tick_opt(&mut update_tick) => {
                    self.dispatch(Input::Update);
                }
            }
        }
    }

    /// Sample every polling source once and dispatch what they produced,
    /// in source order.
    pub fn poll_sources(&mut self, now: Instant) {
        let events: Vec<PeripheralEvent> = self
            .sources
            .iter_mut()
            .filter_map(|source| source.poll(now))
            .collect();
        for event in events {
            self.handle_peripheral_event(event);
        }
    }

    /// Run the delegates bound to the event's `(source, kind)` and hand
    /// their inputs to the active state.
    pub fn handle_peripheral_event(&mut self, event: PeripheralEvent) {
        trace!("Peripheral event {}", event);
        let bound = self.resources.delegates.snapshot(&event);
        if bound.is_empty() {
            trace!("No delegate for {}", event);
            return;
        }
        for delegate in bound {
            // an earlier handler's transition may have released it
            if !self.resources.delegates.is_registered(delegate.id) {
                debug!("Skipping released delegate '{}'", delegate.name);
                continue;
            }
            let Some(input) = (delegate.handler)(&event) else {
                continue;
            };
            let result = self
                .machine
                .dispatch(input, &mut self.resources.env(Instant::now()));
            if let Err(e) = result {
                warn!(
                    "Delegate '{}' rejected event from {} (kind={}, payload={}): {}",
                    delegate.name,
                    event.source(),
                    event.kind(),
                    event.payload(),
                    e
                );
            }
        }
    }

    /// Route every state timer due at `now`, earliest first.
    pub fn fire_timers(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(expired) = self.resources.timers.pop_next_expired(now) {
            fired += 1;
            let result = self
                .machine
                .dispatch_timer(&expired, &mut self.resources.env(now));
            if let Err(e) = result {
                warn!("Timer '{}' rejected: {}", expired.tag, e);
            }
        }
        fired
    }

    pub fn handle_session_update(&mut self, update: SessionUpdate) -> Result<(), ControllerError> {
        match update {
            SessionUpdate::Connected => {
                info!("Controller {}: session connected", self.settings.device_id);
                self.dispatch(Input::Connected);
            }
            SessionUpdate::Disconnected { reason } => {
                warn!("Controller {}: session lost: {}", self.settings.device_id, reason);
            }
            SessionUpdate::Message(message) => {
                let payload = message.to_value();
                let input = Input::Message(message);
                if let Err(e) = self
                    .machine
                    .dispatch(input, &mut self.resources.env(Instant::now()))
                {
                    warn!("Inbound message {} rejected: {}", payload, e);
                }
            }
            SessionUpdate::GaveUp { attempts } => {
                return Err(SessionError::GaveUp(attempts).into());
            }
        }
        Ok(())
    }

    /// Handle `text` as if it arrived from the coordinator. Returns `false`
    /// if the frame was malformed and discarded.
    pub fn inject_frame(&mut self, text: &str) -> bool {
        match parse_frame(text) {
            Ok(message) => {
                // infallible here: Message is the only variant produced
                let _ = self.handle_session_update(SessionUpdate::Message(message));
                true
            }
            Err(e) => {
                warn!("Discarding inbound frame: {}", e);
                false
            }
        }
    }

    fn dispatch(&mut self, input: Input) {
        let label = input.label();
        let result = self
            .machine
            .dispatch(input, &mut self.resources.env(Instant::now()));
        if let Err(e) = result {
            let step = self.machine.active_step().map(|s| s.name()).unwrap_or("-");
            warn!("State {} rejected {}: {}", step, label, e);
        }
    }

    /// Release every resource. Each step runs even if an earlier one failed.
    /// Idempotent and safe before [`run`](Self::run).
    pub fn cleanup(&mut self) -> bool {
        if self.cleaned_up {
            return false;
        }
        self.cleaned_up = true;
        info!("Controller {}: cleaning up", self.settings.device_id);

        let released = self.resources.delegates.len();
        let cancelled = self.resources.timers.len();
        // exit hooks may still drive outputs, so they run before stop_all
        self.machine.stop(&mut self.resources.env(Instant::now()));
        for (name, e) in self.resources.actuators.stop_all() {
            warn!("Failed to stop actuator '{}': {}", name, e);
        }
        self.resources.session.close();
        self.resources.delegates.clear();
        self.resources.timers.clear();
        self.initial = None;
        self.events_rx.close();

        debug!(
            "Controller {}: released {} delegate(s), cancelled {} timer(s)",
            self.settings.device_id, released, cancelled
        );
        true
    }
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
