// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for atelier-node.
//!
//! Loaded from the `[atelier-node]` table of `atelier.toml`, searched in
//! this order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./atelier.toml` (current directory)
//! 3. `~/.config/atelier/atelier.toml` (XDG config)
//! 4. `/etc/atelier/atelier.toml` (system-wide)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use atelier_app::{normalize_name, ConfigError, ConfigFile};
use serde::{Deserialize, Serialize};

use crate::controller::ControllerSettings;
use crate::session::{parse_session_url, SessionSettings};

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub general: GeneralConfig,
    pub session: SessionConfig,
    pub runtime: RuntimeConfig,
    pub workshop: WorkshopConfig,
    pub peripherals: PeripheralsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name this node reports in logs
    pub device_id: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Coordinator connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Coordinator URL (`ws://host:port/path` or `host:port`)
    pub url: Option<String>,
    pub auto_reconnect: bool,
    pub connect_timeout_ms: u64,
    /// Reliable messages kept while disconnected
    pub max_queue: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Fraction (0..=1) a reconnect delay may be shortened by
    pub backoff_jitter: f64,
    /// Give up after this many failed attempts; unset retries forever
    pub max_attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: None,
            auto_reconnect: true,
            connect_timeout_ms: 5_000,
            max_queue: 64,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            backoff_jitter: 0.2,
            max_attempts: None,
        }
    }
}

/// Event loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How often polling sources are sampled
    pub sample_interval_ms: u64,
    /// Period of the state `update()` hook; 0 disables it
    pub update_interval_ms: u64,
    /// Capacity of the queue fed by background producers
    pub event_queue_capacity: usize,
    /// Read simulated peripheral commands from stdin
    pub console: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 10,
            update_interval_ms: 1_000,
            event_queue_capacity: 64,
            console: true,
        }
    }
}

/// Workshop scenarios this node can run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkshopKind {
    #[default]
    Stranger,
    Lost,
}

impl WorkshopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for WorkshopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkshopKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "stranger" | "strangerthings" => Ok(Self::Stranger),
            "lost" => Ok(Self::Lost),
            _ => Err(format!(
                "unknown workshop '{s}' (expected one of: stranger, lost)"
            )),
        }
    }
}

/// Scenario settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkshopConfig {
    pub kind: WorkshopKind,
    /// Stranger: leave `active` on its own after this long
    pub auto_advance_ms: Option<u64>,
    /// Lost: how long `found` is shown before `done`
    pub found_hold_ms: u64,
    /// Lost: card UIDs that count as the lost object
    pub recognised_uids: Vec<String>,
    /// Actuator driven as the LED strip
    pub strip: String,
    /// Actuator driven as the door servo
    pub door: String,
}

impl Default for WorkshopConfig {
    fn default() -> Self {
        Self {
            kind: WorkshopKind::Stranger,
            auto_advance_ms: None,
            found_hold_ms: 3_000,
            recognised_uids: Vec::new(),
            strip: "strip".to_string(),
            door: "door".to_string(),
        }
    }
}

/// Peripheral wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralsConfig {
    /// Buttons, indexed in declaration order
    pub buttons: Vec<ButtonConfig>,
    pub rfid: Vec<RfidConfig>,
    pub light: Vec<LightConfig>,
    pub actuators: Vec<ActuatorConfig>,
}

impl Default for PeripheralsConfig {
    fn default() -> Self {
        Self {
            buttons: vec![ButtonConfig::new("start")],
            rfid: vec![RfidConfig::new("reader")],
            light: vec![LightConfig::new("ambient")],
            actuators: vec![ActuatorConfig::new("strip"), ActuatorConfig::new("door")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub id: String,
    pub debounce_ms: u64,
    pub long_press_ms: Option<u64>,
}

impl ButtonConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            debounce_ms: 30,
            long_press_ms: Some(1_500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RfidConfig {
    pub id: String,
    /// Same card is suppressed for this long after a read
    pub debounce_ms: u64,
    /// Absence needed before `card_lost`
    pub lost_after_ms: u64,
}

impl RfidConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

impl Default for RfidConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            debounce_ms: 2_000,
            lost_after_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub id: String,
    /// Minimum change worth reporting
    pub threshold: f64,
}

impl LightConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            threshold: 25.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub name: String,
}

impl ActuatorConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_log_level(self.general.log_level.as_deref())?;

        if let Some(url) = &self.session.url {
            parse_session_url(url).map_err(|e| ConfigError::Invalid(format!("[session].url: {e}")))?;
        }
        if self.session.connect_timeout_ms == 0 {
            return invalid("[session].connect_timeout_ms must be > 0");
        }
        if self.session.backoff_base_ms == 0 {
            return invalid("[session].backoff_base_ms must be > 0");
        }
        if self.session.backoff_max_ms < self.session.backoff_base_ms {
            return invalid("[session].backoff_max_ms must be >= backoff_base_ms");
        }
        if !(0.0..=1.0).contains(&self.session.backoff_jitter) {
            return invalid("[session].backoff_jitter must be within 0.0..=1.0");
        }
        if self.runtime.sample_interval_ms == 0 {
            return invalid("[runtime].sample_interval_ms must be > 0");
        }
        if self.runtime.event_queue_capacity == 0 {
            return invalid("[runtime].event_queue_capacity must be > 0");
        }
        if self.workshop.auto_advance_ms == Some(0) {
            return invalid("[workshop].auto_advance_ms must be > 0 when set");
        }
        if self.workshop.kind == WorkshopKind::Lost && self.workshop.recognised_uids.is_empty() {
            return invalid("[workshop].recognised_uids must not be empty for the lost workshop");
        }

        let mut ids: Vec<&str> = Vec::new();
        let inputs = self
            .peripherals
            .buttons
            .iter()
            .map(|b| b.id.as_str())
            .chain(self.peripherals.rfid.iter().map(|r| r.id.as_str()))
            .chain(self.peripherals.light.iter().map(|l| l.id.as_str()));
        for id in inputs {
            if id.trim().is_empty() {
                return invalid("[peripherals] input ids must not be empty");
            }
            if ids.contains(&id) {
                return Err(ConfigError::Invalid(format!(
                    "[peripherals] duplicate input id '{id}'"
                )));
            }
            ids.push(id);
        }
        for light in &self.peripherals.light {
            if !light.threshold.is_finite() || light.threshold < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "[peripherals.light] '{}' threshold must be a non-negative number",
                    light.id
                )));
            }
        }
        if self
            .peripherals
            .actuators
            .iter()
            .any(|a| a.name.trim().is_empty())
        {
            return invalid("[peripherals.actuators] names must not be empty");
        }

        Ok(())
    }

    /// Session settings for `url`, which overrides `[session].url`.
    pub fn session_settings(&self, url: String) -> SessionSettings {
        SessionSettings {
            url,
            auto_reconnect: self.session.auto_reconnect,
            connect_timeout: Duration::from_millis(self.session.connect_timeout_ms),
            max_queue: self.session.max_queue,
            backoff_base: Duration::from_millis(self.session.backoff_base_ms),
            backoff_max: Duration::from_millis(self.session.backoff_max_ms),
            backoff_jitter: self.session.backoff_jitter,
            max_attempts: self.session.max_attempts,
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            device_id: self
                .general
                .device_id
                .clone()
                .unwrap_or_else(|| format!("{}-node", self.workshop.kind)),
            sample_interval: Duration::from_millis(self.runtime.sample_interval_ms),
            update_interval: match self.runtime.update_interval_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            event_queue_capacity: self.runtime.event_queue_capacity,
        }
    }

    /// Generate an example configuration as a TOML string.
    pub fn example_toml() -> String {
        let example = NodeConfig {
            general: GeneralConfig {
                device_id: Some("lost-node-1".to_string()),
                log_level: Some("info".to_string()),
            },
            session: SessionConfig {
                url: Some("ws://192.168.1.10:8765/nodes".to_string()),
                ..SessionConfig::default()
            },
            runtime: RuntimeConfig::default(),
            workshop: WorkshopConfig {
                kind: WorkshopKind::Lost,
                recognised_uids: vec!["04A1B2C3".to_string()],
                ..WorkshopConfig::default()
            },
            peripherals: PeripheralsConfig::default(),
        };

        let mut root = toml::Table::new();
        if let Ok(value) = toml::Value::try_from(&example) {
            root.insert(Self::section_key().to_string(), value);
        }
        toml::to_string_pretty(&root).unwrap_or_default()
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.to_string()))
}

fn validate_log_level(level: Option<&str>) -> Result<(), ConfigError> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                )))
            }
        }
    }
    Ok(())
}

impl ConfigFile for NodeConfig {
    fn section_key() -> &'static str {
        "atelier-node"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.session.url.is_none());
        assert!(config.session.auto_reconnect);
        assert_eq!(config.session.max_queue, 64);
        assert_eq!(config.runtime.sample_interval_ms, 10);
        assert_eq!(config.workshop.kind, WorkshopKind::Stranger);
        assert_eq!(config.peripherals.buttons[0].id, "start");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_node_toml() {
        let toml_str = r#"
[atelier-node.general]
device_id = "lost-1"

[atelier-node.session]
url = "ws://10.0.0.2:8765"
max_queue = 8

[atelier-node.workshop]
kind = "lost"
recognised_uids = ["04A1B2C3"]

[[atelier-node.peripherals.buttons]]
id = "start"

[[atelier-node.peripherals.buttons]]
id = "hint"
long_press_ms = 2000
"#;

        let config = NodeConfig::load_from_str(toml_str).unwrap();
        assert_eq!(config.general.device_id.as_deref(), Some("lost-1"));
        assert_eq!(config.session.max_queue, 8);
        assert_eq!(config.session.backoff_base_ms, 500);
        assert_eq!(config.workshop.kind, WorkshopKind::Lost);
        assert_eq!(config.peripherals.buttons.len(), 2);
        assert_eq!(config.peripherals.buttons[1].debounce_ms, 30);
        assert_eq!(config.peripherals.buttons[1].long_press_ms, Some(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_toml_parses() {
        let example = NodeConfig::example_toml();
        let config = NodeConfig::load_from_str(&example).unwrap();
        assert_eq!(config.workshop.kind, WorkshopKind::Lost);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.session.url = Some("http://example.com".into());
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.session.backoff_max_ms = 10;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.peripherals.light.push(LightConfig::new("start"));
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.workshop.kind = WorkshopKind::Lost;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.general.log_level = Some("loud".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_workshop_kind_from_str() {
        assert_eq!("Lost".parse::<WorkshopKind>(), Ok(WorkshopKind::Lost));
        assert_eq!(
            "stranger-things".parse::<WorkshopKind>(),
            Ok(WorkshopKind::Stranger)
        );
        assert!("maze".parse::<WorkshopKind>().is_err());
    }

    #[test]
    fn test_settings_conversion() {
        let mut config = NodeConfig::default();
        config.runtime.update_interval_ms = 0;
        let controller = config.controller_settings();
        assert_eq!(controller.device_id, "stranger-node");
        assert!(controller.update_interval.is_none());

        let session = config.session_settings("ws://127.0.0.1:9000".into());
        assert_eq!(session.backoff_max, Duration::from_secs(30));
    }
}
