// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Workshop node: a controller that binds simulated or real peripherals to
//! a workshop state machine and reports to the coordinator over WebSocket.

pub mod config;
pub mod console;
pub mod controller;
pub mod session;
pub mod sim;
pub mod workshops;

pub use config::{NodeConfig, WorkshopKind};
pub use controller::{Controller, ControllerError, ControllerSettings};
pub use session::{SessionClient, SessionError, SessionSettings, SessionState, SessionUpdate};
