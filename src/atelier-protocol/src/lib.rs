// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire protocol for atelier nodes.
//!
//! Nodes talk to the coordinator with JSON text frames. Outbound frames are
//! application-defined objects (usually `{"<workshop>_state": "<step>"}` or a
//! `{"type": ..., "value": ...}` envelope); inbound frames are either typed
//! envelopes or flat objects with ad hoc keys such as `{"start_system": true}`.

pub mod codec;
pub mod types;

pub use codec::{encode_message, parse_frame, ProtocolError, MAX_FRAME_BYTES};
pub use types::{InboundMessage, MessageClass, OutboundMessage, TypedEnvelope};
