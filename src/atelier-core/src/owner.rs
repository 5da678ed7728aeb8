// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

/// Who registered a delegate or started a timer.
///
/// State-owned resources are keyed by the activation epoch of the state
/// machine, so everything one activation created can be released when it
/// exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Controller,
    State(u64),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Controller => write!(f, "controller"),
            Self::State(epoch) => write!(f, "state#{}", epoch),
        }
    }
}
