// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

use crate::backend::{Backend as AudioBackend, StreamParams};

/// A mock backend. Doesn't drive any hardware; tests pump the driver's
/// mix entry point by hand instead of waiting on a device callback.
pub struct Backend {
    name: String,
    params: StreamParams,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn new(name: &str, params: StreamParams) -> Backend {
        Backend {
            name: name.to_string(),
            params,
        }
    }
}

impl AudioBackend for Backend {
    fn params(&self) -> StreamParams {
        self.params
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
