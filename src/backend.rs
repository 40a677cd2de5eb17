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

pub mod cpal;
pub mod mock;

/// The sample rate tried when the device refuses the configured rate.
pub const FALLBACK_SAMPLE_RATE: u32 = 22050;

/// Stream parameters settled during device negotiation. The driver
/// derives its latency and buffer-time durations from these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamParams {
    /// The negotiated sample rate in Hz.
    pub sample_rate: u32,
    /// The device buffer length in samples.
    pub buffer_samples: usize,
}

/// A platform audio backend holding the periodic callback alive.
///
/// Dropping a backend stops its callback; the driver and any channels
/// remain independently reference-counted.
pub trait Backend: fmt::Display {
    fn params(&self) -> StreamParams;
}
