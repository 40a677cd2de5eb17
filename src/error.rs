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
/// Error types for mixer and backend operations.
///
/// Device negotiation failures are fatal to the audio subsystem only;
/// capacity exhaustion is recoverable and the caller decides whether to
/// drop, retry, or skip.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no output device found with name {0}")]
    NoDevice(String),

    #[error("no supported output configuration at {requested}Hz or the {fallback}Hz fallback")]
    Negotiation { requested: u32, fallback: u32 },

    #[error("the active channel table is full ({0} channels)")]
    ChannelsExhausted(usize),

    #[error("unable to query audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("unable to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("unable to query device configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("unable to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("unable to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}
