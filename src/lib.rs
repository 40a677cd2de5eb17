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
//! A real-time multi-channel software audio mixer.
//!
//! Game or application code creates [`SampleBuffer`]s and [`Channel`]s
//! through the [`Driver`] and posts buffers for playback; the platform
//! audio backend invokes the driver's mix entry point from its periodic
//! callback thread, which schedules each channel's queued audio against
//! device playback time and produces a continuous mixed stream.

use std::sync::Arc;

use tracing::info;

pub mod backend;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
mod ring;

pub use buffer::SampleBuffer;
pub use channel::{Channel, ChannelCallbacks, MAX_QUEUED_BUFFERS};
pub use driver::{Driver, MAX_CHANNELS, MAX_VOLUME_SCALE, MIX_CHUNK_SAMPLES};
pub use error::Error;

use backend::{Backend, StreamParams};

/// An opened mixer: the driver plus the backend keeping its callback
/// running.
pub struct Mixer {
    driver: Arc<Driver>,
    backend: Box<dyn Backend>,
}

/// Opens the audio backend described by the configuration and returns a
/// running mixer.
///
/// Device names starting with "mock" select the mock backend, which
/// plays nothing; everything else goes through cpal. Failure is fatal to
/// audio only, and callers are expected to carry on without sound.
pub fn open(config: &config::Audio) -> Result<Mixer, Error> {
    let device = config.device();
    if device.starts_with("mock") {
        let params = StreamParams {
            sample_rate: config.sample_rate(),
            buffer_samples: MIX_CHUNK_SAMPLES,
        };
        let backend = backend::mock::Backend::new(device, params);
        info!(backend = %backend, "Opened audio backend.");
        return Ok(Mixer {
            driver: Driver::new(params),
            backend: Box::new(backend),
        });
    }

    let (backend, driver) = backend::cpal::Backend::open(config)?;
    info!(backend = %backend, "Opened audio backend.");
    Ok(Mixer {
        driver,
        backend: Box::new(backend),
    })
}

impl Mixer {
    /// The driver handle used to create buffers and channels.
    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// The negotiated sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.backend.params().sample_rate
    }

    /// Preference hooks. The mixer persists nothing, but hosts with a
    /// preferences pass can treat the audio subsystem uniformly.
    pub fn apply_prefs(&self, _identifier: &[u8], _contents: &[u8], _version: u32) {}

    pub fn save_prefs(&self) -> bool {
        true
    }

    /// Stops the backend callback and releases the mixer's resources.
    ///
    /// Channels already created remain independently reference-counted
    /// and must be destroyed by their owners.
    pub fn shutdown(self) {
        info!(backend = %self.backend, "Shutting down audio backend.");
        drop(self.backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_mock_backend() {
        let mixer = open(&config::Audio::new("mock")).unwrap();
        assert_eq!(mixer.sample_rate(), 44100);
        assert_eq!(mixer.driver().sample_rate(), 44100);
        assert_eq!(mixer.driver().active_channels(), 0);
    }

    #[test]
    fn test_mock_backend_honors_configured_rate() {
        let config: config::Audio =
            serde_yml::from_str("device: mock\nsample_rate: 22050\n").unwrap();
        let mixer = open(&config).unwrap();
        assert_eq!(mixer.sample_rate(), 22050);
    }

    #[test]
    fn test_channels_survive_shutdown() {
        let mixer = open(&config::Audio::new("mock")).unwrap();
        let driver = Arc::clone(mixer.driver());
        let channel = driver.create_channel().unwrap();
        assert!(channel.post_buffer(&driver.create_buffer(&[128; 32])));

        mixer.shutdown();

        // The channel is still usable; its owner destroys it explicitly.
        assert_eq!(channel.queued_buffers(), 1);
        channel.stop();
        channel.destroy();
        assert_eq!(driver.active_channels(), 0);
    }

    #[test]
    fn test_prefs_hooks_are_noops() {
        let mixer = open(&config::Audio::new("mock")).unwrap();
        mixer.apply_prefs(b"audio", b"{}", 1);
        assert!(mixer.save_prefs());
    }
}
