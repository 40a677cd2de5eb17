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
use std::{fmt, sync::Arc};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, warn};

use crate::{
    backend::{Backend as AudioBackend, StreamParams, FALLBACK_SAMPLE_RATE},
    config,
    driver::{Driver, MIX_CHUNK_SAMPLES},
    error::Error,
};

/// A cpal-backed output stream wired to the driver's mix entry point.
pub struct Backend {
    name: String,
    params: StreamParams,
    /// Held to keep the callback running; dropped on shutdown.
    _stream: cpal::Stream,
}

impl Backend {
    /// Opens the configured output device, negotiates a sample rate, and
    /// starts the periodic mix callback.
    ///
    /// The configured rate is preferred; if the device refuses it,
    /// negotiation retries at [`FALLBACK_SAMPLE_RATE`] before failing.
    /// Failure here is fatal to audio only; the caller may continue
    /// without sound.
    pub fn open(config: &config::Audio) -> Result<(Backend, Arc<Driver>), Error> {
        let device = find_device(config.device())?;
        let (stream_config, params) = negotiate(&device, config.sample_rate())?;
        let driver = Driver::new(params);

        let mix_driver = Arc::clone(&driver);
        let stream = device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                mix_driver.mix_audio(data);
            },
            |err| error!(err = err.to_string(), "Output stream error"),
            None,
        )?;
        stream.play()?;

        info!(
            device = config.device(),
            sample_rate = params.sample_rate,
            buffer_samples = params.buffer_samples,
            "Audio output stream started."
        );

        Ok((
            Backend {
                name: config.device().to_string(),
                params,
                _stream: stream,
            },
            driver,
        ))
    }
}

impl AudioBackend for Backend {
    fn params(&self) -> StreamParams {
        self.params
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}Hz) (CPAL)", self.name, self.params.sample_rate)
    }
}

/// Finds the named output device, or the host default.
fn find_device(name: &str) -> Result<cpal::Device, Error> {
    let host = cpal::default_host();
    if name == "default" {
        return host
            .default_output_device()
            .ok_or_else(|| Error::NoDevice(name.to_string()));
    }

    for device in host.output_devices()? {
        if device.name()?.trim() == name {
            return Ok(device);
        }
    }
    Err(Error::NoDevice(name.to_string()))
}

/// Picks a mono signed 16-bit stream configuration at the requested rate,
/// falling back once before giving up.
fn negotiate(
    device: &cpal::Device,
    requested_rate: u32,
) -> Result<(cpal::StreamConfig, StreamParams), Error> {
    for rate in [requested_rate, FALLBACK_SAMPLE_RATE] {
        if !supports_rate(device, rate)? {
            continue;
        }

        if rate != requested_rate {
            warn!(
                requested = requested_rate,
                negotiated = rate,
                "Requested sample rate unsupported, falling back."
            );
        }

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: rate,
            buffer_size: cpal::BufferSize::Fixed(MIX_CHUNK_SAMPLES as u32),
        };
        return Ok((
            stream_config,
            StreamParams {
                sample_rate: rate,
                buffer_samples: MIX_CHUNK_SAMPLES,
            },
        ));
    }

    Err(Error::Negotiation {
        requested: requested_rate,
        fallback: FALLBACK_SAMPLE_RATE,
    })
}

fn supports_rate(device: &cpal::Device, rate: u32) -> Result<bool, Error> {
    let rate: cpal::SampleRate = rate;
    for range in device.supported_output_configs()? {
        if range.sample_format() == cpal::SampleFormat::I16
            && range.channels() == 1
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate()
        {
            return Ok(true);
        }
    }
    Ok(false)
}
