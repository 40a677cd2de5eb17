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
use std::{
    sync::{
        atomic::{AtomicI16, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::warn;

use crate::{
    backend::StreamParams,
    buffer::SampleBuffer,
    channel::Channel,
    error::Error,
};

/// The maximum number of simultaneously active channels.
pub const MAX_CHANNELS: usize = 16;

/// The size of the internal mix chunk cache, in samples.
pub const MIX_CHUNK_SAMPLES: usize = 512;

/// The upper end of the master volume scale.
pub const MAX_VOLUME_SCALE: i16 = 64;

/// Owns the active channels and produces the mixed output stream.
///
/// Producers create buffers and channels through the driver; the audio
/// backend invokes [`Driver::mix_audio`] from its periodic callback
/// thread. The driver lock guards only the channel table, each channel
/// guards its own queue, and the two are never held at the same time by
/// one thread.
pub struct Driver {
    /// Active channels. No gaps below the length; detach is swap-remove.
    channels: Mutex<Vec<Arc<Channel>>>,
    /// Mix chunk cache, touched only by the backend callback thread.
    mix: Mutex<MixState>,
    /// Master volume scale in [0, MAX_VOLUME_SCALE], applied to every
    /// mixed sample.
    volume_scale: AtomicI16,
    sample_rate: u32,
    latency: Duration,
    buffer_time: Duration,
    buffer_samples: usize,
}

struct MixState {
    chunk: [i16; MIX_CHUNK_SAMPLES],
    /// Read position into the chunk; MIX_CHUNK_SAMPLES means drained.
    read_offset: usize,
}

impl Driver {
    /// Creates a driver for the negotiated stream parameters.
    ///
    /// The latency compensation and nominal buffer duration both derive
    /// from the device buffer length at the negotiated rate.
    pub fn new(params: StreamParams) -> Arc<Driver> {
        let buffer_time = duration_for_samples(params.buffer_samples, params.sample_rate);
        Arc::new(Driver {
            channels: Mutex::new(Vec::with_capacity(MAX_CHANNELS)),
            mix: Mutex::new(MixState {
                chunk: [0; MIX_CHUNK_SAMPLES],
                read_offset: MIX_CHUNK_SAMPLES,
            }),
            volume_scale: AtomicI16::new(MAX_VOLUME_SCALE),
            sample_rate: params.sample_rate,
            latency: buffer_time,
            buffer_time,
            buffer_samples: params.buffer_samples,
        })
    }

    /// The negotiated sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The per-channel latency compensation duration.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Creates an immutable sample buffer from raw 8-bit unsigned data.
    pub fn create_buffer(&self, data: &[u8]) -> Arc<SampleBuffer> {
        SampleBuffer::from_u8(data)
    }

    /// Creates a playback channel and attaches it to the active list.
    ///
    /// Fails when the channel table already holds [`MAX_CHANNELS`]
    /// channels; the freshly created channel is discarded.
    pub fn create_channel(self: &Arc<Self>) -> Result<Arc<Channel>, Error> {
        let channel = Channel::new(
            Arc::downgrade(self),
            self.latency,
            self.buffer_time,
            self.buffer_samples,
            self.sample_rate,
        );

        let mut channels = self.channels.lock();
        if channels.len() == MAX_CHANNELS {
            warn!(max_channels = MAX_CHANNELS, "Channel table is full.");
            return Err(Error::ChannelsExhausted(MAX_CHANNELS));
        }
        channels.push(Arc::clone(&channel));

        Ok(channel)
    }

    /// Sets the master volume as a fraction `vol / max_volume`, mapped to
    /// an integer scale in [0, MAX_VOLUME_SCALE]. A `vol` beyond
    /// `max_volume` clamps to full scale.
    pub fn set_master_volume(&self, vol: u32, max_volume: u32) {
        if max_volume == 0 {
            return;
        }
        let scale = (vol as u64 * MAX_VOLUME_SCALE as u64 / max_volume as u64)
            .min(MAX_VOLUME_SCALE as u64) as i16;
        self.volume_scale.store(scale, Ordering::Relaxed);
    }

    /// The number of channels currently attached.
    pub fn active_channels(&self) -> usize {
        self.channels.lock().len()
    }

    /// Removes a channel from the active list. A no-op when the channel
    /// was already detached.
    pub(crate) fn detach_channel(&self, channel: &Arc<Channel>) {
        let mut channels = self.channels.lock();
        if let Some(index) = channels
            .iter()
            .position(|entry| Arc::ptr_eq(entry, channel))
        {
            channels.swap_remove(index);
        }
    }

    /// The periodic mix entry point, invoked by the audio backend with the
    /// device-owned output buffer.
    ///
    /// Drains the mix chunk cache into `output`, refilling one chunk at a
    /// time. Each refill is stamped with the device playback time of its
    /// sub-block, derived from the samples emitted since the start of the
    /// callback rather than from when the callback happens to run.
    pub fn mix_audio(&self, output: &mut [i16]) {
        if output.is_empty() {
            return;
        }

        // Snapshot the active channels into inline storage, taking a
        // reference to each before the driver lock is released. The
        // per-channel work below then runs without the driver lock, so a
        // concurrent detach can never deadlock against a channel's own
        // lock, and the callback thread never touches the heap.
        let mut mixing_channels: [Option<Arc<Channel>>; MAX_CHANNELS] =
            std::array::from_fn(|_| None);
        let num_channels = {
            let channels = self.channels.lock();
            for (slot, channel) in mixing_channels.iter_mut().zip(channels.iter()) {
                *slot = Some(Arc::clone(channel));
            }
            channels.len()
        };

        let mut mix = self.mix.lock();

        let mix_start = Instant::now();
        let mut block_start = mix_start;
        let mut samples_since_start = 0usize;
        let mut samples_remaining = output.len();
        let mut pos = 0usize;

        loop {
            let available = MIX_CHUNK_SAMPLES - mix.read_offset;

            if available > samples_remaining {
                let offset = mix.read_offset;
                output[pos..pos + samples_remaining]
                    .copy_from_slice(&mix.chunk[offset..offset + samples_remaining]);
                mix.read_offset += samples_remaining;
                break;
            }

            output[pos..pos + available].copy_from_slice(&mix.chunk[mix.read_offset..]);
            pos += available;
            samples_since_start += available;

            let block_end =
                mix_start + duration_for_samples(samples_since_start, self.sample_rate);

            mix.read_offset = 0;
            self.refill_mix_chunk(
                &mut mix,
                &mixing_channels[..num_channels],
                samples_remaining,
                block_start,
                block_end,
            );
            block_start = block_end;

            samples_remaining -= available;
        }
    }

    /// Refills the mix chunk from the snapshotted channels.
    ///
    /// When fewer than a full chunk of samples is wanted, the tail of the
    /// chunk is filled instead and the read offset is parked at its start,
    /// so the cache always ends on a chunk boundary.
    fn refill_mix_chunk(
        &self,
        mix: &mut MixState,
        channels: &[Option<Arc<Channel>>],
        max_samples_to_fill: usize,
        mix_start: Instant,
        mix_end: Instant,
    ) {
        let mut scratch = [0i16; MIX_CHUNK_SAMPLES];
        let volume_scale = self.volume_scale.load(Ordering::Relaxed);

        let mut samples_to_fill = MIX_CHUNK_SAMPLES;
        if samples_to_fill > max_samples_to_fill {
            mix.read_offset += samples_to_fill - max_samples_to_fill;
            samples_to_fill = max_samples_to_fill;
        } else {
            mix.read_offset = 0;
        }

        let offset = mix.read_offset;
        let chunk = &mut mix.chunk[offset..offset + samples_to_fill];

        let mut no_audio = true;
        for (i, channel) in channels.iter().flatten().enumerate() {
            channel.consume(&mut scratch[..samples_to_fill], mix_start, mix_end);

            if i == 0 {
                no_audio = false;
                chunk.copy_from_slice(&scratch[..samples_to_fill]);
            } else {
                add_samples(chunk, &scratch[..samples_to_fill]);
            }
        }

        if no_audio {
            chunk.fill(0);
        } else {
            // Plain wrapping arithmetic: loud channels can wrap rather
            // than clip, which matches the audible output this mixer has
            // always produced.
            for sample in chunk.iter_mut() {
                *sample = sample.wrapping_mul(volume_scale);
            }
        }
    }
}

fn add_samples(dest: &mut [i16], src: &[i16]) {
    for (dest, &src) in dest.iter_mut().zip(src) {
        *dest = dest.wrapping_add(src);
    }
}

fn duration_for_samples(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_nanos(samples as u64 * 1_000_000_000 / sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_driver() -> Arc<Driver> {
        Driver::new(StreamParams {
            sample_rate: 22050,
            buffer_samples: MIX_CHUNK_SAMPLES,
        })
    }

    #[test]
    fn test_no_channels_mixes_silence() {
        let driver = test_driver();
        let mut output = [-1i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(output, [0; MIX_CHUNK_SAMPLES]);
    }

    #[test]
    fn test_single_channel_passthrough() {
        let driver = test_driver();
        // Scale of 1 leaves samples untouched.
        driver.set_master_volume(1, 64);

        let channel = driver.create_channel().unwrap();
        let samples: Vec<i16> = (1..=1024).collect();
        assert!(channel.post_buffer(&SampleBuffer::from_i16(&samples)));

        let mut output = [0i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(&output[..], &samples[..MIX_CHUNK_SAMPLES]);

        // The second call plays the lookahead chunk cached by the first.
        let mut output = [0i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(&output[..], &samples[MIX_CHUNK_SAMPLES..]);

        // The queue is empty now; further mixing is silence.
        let mut output = [-1i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(output, [0; MIX_CHUNK_SAMPLES]);
    }

    #[test]
    fn test_master_volume_scales_samples() {
        let driver = test_driver();
        // vol=1 of max=2 against a max scale of 64 gives a scale of 32.
        driver.set_master_volume(1, 2);

        let channel = driver.create_channel().unwrap();
        assert!(channel.post_buffer(&SampleBuffer::from_i16(&[100; 1024])));

        let mut output = [0i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(output, [3200; MIX_CHUNK_SAMPLES]);
    }

    #[test]
    fn test_two_channels_sum_without_saturation() {
        let driver = test_driver();
        driver.set_master_volume(1, 64);

        for _ in 0..2 {
            let channel = driver.create_channel().unwrap();
            assert!(channel.post_buffer(&SampleBuffer::from_i16(&[30000; 1024])));
        }

        let mut output = [0i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        // 30000 + 30000 wraps around the i16 range instead of clipping.
        assert_eq!(output, [30000i16.wrapping_add(30000); MIX_CHUNK_SAMPLES]);
    }

    #[test]
    fn test_sub_chunk_output_lengths() {
        let driver = test_driver();
        driver.set_master_volume(1, 64);

        let channel = driver.create_channel().unwrap();
        let samples: Vec<i16> = (1..=512).collect();
        assert!(channel.post_buffer(&SampleBuffer::from_i16(&samples)));

        // Four callbacks of 128 samples each walk the whole buffer.
        let mut played = Vec::new();
        for _ in 0..4 {
            let mut output = [0i16; 128];
            driver.mix_audio(&mut output);
            played.extend_from_slice(&output);
        }
        assert_eq!(&played[..], &samples[..]);
    }

    #[test]
    fn test_mixes_full_channel_table() {
        let driver = test_driver();
        driver.set_master_volume(1, 64);

        // Every snapshot slot is occupied.
        let mut channels = Vec::new();
        for _ in 0..MAX_CHANNELS {
            let channel = driver.create_channel().unwrap();
            assert!(channel.post_buffer(&SampleBuffer::from_i16(&[1; 1024])));
            channels.push(channel);
        }

        let mut output = [0i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(output, [MAX_CHANNELS as i16; MIX_CHUNK_SAMPLES]);
    }

    #[test]
    fn test_master_volume_clamps_to_full_scale() {
        let driver = test_driver();
        driver.set_master_volume(u32::MAX, 2);

        let channel = driver.create_channel().unwrap();
        assert!(channel.post_buffer(&SampleBuffer::from_i16(&[100; 1024])));

        let mut output = [0i16; MIX_CHUNK_SAMPLES];
        driver.mix_audio(&mut output);
        assert_eq!(output, [6400; MIX_CHUNK_SAMPLES]);
    }

    #[test]
    fn test_channel_table_capacity() {
        let driver = test_driver();
        let mut channels = Vec::new();
        for _ in 0..MAX_CHANNELS {
            channels.push(driver.create_channel().unwrap());
        }
        assert!(matches!(
            driver.create_channel(),
            Err(Error::ChannelsExhausted(MAX_CHANNELS))
        ));
        assert_eq!(driver.active_channels(), MAX_CHANNELS);
    }

    #[test]
    fn test_destroy_detaches_channel() {
        let driver = test_driver();
        let first = driver.create_channel().unwrap();
        let second = driver.create_channel().unwrap();
        assert_eq!(driver.active_channels(), 2);

        first.destroy();
        assert_eq!(driver.active_channels(), 1);

        // Destroying again is a no-op, and the other channel survives.
        first.destroy();
        assert_eq!(driver.active_channels(), 1);
        second.destroy();
        assert_eq!(driver.active_channels(), 0);
    }

    #[test]
    fn test_detached_channel_lives_while_referenced() {
        let driver = test_driver();
        let channel = driver.create_channel().unwrap();
        assert!(channel.post_buffer(&SampleBuffer::from_i16(&[42; 16])));

        channel.destroy();
        assert_eq!(driver.active_channels(), 0);

        // The table dropped its reference, but ours still works.
        let mut output = [0i16; 16];
        channel.consume(&mut output, Instant::now(), Instant::now());
        assert_eq!(output, [42; 16]);
    }

    #[test]
    fn test_create_buffer_converts_input() {
        let driver = test_driver();
        let buffer = driver.create_buffer(&[128, 138]);
        assert_eq!(buffer.samples(), &[0, 10]);
    }

    #[test]
    fn test_duration_for_samples() {
        assert_eq!(
            duration_for_samples(22050, 22050),
            Duration::from_secs(1)
        );
        assert_eq!(
            duration_for_samples(512, 22050),
            Duration::from_nanos(512 * 1_000_000_000 / 22050)
        );
    }
}
