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
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{buffer::SampleBuffer, driver::Driver, ring::RingQueue};

/// The maximum number of buffers a channel will queue before rejecting
/// further posts.
pub const MAX_QUEUED_BUFFERS: usize = 16;

/// Callbacks a channel owner can register to observe playback progress.
///
/// `buffer_finished` fires once for every queued buffer the channel
/// releases, whether it played to completion during a mix pass or was
/// drained by `stop`. The hook is invoked after the channel lock has been
/// released, so it may post new buffers to the same channel.
pub trait ChannelCallbacks: Send + Sync {
    fn buffer_finished(&self);
}

/// An independent playback queue feeding the mixer.
///
/// Producer threads post buffers; the mix callback consumes them. The
/// channel keeps a timestamp of when its queued audio will finish playing
/// and uses it to compute leading silence: a freshly posted buffer that
/// arrives late relative to the last mix boundary is preceded by exactly
/// enough zero samples to resynchronize playback to wall-clock time
/// instead of playing early and accumulating jitter.
pub struct Channel {
    /// Compensation added to "now" when judging whether a post is late.
    latency: Duration,
    /// The nominal duration of one device buffer.
    buffer_time: Duration,
    /// The device buffer length in samples; also the silence clamp.
    buffer_samples_max: usize,
    sample_rate: u32,
    /// Non-owning handle back to the driver, used only for detach.
    owner: Weak<Driver>,
    state: Mutex<ChannelState>,
}

struct ChannelState {
    queue: RingQueue<Arc<SampleBuffer>, MAX_QUEUED_BUFFERS>,
    /// Samples already consumed from the head buffer. Strictly less than
    /// the head buffer's length while the queue is non-empty.
    consumed: usize,
    /// Zero samples still owed before the head buffer is heard.
    leading_silence: usize,
    /// Device playback time at which the last mix pass ends, if any mix
    /// pass has touched this channel yet.
    timestamp: Option<Instant>,
    /// True while a consume is in progress on the mix thread.
    mixing: bool,
    callbacks: Option<Arc<dyn ChannelCallbacks>>,
}

impl Channel {
    pub(crate) fn new(
        owner: Weak<Driver>,
        latency: Duration,
        buffer_time: Duration,
        buffer_samples_max: usize,
        sample_rate: u32,
    ) -> Arc<Channel> {
        Arc::new(Channel {
            latency,
            buffer_time,
            buffer_samples_max,
            sample_rate,
            owner,
            state: Mutex::new(ChannelState {
                queue: RingQueue::new(),
                consumed: 0,
                leading_silence: 0,
                timestamp: None,
                mixing: false,
                callbacks: None,
            }),
        })
    }

    /// Registers the callbacks invoked as queued buffers finish.
    pub fn set_callbacks(&self, callbacks: Arc<dyn ChannelCallbacks>) {
        self.state.lock().callbacks = Some(callbacks);
    }

    /// Queues a buffer for playback.
    ///
    /// Returns false when the queue already holds [`MAX_QUEUED_BUFFERS`]
    /// buffers; the queue is left unchanged and the caller keeps its
    /// reference. When the queue is empty and a mix pass has previously
    /// stamped this channel, the post also computes the leading silence
    /// needed to line the new audio up with device playback time.
    pub fn post_buffer(&self, buffer: &Arc<SampleBuffer>) -> bool {
        let mut state = self.state.lock();
        if state.queue.is_full() {
            return false;
        }

        let mut leading_silence = 0;
        if state.queue.is_empty() && !state.mixing {
            if let Some(timestamp) = state.timestamp {
                let queue_time = Instant::now() + self.latency;
                if queue_time > timestamp {
                    let lead_time = queue_time - timestamp;
                    leading_silence = if lead_time > self.buffer_time {
                        // More than one buffer late: delay by a full device
                        // buffer so playback lands on the next boundary.
                        self.buffer_samples_max
                    } else {
                        (lead_time.as_nanos() * self.sample_rate as u128 / 1_000_000_000) as usize
                    };
                }
            }
        }
        state.leading_silence = leading_silence;

        state.queue.push(Arc::clone(buffer)).is_ok()
    }

    /// Drains every queued buffer, firing one buffer-finished notification
    /// per buffer, and resets the leading silence and consumed offset.
    pub fn stop(&self) {
        let mut finished = 0usize;
        let callbacks = {
            let mut state = self.state.lock();
            state.leading_silence = 0;
            state.consumed = 0;
            while state.queue.pop().is_some() {
                finished += 1;
            }
            state.callbacks.clone()
        };

        if let Some(callbacks) = callbacks {
            for _ in 0..finished {
                callbacks.buffer_finished();
            }
        }
    }

    /// Detaches the channel from its driver's active list.
    ///
    /// Future mix passes no longer see the channel, but the object itself
    /// lives until every holder (including an in-flight mix snapshot)
    /// drops its reference.
    pub fn destroy(self: &Arc<Self>) {
        if let Some(owner) = self.owner.upgrade() {
            owner.detach_channel(self);
        }
    }

    /// Consumes up to `output.len()` samples into `output` on behalf of a
    /// mix pass, recording `mix_end` as the device time at which this
    /// block finishes playing.
    ///
    /// Leading silence is emitted first, then samples are copied from the
    /// head of the queue, releasing buffers as they empty. If the queue
    /// runs out the remainder is zero-filled; an underrun is audible but
    /// not an error.
    pub(crate) fn consume(&self, output: &mut [i16], _mix_start: Instant, mix_end: Instant) {
        let mut finished = 0usize;
        let mut pos;

        let callbacks = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.mixing = true;
            state.timestamp = Some(mix_end);

            if output.len() <= state.leading_silence {
                state.leading_silence -= output.len();
                output.fill(0);
                state.mixing = false;
                return;
            }

            pos = state.leading_silence;
            if pos > 0 {
                output[..pos].fill(0);
                state.leading_silence = 0;
            }

            loop {
                let take;
                let buffer_done;
                {
                    let Some(buffer) = state.queue.front() else {
                        break;
                    };
                    let samples = buffer.samples();
                    // Empty buffers are legal posts; they finish instantly.
                    debug_assert!(state.consumed < samples.len() || samples.is_empty());

                    let available = samples.len() - state.consumed;
                    take = available.min(output.len() - pos);
                    output[pos..pos + take]
                        .copy_from_slice(&samples[state.consumed..state.consumed + take]);
                    buffer_done = take == available;
                }

                pos += take;
                if buffer_done {
                    state.consumed = 0;
                    state.queue.pop();
                    finished += 1;
                    if pos == output.len() {
                        break;
                    }
                } else {
                    state.consumed += take;
                    break;
                }
            }

            state.mixing = false;
            state.callbacks.clone()
        };

        // Underrun: zero-fill whatever the queue could not satisfy.
        output[pos..].fill(0);

        if let Some(callbacks) = callbacks {
            for _ in 0..finished {
                callbacks.buffer_finished();
            }
        }
    }

    /// The number of buffers currently queued.
    pub fn queued_buffers(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[cfg(test)]
    pub(crate) fn leading_silence(&self) -> usize {
        self.state.lock().leading_silence
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Mirror stop: leftover buffers still owe their notifications.
        let state = self.state.get_mut();
        let callbacks = state.callbacks.clone();
        let mut finished = 0usize;
        while state.queue.pop().is_some() {
            finished += 1;
        }
        debug_assert!(state.queue.is_empty());

        if let Some(callbacks) = callbacks {
            for _ in 0..finished {
                callbacks.buffer_finished();
            }
        }
    }
}
