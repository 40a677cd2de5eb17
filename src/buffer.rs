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
use std::sync::Arc;

/// An immutable block of signed 16-bit audio samples.
///
/// Buffers are shared between the posting thread and the mix callback via
/// `Arc`; whichever side drops the last reference frees the storage. The
/// sample data is never mutated after construction.
pub struct SampleBuffer {
    samples: Box<[i16]>,
}

impl SampleBuffer {
    /// Creates a buffer from raw 8-bit unsigned sample data, centering each
    /// byte into the signed 16-bit range (`sample = byte - 128`).
    pub fn from_u8(data: &[u8]) -> Arc<SampleBuffer> {
        let samples = data.iter().map(|&b| b as i16 - 128).collect();
        Arc::new(SampleBuffer { samples })
    }

    /// Creates a buffer directly from signed 16-bit samples.
    pub fn from_i16(data: &[i16]) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer {
            samples: data.into(),
        })
    }

    /// The sample data.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// The number of samples in the buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
