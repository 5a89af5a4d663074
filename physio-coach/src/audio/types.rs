//! Core audio data types

/// Decoded PCM audio ready for an output device
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Interleaved by channel: [L, R, L, R, ...] for stereo
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// PCM audio samples (interleaved)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = stereo, ...)
    pub channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Get duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frame_count() as u64 * 1000) / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Remap to `target_channels`
    ///
    /// Mono is duplicated into every output channel; otherwise the first
    /// `min(src, dst)` channels are copied and any extra output channels
    /// are silent.
    pub fn remap_channels(&self, target_channels: u16) -> AudioClip {
        if target_channels == self.channels || self.channels == 0 {
            return self.clone();
        }

        let src = self.channels as usize;
        let dst = target_channels as usize;
        let mut samples = Vec::with_capacity(self.frame_count() * dst);

        for frame in self.samples.chunks_exact(src) {
            for ch in 0..dst {
                let sample = if src == 1 {
                    frame[0]
                } else if ch < src {
                    frame[ch]
                } else {
                    0.0
                };
                samples.push(sample);
            }
        }

        AudioClip::new(samples, self.sample_rate, target_channels)
    }
}
