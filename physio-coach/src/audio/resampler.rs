//! Audio resampling using rubato
//!
//! Converts decoded speech to the output device's sample rate.

use crate::audio::AudioClip;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample a clip to `output_rate`.
    ///
    /// # Notes
    /// If the clip is already at `output_rate`, returns a copy without resampling
    pub fn resample(clip: &AudioClip, output_rate: u32) -> Result<AudioClip> {
        if clip.sample_rate == output_rate || clip.is_empty() {
            return Ok(AudioClip::new(clip.samples.clone(), output_rate, clip.channels));
        }

        debug!(
            "Resampling from {}Hz to {}Hz ({} channels)",
            clip.sample_rate, output_rate, clip.channels
        );

        // De-interleave samples for rubato (which expects planar format)
        let planar_input = Self::deinterleave(&clip.samples, clip.channels);
        let input_frames = planar_input[0].len();

        // Uses FastFixedIn for efficiency; speech does not need sinc quality
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / clip.sample_rate as f64,
            1.0, // max_relative_ratio (no runtime changes)
            PolynomialDegree::Septic,
            input_frames,
            clip.channels as usize,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        Ok(AudioClip::new(
            Self::interleave(planar_output),
            output_rate,
            clip.channels,
        ))
    }

    /// De-interleave audio samples.
    ///
    /// Converts [L, R, L, R, ...] to [[L, L, ...], [R, R, ...]]
    fn deinterleave(interleaved: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let channels = channels as usize;
        let frames = interleaved.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];

        for frame in interleaved.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }

        planar
    }

    /// Interleave planar audio samples.
    ///
    /// Converts [[L, L, ...], [R, R, ...]] to [L, R, L, R, ...]
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        if planar.is_empty() {
            return Vec::new();
        }

        let channels = planar.len();
        let frames = planar[0].len();
        let mut interleaved = Vec::with_capacity(frames * channels);

        for frame_idx in 0..frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }

        interleaved
    }
}
