//! Spoken feedback: decoding, resampling, device output and the narrator channel

pub mod decoder;
pub mod narrator;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::decode_clip;
pub use narrator::{NarratorAudioChannel, SkipReason, SpeakOutcome};
pub use output::{ActivePlayback, AudioSink, CpalAudioSink, PlaybackHandle};
pub use resampler::Resampler;
pub use types::AudioClip;
