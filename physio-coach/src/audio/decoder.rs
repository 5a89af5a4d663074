//! Audio decoder using symphonia
//!
//! Decodes an in-memory encoded clip (MP3 from the TTS service; WAV/PCM is
//! also accepted) to interleaved f32 PCM. The container is detected by
//! probing, so no file extension hint is needed.

use crate::audio::AudioClip;
use crate::error::{Error, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode an entire encoded clip to PCM
///
/// Corrupt packets are skipped with a warning; a clip that yields no audio
/// at all is an error.
///
/// # Errors
/// - Unrecognised container or codec
/// - No audio track, or no decodable packets
pub fn decode_clip(encoded: Vec<u8>) -> Result<AudioClip> {
    if encoded.is_empty() {
        return Err(Error::Decode("Empty audio payload".to_string()));
    }
    let encoded_len = encoded.len();

    let mss = MediaSourceStream::new(Box::new(Cursor::new(encoded)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    // Some containers only reveal rate/channels on the first decoded packet
    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count() as u16);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Decode error: {}", e);
                continue;
            }
            Err(e) => return Err(Error::Decode(format!("Decoder failed: {}", e))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
    let channels = channels.ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

    if samples.is_empty() {
        return Err(Error::Decode("Clip contained no audio".to_string()));
    }

    let clip = AudioClip::new(samples, sample_rate, channels);
    debug!(
        encoded_bytes = encoded_len,
        sample_rate,
        channels,
        duration_ms = clip.duration_ms(),
        "Decoded speech clip"
    );
    Ok(clip)
}
