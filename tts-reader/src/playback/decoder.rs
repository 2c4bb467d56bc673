//! WAV decoding using symphonia
//!
//! Decodes an in-memory WAV artifact to interleaved f32 samples.

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

/// Decoded PCM audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Convert to interleaved stereo
    ///
    /// Mono is duplicated to both channels; extra channels beyond the
    /// first two are dropped.
    pub fn into_stereo(self) -> Vec<f32> {
        match self.channels {
            2 => self.samples,
            1 => self.samples.iter().flat_map(|&s| [s, s]).collect(),
            0 => Vec::new(),
            n => self
                .samples
                .chunks_exact(n as usize)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        }
    }
}

/// Decode a complete WAV file held in memory
pub fn decode_wav(bytes: Vec<u8>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
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
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(Error::Decode(e.to_string())),
        }
    }

    debug!(
        sample_rate,
        channels,
        frames = samples.len() / channels.max(1) as usize,
        "Decoded WAV artifact"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_wav(b"definitely not a wav file".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_into_stereo() {
        let mono = DecodedAudio {
            samples: vec![0.1, 0.2],
            sample_rate: 22050,
            channels: 1,
        };
        assert_eq!(mono.frames(), 2);
        assert_eq!(mono.into_stereo(), vec![0.1, 0.1, 0.2, 0.2]);

        let surround = DecodedAudio {
            samples: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            sample_rate: 48000,
            channels: 3,
        };
        assert_eq!(surround.into_stereo(), vec![1.0, 2.0, 4.0, 5.0]);
    }
}
