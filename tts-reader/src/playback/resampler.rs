//! Audio resampling using rubato
//!
//! Piper voices produce 16 or 22.05 kHz audio; the output device usually
//! runs at 44.1 or 48 kHz.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use tracing::debug;

/// Resample interleaved audio from `input_rate` to `output_rate`
///
/// Returns a copy when the rates already match.
pub fn resample(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Result<Vec<f32>> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if channels == 0 || input_rate == 0 || output_rate == 0 {
        return Err(Error::Decode(format!(
            "Cannot resample {} channels from {}Hz to {}Hz",
            channels, input_rate, output_rate
        )));
    }

    let planar_input = deinterleave(input, channels);
    let input_frames = planar_input[0].len();

    // The whole clip is one fixed-size chunk
    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

    let output = interleave(planar_output);
    debug!(
        input_rate,
        output_rate,
        input_frames,
        output_frames = output.len() / channels as usize,
        "Resampled audio"
    );
    Ok(output)
}

/// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`
fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let channels = channels as usize;
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    planar
}

fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    let Some(frames) = planar.first().map(Vec::len) else {
        return Vec::new();
    };
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for channel in &planar {
            interleaved.push(channel[i]);
        }
    }
    interleaved
}
