//! Sample rate conversion from the capture rate to the analysis rate

use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Input frames handed to the resampler per call
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per FFT chunk
const SUB_CHUNKS: usize = 2;

/// Number of output samples for `input_len` samples converted between rates
pub fn output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    let numerator = input_len as u64 * to_rate as u64;
    numerator.div_ceil(from_rate.max(1) as u64) as usize
}

/// Resample a complete mono signal.
///
/// The resampler's group delay is trimmed so that output sample `i` lines up
/// with input time `i / to_rate`, and the result has exactly
/// [`output_len`] samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> PipelineResult<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(resampling_error("sample rate must be non-zero"));
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    debug!(
        "Resampling {} samples: {} Hz -> {} Hz",
        samples.len(),
        from_rate,
        to_rate
    );

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1, // channels
    )
    .map_err(resampling_error)?;

    let delay = resampler.output_delay();
    let expected = output_len(samples.len(), from_rate, to_rate);
    let mut output = Vec::with_capacity(expected + delay + resampler.output_frames_max());

    // Process complete chunks
    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > samples.len() {
            break;
        }
        let chunk: [&[f32]; 1] = [&samples[pos..pos + needed]];
        let result = resampler
            .process(&chunk[..], None)
            .map_err(resampling_error)?;
        output.extend_from_slice(&result[0]);
        pos += needed;
    }

    // Remaining tail, zero padded by rubato
    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let result = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(resampling_error)?;
        output.extend_from_slice(&result[0]);
    }

    // Flush the delay line
    while output.len() < expected + delay {
        let result = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(resampling_error)?;
        if result[0].is_empty() {
            break;
        }
        output.extend_from_slice(&result[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);

    Ok(output)
}

fn resampling_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::FeatureExtraction(format!("resampling failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_output_len() {
        assert_eq!(output_len(32000, 32000, 22050), 22050);
        assert_eq!(output_len(1, 32000, 22050), 1);
        assert_eq!(output_len(0, 32000, 22050), 0);
        assert_eq!(output_len(320_000, 32000, 22050), 220_500);
    }

    #[test]
    fn test_identity_rate() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&input, 22050, 22050).unwrap(), input);
    }

    #[test]
    fn test_downsample_length() {
        let input = sine(440.0, 32000, 32000);
        let output = resample(&input, 32000, 22050).unwrap();
        assert_eq!(output.len(), 22050);
    }

    #[test]
    fn test_short_input_length() {
        let input = sine(440.0, 32000, 100);
        let output = resample(&input, 32000, 22050).unwrap();
        assert_eq!(output.len(), output_len(100, 32000, 22050));
    }

    #[test]
    fn test_preserves_low_frequency_tone() {
        let input = sine(200.0, 32000, 32000);
        let output = resample(&input, 32000, 22050).unwrap();

        // Unit sine has RMS 1/sqrt(2); check away from the edges
        let middle = &output[2000..20000];
        let rms = (middle.iter().map(|s| s * s).sum::<f32>() / middle.len() as f32).sqrt();
        assert!((rms - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.05, "rms {}", rms);
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample(&[0.0], 0, 22050).is_err());
    }
}
