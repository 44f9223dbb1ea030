//! Waveform encoder - raw interleaved PCM bytes to a canonical mono waveform

use std::io::{Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::error::{PipelineError, PipelineResult, Result};

/// Only 16-bit samples are accepted on the wire
const SUPPORTED_SAMPLE_WIDTH: u16 = 2;

/// Layout of a headerless PCM stream, agreed between sensor and server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
}

impl PcmFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            sample_width: SUPPORTED_SAMPLE_WIDTH,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_bytes(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }
}

impl From<&CaptureConfig> for PcmFormat {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            sample_width: config.sample_width,
        }
    }
}

/// Mono 16-bit waveform after gain and clipping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalWaveform {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl CanonicalWaveform {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }

    /// Samples scaled to [-1.0, 1.0)
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32 / 32768.0).collect()
    }

    /// Little-endian 16-bit bytes, the inverse of [`encode`] at unit gain
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Serialize as a mono 16-bit WAV container
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, wav_spec(self.sample_rate))?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write a mono 16-bit WAV file
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = WavWriter::create(path, wav_spec(self.sample_rate))?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        info!("WAV file written: {} ({:.2}s)", path.display(), self.duration());
        Ok(())
    }

    /// Decode a WAV container produced by [`CanonicalWaveform::to_wav_bytes`]
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_wav_reader(WavReader::new(Cursor::new(bytes))?)
    }

    /// Read a WAV file written by [`CanonicalWaveform::write_wav`]
    pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_wav_reader(WavReader::open(path)?)
    }

    fn from_wav_reader<R: Read>(mut reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();
        if spec.channels != 1 || spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int
        {
            return Err(PipelineError::MalformedAudio(format!(
                "expected mono 16-bit PCM, got {} channels, {} bits, {:?}",
                spec.channels, spec.bits_per_sample, spec.sample_format
            ))
            .into());
        }

        let samples = reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::new(samples, spec.sample_rate))
    }
}

fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Apply gain with hard saturation to the i16 range
///
/// The float-to-int cast truncates toward zero after clamping.
fn amplify(sample: i16, gain: f32) -> i16 {
    (sample as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert raw little-endian PCM bytes into a canonical mono waveform.
///
/// The byte length must be a whole number of frames; a trailing partial
/// sample is rejected rather than dropped. Multi-channel frames are averaged
/// down to mono after gain is applied.
pub fn encode(pcm: &[u8], format: &PcmFormat, gain: f32) -> PipelineResult<CanonicalWaveform> {
    if format.sample_width != SUPPORTED_SAMPLE_WIDTH {
        return Err(PipelineError::MalformedAudio(format!(
            "unsupported sample width: {} bytes",
            format.sample_width
        )));
    }
    if format.channels == 0 {
        return Err(PipelineError::MalformedAudio("zero channels".to_string()));
    }

    let frame_bytes = format.frame_bytes();
    if pcm.len() % frame_bytes != 0 {
        return Err(PipelineError::MalformedAudio(format!(
            "{} bytes is not a multiple of the {}-byte frame size",
            pcm.len(),
            frame_bytes
        )));
    }

    let channels = format.channels as usize;
    let samples: Vec<i16> = pcm
        .chunks_exact(frame_bytes)
        .map(|frame| {
            let mut sum = 0i32;
            for bytes in frame.chunks_exact(2) {
                sum += amplify(i16::from_le_bytes([bytes[0], bytes[1]]), gain) as i32;
            }
            (sum / channels as i32) as i16
        })
        .collect();

    debug!(
        "Encoded {} bytes into {} samples @ {} Hz (gain {})",
        pcm.len(),
        samples.len(),
        format.sample_rate,
        gain
    );

    Ok(CanonicalWaveform::new(samples, format.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_unit_gain_round_trip() {
        let samples = [0, 1, -1, 1234, -4321, i16::MAX, i16::MIN];
        let pcm = bytes_of(&samples);
        let waveform = encode(&pcm, &PcmFormat::mono(32000), 1.0).unwrap();
        assert_eq!(waveform.samples(), &samples);
        assert_eq!(waveform.to_pcm_bytes(), pcm);
    }

    #[test]
    fn test_gain_saturates() {
        let pcm = bytes_of(&[10_000, -10_000, 100]);
        let waveform = encode(&pcm, &PcmFormat::mono(32000), 10.0).unwrap();
        assert_eq!(waveform.samples(), &[i16::MAX, i16::MIN, 1000]);
    }

    #[test]
    fn test_gain_truncates_toward_zero() {
        let pcm = bytes_of(&[3, -3]);
        let waveform = encode(&pcm, &PcmFormat::mono(32000), 0.5).unwrap();
        assert_eq!(waveform.samples(), &[1, -1]);
    }

    #[test]
    fn test_odd_length_rejected() {
        let err = encode(&[0, 0, 7], &PcmFormat::mono(32000), 1.0).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedAudio(_)));
    }

    #[test]
    fn test_unsupported_width_rejected() {
        let format = PcmFormat {
            sample_width: 3,
            ..PcmFormat::mono(32000)
        };
        assert!(encode(&[0; 6], &format, 1.0).is_err());
    }

    #[test]
    fn test_empty_input() {
        let waveform = encode(&[], &PcmFormat::mono(32000), 10.0).unwrap();
        assert!(waveform.is_empty());
    }

    #[test]
    fn test_stereo_downmix() {
        let format = PcmFormat {
            channels: 2,
            ..PcmFormat::mono(16000)
        };
        let pcm = bytes_of(&[100, 300, -50, -150]);
        let waveform = encode(&pcm, &format, 1.0).unwrap();
        assert_eq!(waveform.samples(), &[200, -100]);

        // Half a frame is malformed for stereo
        assert!(encode(&pcm[..6], &format, 1.0).is_err());
    }

    #[test]
    fn test_wav_round_trip() {
        let waveform = CanonicalWaveform::new(vec![0, 5, -5, i16::MAX, i16::MIN], 32000);
        let bytes = waveform.to_wav_bytes().unwrap();
        assert_eq!(&bytes[..4], b"RIFF");

        let decoded = CanonicalWaveform::from_wav_bytes(&bytes).unwrap();
        assert_eq!(decoded, waveform);
    }

    #[test]
    fn test_to_f32_scale() {
        let waveform = CanonicalWaveform::new(vec![i16::MIN, 0, 16384], 8000);
        assert_eq!(waveform.to_f32(), vec![-1.0, 0.0, 0.5]);
    }
}
