//! Time-averaged MFCC extraction
//!
//! The transform chain matches the conventions the regressor was trained on:
//!
//! 1. Centered STFT (zero padding of half a window on each side), periodic
//!    Hann window
//! 2. Power spectrum
//! 3. Slaney-scale mel filterbank with area normalization
//! 4. Power to decibels, floored at 80 dB below the spectrogram peak
//! 5. Orthonormal DCT-II over the mel axis
//! 6. Mean of every coefficient across frames

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use super::FeatureVector;
use crate::audio::NormalizedWaveform;
use crate::config::FeatureConfig;
use crate::error::{PipelineError, PipelineResult};

/// Mel bands used when only the cepstral parameters are given
pub const DEFAULT_N_MELS: usize = 128;

/// Floor applied to power before taking the logarithm
const AMIN: f32 = 1e-10;

/// Dynamic range kept below the loudest mel bin
const TOP_DB: f32 = 80.0;

/// Parameters of the cepstral transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfccParams {
    pub sample_rate: u32,
    pub n_coefficients: usize,
    pub fft_window_size: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

impl From<&FeatureConfig> for MfccParams {
    fn from(config: &FeatureConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            n_coefficients: config.n_coefficients,
            fft_window_size: config.fft_window_size,
            hop_length: config.hop_length,
            n_mels: config.n_mels,
        }
    }
}

/// MFCC extractor with precomputed window, filterbank, DCT basis and FFT plan
pub struct MfccExtractor {
    params: MfccParams,
    window: Vec<f32>,
    /// Sparse triangular filters: (fft bin, weight)
    mel_filters: Vec<Vec<(usize, f32)>>,
    /// `n_coefficients` rows of `n_mels` DCT-II weights
    dct_basis: Vec<Vec<f64>>,
    fft: Arc<dyn Fft<f32>>,
}

impl MfccExtractor {
    pub fn new(params: MfccParams) -> PipelineResult<Self> {
        if params.sample_rate == 0 {
            return Err(extraction_error("sample rate must be non-zero"));
        }
        if params.fft_window_size < 2 {
            return Err(extraction_error(format!(
                "FFT window of {} samples is too small",
                params.fft_window_size
            )));
        }
        if params.hop_length == 0 {
            return Err(extraction_error("hop length must be non-zero"));
        }
        if params.n_coefficients == 0 || params.n_coefficients > params.n_mels {
            return Err(extraction_error(format!(
                "{} coefficients requested from {} mel bands",
                params.n_coefficients, params.n_mels
            )));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(params.fft_window_size);

        debug!(
            "MfccExtractor initialized: sample_rate={}, n_fft={}, hop={}, n_mels={}, n_mfcc={}",
            params.sample_rate,
            params.fft_window_size,
            params.hop_length,
            params.n_mels,
            params.n_coefficients
        );

        Ok(Self {
            params,
            window: hann_window(params.fft_window_size),
            mel_filters: mel_filterbank(params.sample_rate, params.fft_window_size, params.n_mels),
            dct_basis: dct_ortho_basis(params.n_coefficients, params.n_mels),
            fft,
        })
    }

    pub fn params(&self) -> &MfccParams {
        &self.params
    }

    /// Extract features from a normalized waveform at the configured rate
    pub fn extract_waveform(&self, waveform: &NormalizedWaveform) -> PipelineResult<FeatureVector> {
        if waveform.sample_rate() != self.params.sample_rate {
            return Err(extraction_error(format!(
                "waveform is {} Hz, extractor expects {} Hz",
                waveform.sample_rate(),
                self.params.sample_rate
            )));
        }
        self.extract(waveform.samples())
    }

    /// Compute the time-averaged cepstral vector of `samples`
    pub fn extract(&self, samples: &[f32]) -> PipelineResult<FeatureVector> {
        let n_fft = self.params.fft_window_size;
        if samples.len() < n_fft {
            return Err(extraction_error(format!(
                "{} samples is shorter than the {}-sample FFT window",
                samples.len(),
                n_fft
            )));
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(extraction_error(format!("non-finite sample at index {}", pos)));
        }

        let (mel_db, n_frames) = self.log_mel_spectrogram(samples);
        let n_mels = self.params.n_mels;

        let mut sums = vec![0.0f64; self.params.n_coefficients];
        for frame in mel_db.chunks_exact(n_mels) {
            for (sum, basis) in sums.iter_mut().zip(&self.dct_basis) {
                let coeff: f64 = basis
                    .iter()
                    .zip(frame)
                    .map(|(&w, &v)| w * v as f64)
                    .sum();
                *sum += coeff;
            }
        }

        let coefficients: Vec<f32> = sums
            .iter()
            .map(|&s| (s / n_frames as f64) as f32)
            .collect();

        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(extraction_error("transform produced non-finite coefficients"));
        }

        debug!(
            "Extracted {} coefficients from {} samples ({} frames)",
            coefficients.len(),
            samples.len(),
            n_frames
        );

        Ok(FeatureVector::new(coefficients))
    }

    /// Row-major `n_frames x n_mels` decibel spectrogram
    fn log_mel_spectrogram(&self, samples: &[f32]) -> (Vec<f32>, usize) {
        let n_fft = self.params.fft_window_size;
        let hop = self.params.hop_length;
        let pad = n_fft / 2;
        let n_frames = 1 + (samples.len() + 2 * pad - n_fft) / hop;
        let n_bins = n_fft / 2 + 1;

        let mut buffer = vec![Complex::new(0.0f32, 0.0f32); n_fft];
        let mut scratch = vec![Complex::new(0.0f32, 0.0f32); self.fft.get_inplace_scratch_len()];
        let mut power = vec![0.0f32; n_bins];
        let mut mel_db = Vec::with_capacity(n_frames * self.params.n_mels);
        let mut peak_db = f32::NEG_INFINITY;

        for frame in 0..n_frames {
            let start = frame * hop;
            for (i, cell) in buffer.iter_mut().enumerate() {
                // Index into the zero-padded signal
                let sample = (start + i)
                    .checked_sub(pad)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *cell = Complex::new(sample * self.window[i], 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (p, c) in power.iter_mut().zip(&buffer) {
                *p = c.re * c.re + c.im * c.im;
            }

            for filter in &self.mel_filters {
                let energy: f64 = filter
                    .iter()
                    .map(|&(bin, weight)| power[bin] as f64 * weight as f64)
                    .sum();
                let db = 10.0 * (energy as f32).max(AMIN).log10();
                peak_db = peak_db.max(db);
                mel_db.push(db);
            }
        }

        let floor = peak_db - TOP_DB;
        for db in mel_db.iter_mut() {
            *db = db.max(floor);
        }

        (mel_db, n_frames)
    }
}

/// Extract a time-averaged MFCC vector with the default mel band count
pub fn extract(
    samples: &[f32],
    sample_rate: u32,
    n_coefficients: usize,
    fft_window_size: usize,
    hop_length: usize,
) -> PipelineResult<FeatureVector> {
    let extractor = MfccExtractor::new(MfccParams {
        sample_rate,
        n_coefficients,
        fft_window_size,
        hop_length,
        n_mels: DEFAULT_N_MELS,
    })?;
    extractor.extract(samples)
}

fn extraction_error(msg: impl Into<String>) -> PipelineError {
    PipelineError::FeatureExtraction(msg.into())
}

/// Periodic Hann window
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos()) as f32)
        .collect()
}

// Slaney mel scale: linear below 1 kHz, logarithmic above
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular filters from 0 Hz to Nyquist, each scaled to unit area
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<(usize, f32)>> {
    let sr = sample_rate as f64;
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins).map(|j| j as f64 * sr / n_fft as f64).collect();

    let mel_max = hz_to_mel(sr / 2.0);
    let mel_min = hz_to_mel(0.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|k| mel_to_hz(mel_min + (mel_max - mel_min) * k as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|m| {
            let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (right - left);
            fft_freqs
                .iter()
                .enumerate()
                .filter_map(|(bin, &f)| {
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    let w = lower.min(upper).max(0.0) * enorm;
                    (w > 0.0).then_some((bin, w as f32))
                })
                .collect()
        })
        .collect()
}

/// Orthonormal DCT-II basis, first `n_out` rows
fn dct_ortho_basis(n_out: usize, n_in: usize) -> Vec<Vec<f64>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}
