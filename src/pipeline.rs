//! Request pipeline: PCM bytes in, labelled report out

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{encode, normalize, resample, CanonicalWaveform, NormalizedWaveform, PcmFormat};
use crate::classifier::{classify, ClassificationResult, Scorer};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult, Result};
use crate::features::{FeatureVector, MfccExtractor, MfccParams};
use crate::output::{report, Report, ReportStore};

/// Outcome of a successful classification
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub result: ClassificationResult,
    pub report: Report,
}

/// Front half of the pipeline: PCM bytes to a feature vector.
///
/// Needs no model, so feature dumps and format conversion can run without
/// one.
pub struct FeaturePipeline {
    format: PcmFormat,
    gain: f32,
    analysis_rate: u32,
    target_sample_count: usize,
    duration_seconds: f32,
    extractor: MfccExtractor,
}

impl FeaturePipeline {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let features = &config.features;
        let extractor = MfccExtractor::new(MfccParams::from(features))?;

        Ok(Self {
            format: PcmFormat::from(&config.capture),
            gain: config.capture.gain,
            analysis_rate: features.sample_rate,
            target_sample_count: features.target_sample_count(),
            duration_seconds: features.duration_seconds,
            extractor,
        })
    }

    pub fn n_coefficients(&self) -> usize {
        self.extractor.params().n_coefficients
    }

    /// Encode raw PCM into the canonical waveform
    pub fn encode(&self, pcm: &[u8]) -> PipelineResult<CanonicalWaveform> {
        if pcm.is_empty() {
            return Err(no_samples());
        }
        encode(pcm, &self.format, self.gain)
    }

    /// Encode, resample and fit to the analysis window
    pub fn prepare(&self, pcm: &[u8]) -> PipelineResult<NormalizedWaveform> {
        let waveform = self.encode(pcm)?;
        self.prepare_waveform(&waveform)
    }

    /// Resample an already encoded waveform and fit it to the analysis window
    pub fn prepare_waveform(
        &self,
        waveform: &CanonicalWaveform,
    ) -> PipelineResult<NormalizedWaveform> {
        if waveform.is_empty() {
            return Err(no_samples());
        }

        let samples = waveform.to_f32();
        // Anything past the window would be dropped after resampling anyway
        let limit = self.source_sample_limit(waveform.sample_rate());
        let window = &samples[..samples.len().min(limit)];

        let resampled = resample(window, waveform.sample_rate(), self.analysis_rate)?;
        debug!(
            "Fitting {} samples to {} @ {} Hz",
            resampled.len(),
            self.target_sample_count,
            self.analysis_rate
        );

        Ok(normalize(
            resampled,
            self.analysis_rate,
            self.target_sample_count,
        ))
    }

    /// Source samples needed to cover the analysis window at `sample_rate`
    fn source_sample_limit(&self, sample_rate: u32) -> usize {
        (self.duration_seconds as f64 * sample_rate as f64).ceil() as usize
    }

    /// Feature vector for one capture
    pub fn features(&self, pcm: &[u8]) -> PipelineResult<FeatureVector> {
        let normalized = self.prepare(pcm)?;
        self.extractor.extract_waveform(&normalized)
    }

    /// Feature vector for an already encoded waveform
    pub fn waveform_features(&self, waveform: &CanonicalWaveform) -> PipelineResult<FeatureVector> {
        let normalized = self.prepare_waveform(waveform)?;
        self.extractor.extract_waveform(&normalized)
    }
}

/// Audio-to-classification pipeline.
///
/// Holds only read-only state, so one instance can serve concurrent requests
/// by shared reference. Every buffer is owned by the request that made it.
pub struct Pipeline {
    front: FeaturePipeline,
    scorer: Arc<dyn Scorer>,
    labels: Vec<String>,
}

impl Pipeline {
    pub fn new(config: &Config, scorer: Arc<dyn Scorer>) -> Result<Self> {
        let front = FeaturePipeline::new(config)?;

        if scorer.input_width() != front.n_coefficients() {
            warn!(
                "Scorer expects {} features but extractor produces {}; every request will fail",
                scorer.input_width(),
                front.n_coefficients()
            );
        }

        info!(
            "Pipeline ready: {} Hz x{} capture, {} Hz x {:.1}s analysis, {} coefficients, {} labels",
            config.capture.sample_rate,
            config.capture.channels,
            config.features.sample_rate,
            config.features.duration_seconds,
            config.features.n_coefficients,
            config.classifier.labels.len()
        );

        Ok(Self {
            front,
            scorer,
            labels: config.classifier.labels.clone(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn encode(&self, pcm: &[u8]) -> PipelineResult<CanonicalWaveform> {
        self.front.encode(pcm)
    }

    pub fn prepare(&self, pcm: &[u8]) -> PipelineResult<NormalizedWaveform> {
        self.front.prepare(pcm)
    }

    pub fn features(&self, pcm: &[u8]) -> PipelineResult<FeatureVector> {
        self.front.features(pcm)
    }

    /// Run the whole chain for one capture
    pub fn classify(&self, pcm: &[u8]) -> PipelineResult<Prediction> {
        let features = self.front.features(pcm)?;
        self.predict(&features, pcm.len())
    }

    /// Classify a waveform that was already encoded, e.g. read from WAV
    pub fn classify_waveform(&self, waveform: &CanonicalWaveform) -> PipelineResult<Prediction> {
        let features = self.front.waveform_features(waveform)?;
        self.predict(&features, waveform.len() * 2)
    }

    fn predict(&self, features: &FeatureVector, input_bytes: usize) -> PipelineResult<Prediction> {
        let result = classify(features, self.scorer.as_ref(), self.labels.len())?;
        let report = report(&result, &self.labels)?;

        info!(
            "Classified {} bytes as {} ({:.2}%)",
            input_bytes, report.label, report.confidence_percent
        );

        Ok(Prediction { result, report })
    }

    /// Classify and persist the report. Nothing is stored on failure.
    pub fn classify_and_record(&self, pcm: &[u8], store: &dyn ReportStore) -> Result<Prediction> {
        let prediction = self.classify(pcm)?;
        store.save(&prediction.report, &prediction.result)?;
        Ok(prediction)
    }

    /// [`Pipeline::classify_and_record`] for an already encoded waveform
    pub fn classify_waveform_and_record(
        &self,
        waveform: &CanonicalWaveform,
        store: &dyn ReportStore,
    ) -> Result<Prediction> {
        let prediction = self.classify_waveform(waveform)?;
        store.save(&prediction.report, &prediction.result)?;
        Ok(prediction)
    }
}

fn no_samples() -> PipelineError {
    PipelineError::FeatureExtraction("no audio samples captured".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FnScorer;
    use crate::error::{ErrorKind, HeartSoundError};
    use crate::output::MemoryStore;

    /// Short windows keep the tests fast
    fn test_config() -> Config {
        let mut config = Config::default();
        config.capture.sample_rate = 8000;
        config.features.sample_rate = 4000;
        config.features.duration_seconds = 1.0;
        config.features.fft_window_size = 512;
        config.features.hop_length = 128;
        config.features.n_mels = 40;
        config.features.n_coefficients = 13;
        config
    }

    fn constant_scorer(width: usize, value: f64) -> Arc<dyn Scorer> {
        Arc::new(FnScorer::new(width, move |_: &[f32]| Ok(value)))
    }

    fn tone_pcm(samples: usize, rate: u32) -> Vec<u8> {
        (0..samples)
            .map(|i| {
                let t = i as f32 / rate as f32;
                ((2.0 * std::f32::consts::PI * 220.0 * t).sin() * 1000.0) as i16
            })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_prepare_length_is_fixed() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 2.0)).unwrap();
        for n in [1, 100, 8000, 8001, 40_000] {
            let prepared = pipeline.prepare(&tone_pcm(n, 8000)).unwrap();
            assert_eq!(prepared.len(), 4000, "input of {} samples", n);
            assert_eq!(prepared.sample_rate(), 4000);
        }
    }

    #[test]
    fn test_classify_reports_label() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 1.2)).unwrap();
        let prediction = pipeline.classify(&tone_pcm(8000, 8000)).unwrap();

        assert_eq!(prediction.result.class_index, 1);
        assert_eq!(prediction.report.label, "murmur");
        assert!((prediction.report.confidence_percent - 100.0 / 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 0.0)).unwrap();
        let err = pipeline.classify(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FeatureExtraction);
    }

    #[test]
    fn test_odd_byte_count() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 0.0)).unwrap();
        let err = pipeline.classify(&[0u8; 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedAudio);
    }

    #[test]
    fn test_failure_records_nothing() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(12, 0.0)).unwrap();
        let store = MemoryStore::new();

        let err = pipeline
            .classify_and_record(&tone_pcm(8000, 8000), &store)
            .unwrap_err();
        assert!(matches!(
            err,
            HeartSoundError::Pipeline(PipelineError::FeatureShape {
                expected: 12,
                actual: 13
            })
        ));
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn test_success_is_recorded() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 3.0)).unwrap();
        let store = MemoryStore::new();

        let prediction = pipeline
            .classify_and_record(&tone_pcm(8000, 8000), &store)
            .unwrap();
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.label, "extrahls");
        assert_eq!(latest.to_report(), prediction.report);
    }

    #[test]
    fn test_empty_waveform() {
        let front = FeaturePipeline::new(&test_config()).unwrap();
        let waveform = CanonicalWaveform::new(Vec::new(), 8000);
        assert!(matches!(
            front.waveform_features(&waveform),
            Err(PipelineError::FeatureExtraction(_))
        ));
    }

    #[test]
    fn test_waveform_path_matches_bytes() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 2.0)).unwrap();
        let pcm = tone_pcm(8000, 8000);
        let waveform = pipeline.encode(&pcm).unwrap();

        assert_eq!(
            pipeline.classify_waveform(&waveform).unwrap(),
            pipeline.classify(&pcm).unwrap()
        );
    }

    #[test]
    fn test_waveform_at_other_rate_keeps_full_window() {
        let mut config = test_config();
        config.features.duration_seconds = 2.0;
        let front = FeaturePipeline::new(&config).unwrap();

        // 2 s at twice the capture rate
        let waveform = CanonicalWaveform::new(vec![10000; 32000], 16000);
        let prepared = front.prepare_waveform(&waveform).unwrap();
        assert_eq!(prepared.len(), 8000);

        // Away from the resampler's edges the second second must still carry signal
        let tail = &prepared.samples()[5000..7500];
        assert!(
            tail.iter().all(|&s| (s - 10000.0 / 32768.0).abs() < 0.05),
            "second half of a 2 s capture was lost"
        );
    }

    #[test]
    fn test_waveform_record_matches_bytes_record() {
        let pipeline = Pipeline::new(&test_config(), constant_scorer(13, 1.0)).unwrap();
        let pcm = tone_pcm(8000, 8000);
        let waveform = pipeline.encode(&pcm).unwrap();

        let from_bytes = MemoryStore::new();
        let from_waveform = MemoryStore::new();
        let expected = pipeline.classify_and_record(&pcm, &from_bytes).unwrap();
        let prediction = pipeline
            .classify_waveform_and_record(&waveform, &from_waveform)
            .unwrap();

        assert_eq!(prediction, expected);
        assert_eq!(from_waveform.latest().unwrap(), from_bytes.latest().unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.classifier.labels.clear();
        assert!(matches!(
            Pipeline::new(&config, constant_scorer(13, 0.0)),
            Err(HeartSoundError::Config(_))
        ));
    }
}
