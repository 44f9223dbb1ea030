//! Heart Sound Classifier
//!
//! Turns a raw PCM capture from a digital stethoscope into a labelled
//! diagnosis with a confidence score.
//!
//! # Architecture
//!
//! The system is organized into the following modules:
//!
//! - `audio`: PCM encoding, WAV container I/O, resampling and the fixed analysis window
//! - `features`: time-averaged MFCC extraction
//! - `classifier`: the scoring capability, tree ensemble backend and class mapping
//! - `output`: reports, formatting and persistence of the last result
//! - `pipeline`: the request chain tying the stages together
//! - `config`: Configuration structures
//! - `error`: Error types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use heartsound_rs::{load_model, Config, JsonFileStore, Pipeline};
//!
//! let config = Config::default();
//! let model = load_model(&config.classifier.model_path).unwrap();
//! let pipeline = Pipeline::new(&config, Arc::new(model)).unwrap();
//!
//! let pcm = std::fs::read("capture.raw").unwrap();
//! let store = JsonFileStore::new(&config.output.state_path);
//! let prediction = pipeline.classify_and_record(&pcm, &store).unwrap();
//! println!("{}", heartsound_rs::format_text(&prediction.report));
//! ```

pub mod audio;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod pipeline;

// Re-exports for convenience
pub use audio::{encode, normalize, resample, CanonicalWaveform, NormalizedWaveform, PcmFormat};
pub use classifier::{
    classify, load_model, ClassificationResult, Exclusive, FnScorer, ScoreMut, Scorer,
    TreeEnsemble,
};
pub use config::{CaptureConfig, ClassifierConfig, Config, FeatureConfig, OutputConfig};
pub use error::{
    ConfigError, ErrorKind, HeartSoundError, ModelError, PipelineError, PipelineResult, Result,
    StoreError,
};
pub use features::{extract, FeatureVector, MfccExtractor, MfccParams};
pub use output::{
    format_json, format_text, report, JsonFileStore, MemoryStore, OutputWriter, PersistedReport,
    Report, ReportStore,
};
pub use pipeline::{FeaturePipeline, Pipeline, Prediction};
