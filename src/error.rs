//! Custom error types for the heart sound classifier

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum HeartSoundError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),

    #[error("WAV container error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of a [`PipelineError`], for callers that map failures onto
/// transport-level responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedAudio,
    FeatureExtraction,
    FeatureShape,
    Classifier,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::MalformedAudio => write!(f, "malformed_audio"),
            ErrorKind::FeatureExtraction => write!(f, "feature_extraction"),
            ErrorKind::FeatureShape => write!(f, "feature_shape"),
            ErrorKind::Classifier => write!(f, "classifier"),
        }
    }
}

/// Per-request failures of the audio-to-classification pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("Feature shape mismatch: classifier expects {expected} values, got {actual}")]
    FeatureShape { expected: usize, actual: usize },

    #[error("Classifier error: {0}")]
    Classifier(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MalformedAudio(_) => ErrorKind::MalformedAudio,
            PipelineError::FeatureExtraction(_) => ErrorKind::FeatureExtraction,
            PipelineError::FeatureShape { .. } => ErrorKind::FeatureShape,
            PipelineError::Classifier(_) => ErrorKind::Classifier,
        }
    }
}

/// Model loading and scoring errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Unsupported model: {0}")]
    Unsupported(String),

    #[error("Scoring failed: {0}")]
    Scoring(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

/// Errors from persisting or reading the last classification
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to replace record: {0}")]
    Persist(String),
}

pub type Result<T> = std::result::Result<T, HeartSoundError>;

/// Result alias for the per-request pipeline stages
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
