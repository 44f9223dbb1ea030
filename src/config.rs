//! Configuration structures for the heart sound classifier

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Class names the bundled regressor was trained on, in index order
pub const DEFAULT_LABELS: [&str; 5] = ["artifact", "murmur", "normal", "extrahls", "extrastole"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.sample_rate == 0 {
            return Err(invalid("capture.sample_rate", capture.sample_rate));
        }
        if capture.channels == 0 {
            return Err(invalid("capture.channels", capture.channels));
        }
        if capture.sample_width != 2 {
            return Err(invalid("capture.sample_width", capture.sample_width));
        }
        if !capture.gain.is_finite() || capture.gain < 0.0 {
            return Err(invalid("capture.gain", capture.gain));
        }

        let features = &self.features;
        if features.sample_rate == 0 {
            return Err(invalid("features.sample_rate", features.sample_rate));
        }
        if !features.duration_seconds.is_finite() || features.duration_seconds <= 0.0 {
            return Err(invalid("features.duration_seconds", features.duration_seconds));
        }
        if features.fft_window_size < 2 {
            return Err(invalid("features.fft_window_size", features.fft_window_size));
        }
        if features.hop_length == 0 {
            return Err(invalid("features.hop_length", features.hop_length));
        }
        if features.n_mels == 0 {
            return Err(invalid("features.n_mels", features.n_mels));
        }
        if features.n_coefficients == 0 || features.n_coefficients > features.n_mels {
            return Err(invalid("features.n_coefficients", features.n_coefficients));
        }
        if features.target_sample_count() < features.fft_window_size {
            return Err(invalid("features.duration_seconds", features.duration_seconds));
        }

        if self.classifier.labels.is_empty() {
            return Err(invalid("classifier.labels", "[]"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Format of the raw capture uploaded by the sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture sample rate (Hz)
    pub sample_rate: u32,
    /// Interleaved channels in the raw stream
    pub channels: u16,
    /// Bytes per sample (only 2 is supported)
    pub sample_width: u16,
    /// Linear gain applied before clipping
    pub gain: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            channels: 1,
            sample_width: 2,
            gain: 10.0,
        }
    }
}

/// Feature extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Analysis sample rate (Hz); captures are resampled to it
    pub sample_rate: u32,
    /// Fixed analysis window (seconds)
    pub duration_seconds: f32,
    /// Number of cepstral coefficients in the feature vector
    pub n_coefficients: usize,
    /// STFT window size in samples
    pub fft_window_size: usize,
    /// STFT hop in samples
    pub hop_length: usize,
    /// Mel filterbank size
    pub n_mels: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            duration_seconds: 10.0,
            n_coefficients: 52,
            fft_window_size: 2048,
            hop_length: 512,
            n_mels: 128,
        }
    }
}

impl FeatureConfig {
    /// Exact length of every normalized waveform
    pub fn target_sample_count(&self) -> usize {
        (self.sample_rate as f64 * self.duration_seconds as f64).round() as usize
    }
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Path to the XGBoost JSON model dump
    pub model_path: PathBuf,
    /// Class labels, indexed by class index
    pub labels: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/xgb_regressor.json"),
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Console output format
    pub format: OutputFormat,
    /// Where the last successful classification is kept
    pub state_path: PathBuf,
    /// Also write the canonical waveform as a WAV file
    pub wav_path: Option<PathBuf>,
    /// Enable console output
    pub enable_console: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            state_path: PathBuf::from("./data.json"),
            wav_path: None,
            enable_console: true,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `label|Conf: NN%`
    Text,
    /// JSON record
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(invalid("output.format", other)),
        }
    }
}
