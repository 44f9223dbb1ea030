//! Audio processing modules

pub mod encoder;
pub mod resample;
pub mod window;

pub use encoder::{encode, CanonicalWaveform, PcmFormat};
pub use resample::resample;
pub use window::{fit_to_length, normalize, NormalizedWaveform};
