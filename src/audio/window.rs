//! Fixed-duration analysis window

/// Waveform resized to exactly the analysis window length
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWaveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl NormalizedWaveform {
    pub fn samples(&self) -> &[f32] {
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

    /// Get duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate.max(1) as f32
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Zero-pad at the end or keep the prefix so the result has `target` samples
pub fn fit_to_length<T: Copy + Default>(samples: &[T], target: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(target);
    out.extend_from_slice(&samples[..samples.len().min(target)]);
    out.resize(target, T::default());
    out
}

/// Resize a waveform to the fixed analysis window.
///
/// Longer input keeps its first `target_sample_count` samples; the start of a
/// capture is taken as the most representative part.
pub fn normalize(
    samples: Vec<f32>,
    sample_rate: u32,
    target_sample_count: usize,
) -> NormalizedWaveform {
    NormalizedWaveform {
        samples: fit_to_length(&samples, target_sample_count),
        sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        let n = 100;
        for len in [0, n - 1, n, n + 1, 10 * n] {
            let input: Vec<f32> = (0..len).map(|i| i as f32).collect();
            let out = normalize(input, 10, n);
            assert_eq!(out.len(), n, "input length {}", len);
        }
    }

    #[test]
    fn test_matches_fit_to_length() {
        let input: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        for target in [0, 10, 37, 64] {
            let out = normalize(input.clone(), 10, target);
            assert_eq!(out.samples(), fit_to_length(&input, target).as_slice());
        }
    }

    #[test]
    fn test_pad_with_zeros() {
        let out = normalize(vec![1.0, 2.0], 10, 5);
        assert_eq!(out.samples(), &[1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_keeps_prefix() {
        let out = normalize(vec![1.0, 2.0, 3.0, 4.0], 10, 2);
        assert_eq!(out.samples(), &[1.0, 2.0]);
    }

    #[test]
    fn test_identity() {
        let input = vec![0.5, -0.5, 0.25];
        let out = normalize(input.clone(), 10, 3);
        assert_eq!(out.into_samples(), input);
    }

    #[test]
    fn test_fit_to_length_generic() {
        assert_eq!(fit_to_length(&[7i16, 8, 9], 2), vec![7, 8]);
        assert_eq!(fit_to_length(&[7i16], 3), vec![7, 0, 0]);
        assert!(fit_to_length::<i16>(&[], 0).is_empty());
    }

    #[test]
    fn test_duration() {
        let out = normalize(Vec::new(), 22050, 220_500);
        assert!((out.duration() - 10.0).abs() < 1e-6);
    }
}
