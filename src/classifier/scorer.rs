//! Scoring capability consumed by the classifier adapter

use parking_lot::Mutex;

use crate::error::ModelError;

/// Opaque regressor: a fixed-width feature vector in, one continuous value out.
///
/// # Thread Safety
///
/// Implementations are shared across concurrent requests and must be safe to
/// call from several threads at once. Backends that need `&mut self` to score
/// implement [`ScoreMut`] and are wrapped in [`Exclusive`].
pub trait Scorer: Send + Sync {
    /// Number of features the scorer expects
    fn input_width(&self) -> usize;

    /// Score one feature vector
    fn score(&self, features: &[f32]) -> Result<f64, ModelError>;
}

impl<S: Scorer + ?Sized> Scorer for std::sync::Arc<S> {
    fn input_width(&self) -> usize {
        (**self).input_width()
    }

    fn score(&self, features: &[f32]) -> Result<f64, ModelError> {
        (**self).score(features)
    }
}

/// Scorer backed by a closure
pub struct FnScorer<F> {
    width: usize,
    func: F,
}

impl<F> FnScorer<F>
where
    F: Fn(&[f32]) -> Result<f64, ModelError> + Send + Sync,
{
    pub fn new(width: usize, func: F) -> Self {
        Self { width, func }
    }
}

impl<F> Scorer for FnScorer<F>
where
    F: Fn(&[f32]) -> Result<f64, ModelError> + Send + Sync,
{
    fn input_width(&self) -> usize {
        self.width
    }

    fn score(&self, features: &[f32]) -> Result<f64, ModelError> {
        (self.func)(features)
    }
}

/// A scoring backend that is not reentrant
pub trait ScoreMut: Send {
    fn input_width(&self) -> usize;

    fn score_mut(&mut self, features: &[f32]) -> Result<f64, ModelError>;
}

/// Serializes calls into a non-reentrant backend.
///
/// The lock is held for the scoring call only, so the rest of each request
/// runs concurrently.
pub struct Exclusive<S> {
    width: usize,
    inner: Mutex<S>,
}

impl<S: ScoreMut> Exclusive<S> {
    pub fn new(backend: S) -> Self {
        Self {
            width: backend.input_width(),
            inner: Mutex::new(backend),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner()
    }
}

impl<S: ScoreMut> Scorer for Exclusive<S> {
    fn input_width(&self) -> usize {
        self.width
    }

    fn score(&self, features: &[f32]) -> Result<f64, ModelError> {
        self.inner.lock().score_mut(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Counting {
        calls: usize,
    }

    impl ScoreMut for Counting {
        fn input_width(&self) -> usize {
            2
        }

        fn score_mut(&mut self, features: &[f32]) -> Result<f64, ModelError> {
            self.calls += 1;
            Ok(features.iter().map(|&f| f as f64).sum())
        }
    }

    #[test]
    fn test_fn_scorer() {
        let scorer = FnScorer::new(3, |f: &[f32]| Ok(f.len() as f64));
        assert_eq!(scorer.input_width(), 3);
        assert_eq!(scorer.score(&[0.0; 3]).unwrap(), 3.0);
    }

    #[test]
    fn test_exclusive_serializes_calls() {
        let scorer = Arc::new(Exclusive::new(Counting { calls: 0 }));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let scorer = Arc::clone(&scorer);
                s.spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(scorer.score(&[1.0, 2.0]).unwrap(), 3.0);
                    }
                });
            }
        });

        let backend = Arc::try_unwrap(scorer).ok().unwrap().into_inner();
        assert_eq!(backend.calls, 800);
    }

    #[test]
    fn test_arc_forwarding() {
        let scorer: Arc<dyn Scorer> = Arc::new(FnScorer::new(1, |_: &[f32]| Ok(0.25)));
        let wrapped = Arc::new(scorer);
        assert_eq!(wrapped.input_width(), 1);
        assert_eq!(wrapped.score(&[0.0]).unwrap(), 0.25);
    }
}
