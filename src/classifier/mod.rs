//! Classifier adapter and scoring backends

pub mod adapter;
pub mod scorer;
pub mod tree;

pub use adapter::{classify, confidence, derive, ClassificationResult};
pub use scorer::{Exclusive, FnScorer, ScoreMut, Scorer};
pub use tree::{load_model, TreeEnsemble};
