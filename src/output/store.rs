//! Persistence of the most recent successful classification

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use super::Report;
use crate::classifier::ClassificationResult;
use crate::error::StoreError;

/// On-disk record, readable by anything that understands
/// `{"class": ..., "confidence": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedReport {
    #[serde(rename = "class")]
    pub label: String,
    /// Percent, as in [`Report::confidence_percent`]
    pub confidence: f64,
    #[serde(default)]
    pub class_index: usize,
    #[serde(default)]
    pub raw_value: f64,
}

impl PersistedReport {
    pub fn new(report: &Report, result: &ClassificationResult) -> Self {
        Self {
            label: report.label.clone(),
            confidence: report.confidence_percent,
            class_index: report.class_index,
            raw_value: result.raw_value,
        }
    }

    pub fn to_report(&self) -> Report {
        Report {
            label: self.label.clone(),
            class_index: self.class_index,
            confidence_percent: self.confidence,
        }
    }
}

/// Keeps the last successful classification.
///
/// A reader never observes a partially written record.
pub trait ReportStore: Send + Sync {
    fn save(&self, report: &Report, result: &ClassificationResult) -> Result<(), StoreError>;

    fn latest(&self) -> Result<Option<PersistedReport>, StoreError>;
}

/// JSON file replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl ReportStore for JsonFileStore {
    fn save(&self, report: &Report, result: &ClassificationResult) -> Result<(), StoreError> {
        let record = PersistedReport::new(report, result);
        let json = serde_json::to_vec_pretty(&record)?;

        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;

        // Same directory so the rename stays on one filesystem
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::Persist(e.to_string()))?;

        debug!("Saved last result to {}", self.path.display());
        Ok(())
    }

    fn latest(&self) -> Result<Option<PersistedReport>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    last: RwLock<Option<PersistedReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryStore {
    fn save(&self, report: &Report, result: &ClassificationResult) -> Result<(), StoreError> {
        *self.last.write() = Some(PersistedReport::new(report, result));
        Ok(())
    }

    fn latest(&self) -> Result<Option<PersistedReport>, StoreError> {
        Ok(self.last.read().clone())
    }
}
