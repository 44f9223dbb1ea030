//! Report formatting, console output and result persistence

pub mod formats;
pub mod report;
pub mod store;

use std::io::{self, Write};

use crate::config::{OutputConfig, OutputFormat};

pub use formats::{format_json, format_text, whole_percent};
pub use report::{report, Report};
pub use store::{JsonFileStore, MemoryStore, PersistedReport, ReportStore};

/// Writes reports to the console in the configured format
pub struct OutputWriter {
    config: OutputConfig,
}

impl OutputWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write a report to stdout, if console output is enabled
    pub fn write(&self, report: &Report) -> io::Result<()> {
        if !self.config.enable_console {
            return Ok(());
        }
        let mut stdout = io::stdout().lock();
        self.write_to(&mut stdout, report)?;
        stdout.flush()
    }

    pub fn write_to<W: Write>(&self, out: &mut W, report: &Report) -> io::Result<()> {
        writeln!(out, "{}", self.format(report))
    }

    /// Format the report according to configured format
    pub fn format(&self, report: &Report) -> String {
        match self.config.format {
            OutputFormat::Text => format_text(report),
            OutputFormat::Json => format_json(report),
        }
    }
}
