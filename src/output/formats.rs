//! Output format implementations

use serde::Serialize;

use super::Report;

/// JSON output structure
#[derive(Debug, Serialize)]
struct JsonOutput<'a> {
    class: &'a str,
    confidence: f64,
}

/// Whole percent, truncated toward zero
pub fn whole_percent(report: &Report) -> u32 {
    report.confidence_percent.trunc() as u32
}

/// Format as `label|Conf: NN%`
pub fn format_text(report: &Report) -> String {
    format!("{}|Conf: {}%", report.label, whole_percent(report))
}

/// Format as JSON
pub fn format_json(report: &Report) -> String {
    let output = JsonOutput {
        class: &report.label,
        confidence: report.confidence_percent,
    };

    serde_json::to_string(&output)
        .unwrap_or_else(|_| format!("{{\"class\": \"{}\"}}", report.label))
}
