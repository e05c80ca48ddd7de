use crate::analysis::AnalysisReport;
use anyhow::{Context, Result};

pub fn render(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize analysis report")
}
