//! Run summary generation.
//!
//! This module renders the end-of-run summary as Markdown or JSON and
//! writes it next to the report tables.

use crate::error::AnalysisResult;
use crate::models::DatasetSummary;
use crate::report::sink::CsvSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl SummaryFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SummaryFormat::Markdown => "md",
            SummaryFormat::Json => "json",
        }
    }
}

/// Counts of flagged entities in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FindingCounts {
    pub transaction_anomalies: usize,
    pub customer_anomalies: usize,
    pub merchant_anomalies: usize,
    pub high_risk_merchants: usize,
    pub high_risk_categories: usize,
    pub high_risk_periods: usize,
}

/// Everything reported at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub database: String,
    pub dataset: DatasetSummary,
    pub findings: FindingCounts,
    pub files_written: Vec<PathBuf>,
    pub duration_seconds: f64,
}

/// Generate the Markdown summary.
pub fn generate_markdown_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str("# Transaction Analysis Summary\n\n");
    output.push_str(&generate_metadata_section(summary));
    output.push_str(&generate_dataset_section(&summary.dataset));
    output.push_str(&generate_findings_section(&summary.findings));
    output.push_str(&generate_files_section(&summary.files_written));

    output
}

fn generate_metadata_section(summary: &RunSummary) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Database:** `{}`\n", summary.database));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        summary.duration_seconds
    ));

    section
}

fn generate_dataset_section(dataset: &DatasetSummary) -> String {
    let mut section = String::new();
    let or_blank = |v: Option<f64>| v.map(|v| format!("{:.2}", v)).unwrap_or_default();

    section.push_str("## Dataset\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|---:|\n");
    section.push_str(&format!("| Transactions | {} |\n", dataset.total_transactions));
    section.push_str(&format!("| Customers | {} |\n", dataset.unique_customers));
    section.push_str(&format!("| Merchants | {} |\n", dataset.unique_merchants));
    section.push_str(&format!("| Total amount | {:.2} |\n", dataset.total_amount));
    section.push_str(&format!("| Average amount | {} |\n", or_blank(dataset.avg_amount())));
    section.push_str(&format!("| Fraudulent | {} |\n", dataset.fraud_count));
    section.push_str(&format!("| Fraud rate (%) | {} |\n\n", or_blank(dataset.fraud_rate())));

    section
}

fn generate_findings_section(findings: &FindingCounts) -> String {
    let mut section = String::new();

    section.push_str("## Findings\n\n");
    section.push_str("| Finding | Count |\n");
    section.push_str("|:---|---:|\n");
    for (label, count) in [
        ("Transaction anomalies", findings.transaction_anomalies),
        ("Customer anomalies", findings.customer_anomalies),
        ("Merchant anomalies", findings.merchant_anomalies),
        ("High-risk merchants", findings.high_risk_merchants),
        ("High-risk categories", findings.high_risk_categories),
        ("High-risk periods", findings.high_risk_periods),
    ] {
        section.push_str(&format!("| {} | {} |\n", label, count));
    }
    section.push('\n');

    section
}

fn generate_files_section(files: &[PathBuf]) -> String {
    let mut section = String::new();

    section.push_str("## Files Written\n\n");
    if files.is_empty() {
        section.push_str("No files were written.\n");
        return section;
    }
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        section.push_str(&format!("- `{}`\n", name));
    }

    section
}

/// Generate the JSON summary.
pub fn generate_json_summary(summary: &RunSummary) -> AnalysisResult<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Write the summary as `analysis_summary_<date>.<ext>` in the sink directory.
pub fn write_summary(
    summary: &RunSummary,
    format: SummaryFormat,
    sink: &CsvSink,
) -> AnalysisResult<PathBuf> {
    let content = match format {
        SummaryFormat::Markdown => generate_markdown_summary(summary),
        SummaryFormat::Json => generate_json_summary(summary)?,
    };

    let path = sink.path_for("analysis_summary", format.extension());
    std::fs::write(&path, content)?;
    Ok(path)
}
