//! # Export Engine
//!
//! Serializes a filtered deployment listing into a downloadable file. The
//! listing is produced by the query engine with the caller's filters, minus
//! pagination, so an export always matches what the dashboard shows.

use thiserror::Error;

use depot_core::Timestamp;
use depot_state::Deployment;

use crate::query::{filter_sorted, DeploymentQuery};

const HEADER: [&str; 6] = [
    "item",
    "status",
    "priority",
    "tellers",
    "expectedReturn",
    "completion",
];

/// Failure while writing an export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write export row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to finish export: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values.
    Csv,
    /// Tab-separated table that spreadsheets import directly.
    Table,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "csv" => Some(Self::Csv),
            "table" | "tsv" => Some(Self::Table),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Table => "text/tab-separated-values",
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            Self::Csv => "deployments-export.csv",
            Self::Table => "deployments-export.tsv",
        }
    }

    fn delimiter(&self) -> u8 {
        match self {
            Self::Csv => b',',
            Self::Table => b'\t',
        }
    }
}

/// A rendered export ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub content_type: &'static str,
    pub filename: &'static str,
    pub bytes: Vec<u8>,
}

/// Export every deployment matching `query`.
pub fn export(
    deployments: Vec<Deployment>,
    query: &DeploymentQuery,
    format: ExportFormat,
    now: Timestamp,
) -> Result<ExportFile, ExportError> {
    let rows = filter_sorted(deployments, query, now);
    let bytes = render(&rows, format)?;
    tracing::info!(rows = rows.len(), format = format.filename(), "deployments exported");
    Ok(ExportFile {
        content_type: format.content_type(),
        filename: format.filename(),
        bytes,
    })
}

fn render(rows: &[Deployment], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for d in rows {
        let tellers = d
            .assigned_tellers
            .iter()
            .map(|t| t.teller_name.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let (complete, total) = d.completion_counts();
        writer.write_record([
            d.item_name.as_str(),
            d.status.as_str(),
            d.priority.as_str(),
            tellers.as_str(),
            d.expected_return_date.to_date_string().as_str(),
            format!("{complete}/{total}").as_str(),
        ])?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}
