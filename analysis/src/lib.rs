//! Exporters turning a target's collected statistics into files

pub mod csv_export;
pub mod plot;

use serde::Deserialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};
use thiserror::Error;
use ycsb_ingest::{Field, MetricSet};

pub use csv_export::CsvExporter;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export file")]
    Io(#[from] std::io::Error),
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to draw plot: {0}")]
    Plot(String),
}

/// Writes statistics to some output format
/// every method receives a path without extension and returns the path actually written
pub trait Exporter {
    /// raw export, one row per record with the selected fields
    fn export(
        &self,
        stats: &MetricSet,
        path: &Path,
        key: Field,
        fields: &[Field],
    ) -> Result<PathBuf, ExportError>;

    /// per-key mean of the selected fields, ordered by key
    fn export_averages(
        &self,
        stats: &MetricSet,
        path: &Path,
        key: Field,
        fields: &[Field],
    ) -> Result<PathBuf, ExportError>;

    fn export_averages_plot(
        &self,
        stats: &MetricSet,
        path: &Path,
        title: &str,
        key: Field,
        fields: &[Field],
    ) -> Result<PathBuf, ExportError>;
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "CSV")]
    Csv,
}

impl OutputFormat {
    pub fn exporter(self) -> Box<dyn Exporter> {
        match self {
            Self::Csv => Box::new(CsvExporter),
        }
    }
}

/// append an extension without touching dots already present in the file name
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);

    PathBuf::from(raw)
}
