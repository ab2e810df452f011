//! Effective YCSB workload files
//!
//! A workload is a Java properties file. The runner never hands the configured
//! file to YCSB directly, instead the base properties are merged with the
//! per-target overrides and written to a temporary file.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Failed to read workload file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write the effective workload file")]
    Write(#[from] io::Error),
}

/// parse java properties into a sorted map, later keys win
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(index) => (line[..index].trim(), line[index + 1..].trim()),
            None => (line, ""),
        })
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

#[derive(Debug)]
pub struct Workload {
    properties: BTreeMap<String, String>,
    file: NamedTempFile,
}

impl Workload {
    /// read `base`, apply `overrides` and write the result to a fresh temporary file
    pub fn load(base: &Path, overrides: &BTreeMap<String, String>) -> Result<Self, WorkloadError> {
        let text = fs::read_to_string(base).map_err(|source| WorkloadError::Read {
            path: base.to_path_buf(),
            source,
        })?;

        let mut properties = parse_properties(&text);
        properties.extend(
            overrides
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        let mut file = tempfile::Builder::new()
            .prefix("ycsb-workload-")
            .tempfile()?;
        for (key, value) in properties.iter() {
            writeln!(file, "{key}={value}")?;
        }
        file.flush()?;

        debug!(
            base = ?base,
            effective = ?file.path(),
            properties = properties.len(),
            "Wrote effective workload"
        );

        Ok(Self { properties, file })
    }

    /// path of the effective workload file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}
