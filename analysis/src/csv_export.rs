use crate::{plot, with_suffix, ExportError, Exporter};
use csv::Writer;
use std::path::{Path, PathBuf};
use tracing::debug;
use ycsb_ingest::{Aggregate, Field, MetricSet, Value};

const FILE_EXT: &str = ".csv";
const PLOT_FILE_EXT: &str = ".svg";

/// Exports statistics to CSV, plots are rendered as SVG
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

fn cell(value: Option<Value>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

impl Exporter for CsvExporter {
    fn export(
        &self,
        stats: &MetricSet,
        path: &Path,
        _key: Field,
        fields: &[Field],
    ) -> Result<PathBuf, ExportError> {
        let path = with_suffix(path, FILE_EXT);
        let mut writer = Writer::from_path(&path)?;

        writer.write_record(fields.iter().map(|field| field.name()))?;
        for row in stats.rows(fields) {
            writer.write_record(row.into_iter().map(cell))?;
        }
        writer.flush()?;

        debug!(path = ?path, rows = stats.len(), "Exported raw statistics");

        Ok(path)
    }

    fn export_averages(
        &self,
        stats: &MetricSet,
        path: &Path,
        key: Field,
        fields: &[Field],
    ) -> Result<PathBuf, ExportError> {
        let path = with_suffix(path, FILE_EXT);
        let mut writer = Writer::from_path(&path)?;
        let fields: Vec<Field> = fields.iter().copied().filter(|field| *field != key).collect();

        writer.write_record(std::iter::once(key).chain(fields.iter().copied()).map(Field::name))?;

        let groups = stats.grouped_by(key);
        for (key_value, group) in &groups {
            let averages = fields.iter().map(|field| {
                // a field without a single defined value leaves its cell empty
                group
                    .aggregate(Aggregate::Avg, *field)
                    .map(|average| average.to_string())
                    .unwrap_or_default()
            });

            writer.write_record(std::iter::once(key_value.to_string()).chain(averages))?;
        }
        writer.flush()?;

        debug!(path = ?path, groups = groups.len(), "Exported averages");

        Ok(path)
    }

    fn export_averages_plot(
        &self,
        stats: &MetricSet,
        path: &Path,
        title: &str,
        key: Field,
        fields: &[Field],
    ) -> Result<PathBuf, ExportError> {
        let path = with_suffix(path, PLOT_FILE_EXT);
        plot::averages(stats, &path, title, key, fields)?;

        Ok(path)
    }
}
