use super::{clean, DbKind, TargetSpec};
use crate::{
    config::BenchmarkOptions,
    executors::{Executor, ExecutorError},
    workload::{Workload, WorkloadError},
};
use chrono::Local;
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};
use ycsb_analysis::ExportError;
use ycsb_ingest::{MetricRecord, MetricSet};

const LOG_LINE_PREFIX: &str = "<<YCSB Runner>>:";
const DEFAULT_TABLENAME: &str = "usertable";

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Failed to create output directory {path}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write log file {path}")]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to copy {path} into the output directory")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to prepare workload")]
    Workload(#[from] WorkloadError),
    #[error("Failed to export statistics of {target}")]
    Export {
        target: String,
        #[source]
        source: ExportError,
    },
    #[error("Failed to clean {target}, refusing to continue")]
    Clean {
        target: String,
        #[source]
        source: ExecutorError,
    },
}

/// One database under test with everything produced while benchmarking it
#[derive(Debug)]
pub struct DatabaseTarget {
    spec: TargetSpec,
    options: BenchmarkOptions,
    tablename: String,
    workload: Option<Workload>,
    datestr: String,
    outdir: Option<PathBuf>,
    logfile: Option<(PathBuf, File)>,
    stats: MetricSet,
}

impl DatabaseTarget {
    pub fn new(spec: TargetSpec, options: BenchmarkOptions) -> Result<Self, TargetError> {
        let workload = Workload::load(&options.workload, &options.workload_overrides())?;
        let tablename = options
            .tablename
            .clone()
            .or_else(|| workload.property("table").map(str::to_owned))
            .unwrap_or_else(|| DEFAULT_TABLENAME.to_owned());

        Ok(Self {
            spec,
            options,
            tablename,
            workload: Some(workload),
            datestr: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            outdir: None,
            logfile: None,
            stats: MetricSet::new(),
        })
    }

    pub fn kind(&self) -> DbKind {
        self.spec.kind
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    /// kind and label, e.g. `jdbc-mysql:primary`
    pub fn labelname(&self) -> String {
        self.spec.labelname()
    }

    pub fn options(&self) -> &BenchmarkOptions {
        &self.options
    }

    pub fn tablename(&self) -> &str {
        &self.tablename
    }

    pub fn datestr(&self) -> &str {
        &self.datestr
    }

    pub fn stats(&self) -> &MetricSet {
        &self.stats
    }

    pub fn record(&mut self, record: MetricRecord) {
        self.stats.push(record);
    }

    pub fn into_stats(self) -> MetricSet {
        self.stats
    }

    /// effective workload file, the configured one once resources were released
    pub fn workload_path(&self) -> &Path {
        match &self.workload {
            Some(workload) => workload.path(),
            None => &self.options.workload,
        }
    }

    /// `<output_dir>/<timestamp>-<labelname>`, created on first use
    pub fn outdir(&mut self) -> Result<&Path, TargetError> {
        let path = match self.outdir.take() {
            Some(path) => path,
            None => {
                let path = self
                    .options
                    .output_dir
                    .join(format!("{}-{}", self.datestr, self.labelname()));

                fs::create_dir_all(&path).map_err(|source| TargetError::OutputDir {
                    path: path.clone(),
                    source,
                })?;
                debug!(path = ?path, "Created output directory");

                path
            }
        };

        Ok(self.outdir.insert(path).as_path())
    }

    /// `<outdir>/<prefix>-<labelname>-<timestamp><ext>`
    pub fn file_path(&mut self, prefix: &str, ext: &str) -> Result<PathBuf, TargetError> {
        let name = format!("{prefix}-{}-{}{ext}", self.labelname(), self.datestr);

        Ok(self.outdir()?.join(name))
    }

    fn write_log(&mut self, line: &str) -> Result<(), TargetError> {
        if self.logfile.is_none() {
            let path = self.file_path("log", ".log")?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| TargetError::Log {
                    path: path.clone(),
                    source,
                })?;

            self.logfile = Some((path, file));
        }

        if let Some((path, file)) = self.logfile.as_mut() {
            writeln!(file, "{line}")
                .and_then(|_| file.flush())
                .map_err(|source| TargetError::Log {
                    path: path.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    /// user facing progress message, written to the target log and the console
    pub fn log(
        &mut self,
        message: &str,
        trial: Option<u32>,
        mpl: Option<u32>,
    ) -> Result<String, TargetError> {
        let mut line = format!(
            "{LOG_LINE_PREFIX} [{}] [{}]",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
            self.labelname()
        );
        if let Some(trial) = trial {
            line.push_str(&format!(" (Trial={trial})"));
        }
        if let Some(mpl) = mpl {
            line.push_str(&format!(" (MPL={mpl})"));
        }
        line.push(' ');
        line.push_str(message);

        info!("{line}");
        self.write_log(&line)?;

        Ok(line)
    }

    /// verbatim process output, written to the target log and stdout
    pub fn raw_log(&mut self, text: &str) -> Result<(), TargetError> {
        println!("{text}");

        self.write_log(text)
    }

    /// copy the config file and the effective workload into the output directory
    pub fn snapshot(&mut self, config_path: &Path) -> Result<(), TargetError> {
        let ext = config_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let config_copy = self.file_path("config", &ext)?;
        let workload_copy = self.file_path("workload", "")?;

        for (from, to) in [
            (config_path.to_path_buf(), config_copy),
            (self.workload_path().to_path_buf(), workload_copy),
        ] {
            fs::copy(&from, &to).map_err(|source| TargetError::Snapshot {
                path: from.clone(),
                source,
            })?;
        }

        Ok(())
    }

    fn ycsb_command(&self, action: &str, threads: u32) -> Vec<String> {
        vec![
            self.options.ycsb.to_string_lossy().into_owned(),
            action.to_owned(),
            self.spec.kind.binding().to_owned(),
            "-P".to_owned(),
            self.workload_path().to_string_lossy().into_owned(),
            "-s".to_owned(),
            "-threads".to_owned(),
            threads.to_string(),
        ]
    }

    pub fn cmd_load(&self) -> Vec<String> {
        self.ycsb_command("load", 1)
    }

    pub fn cmd_run(&self, mpl: u32) -> Vec<String> {
        self.ycsb_command("run", mpl)
    }

    pub fn cmd_clean(&self) -> Vec<String> {
        let properties = self
            .workload
            .as_ref()
            .map(|workload| workload.properties().clone())
            .unwrap_or_default();

        clean::command(self.spec.kind, &self.tablename, &properties)
    }

    /// wipe all benchmark data from the database, any failure is fatal
    pub fn clean(&self, executor: &impl Executor) -> Result<(), TargetError> {
        executor
            .exec_checked(&self.cmd_clean())
            .map_err(|source| TargetError::Clean {
                target: self.labelname(),
                source,
            })
    }

    /// write averages, raw data and if enabled the averages plot
    /// returns the files written
    pub fn export_stats(&mut self) -> Result<Vec<PathBuf>, TargetError> {
        let averages_path = self.file_path("averages", "")?;
        let output_path = self.file_path("output", "")?;
        let plot_path = self.file_path("plot", "")?;

        let options = &self.options;
        let exporter = options.output_format.exporter();
        let export_error = |source| TargetError::Export {
            target: self.spec.labelname(),
            source,
        };

        let mut written = vec![
            exporter
                .export_averages(&self.stats, &averages_path, options.avg_key, &options.avg_fields)
                .map_err(export_error)?,
            exporter
                .export(&self.stats, &output_path, options.avg_key, &options.export_fields)
                .map_err(export_error)?,
        ];

        if options.output_plots {
            let title = format!("{} {}", self.spec.labelname(), self.datestr);

            written.push(
                exporter
                    .export_averages_plot(
                        &self.stats,
                        &plot_path,
                        &title,
                        options.plot_key,
                        &options.plot_fields,
                    )
                    .map_err(export_error)?,
            );
        }

        Ok(written)
    }

    /// close the log and drop the temporary workload file
    pub fn cleanup(&mut self) {
        if let Some((path, _)) = self.logfile.take() {
            debug!(path = ?path, "Closed log file");
        }
        self.workload = None;
    }
}
