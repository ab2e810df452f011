use crate::{
    database::{parse_section, TargetSpec},
    hooks::HookPoint,
};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    ops::Deref,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, warn};
use ycsb_analysis::OutputFormat;
use ycsb_ingest::{Field, StatsError};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Config file {0} not found")]
    FileNotFound(PathBuf),
    #[error("Failed to read config file")]
    Read(#[from] std::io::Error),
    #[error("Config file is not valid YAML")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config contains {0} error(s), see above")]
    Invalid(usize),
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    // timeout in seconds applied to every external process
    pub timeout: Option<u64>,
    // hook event -> commands, each given as argv
    #[serde(default)]
    pub hooks: BTreeMap<HookPoint, Vec<Vec<String>>>,
    // section name -> options, the mapping keeps the order of the file
    pub targets: serde_yaml::Mapping,

    #[serde(skip)]
    pub path: PathBuf,
}

/// An ordered list of metric fields, given either as YAML sequence or comma separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFieldList")]
pub struct FieldList(Vec<Field>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldList {
    Csv(String),
    List(Vec<String>),
}

impl FieldList {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    /// parse `"anomaly_score, runtime"`, empty entries are dropped
    pub fn parse_csv(csv: &str) -> Result<Self, StatsError> {
        csv.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl TryFrom<RawFieldList> for FieldList {
    type Error = StatsError;

    fn try_from(raw: RawFieldList) -> Result<Self, Self::Error> {
        match raw {
            RawFieldList::Csv(csv) => Self::parse_csv(&csv),
            RawFieldList::List(names) => names
                .into_iter()
                .map(Field::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
        }
    }
}

impl Deref for FieldList {
    type Target = [Field];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkOptions {
    #[serde(default = "default_trials")]
    pub trials: u32,
    #[serde(default = "default_min_mpl")]
    pub min_mpl: u32,
    #[serde(default = "default_max_mpl")]
    pub max_mpl: u32,
    #[serde(default = "default_inc_mpl")]
    pub inc_mpl: u32,
    pub workload: PathBuf,
    #[serde(default, rename = "output")]
    pub output_format: OutputFormat,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_true")]
    pub output_plots: bool,
    #[serde(default = "default_key", rename = "avgkey")]
    pub avg_key: Field,
    #[serde(default = "default_avg_fields", rename = "avgfields")]
    pub avg_fields: FieldList,
    #[serde(default = "default_key", rename = "plotkey")]
    pub plot_key: Field,
    #[serde(default = "default_plot_fields", rename = "plotfields")]
    pub plot_fields: FieldList,
    #[serde(default = "default_export_fields", rename = "exportfields")]
    pub export_fields: FieldList,
    #[serde(default = "default_true")]
    pub clean_data: bool,
    // falls back to the workload's `table` property
    pub tablename: Option<String>,
    #[serde(default = "default_ycsb")]
    pub ycsb: PathBuf,
    #[serde(default)]
    pub workload_properties: BTreeMap<String, serde_yaml::Value>,
}

/// MPL values of one trial: `min_mpl`, `min_mpl + inc_mpl`, ... while `<= max_mpl`
#[derive(Debug, Clone)]
pub struct MplSweep {
    next: Option<u32>,
    max: u32,
    step: u32,
}

impl Iterator for MplSweep {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.filter(|mpl| *mpl <= self.max)?;
        self.next = current.checked_add(self.step);

        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next {
            Some(next) if next <= self.max => ((self.max - next) / self.step) as usize + 1,
            _ => 0,
        };

        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for MplSweep {}

fn yaml_to_property(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(value) => value.to_string(),
        serde_yaml::Value::Number(value) => value.to_string(),
        serde_yaml::Value::String(value) => value.clone(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim().to_owned())
            .unwrap_or_default(),
    }
}

impl BenchmarkOptions {
    /// default options for the given workload
    pub fn with_workload(workload: impl Into<PathBuf>) -> Self {
        Self {
            trials: default_trials(),
            min_mpl: default_min_mpl(),
            max_mpl: default_max_mpl(),
            inc_mpl: default_inc_mpl(),
            workload: workload.into(),
            output_format: OutputFormat::default(),
            output_dir: default_output_dir(),
            output_plots: true,
            avg_key: default_key(),
            avg_fields: default_avg_fields(),
            plot_key: default_key(),
            plot_fields: default_plot_fields(),
            export_fields: default_export_fields(),
            clean_data: true,
            tablename: None,
            ycsb: default_ycsb(),
            workload_properties: BTreeMap::new(),
        }
    }

    pub fn sweep(&self) -> MplSweep {
        MplSweep {
            // a zero step would never terminate
            next: (self.inc_mpl > 0).then_some(self.min_mpl),
            max: self.max_mpl,
            step: self.inc_mpl.max(1),
        }
    }

    /// with `clean_data` the database is only wiped at the start of a trial,
    /// without it before every single run
    pub fn should_clean(&self, mpl: u32) -> bool {
        !self.clean_data || mpl == self.min_mpl
    }

    /// extra workload properties as they are written to the workload file
    pub fn workload_overrides(&self) -> BTreeMap<String, String> {
        self.workload_properties
            .iter()
            .map(|(key, value)| (key.clone(), yaml_to_property(value)))
            .collect()
    }

    /// every problem with these options, an empty list means they can be run
    pub fn preflight_checks(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.trials == 0 {
            problems.push("trials must be at least 1".to_owned());
        }
        if self.min_mpl == 0 {
            problems.push("min_mpl must be at least 1".to_owned());
        }
        if self.inc_mpl == 0 {
            problems.push("inc_mpl must be at least 1, the sweep would never end".to_owned());
        }
        if self.min_mpl > self.max_mpl {
            problems.push(format!(
                "min_mpl ({}) is larger than max_mpl ({})",
                self.min_mpl, self.max_mpl
            ));
        }
        if !self.workload.is_file() {
            problems.push(format!(
                "workload {} is either not a file or doesn't exist",
                self.workload.to_string_lossy()
            ));
        }
        if self.tablename.as_deref().map(str::trim) == Some("") {
            problems.push("tablename can't be empty".to_owned());
        }

        problems
    }
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        if !path.is_file() {
            return Err(ConfigErrors::FileNotFound(path.to_path_buf()));
        }

        Self::parse(&fs::read_to_string(path)?, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigErrors> {
        let mut config: Self = serde_yaml::from_str(text)?;
        config.path = path.to_path_buf();

        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// validate every section and split them into targets
    /// all problems are logged before failing to make fixing the config easier
    pub fn targets(&self) -> Result<Vec<(TargetSpec, BenchmarkOptions)>, ConfigErrors> {
        let mut errors = 0;
        let mut targets = Vec::new();

        if self.timeout == Some(0) {
            error!("timeout cannot be 0, leave it out to run without a timeout");
            errors += 1;
        }

        for (point, commands) in self.hooks.iter() {
            for (index, argv) in commands.iter().enumerate() {
                if argv.is_empty() {
                    error!("hooks.{point}[{index}] is an empty command");
                    errors += 1;
                }
            }
        }

        if self.targets.is_empty() {
            warn!("No targets were configured, nothing will be run");
        }

        for (section, options) in self.targets.iter() {
            let Some(section) = section.as_str() else {
                error!("Target section names must be strings, found {section:?}");
                errors += 1;
                continue;
            };

            let options = match serde_yaml::from_value::<BenchmarkOptions>(options.clone()) {
                Ok(options) => options,
                Err(e) => {
                    error!("targets.{section}: {e}");
                    errors += 1;
                    continue;
                }
            };

            let problems = options.preflight_checks();
            for problem in problems.iter() {
                error!("targets.{section}: {problem}");
            }
            errors += problems.len();

            let specs = parse_section(section);
            if specs.is_empty() {
                warn!("Section '{section}' names no supported database, skipping it");
            }

            targets.extend(specs.into_iter().map(|spec| (spec, options.clone())));
        }

        if errors > 0 {
            Err(ConfigErrors::Invalid(errors))
        } else {
            Ok(targets)
        }
    }
}

fn default_trials() -> u32 {
    1
}

fn default_min_mpl() -> u32 {
    1
}

fn default_max_mpl() -> u32 {
    25
}

fn default_inc_mpl() -> u32 {
    4
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

fn default_key() -> Field {
    Field::Mpl
}

fn default_avg_fields() -> FieldList {
    FieldList(vec![Field::AnomalyScore, Field::Runtime])
}

fn default_plot_fields() -> FieldList {
    FieldList(vec![Field::AnomalyScore])
}

fn default_export_fields() -> FieldList {
    FieldList(vec![Field::Mpl, Field::Runtime, Field::Throughput, Field::Trial])
}

fn default_ycsb() -> PathBuf {
    PathBuf::from("ycsb")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DbKind;

    fn config_with_workload(body: &str) -> (tempfile::TempDir, RunnerConfig) {
        let dir = tempfile::tempdir().unwrap();
        let workload = dir.path().join("workload");
        fs::write(&workload, "recordcount=10\n").unwrap();

        let text = body.replace("WORKLOAD", &workload.to_string_lossy());
        let config = RunnerConfig::parse(&text, &dir.path().join("runner.yaml")).unwrap();

        (dir, config)
    }

    #[test]
    fn defaults_are_applied() {
        let (_dir, config) = config_with_workload("targets:\n  redis:\n    workload: WORKLOAD\n");
        let targets = config.targets().unwrap();
        let (spec, options) = &targets[0];

        assert_eq!(spec.kind, DbKind::Redis);
        assert_eq!(options.trials, 1);
        assert_eq!((options.min_mpl, options.max_mpl, options.inc_mpl), (1, 25, 4));
        assert_eq!(options.output_format, OutputFormat::Csv);
        assert_eq!(options.output_dir, PathBuf::from("output"));
        assert!(options.output_plots);
        assert!(options.clean_data);
        assert_eq!(options.avg_key, Field::Mpl);
        assert_eq!(&*options.avg_fields, &[Field::AnomalyScore, Field::Runtime]);
        assert_eq!(&*options.plot_fields, &[Field::AnomalyScore]);
        assert_eq!(
            &*options.export_fields,
            &[Field::Mpl, Field::Runtime, Field::Throughput, Field::Trial]
        );
        assert_eq!(options.ycsb, PathBuf::from("ycsb"));
        assert_eq!(config.timeout(), None);
        assert!(config.hooks.is_empty());
    }

    #[test]
    fn sections_expand_in_file_order() {
        let (_dir, config) = config_with_workload(
            "targets:\n  \"mongodb:b, jdbc-mysql\":\n    workload: WORKLOAD\n    trials: 2\n  redis:a:\n    workload: WORKLOAD\n",
        );
        let targets = config.targets().unwrap();
        let names: Vec<_> = targets.iter().map(|(spec, _)| spec.labelname()).collect();

        assert_eq!(names, vec!["mongodb:b", "jdbc-mysql", "redis:a"]);
        assert_eq!(targets[1].1.trials, 2);
        assert_eq!(targets[2].1.trials, 1);
    }

    #[test]
    fn field_lists_accept_csv_and_sequences() {
        let (_dir, config) = config_with_workload(
            "targets:\n  redis:\n    workload: WORKLOAD\n    avgfields: \" throughput ,runtime,\"\n    exportfields: [mpl, latency_tx_99]\n    output: CSV\n",
        );
        let (_, options) = config.targets().unwrap().remove(0);

        assert_eq!(&*options.avg_fields, &[Field::Throughput, Field::Runtime]);
        assert_eq!(&*options.export_fields, &[Field::Mpl, Field::LatencyTx99]);
    }

    #[test]
    fn unknown_fields_and_keys_are_rejected() {
        let (_dir, config) = config_with_workload(
            "targets:\n  redis:\n    workload: WORKLOAD\n    avgfields: runtime,walltime\n  mongodb:\n    workload: WORKLOAD\n    threads: 4\n",
        );

        assert!(matches!(config.targets(), Err(ConfigErrors::Invalid(2))));
    }

    #[test]
    fn every_problem_is_counted() {
        let (_dir, config) = config_with_workload(
            "timeout: 0\ntargets:\n  redis:\n    workload: WORKLOAD\n    inc_mpl: 0\n    min_mpl: 30\n    trials: 0\n  mongodb:\n    workload: /nonexistent/workload\n",
        );

        // timeout, inc_mpl, min > max, trials, missing workload
        assert!(matches!(config.targets(), Err(ConfigErrors::Invalid(5))));
    }

    #[test]
    fn missing_workload_key_is_an_error() {
        let (_dir, config) = config_with_workload("targets:\n  redis:\n    trials: 3\n");

        assert!(matches!(config.targets(), Err(ConfigErrors::Invalid(1))));
    }

    #[test]
    fn unsupported_databases_are_skipped() {
        let (_dir, config) =
            config_with_workload("targets:\n  \"voltdb, redis\":\n    workload: WORKLOAD\n");
        let targets = config.targets().unwrap();

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0.kind, DbKind::Redis);
    }

    #[test]
    fn hooks_are_parsed_by_event_name() {
        let (_dir, config) = config_with_workload(
            "hooks:\n  pre_db: [[\"echo\", \"hi\"]]\n  POST_RUN: [[\"true\"], []]\ntargets: {}\n",
        );

        assert_eq!(config.hooks[&HookPoint::PreDb], vec![vec!["echo", "hi"]]);
        assert!(matches!(config.targets(), Err(ConfigErrors::Invalid(1))));
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(matches!(
            RunnerConfig::parse("executor: local\ntargets: {}\n", Path::new("runner.yaml")),
            Err(ConfigErrors::Parse(_))
        ));
    }

    #[test]
    fn missing_config_file() {
        assert!(matches!(
            RunnerConfig::load(Path::new("/nonexistent/runner.yaml")),
            Err(ConfigErrors::FileNotFound(_))
        ));
    }

    #[test]
    fn sweep_length() {
        for (min, max, inc) in [(1, 25, 4), (1, 3, 1), (5, 5, 3), (2, 11, 3), (6, 5, 1)] {
            let mut options = BenchmarkOptions::with_workload("workload");
            (options.min_mpl, options.max_mpl, options.inc_mpl) = (min, max, inc);

            let expected = if min > max { 0 } else { ((max - min) / inc + 1) as usize };
            let sweep = options.sweep();

            assert_eq!(sweep.len(), expected);
            assert_eq!(sweep.count(), expected);
        }
    }

    #[test]
    fn sweep_values_stop_before_max_is_exceeded() {
        let mut options = BenchmarkOptions::with_workload("workload");
        (options.min_mpl, options.max_mpl, options.inc_mpl) = (1, 10, 4);

        assert_eq!(options.sweep().collect::<Vec<_>>(), vec![1, 5, 9]);

        options.inc_mpl = 0;
        assert_eq!(options.sweep().count(), 0);

        (options.min_mpl, options.max_mpl, options.inc_mpl) = (u32::MAX - 1, u32::MAX, 5);
        assert_eq!(options.sweep().collect::<Vec<_>>(), vec![u32::MAX - 1]);
    }

    #[test]
    fn clean_policy() {
        let mut options = BenchmarkOptions::with_workload("workload");
        (options.min_mpl, options.max_mpl, options.inc_mpl) = (2, 10, 4);

        assert!(options.should_clean(2));
        assert!(!options.should_clean(6));

        // without clean_data every step is cleaned
        options.clean_data = false;
        assert!(options.should_clean(2));
        assert!(options.should_clean(6));
    }

    #[test]
    fn workload_properties_are_stringified() {
        let (_dir, config) = config_with_workload(
            "targets:\n  redis:\n    workload: WORKLOAD\n    workload_properties:\n      operationcount: 500\n      table: accounts\n      validate: true\n",
        );
        let (_, options) = config.targets().unwrap().remove(0);
        let overrides = options.workload_overrides();

        assert_eq!(overrides["operationcount"], "500");
        assert_eq!(overrides["table"], "accounts");
        assert_eq!(overrides["validate"], "true");
    }
}
