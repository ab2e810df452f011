//! Sweep orchestration: clean, load, run, collect and export every target in turn

use crate::{
    config::{ConfigErrors, RunnerConfig},
    database::{DatabaseTarget, TargetError},
    executors::{Executor, ExecutorError},
    hooks::{HookFailure, Hooks},
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};
use ycsb_ingest::{ExtractionRules, Field, MetricSet, StatsError, Value, DEFAULT_RULES};

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Hook(#[from] HookFailure),
    #[error("Failed to record statistics for {target}")]
    Stats {
        target: String,
        #[source]
        source: StatsError,
    },
    #[error("Failed to execute YCSB for {target}")]
    Exec {
        target: String,
        #[source]
        source: ExecutorError,
    },
}

/// Everything a finished target left behind
#[derive(Debug)]
pub struct TargetReport {
    pub labelname: String,
    pub outdir: PathBuf,
    pub exports: Vec<PathBuf>,
    pub stats: MetricSet,
}

fn exec_error(target: &DatabaseTarget) -> impl FnOnce(ExecutorError) -> RunnerError {
    let labelname = target.labelname();

    move |source| RunnerError::Exec {
        target: labelname,
        source,
    }
}

fn stats_error(target: &DatabaseTarget) -> impl FnOnce(StatsError) -> RunnerError {
    let labelname = target.labelname();

    move |source| RunnerError::Stats {
        target: labelname,
        source,
    }
}

/// create a target for every configured section token, in file order
pub fn load_targets(config: &RunnerConfig) -> Result<Vec<DatabaseTarget>, RunnerError> {
    config
        .targets()?
        .into_iter()
        .map(|(spec, options)| DatabaseTarget::new(spec, options).map_err(RunnerError::from))
        .collect()
}

pub struct Runner<'a, E: Executor> {
    config_path: &'a Path,
    executor: E,
    rules: &'a ExtractionRules,
}

impl<'a, E: Executor> Runner<'a, E> {
    pub fn new(config_path: &'a Path, executor: E) -> Self {
        Self {
            config_path,
            executor,
            rules: &*DEFAULT_RULES,
        }
    }

    /// scrape process output with custom rules instead of the YCSB defaults
    pub fn with_rules(mut self, rules: &'a ExtractionRules) -> Self {
        self.rules = rules;
        self
    }

    /// benchmark all targets one after another, the first error aborts the whole run
    pub fn run(
        &self,
        targets: Vec<DatabaseTarget>,
        hooks: &Hooks,
    ) -> Result<Vec<TargetReport>, RunnerError> {
        let mut reports = Vec::with_capacity(targets.len());

        hooks.fire_pre_run()?;

        for mut target in targets {
            let exports = self.run_target(&mut target, hooks)?;

            reports.push(TargetReport {
                labelname: target.labelname(),
                outdir: target.outdir()?.to_path_buf(),
                exports,
                stats: target.into_stats(),
            });
        }

        hooks.fire_post_run()?;

        info!("Done with {} target(s)", reports.len());

        Ok(reports)
    }

    #[instrument(skip_all, fields(target = %target.labelname()))]
    fn run_target(
        &self,
        target: &mut DatabaseTarget,
        hooks: &Hooks,
    ) -> Result<Vec<PathBuf>, RunnerError> {
        hooks.fire_pre_db(target)?;

        target.snapshot(self.config_path)?;

        let trials = target.options().trials;
        let sweep = target.options().sweep();

        for trial in 1..=trials {
            hooks.fire_pre_trial(trial, target)?;

            for mpl in sweep.clone() {
                self.run_step(target, hooks, trial, mpl)?;
            }

            hooks.fire_post_trial(trial, target)?;
        }

        target.log("Exporting run stats...", None, None)?;
        let exports = target.export_stats()?;
        debug!(files = exports.len(), "Exported");

        target.cleanup();

        hooks.fire_post_db(target)?;

        Ok(exports)
    }

    /// a single clean?, load, run and collect cycle
    fn run_step(
        &self,
        target: &mut DatabaseTarget,
        hooks: &Hooks,
        trial: u32,
        mpl: u32,
    ) -> Result<(), RunnerError> {
        hooks.fire_pre_mpl(mpl, trial, target)?;

        target.log(&format!("Starting trial {trial}..."), Some(trial), Some(mpl))?;

        if target.options().should_clean(mpl) {
            target.log("Cleaning the database...", Some(trial), Some(mpl))?;
            target.clean(&self.executor)?;
        }

        target.log("Loading YCSB data...", Some(trial), Some(mpl))?;
        self.executor
            .exec_discard(&target.cmd_load())
            .map_err(exec_error(target))?;

        target.log("Running YCSB workload...", Some(trial), Some(mpl))?;
        let output = self
            .executor
            .exec_captured(&target.cmd_run(mpl))
            .map_err(exec_error(target))?;
        target.raw_log(&output)?;

        let mut record = self.rules.extract(&output);
        record
            .set(Field::Mpl, Value::from(mpl))
            .map_err(stats_error(target))?;
        record
            .set(Field::Trial, Value::from(trial))
            .map_err(stats_error(target))?;
        debug!(%record, "Collected statistics");
        target.record(record);

        hooks.fire_post_mpl(mpl, trial, target)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_failures_name_the_target() {
        let error = RunnerError::Stats {
            target: "jdbc-mysql:primary".to_owned(),
            source: StatsError::ReadOnly(Field::AnomalyScore),
        };

        assert_eq!(
            error.to_string(),
            "Failed to record statistics for jdbc-mysql:primary"
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
