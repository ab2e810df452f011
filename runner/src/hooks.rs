//! Lifecycle hooks
//!
//! Listeners are registered per event and invoked synchronously in
//! registration order. The first failing listener aborts the whole run.

use crate::{
    database::DatabaseTarget,
    executors::{display_command, Executor},
};
use serde::Deserialize;
use std::{collections::BTreeMap, error::Error, fmt, rc::Rc, str::FromStr};
use thiserror::Error;
use tracing::{debug, info};

pub type HookError = Box<dyn Error + Send + Sync>;
pub type HookResult = Result<(), HookError>;

type RunHook = Box<dyn Fn() -> HookResult>;
type DbHook = Box<dyn Fn(&DatabaseTarget) -> HookResult>;
type TrialHook = Box<dyn Fn(u32, &DatabaseTarget) -> HookResult>;
type MplHook = Box<dyn Fn(u32, u32, &DatabaseTarget) -> HookResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum HookPoint {
    PreRun,
    PostRun,
    PreDb,
    PostDb,
    PreTrial,
    PostTrial,
    PreMpl,
    PostMpl,
}

impl HookPoint {
    pub const ALL: [HookPoint; 8] = [
        HookPoint::PreRun,
        HookPoint::PostRun,
        HookPoint::PreDb,
        HookPoint::PostDb,
        HookPoint::PreTrial,
        HookPoint::PostTrial,
        HookPoint::PreMpl,
        HookPoint::PostMpl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PreRun => "PRE_RUN",
            Self::PostRun => "POST_RUN",
            Self::PreDb => "PRE_DB",
            Self::PostDb => "POST_DB",
            Self::PreTrial => "PRE_TRIAL",
            Self::PostTrial => "POST_TRIAL",
            Self::PreMpl => "PRE_MPL",
            Self::PostMpl => "POST_MPL",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown hook event '{0}'")]
pub struct UnknownHookPoint(pub String);

impl FromStr for HookPoint {
    type Err = UnknownHookPoint;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.trim();

        HookPoint::ALL
            .into_iter()
            .find(|point| point.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownHookPoint(name.to_owned()))
    }
}

impl TryFrom<String> for HookPoint {
    type Error = UnknownHookPoint;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

#[derive(Error, Debug)]
#[error("Hook #{index} of {point} failed{}", for_target(.target))]
pub struct HookFailure {
    pub point: HookPoint,
    pub index: usize,
    /// labelname of the target being benchmarked, none for run level events
    pub target: Option<String>,
    #[source]
    pub source: HookError,
}

fn for_target(target: &Option<String>) -> String {
    target
        .as_ref()
        .map(|target| format!(" for {target}"))
        .unwrap_or_default()
}

/// Registry of all listeners, read-only while a run is in progress
#[derive(Default)]
pub struct Hooks {
    pre_run: Vec<RunHook>,
    post_run: Vec<RunHook>,
    pre_db: Vec<DbHook>,
    post_db: Vec<DbHook>,
    pre_trial: Vec<TrialHook>,
    post_trial: Vec<TrialHook>,
    pre_mpl: Vec<MplHook>,
    post_mpl: Vec<MplHook>,
}

fn fire<H>(
    point: HookPoint,
    target: Option<&DatabaseTarget>,
    hooks: &[H],
    call: impl Fn(&H) -> HookResult,
) -> Result<(), HookFailure> {
    for (index, hook) in hooks.iter().enumerate() {
        debug!("Running hook #{index} of {point}");

        call(hook).map_err(|source| HookFailure {
            point,
            index,
            target: target.map(DatabaseTarget::labelname),
            source,
        })?;
    }

    Ok(())
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// register one command hook per configured argv, all run through `executor`
    pub fn from_commands(
        commands: &BTreeMap<HookPoint, Vec<Vec<String>>>,
        executor: Rc<dyn Executor>,
    ) -> Self {
        let mut hooks = Self::new();

        for (point, argvs) in commands.iter() {
            for argv in argvs.iter() {
                let hook = CommandHook {
                    point: *point,
                    argv: argv.clone(),
                    executor: executor.clone(),
                };

                match point {
                    HookPoint::PreRun => hooks.on_pre_run(move || hook.run(None, None, None)),
                    HookPoint::PostRun => hooks.on_post_run(move || hook.run(None, None, None)),
                    HookPoint::PreDb => {
                        hooks.on_pre_db(move |target| hook.run(Some(target), None, None))
                    }
                    HookPoint::PostDb => {
                        hooks.on_post_db(move |target| hook.run(Some(target), None, None))
                    }
                    HookPoint::PreTrial => hooks
                        .on_pre_trial(move |trial, target| hook.run(Some(target), Some(trial), None)),
                    HookPoint::PostTrial => hooks.on_post_trial(move |trial, target| {
                        hook.run(Some(target), Some(trial), None)
                    }),
                    HookPoint::PreMpl => hooks.on_pre_mpl(move |mpl, trial, target| {
                        hook.run(Some(target), Some(trial), Some(mpl))
                    }),
                    HookPoint::PostMpl => hooks.on_post_mpl(move |mpl, trial, target| {
                        hook.run(Some(target), Some(trial), Some(mpl))
                    }),
                };
            }
        }

        hooks
    }

    pub fn len(&self, point: HookPoint) -> usize {
        match point {
            HookPoint::PreRun => self.pre_run.len(),
            HookPoint::PostRun => self.post_run.len(),
            HookPoint::PreDb => self.pre_db.len(),
            HookPoint::PostDb => self.post_db.len(),
            HookPoint::PreTrial => self.pre_trial.len(),
            HookPoint::PostTrial => self.post_trial.len(),
            HookPoint::PreMpl => self.pre_mpl.len(),
            HookPoint::PostMpl => self.post_mpl.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        HookPoint::ALL.into_iter().all(|point| self.len(point) == 0)
    }

    pub fn on_pre_run(&mut self, hook: impl Fn() -> HookResult + 'static) -> &mut Self {
        self.pre_run.push(Box::new(hook));
        self
    }

    pub fn on_post_run(&mut self, hook: impl Fn() -> HookResult + 'static) -> &mut Self {
        self.post_run.push(Box::new(hook));
        self
    }

    pub fn on_pre_db(
        &mut self,
        hook: impl Fn(&DatabaseTarget) -> HookResult + 'static,
    ) -> &mut Self {
        self.pre_db.push(Box::new(hook));
        self
    }

    pub fn on_post_db(
        &mut self,
        hook: impl Fn(&DatabaseTarget) -> HookResult + 'static,
    ) -> &mut Self {
        self.post_db.push(Box::new(hook));
        self
    }

    pub fn on_pre_trial(
        &mut self,
        hook: impl Fn(u32, &DatabaseTarget) -> HookResult + 'static,
    ) -> &mut Self {
        self.pre_trial.push(Box::new(hook));
        self
    }

    pub fn on_post_trial(
        &mut self,
        hook: impl Fn(u32, &DatabaseTarget) -> HookResult + 'static,
    ) -> &mut Self {
        self.post_trial.push(Box::new(hook));
        self
    }

    /// `hook(mpl, trial, target)`
    pub fn on_pre_mpl(
        &mut self,
        hook: impl Fn(u32, u32, &DatabaseTarget) -> HookResult + 'static,
    ) -> &mut Self {
        self.pre_mpl.push(Box::new(hook));
        self
    }

    /// `hook(mpl, trial, target)`
    pub fn on_post_mpl(
        &mut self,
        hook: impl Fn(u32, u32, &DatabaseTarget) -> HookResult + 'static,
    ) -> &mut Self {
        self.post_mpl.push(Box::new(hook));
        self
    }

    pub fn fire_pre_run(&self) -> Result<(), HookFailure> {
        fire(HookPoint::PreRun, None, &self.pre_run, |hook| hook())
    }

    pub fn fire_post_run(&self) -> Result<(), HookFailure> {
        fire(HookPoint::PostRun, None, &self.post_run, |hook| hook())
    }

    pub fn fire_pre_db(&self, target: &DatabaseTarget) -> Result<(), HookFailure> {
        fire(HookPoint::PreDb, Some(target), &self.pre_db, |hook| hook(target))
    }

    pub fn fire_post_db(&self, target: &DatabaseTarget) -> Result<(), HookFailure> {
        fire(HookPoint::PostDb, Some(target), &self.post_db, |hook| hook(target))
    }

    pub fn fire_pre_trial(&self, trial: u32, target: &DatabaseTarget) -> Result<(), HookFailure> {
        fire(HookPoint::PreTrial, Some(target), &self.pre_trial, |hook| {
            hook(trial, target)
        })
    }

    pub fn fire_post_trial(&self, trial: u32, target: &DatabaseTarget) -> Result<(), HookFailure> {
        fire(HookPoint::PostTrial, Some(target), &self.post_trial, |hook| {
            hook(trial, target)
        })
    }

    pub fn fire_pre_mpl(
        &self,
        mpl: u32,
        trial: u32,
        target: &DatabaseTarget,
    ) -> Result<(), HookFailure> {
        fire(HookPoint::PreMpl, Some(target), &self.pre_mpl, |hook| {
            hook(mpl, trial, target)
        })
    }

    pub fn fire_post_mpl(
        &self,
        mpl: u32,
        trial: u32,
        target: &DatabaseTarget,
    ) -> Result<(), HookFailure> {
        fire(HookPoint::PostMpl, Some(target), &self.post_mpl, |hook| {
            hook(mpl, trial, target)
        })
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for point in HookPoint::ALL {
            map.entry(&point.name(), &self.len(point));
        }

        map.finish()
    }
}

/// External command run as a hook, the sweep position is passed through the environment
struct CommandHook {
    point: HookPoint,
    argv: Vec<String>,
    executor: Rc<dyn Executor>,
}

impl CommandHook {
    fn run(
        &self,
        target: Option<&DatabaseTarget>,
        trial: Option<u32>,
        mpl: Option<u32>,
    ) -> HookResult {
        let mut env = vec![("YCSB_RUNNER_HOOK", self.point.name().to_owned())];
        if let Some(target) = target {
            env.push(("YCSB_RUNNER_TARGET", target.labelname()));
            env.push(("YCSB_RUNNER_DATABASE", target.kind().name().to_owned()));
            env.push(("YCSB_RUNNER_LABEL", target.label().to_owned()));
        }
        if let Some(trial) = trial {
            env.push(("YCSB_RUNNER_TRIAL", trial.to_string()));
        }
        if let Some(mpl) = mpl {
            env.push(("YCSB_RUNNER_MPL", mpl.to_string()));
        }

        info!("Running {} hook: {}", self.point, display_command(&self.argv));
        self.executor.exec_checked_env(&self.argv, &env)?;

        Ok(())
    }
}
