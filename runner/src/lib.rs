//! Drives YCSB sweeps against a list of database targets

pub mod config;
pub mod database;
pub mod executors;
pub mod hooks;
pub mod runner;
pub mod workload;

pub use config::{BenchmarkOptions, RunnerConfig};
pub use database::{DatabaseTarget, DbKind, TargetSpec};
pub use executors::{Executor, ExecutorError, LocalExecutor};
pub use hooks::{HookPoint, Hooks};
pub use runner::{load_targets, Runner, RunnerError, TargetReport};
