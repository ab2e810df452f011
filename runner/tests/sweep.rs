use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs,
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::ExitStatus,
    rc::Rc,
};
use tempfile::TempDir;
use ycsb_ingest::{Field, Value};
use ycsb_runner::{
    database::TargetError,
    executors::{Executor, ExecutorError},
    hooks::HookPoint,
    load_targets, BenchmarkOptions, DatabaseTarget, DbKind, Hooks, Runner, RunnerConfig,
    RunnerError, TargetSpec,
};

/// Pretends to be YCSB and the database clients, remembering every command
#[derive(Default)]
struct ScriptedExecutor {
    calls: RefCell<Vec<Vec<String>>>,
    envs: RefCell<Vec<Vec<(String, String)>>>,
    fail_clean: bool,
    silent: bool,
}

impl ScriptedExecutor {
    fn count(&self, program: &str, action: Option<&str>) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|argv| argv[0] == program)
            .filter(|argv| action.map_or(true, |action| argv[1] == action))
            .count()
    }

    fn env_values(&self, key: &str) -> Vec<String> {
        self.envs
            .borrow()
            .iter()
            .filter_map(|env| env.iter().find(|(name, _)| name == key))
            .map(|(_, value)| value.clone())
            .collect()
    }
}

impl Executor for ScriptedExecutor {
    fn exec_captured(&self, argv: &[String]) -> Result<String, ExecutorError> {
        self.calls.borrow_mut().push(argv.to_vec());

        if self.silent {
            return Ok(String::new());
        }

        let mpl: u32 = argv.last().and_then(|threads| threads.parse().ok()).unwrap_or(0);
        Ok(format!(
            "[OVERALL], RunTime(ms), {}.0\n\
             [OVERALL], Throughput(ops/sec), 100.0\n\
             [TOTAL CASH], 1000\n\
             [COUNTED CASH], 990\n\
             [ACTUAL OPERATIONS], {}\n",
            mpl * 10,
            mpl * 10
        ))
    }

    fn exec_discard(&self, argv: &[String]) -> Result<(), ExecutorError> {
        self.calls.borrow_mut().push(argv.to_vec());

        Ok(())
    }

    fn exec_checked(&self, argv: &[String]) -> Result<(), ExecutorError> {
        self.calls.borrow_mut().push(argv.to_vec());

        if self.fail_clean {
            Err(ExecutorError::NonZeroExit {
                command: argv.join(" "),
                status: ExitStatus::from_raw(1 << 8),
            })
        } else {
            Ok(())
        }
    }

    fn exec_checked_env(
        &self,
        argv: &[String],
        env: &[(&str, String)],
    ) -> Result<(), ExecutorError> {
        self.calls.borrow_mut().push(argv.to_vec());
        self.envs.borrow_mut().push(
            env.iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        );

        Ok(())
    }
}

struct Setup {
    dir: TempDir,
    config: PathBuf,
    workload: PathBuf,
}

impl Setup {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("runner.yaml");
        let workload = dir.path().join("closed_economy");

        fs::write(&config, "targets: {}\n").unwrap();
        fs::write(&workload, "recordcount=100\noperationcount=10\n").unwrap();

        Self {
            dir,
            config,
            workload,
        }
    }

    fn options(&self, configure: impl FnOnce(&mut BenchmarkOptions)) -> BenchmarkOptions {
        let mut options = BenchmarkOptions::with_workload(&self.workload);
        options.output_dir = self.dir.path().join("output");
        (options.min_mpl, options.max_mpl, options.inc_mpl) = (1, 3, 1);
        configure(&mut options);

        options
    }

    fn target(&self, kind: DbKind, configure: impl FnOnce(&mut BenchmarkOptions)) -> DatabaseTarget {
        let spec = TargetSpec {
            kind,
            label: String::new(),
        };

        DatabaseTarget::new(spec, self.options(configure)).unwrap()
    }

    fn runner<'a>(&'a self, executor: &'a ScriptedExecutor) -> Runner<'a, &'a ScriptedExecutor> {
        Runner::new(&self.config, executor)
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    names
}

#[test]
fn sweep_collects_one_record_per_mpl() {
    let setup = Setup::new();
    let executor = ScriptedExecutor::default();

    let reports = setup
        .runner(&executor)
        .run(vec![setup.target(DbKind::Redis, |_| {})], &Hooks::new())
        .unwrap();

    let stats = &reports[0].stats;
    let mpls: Vec<_> = stats.iter().map(|record| record.mpl()).collect();
    assert_eq!(mpls, vec![1, 2, 3]);
    assert!(stats.iter().all(|record| record.trial() == 1));
    assert_eq!(stats[2].get(Field::Runtime), Some(Value::Float(30.0)));
    assert_eq!(stats[0].anomaly_score(), Some(1.0));
    assert_eq!(stats.query("avg_runtime"), Ok(20.0));

    assert_eq!(executor.count("ycsb", Some("load")), 3);
    assert_eq!(executor.count("ycsb", Some("run")), 3);
}

#[test]
fn output_directory_holds_every_artifact() {
    let setup = Setup::new();
    let executor = ScriptedExecutor::default();

    let reports = setup
        .runner(&executor)
        .run(vec![setup.target(DbKind::Redis, |_| {})], &Hooks::new())
        .unwrap();
    let report = &reports[0];

    assert_eq!(report.labelname, "redis");
    assert_eq!(report.exports.len(), 3);
    assert!(report.exports.iter().all(|path| path.starts_with(&report.outdir)));

    let prefixes: Vec<_> = file_names(&report.outdir)
        .into_iter()
        .map(|name| name.split('-').next().unwrap_or_default().to_owned())
        .collect();
    assert_eq!(
        prefixes,
        vec!["averages", "config", "log", "output", "plot", "workload"]
    );
}

#[test]
fn clean_data_cleans_once_per_trial() {
    let setup = Setup::new();
    let executor = ScriptedExecutor::default();

    setup
        .runner(&executor)
        .run(
            vec![setup.target(DbKind::Redis, |options| options.trials = 2)],
            &Hooks::new(),
        )
        .unwrap();

    assert_eq!(executor.count("redis-cli", None), 2);
}

#[test]
fn without_clean_data_every_step_is_cleaned() {
    let setup = Setup::new();
    let executor = ScriptedExecutor::default();

    setup
        .runner(&executor)
        .run(
            vec![setup.target(DbKind::Redis, |options| {
                options.trials = 2;
                options.clean_data = false;
            })],
            &Hooks::new(),
        )
        .unwrap();

    // the inverted naming is long standing behaviour, two trials of three steps
    assert_eq!(executor.count("redis-cli", None), 6);
}

#[test]
fn clean_failure_aborts_the_run() {
    let setup = Setup::new();
    let executor = ScriptedExecutor {
        fail_clean: true,
        ..Default::default()
    };
    let targets = vec![
        setup.target(DbKind::Cassandra10, |_| {}),
        setup.target(DbKind::Redis, |_| {}),
    ];

    let result = setup.runner(&executor).run(targets, &Hooks::new());

    assert!(matches!(
        result,
        Err(RunnerError::Target(TargetError::Clean {
            source: ExecutorError::NonZeroExit { .. },
            ..
        }))
    ));
    assert_eq!(executor.count("cqlsh", None), 1);
    assert_eq!(executor.count("redis-cli", None), 0);
    assert_eq!(executor.count("ycsb", None), 0);
}

#[test]
fn silent_workload_yields_zero_records() {
    let setup = Setup::new();
    let executor = ScriptedExecutor {
        silent: true,
        ..Default::default()
    };

    let reports = setup
        .runner(&executor)
        .run(vec![setup.target(DbKind::MongoDb, |_| {})], &Hooks::new())
        .unwrap();
    let stats = &reports[0].stats;

    assert_eq!(stats.len(), 3);
    assert_eq!(stats[1].get(Field::Runtime), Some(Value::Float(0.0)));
    assert_eq!(stats[1].mpl(), 2);
    assert_eq!(stats.query("num_anomaly_score"), Ok(0.0));
}

#[test]
fn hooks_fire_in_lifecycle_order() {
    let setup = Setup::new();
    let executor = ScriptedExecutor::default();
    let events = Rc::new(RefCell::new(Vec::<String>::new()));
    let mut hooks = Hooks::new();

    let log = events.clone();
    hooks.on_pre_run(move || {
        log.borrow_mut().push("PRE_RUN".into());
        Ok(())
    });
    let log = events.clone();
    hooks.on_post_run(move || {
        log.borrow_mut().push("POST_RUN".into());
        Ok(())
    });
    let log = events.clone();
    hooks.on_pre_db(move |target| {
        log.borrow_mut()
            .push(format!("PRE_DB {} {}", target.labelname(), target.stats().len()));
        Ok(())
    });
    let log = events.clone();
    hooks.on_post_db(move |target| {
        log.borrow_mut()
            .push(format!("POST_DB {} {}", target.labelname(), target.stats().len()));
        Ok(())
    });
    let log = events.clone();
    hooks.on_pre_trial(move |trial, _| {
        log.borrow_mut().push(format!("PRE_TRIAL {trial}"));
        Ok(())
    });
    let log = events.clone();
    hooks.on_post_trial(move |trial, _| {
        log.borrow_mut().push(format!("POST_TRIAL {trial}"));
        Ok(())
    });
    let log = events.clone();
    hooks.on_pre_mpl(move |mpl, trial, _| {
        log.borrow_mut().push(format!("PRE_MPL {mpl} {trial}"));
        Ok(())
    });
    let log = events.clone();
    hooks.on_post_mpl(move |mpl, trial, target| {
        log.borrow_mut()
            .push(format!("POST_MPL {mpl} {trial} {}", target.stats().len()));
        Ok(())
    });

    setup
        .runner(&executor)
        .run(
            vec![setup.target(DbKind::Redis, |options| options.max_mpl = 2)],
            &hooks,
        )
        .unwrap();

    assert_eq!(
        *events.borrow(),
        vec![
            "PRE_RUN",
            "PRE_DB redis 0",
            "PRE_TRIAL 1",
            "PRE_MPL 1 1",
            "POST_MPL 1 1 1",
            "PRE_MPL 2 1",
            "POST_MPL 2 1 2",
            "POST_TRIAL 1",
            "POST_DB redis 2",
            "POST_RUN",
        ]
    );
}

#[test]
fn hook_failure_aborts_the_run() {
    let setup = Setup::new();
    let executor = ScriptedExecutor::default();
    let post_run = Rc::new(RefCell::new(false));
    let mut hooks = Hooks::new();

    hooks.on_pre_mpl(|mpl, _, _| {
        if mpl == 2 {
            Err("database unreachable".into())
        } else {
            Ok(())
        }
    });
    let fired = post_run.clone();
    hooks.on_post_run(move || {
        *fired.borrow_mut() = true;
        Ok(())
    });

    let result = setup
        .runner(&executor)
        .run(vec![setup.target(DbKind::Redis, |_| {})], &hooks);

    match result {
        Err(RunnerError::Hook(failure)) => {
            assert_eq!(failure.point, HookPoint::PreMpl);
            assert_eq!(failure.target.as_deref(), Some("redis"));
            assert_eq!(failure.to_string(), "Hook #0 of PRE_MPL failed for redis");
            assert_eq!(failure.source.to_string(), "database unreachable");
        }
        other => panic!("expected a hook failure, got {other:?}"),
    }
    assert_eq!(executor.count("ycsb", Some("run")), 1);
    assert!(!*post_run.borrow());
}

#[test]
fn targets_from_config_run_in_file_order() {
    let setup = Setup::new();
    let output = setup.dir.path().join("output");
    fs::write(
        &setup.config,
        format!(
            "targets:\n  \"redis:a, mongodb\":\n    workload: {}\n    output_dir: {}\n    max_mpl: 5\n    inc_mpl: 2\n    output_plots: false\n",
            setup.workload.to_string_lossy(),
            output.to_string_lossy()
        ),
    )
    .unwrap();

    let config = RunnerConfig::load(&setup.config).unwrap();
    let targets = load_targets(&config).unwrap();
    let executor = Rc::new(ScriptedExecutor::default());

    let reports = Runner::new(&config.path, &*executor)
        .run(targets, &Hooks::from_commands(&config.hooks, executor.clone()))
        .unwrap();

    let names: Vec<_> = reports.iter().map(|report| report.labelname.as_str()).collect();
    assert_eq!(names, vec!["redis:a", "mongodb"]);

    for report in reports.iter() {
        let mpls: Vec<_> = report.stats.iter().map(|record| record.mpl()).collect();
        assert_eq!(mpls, vec![1, 3, 5]);
        assert_eq!(report.exports.len(), 2);
    }

    // one clean per target and trial with clean_data
    assert_eq!(executor.count("redis-cli", None), 1);
    assert_eq!(executor.count("mongo", None), 1);
}

#[test]
fn command_hooks_run_through_the_executor() {
    let setup = Setup::new();
    let executor = Rc::new(ScriptedExecutor::default());
    let commands = BTreeMap::from([(HookPoint::PostMpl, vec![vec!["notify-send".to_owned()]])]);
    let hooks = Hooks::from_commands(&commands, executor.clone());

    setup
        .runner(&executor)
        .run(
            vec![setup.target(DbKind::Redis, |options| options.trials = 2)],
            &hooks,
        )
        .unwrap();

    assert_eq!(executor.count("notify-send", None), 6);
    assert_eq!(
        executor.env_values("YCSB_RUNNER_MPL"),
        vec!["1", "2", "3", "1", "2", "3"]
    );
    assert_eq!(
        executor.env_values("YCSB_RUNNER_TRIAL"),
        vec!["1", "1", "1", "2", "2", "2"]
    );
    assert_eq!(executor.env_values("YCSB_RUNNER_DATABASE"), vec!["redis"; 6]);
    assert_eq!(executor.env_values("YCSB_RUNNER_HOOK"), vec!["POST_MPL"; 6]);
}
