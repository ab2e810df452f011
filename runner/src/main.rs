use clap::Parser;
use std::{path::PathBuf, process::ExitCode, rc::Rc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use ycsb_runner::{load_targets, Hooks, LocalExecutor, Runner, RunnerConfig, RunnerError};

/// Run YCSB workloads against every configured database, sweeping the MPL
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// path of the runner configuration (YAML)
    config: PathBuf,
}

fn run(args: &Args) -> Result<(), RunnerError> {
    let config = RunnerConfig::load(&args.config)?;
    let targets = load_targets(&config)?;
    let executor = LocalExecutor::new(config.timeout());
    let hooks = Hooks::from_commands(&config.hooks, Rc::new(executor.clone()));

    info!(
        "Loaded {} target(s) from {}",
        targets.len(),
        args.config.to_string_lossy()
    );

    let reports = Runner::new(&config.path, executor).run(targets, &hooks)?;

    for report in reports {
        info!(
            records = report.stats.len(),
            "{} finished, output in {}",
            report.labelname,
            report.outdir.to_string_lossy()
        );
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // include the whole cause chain
            let mut message = e.to_string();
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                message.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            error!("{message}");

            ExitCode::FAILURE
        }
    }
}
