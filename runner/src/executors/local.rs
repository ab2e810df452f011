use super::{display_command, Executor, ExecutorError};
use nix::{
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use std::{
    io::{self, Read},
    os::unix::process::CommandExt,
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, instrument, trace, warn};
use wait_timeout::ChildExt;

/// Executor spawning processes on the local machine
///
/// Every command leads its own process group. A timeout kills the whole
/// group, which also reaches the JVM started by the `ycsb` launcher script.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    timeout: Option<Duration>,
}

impl LocalExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn spawn(
        &self,
        argv: &[String],
        env: &[(&str, String)],
        stdout: Stdio,
    ) -> Result<Child, ExecutorError> {
        let (program, args) = argv.split_first().ok_or(ExecutorError::EmptyCommand)?;

        debug!(command = display_command(argv), "Spawning");

        Command::new(program)
            .args(args)
            .envs(env.iter().map(|(key, value)| (*key, value)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: display_command(argv),
                source,
            })
    }

    /// block until the child exits, killing its process group once the timeout is exceeded
    fn wait(&self, argv: &[String], child: &mut Child) -> Result<ExitStatus, ExecutorError> {
        let start = Instant::now();
        let wait_error = |source: io::Error| ExecutorError::Wait {
            command: display_command(argv),
            source,
        };

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout).map_err(wait_error)? {
                Some(status) => status,
                None => {
                    warn!(
                        command = display_command(argv),
                        "Timeout of {timeout:?} exceeded, killing process group"
                    );
                    kill_group(child);
                    child.wait().map_err(wait_error)?;

                    return Err(ExecutorError::Timeout {
                        command: display_command(argv),
                        timeout,
                    });
                }
            },
            None => child.wait().map_err(wait_error)?,
        };

        debug!(
            "Finished in {} ms | status: {status}",
            start.elapsed().as_millis()
        );

        Ok(status)
    }

    fn checked(&self, argv: &[String], env: &[(&str, String)]) -> Result<(), ExecutorError> {
        let mut child = self.spawn(argv, env, Stdio::inherit())?;
        let status = self.wait(argv, &mut child)?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecutorError::NonZeroExit {
                command: display_command(argv),
                status,
            })
        }
    }
}

/// SIGKILL the group led by `child`, descendants holding our pipes included
fn kill_group(child: &mut Child) {
    let group = Pid::from_raw(child.id() as i32);

    if let Err(error) = killpg(group, Signal::SIGKILL) {
        // the group may have exited right after the timeout fired
        debug!("Failed to kill process group {group}: {error}");
        if let Err(error) = child.kill() {
            debug!("Failed to kill child: {error}");
        }
    }
}

/// drain stdout on its own thread so a chatty child never blocks on a full pipe
fn read_stdout(child: &mut Child) -> Option<JoinHandle<String>> {
    child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(error) = stdout.read_to_end(&mut buffer) {
                warn!("Failed to read child stdout: {error}");
            }

            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

impl Executor for LocalExecutor {
    #[instrument(skip(self), level = "debug")]
    fn exec_captured(&self, argv: &[String]) -> Result<String, ExecutorError> {
        let mut child = self.spawn(argv, &[], Stdio::piped())?;
        let reader = read_stdout(&mut child);
        let status = self.wait(argv, &mut child);

        let output = match reader.map(JoinHandle::join) {
            Some(Ok(output)) => output,
            Some(Err(_)) => {
                warn!("Stdout reader thread panicked");
                String::new()
            }
            None => String::new(),
        };

        // status is only checked for timeouts and wait failures
        let status = status?;
        trace!(%status, "Output: {output}");

        Ok(output)
    }

    #[instrument(skip(self), level = "debug")]
    fn exec_discard(&self, argv: &[String]) -> Result<(), ExecutorError> {
        let mut child = self.spawn(argv, &[], Stdio::null())?;
        self.wait(argv, &mut child)?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn exec_checked(&self, argv: &[String]) -> Result<(), ExecutorError> {
        self.checked(argv, &[])
    }

    #[instrument(skip(self, env), level = "debug")]
    fn exec_checked_env(
        &self,
        argv: &[String],
        env: &[(&str, String)],
    ) -> Result<(), ExecutorError> {
        self.checked(argv, env)
    }
}
