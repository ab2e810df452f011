mod local;

pub use local::LocalExecutor;

use itertools::Itertools;
use std::{io, process::ExitStatus, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Refusing to execute an empty command")]
    EmptyCommand,
    #[error("Failed to spawn '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for '{command}'")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' exceeded the timeout of {timeout:?} and was killed")]
    Timeout { command: String, timeout: Duration },
    #[error("'{command}' exited unsuccessfully ({status})")]
    NonZeroExit { command: String, status: ExitStatus },
}

/// Runs external commands to completion, one at a time
pub trait Executor {
    /// run `argv` and return its stdout, the exit status is not inspected
    fn exec_captured(&self, argv: &[String]) -> Result<String, ExecutorError>;

    /// run `argv` and throw away its stdout, the exit status is not inspected
    fn exec_discard(&self, argv: &[String]) -> Result<(), ExecutorError>;

    /// run `argv` with inherited output, a non-zero exit is an error
    fn exec_checked(&self, argv: &[String]) -> Result<(), ExecutorError>;

    /// `exec_checked` with additional environment variables for the child
    fn exec_checked_env(
        &self,
        argv: &[String],
        env: &[(&str, String)],
    ) -> Result<(), ExecutorError>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn exec_captured(&self, argv: &[String]) -> Result<String, ExecutorError> {
        (**self).exec_captured(argv)
    }

    fn exec_discard(&self, argv: &[String]) -> Result<(), ExecutorError> {
        (**self).exec_discard(argv)
    }

    fn exec_checked(&self, argv: &[String]) -> Result<(), ExecutorError> {
        (**self).exec_checked(argv)
    }

    fn exec_checked_env(
        &self,
        argv: &[String],
        env: &[(&str, String)],
    ) -> Result<(), ExecutorError> {
        (**self).exec_checked_env(argv, env)
    }
}

/// shell-ish rendering of an argv for logs and errors
pub(crate) fn display_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("'{arg}'")
            } else {
                arg.clone()
            }
        })
        .join(" ")
}
