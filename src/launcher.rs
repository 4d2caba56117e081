//! # Driver Launchers
//!
//! A launcher runs one driver invocation to completion and hands back its
//! captured standard output. The harness only ever sees that text and the
//! exit status, which keeps the transport (process spawning) separate from
//! the contract (the text format, see [`crate::extract`]).
//!
//! Invocations are strictly sequential: `run` does not return until the
//! whole multi-process job has exited. No timeout is applied, so a hung
//! driver hangs the run.

use crate::error::{HarnessError, HarnessResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs a driver command line and returns its standard output
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn run(&self, argv: &[String]) -> HarnessResult<String>;
}

/// Launches drivers through a parallel-job launcher such as
/// `mpiexec.hydra -n 2 -bind-to hwthread`.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    prefix: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(prefix: Vec<String>) -> Self {
        Self { prefix }
    }

    /// Full argv as it will be executed: the prefix, then `argv` verbatim.
    pub fn command_line(&self, argv: &[String]) -> Vec<String> {
        self.prefix.iter().chain(argv.iter()).cloned().collect()
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn run(&self, argv: &[String]) -> HarnessResult<String> {
        let full = self.command_line(argv);
        let command = full.join(" ");
        let (program, args) = full
            .split_first()
            .ok_or_else(|| HarnessError::InvalidConfig("empty command line".to_string()))?;

        info!("running:  {}", command);
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| HarnessError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(HarnessError::LaunchFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("captured {} bytes of output", stdout.len());
        Ok(stdout)
    }
}

/// Replays canned driver output keyed by command line.
///
/// Each key holds a queue; a queue with one entry left keeps returning it,
/// so a fixed output can stand in for every trial. Useful for exercising
/// the harness without a parallel runtime on the host.
#[derive(Default)]
pub struct ScriptedLauncher {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

#[derive(Clone)]
enum Scripted {
    Output(String),
    Failure(String),
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output for the command line `argv.join(" ")`.
    pub fn respond(&self, command: impl Into<String>, output: impl Into<String>) {
        self.push(command.into(), Scripted::Output(output.into()));
    }

    /// Queue a failing exit for the given command line.
    pub fn fail(&self, command: impl Into<String>, stderr: impl Into<String>) {
        self.push(command.into(), Scripted::Failure(stderr.into()));
    }

    fn push(&self, command: String, response: Scripted) {
        self.responses
            .lock()
            .entry(command)
            .or_default()
            .push_back(response);
    }

    /// Every command line run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn next_response(&self, command: &str) -> Option<Scripted> {
        let mut responses = self.responses.lock();
        let queue = responses.get_mut(command)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn run(&self, argv: &[String]) -> HarnessResult<String> {
        let command = argv.join(" ");
        self.calls.lock().push(command.clone());

        match self.next_response(&command) {
            Some(Scripted::Output(out)) => Ok(out),
            Some(Scripted::Failure(stderr)) => Err(HarnessError::LaunchFailed {
                command,
                status: "exit status: 1".to_string(),
                stderr,
            }),
            None => Err(HarnessError::LaunchFailed {
                command,
                status: "no scripted response".to_string(),
                stderr: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_line_keeps_arguments_intact() {
        let launcher = ProcessLauncher::new(argv(&["mpiexec.hydra", "-n", "2"]));
        let full = launcher.command_line(&argv(&["/opt/pgas drivers/pgas-bench", "--bench", "get"]));
        assert_eq!(
            full,
            argv(&["mpiexec.hydra", "-n", "2", "/opt/pgas drivers/pgas-bench", "--bench", "get"])
        );
    }

    #[tokio::test]
    async fn test_scripted_launcher_replays_in_order_then_repeats_last() {
        let launcher = ScriptedLauncher::new();
        launcher.respond("drv --bench barrier", "1.00");
        launcher.respond("drv --bench barrier", "2.00");

        let cmd = argv(&["drv", "--bench", "barrier"]);
        assert_eq!(launcher.run(&cmd).await.unwrap(), "1.00");
        assert_eq!(launcher.run(&cmd).await.unwrap(), "2.00");
        assert_eq!(launcher.run(&cmd).await.unwrap(), "2.00");
        assert_eq!(launcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_launcher_unknown_command_fails() {
        let launcher = ScriptedLauncher::new();
        let err = launcher.run(&argv(&["drv"])).await.unwrap_err();
        assert!(matches!(err, HarnessError::LaunchFailed { .. }));
    }

    #[tokio::test]
    async fn test_scripted_failure_is_reported() {
        let launcher = ScriptedLauncher::new();
        launcher.fail("drv --bench put", "bus error");
        let err = launcher
            .run(&argv(&["drv", "--bench", "put"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bus error"));
    }
}
