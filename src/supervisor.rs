//! Runs the deployment tool with retries, a per-attempt deadline and the
//! SIGTERM cascade.

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};

use crate::config::runner_config::DEFAULT_GRACE_PERIOD;
use crate::error::{Result, RunnerError};
use crate::invocation::RemoteInvocation;
use crate::process_tree::{ProcessTree, SystemProcessTree, kill_children};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Terminating,
    ForceKilled,
    Reported,
}

/// One execution of the deployment tool.
#[derive(Debug, Clone)]
pub struct RunAttempt {
    pub index: u32,
    pub started_at: DateTime<Local>,
    /// `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub force_killed: bool,
}

impl RunAttempt {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Exit code this attempt maps to. A timed-out attempt never maps to 0.
    pub fn process_exit_code(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (Some(0), _) if self.timed_out => 1,
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

impl fmt::Display for RunAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attempt #{} (started {}): ",
            self.index + 1,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        match (self.exit_code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}")?,
            (None, Some(signal)) => write!(f, "killed by signal {signal}")?,
            (None, None) => write!(f, "no exit status")?,
        }
        if self.timed_out {
            write!(f, ", timed out")?;
        }
        if self.force_killed {
            write!(f, ", force-killed")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorReport {
    pub attempts: Vec<RunAttempt>,
    /// Exit code of the last attempt.
    pub exit_code: i32,
    pub state: SupervisorState,
}

impl SupervisorReport {
    pub fn succeeded(&self) -> bool {
        self.attempts.last().is_some_and(RunAttempt::succeeded)
    }

    /// One line per attempt, oldest first.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A stream of signal deliveries.
pub(crate) trait SignalSource {
    async fn recv(&mut self) -> Option<()>;
}

impl SignalSource for SignalStream {
    async fn recv(&mut self) -> Option<()> {
        SignalStream::recv(self).await
    }
}

impl SignalSource for tokio::sync::mpsc::UnboundedReceiver<()> {
    async fn recv(&mut self) -> Option<()> {
        tokio::sync::mpsc::UnboundedReceiver::recv(self).await
    }
}

/// Signal streams that stay registered for the whole run and are polled
/// alongside every wait on the child.
pub(crate) struct RunSignals<S> {
    pub(crate) terminate: S,
    pub(crate) interrupt: S,
}

pub struct ProcessSupervisor {
    grace_period: Duration,
    env: Option<HashMap<OsString, OsString>>,
    current_dir: Option<PathBuf>,
    tree: Arc<dyn ProcessTree>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Arc::new(SystemProcessTree))
    }
}

impl ProcessSupervisor {
    pub fn new(tree: Arc<dyn ProcessTree>) -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            env: None,
            current_dir: None,
            tree,
        }
    }

    /// Wait after SIGTERM before a timed-out child is force-killed.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Replaces the child's environment.
    pub fn env(mut self, env: HashMap<OsString, OsString>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Runs `invocation` up to `max_attempts` times, stopping at the first
    /// success. Each attempt is bounded by `timeout` when set.
    pub async fn run(
        &self,
        invocation: &RemoteInvocation,
        timeout: Option<Duration>,
        max_attempts: u32,
    ) -> Result<SupervisorReport> {
        // Installed before the first attempt and kept until the run returns.
        let signals = RunSignals {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        };
        self.run_with_signals(invocation, timeout, max_attempts, signals)
            .await
    }

    pub(crate) async fn run_with_signals<S: SignalSource>(
        &self,
        invocation: &RemoteInvocation,
        timeout: Option<Duration>,
        max_attempts: u32,
        mut signals: RunSignals<S>,
    ) -> Result<SupervisorReport> {
        let mut state = SupervisorState::Idle;
        let max_attempts = max_attempts.max(1);
        let mut attempts = Vec::with_capacity(max_attempts as usize);
        for index in 0..max_attempts {
            info!("Attempt #{}/{}: {invocation}", index + 1, max_attempts);
            let attempt = self
                .run_attempt(index, invocation, timeout, &mut signals, &mut state)
                .await?;
            let succeeded = attempt.succeeded();
            if !succeeded {
                info!("{attempt}");
            }
            attempts.push(attempt);
            if succeeded {
                break;
            }
        }

        let exit_code = attempts.last().map_or(1, RunAttempt::process_exit_code);
        advance(&mut state, SupervisorState::Reported);
        Ok(SupervisorReport {
            attempts,
            exit_code,
            state,
        })
    }

    async fn run_attempt<S: SignalSource>(
        &self,
        index: u32,
        invocation: &RemoteInvocation,
        timeout: Option<Duration>,
        signals: &mut RunSignals<S>,
        state: &mut SupervisorState,
    ) -> Result<RunAttempt> {
        let mut command = Command::new(invocation.program());
        command.args(invocation.args_slice()).kill_on_drop(true);
        if let Some(env) = &self.env {
            command.env_clear().envs(env);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: invocation.program().to_path_buf(),
            source,
        })?;
        let started_at = Local::now();
        advance(state, SupervisorState::Running);

        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let status = loop {
            tokio::select! {
                status = child.wait() => break Some(status?),
                Some(()) = signals.terminate.recv() => self.cascade(&child),
                Some(()) = signals.interrupt.recv() => return Err(interrupt(&mut child).await),
                _ = &mut deadline => break None,
            }
        };

        let mut attempt = RunAttempt {
            index,
            started_at,
            exit_code: None,
            signal: None,
            timed_out: false,
            force_killed: false,
        };
        let status = match status {
            Some(status) => {
                advance(state, SupervisorState::Completed);
                status
            }
            None => {
                advance(state, SupervisorState::TimedOut);
                warn!(
                    "Attempt #{} timed out after {:?}",
                    index + 1,
                    timeout.unwrap_or_default()
                );
                attempt.timed_out = true;
                let (status, force_killed) = self.teardown(&mut child, signals, state).await?;
                attempt.force_killed = force_killed;
                status
            }
        };
        attempt.exit_code = status.code();
        attempt.signal = status.signal();
        Ok(attempt)
    }

    /// Force-kills the direct children of the running deployment tool so its
    /// own shutdown path still runs.
    fn cascade(&self, child: &Child) {
        warn!("Received SIGTERM, killing the deployment tool's child processes");
        if let Some(pid) = child.id() {
            let killed = kill_children(self.tree.as_ref(), pid);
            debug!("Cascade handled {} process(es)", killed.len());
        }
    }

    /// SIGTERM, then SIGKILL once the grace period runs out. Signals keep
    /// being handled while waiting. Returns the final status and whether the
    /// force kill was needed.
    async fn teardown<S: SignalSource>(
        &self,
        child: &mut Child,
        signals: &mut RunSignals<S>,
        state: &mut SupervisorState,
    ) -> Result<(ExitStatus, bool)> {
        advance(state, SupervisorState::Terminating);
        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to {pid}: {e}");
            }
        }

        let grace = tokio::time::sleep(self.grace_period);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                status = child.wait() => return Ok((status?, false)),
                Some(()) = signals.terminate.recv() => self.cascade(child),
                Some(()) = signals.interrupt.recv() => return Err(interrupt(child).await),
                _ = &mut grace => break,
            }
        }

        error!(
            "Deployment tool did not exit within {:?} of SIGTERM, killing it",
            self.grace_period
        );
        advance(state, SupervisorState::ForceKilled);
        if let Err(e) = child.start_kill() {
            error!("Failed to kill the deployment tool: {e}");
        }
        Ok((child.wait().await?, true))
    }
}

/// Kills the deployment tool after a user interrupt.
async fn interrupt(child: &mut Child) -> RunnerError {
    warn!("Interrupted, stopping the deployment tool");
    if let Err(e) = child.kill().await {
        error!("Failed to kill the deployment tool: {e}");
    }
    RunnerError::Interrupted
}

fn advance(state: &mut SupervisorState, next: SupervisorState) {
    debug!("Supervisor state: {state:?} -> {next:?}");
    *state = next;
}
