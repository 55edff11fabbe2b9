//! Scoped ownership of harness and subject processes.
//!
//! A [`ManagedChild`] terminates and reaps its process when dropped, so an
//! early return, a `?` or a panic can never leave a listening harness or
//! subject behind. On Unix each child runs in its own process group and
//! teardown signals the whole group: SIGTERM first, SIGKILL once the grace
//! period expires.

use crate::error::{Error, Result};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll period for exit checks.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A spawned process that is torn down on drop.
#[derive(Debug)]
pub struct ManagedChild {
    label: String,
    pid: u32,
    child: Child,
    exit: Option<ExitStatus>,
    grace: Duration,
    torn_down: bool,
}

impl ManagedChild {
    /// Spawns `command`, taking ownership of the process.
    ///
    /// Stdin is closed; stdout and stderr are inherited.
    pub fn spawn(label: impl Into<String>, command: &mut Command, grace: Duration) -> Result<Self> {
        let label = label.into();
        command.stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn().map_err(|e| {
            Error::infrastructure(format!(
                "failed to start {label} ({:?}): {e}",
                command.get_program()
            ))
        })?;
        let pid = child.id();
        tracing::info!(%label, pid, program = ?command.get_program(), "spawned");
        Ok(Self {
            label,
            pid,
            child,
            exit: None,
            grace,
            torn_down: false,
        })
    }

    /// OS process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Human-readable role of this process.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the exit status if the process has exited, reaping it.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let status = self
            .child
            .try_wait()
            .map_err(|e| Error::io(format!("polling {}", self.label), e))?;
        if let Some(status) = status {
            tracing::debug!(label = %self.label, pid = self.pid, %status, "exited");
            self.exit = Some(status);
        }
        Ok(status)
    }

    /// Stops the process group and reaps the leader. Idempotent.
    ///
    /// The group is signalled even when the leader has already exited, so
    /// background children it left behind are stopped too. Returns the
    /// leader's exit status, or `None` if it could not be collected.
    pub fn terminate(&mut self) -> Option<ExitStatus> {
        if self.torn_down {
            return self.exit;
        }
        self.torn_down = true;
        if let Err(e) = self.try_wait() {
            tracing::debug!(label = %self.label, error = %e, "poll before teardown failed");
        }

        #[cfg(unix)]
        self.terminate_group();

        if self.exit.is_none() {
            if let Err(e) = self.child.kill() {
                tracing::debug!(label = %self.label, error = %e, "kill failed");
            }
            match self.child.wait() {
                Ok(status) => self.exit = Some(status),
                Err(e) => {
                    tracing::warn!(label = %self.label, pid = self.pid, error = %e, "failed to reap");
                }
            }
        }
        self.exit
    }

    /// SIGTERM to the group, then SIGKILL if any member outlives the grace
    /// period. The leader is reaped while waiting; an unreaped leader keeps
    /// the group alive.
    #[cfg(unix)]
    fn terminate_group(&mut self) {
        use nix::sys::signal::Signal;

        if !self.signal_group(Signal::SIGTERM) {
            return;
        }
        tracing::info!(
            label = %self.label,
            pid = self.pid,
            leader_exited = self.exit.is_some(),
            "terminating process group"
        );
        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if let Err(e) = self.try_wait() {
                tracing::debug!(label = %self.label, error = %e, "poll during teardown failed");
            }
            if !self.group_alive() {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
        tracing::warn!(label = %self.label, pid = self.pid, "grace period expired; killing process group");
        self.signal_group(Signal::SIGKILL);
    }

    #[cfg(unix)]
    fn group_id(&self) -> Option<nix::unistd::Pid> {
        i32::try_from(self.pid).ok().map(nix::unistd::Pid::from_raw)
    }

    /// `true` while any process remains in the child's group.
    #[cfg(unix)]
    fn group_alive(&self) -> bool {
        self.group_id()
            .is_some_and(|pgid| nix::sys::signal::killpg(pgid, None).is_ok())
    }

    /// Sends `signal` to the child's process group. Returns `false` if the
    /// group could not be signalled, which includes an empty group.
    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> bool {
        let Some(pgid) = self.group_id() else {
            return false;
        };
        match nix::sys::signal::killpg(pgid, signal) {
            Ok(()) => true,
            Err(errno) => {
                tracing::debug!(label = %self.label, pid = self.pid, %errno, ?signal, "killpg failed");
                false
            }
        }
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Builds a [`Command`] from an argv vector.
pub fn command_from_argv(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Config("empty command line".into()))?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}
