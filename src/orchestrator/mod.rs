//! Fuzzing orchestrator.
//!
//! Runs the subject implementation against the conformance harness in one
//! of two pairings:
//!
//! | Role           | Listening side | Connecting side | Harness mode    |
//! |----------------|----------------|-----------------|-----------------|
//! | [`Role::Server`] | subject        | harness         | `fuzzingclient` |
//! | [`Role::Client`] | harness        | subject         | `fuzzingserver` |
//!
//! The listening side is spawned first and probed until it accepts
//! connections, then the connecting side runs to completion. Both processes
//! are [`ManagedChild`] handles, so they are terminated on every exit path.
//! Nothing is retried.

mod interrupt;
mod process;
mod readiness;

pub use interrupt::InterruptFlag;
pub use process::{ManagedChild, command_from_argv};
pub use readiness::{ReadinessProbe, ensure_port_free};

use crate::config::{Config, RoleConfig, resolve_in};
use crate::error::{Error, Result};
use crate::harness_spec::{HarnessMode, HarnessSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

/// Which side of the connection the subject implementation plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Subject is a server; the harness fuzzes it as a client.
    Server,
    /// Subject is a client; the harness fuzzes it as a server.
    Client,
}

impl Role {
    /// Harness mode used for this role.
    #[must_use]
    pub const fn harness_mode(self) -> HarnessMode {
        match self {
            Self::Server => HarnessMode::FuzzingClient,
            Self::Client => HarnessMode::FuzzingServer,
        }
    }

    /// Lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Role the subject played.
    pub role: Role,
    /// Results document written by the harness.
    pub results_path: PathBuf,
    /// Time until the listening side accepted connections.
    pub ready_after: Duration,
    /// Total wall-clock time of the run.
    pub elapsed: Duration,
}

/// Drives harness and subject processes.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    harness_program: String,
    harness_args: Vec<String>,
    working_dir: PathBuf,
    readiness_timeout: Duration,
    readiness_interval: Duration,
    fixed_delay: Option<Duration>,
    grace: Duration,
    run_timeout: Option<Duration>,
    port_precheck: bool,
    interrupt: InterruptFlag,
}

impl Orchestrator {
    /// Builds an orchestrator from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            harness_program: config.harness.program.clone(),
            harness_args: config.harness.args.clone(),
            working_dir: config.working_dir.clone(),
            readiness_timeout: config.readiness_timeout(),
            readiness_interval: config.readiness_interval(),
            fixed_delay: config.readiness.fixed_delay_ms.map(Duration::from_millis),
            grace: config.teardown_grace(),
            run_timeout: config.run_timeout(),
            port_precheck: true,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Uses `flag` to abort waits (see [`InterruptFlag::install`]).
    #[must_use]
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = flag;
        self
    }

    /// Enables or disables the free-port check before launching the
    /// listening side.
    #[must_use]
    pub fn with_port_precheck(mut self, enabled: bool) -> Self {
        self.port_precheck = enabled;
        self
    }

    /// Runs `role` with the paths and subject from `role_config`.
    pub fn run(&self, role: Role, role_config: &RoleConfig) -> Result<RunReport> {
        match role {
            Role::Server => self.run_as_server_role(role_config),
            Role::Client => self.run_as_client_role(role_config),
        }
    }

    /// Subject server, harness in `fuzzingclient` mode.
    pub fn run_as_server_role(&self, role_config: &RoleConfig) -> Result<RunReport> {
        let started = Instant::now();
        let (spec_path, spec) = self.load_spec(role_config, Role::Server)?;
        let addr = spec.listen_addr()?;
        tracing::info!(role = "server", %addr, spec = %spec_path.display(), "starting run");
        if self.port_precheck {
            ensure_port_free(&addr)?;
        }

        let mut subject = self.spawn_subject("subject server", role_config)?;
        let ready_after = self.probe(&addr).wait(&mut subject, &self.interrupt)?;

        let mut harness = self.spawn_harness(HarnessMode::FuzzingClient, &spec_path)?;
        let status = self.supervise(&mut harness, &mut subject)?;
        if !status.success() {
            return Err(Error::infrastructure(format!("harness exited with {status}")));
        }
        subject.terminate();

        self.finish(Role::Server, &spec, started, ready_after)
    }

    /// Subject client, harness in `fuzzingserver` mode.
    pub fn run_as_client_role(&self, role_config: &RoleConfig) -> Result<RunReport> {
        let started = Instant::now();
        let (spec_path, spec) = self.load_spec(role_config, Role::Client)?;
        let addr = spec.listen_addr()?;
        tracing::info!(role = "client", %addr, spec = %spec_path.display(), "starting run");
        if self.port_precheck {
            ensure_port_free(&addr)?;
        }

        let mut harness = self.spawn_harness(HarnessMode::FuzzingServer, &spec_path)?;
        let ready_after = self.probe(&addr).wait(&mut harness, &self.interrupt)?;

        let mut subject = self.spawn_subject("subject client", role_config)?;
        let status = self.supervise(&mut subject, &mut harness)?;
        if !status.success() {
            return Err(Error::infrastructure(format!(
                "subject client exited with {status}"
            )));
        }
        harness.terminate();

        self.finish(Role::Client, &spec, started, ready_after)
    }

    fn load_spec(&self, role_config: &RoleConfig, role: Role) -> Result<(PathBuf, HarnessSpec)> {
        let path = resolve_in(&self.working_dir, &role_config.spec);
        let spec = HarnessSpec::load(&path, role.harness_mode())?;
        Ok((path, spec))
    }

    fn probe(&self, addr: &str) -> ReadinessProbe {
        match self.fixed_delay {
            Some(delay) => ReadinessProbe::Delay(delay),
            None => ReadinessProbe::Tcp {
                addr: addr.to_string(),
                timeout: self.readiness_timeout,
                interval: self.readiness_interval,
            },
        }
    }

    fn spawn_harness(&self, mode: HarnessMode, spec_path: &Path) -> Result<ManagedChild> {
        let mut command = Command::new(&self.harness_program);
        command
            .args(&self.harness_args)
            .arg("-m")
            .arg(mode.as_arg())
            .arg("-s")
            .arg(spec_path)
            .current_dir(&self.working_dir);
        ManagedChild::spawn(format!("harness ({mode})"), &mut command, self.grace)
    }

    fn spawn_subject(&self, label: &str, role_config: &RoleConfig) -> Result<ManagedChild> {
        let mut command = command_from_argv(&role_config.subject)?;
        command.current_dir(&self.working_dir);
        ManagedChild::spawn(label, &mut command, self.grace)
    }

    /// Waits for `primary` to exit while `companion` must stay up.
    fn supervise(
        &self,
        primary: &mut ManagedChild,
        companion: &mut ManagedChild,
    ) -> Result<ExitStatus> {
        let deadline = self.run_timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(status) = primary.try_wait()? {
                tracing::info!(label = primary.label(), %status, "finished");
                return Ok(status);
            }
            if let Some(status) = companion.try_wait()? {
                return Err(Error::infrastructure(format!(
                    "{} exited with {status} while {} was running",
                    companion.label(),
                    primary.label()
                )));
            }
            self.interrupt.check()?;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::infrastructure(format!(
                    "{} did not finish within the run timeout",
                    primary.label()
                )));
            }
            thread::sleep(process::POLL_INTERVAL);
        }
    }

    fn finish(
        &self,
        role: Role,
        spec: &HarnessSpec,
        started: Instant,
        ready_after: Duration,
    ) -> Result<RunReport> {
        let results_path = spec.results_index(&self.working_dir);
        if !results_path.is_file() {
            return Err(Error::infrastructure(format!(
                "harness produced no results at {}",
                results_path.display()
            )));
        }
        let report = RunReport {
            role,
            results_path,
            ready_after,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            %role,
            results = %report.results_path.display(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        Ok(report)
    }
}
