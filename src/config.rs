//! Configuration.
//!
//! Every setting has a conventional default, so `wsconform server` works
//! with no flags and no config file. A `wsconform.toml` in the working
//! directory (or a file passed with `--config`) overrides any subset:
//!
//! ```toml
//! relax_non_strict = false
//! run_timeout_secs = 1800
//!
//! [harness]
//! program = "wstest"
//!
//! [readiness]
//! timeout_ms = 10000
//! interval_ms = 100
//!
//! [server]
//! spec = "autobahn/fuzzingclient.json"
//! baseline = "autobahn/server-results.json"
//! subject = ["target/release/examples/autobahn-server", "127.0.0.1:9002"]
//! ```

use crate::error::{Error, Result};
use crate::orchestrator::Role;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "wsconform.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory relative paths resolve against; also the process cwd.
    pub working_dir: PathBuf,
    /// Collapse NON-STRICT into OK before comparing.
    pub relax_non_strict: bool,
    /// Upper bound on waiting for the harness or subject to finish.
    pub run_timeout_secs: Option<u64>,
    /// Harness invocation.
    pub harness: HarnessConfig,
    /// Readiness probing of the listening role.
    pub readiness: ReadinessConfig,
    /// Process teardown.
    pub teardown: TeardownConfig,
    /// Subject acting as a server (harness in `fuzzingclient` mode).
    pub server: RoleConfig,
    /// Subject acting as a client (harness in `fuzzingserver` mode).
    pub client: RoleConfig,
}

/// How to invoke the conformance harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Harness executable.
    pub program: String,
    /// Extra arguments placed before `-m <mode> -s <spec>`.
    pub args: Vec<String>,
}

/// Readiness probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    /// Give up after this long.
    pub timeout_ms: u64,
    /// Delay between connection attempts.
    pub interval_ms: u64,
    /// Legacy fixed wait instead of probing. Flaky; avoid.
    pub fixed_delay_ms: Option<u64>,
}

/// Teardown settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TeardownConfig {
    /// Time between SIGTERM and SIGKILL.
    pub grace_ms: u64,
}

/// Paths and subject command for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    /// Harness spec file.
    pub spec: PathBuf,
    /// Committed baseline results document.
    pub baseline: PathBuf,
    /// Subject command line (program followed by arguments).
    pub subject: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            relax_non_strict: false,
            run_timeout_secs: None,
            harness: HarnessConfig::default(),
            readiness: ReadinessConfig::default(),
            teardown: TeardownConfig::default(),
            server: RoleConfig::default_for(Role::Server),
            client: RoleConfig::default_for(Role::Client),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: "wstest".to_string(),
            args: Vec::new(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            interval_ms: 100,
            fixed_delay_ms: None,
        }
    }
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self { grace_ms: 2_000 }
    }
}

impl RoleConfig {
    /// Conventional paths for `role`.
    #[must_use]
    pub fn default_for(role: Role) -> Self {
        match role {
            Role::Server => Self {
                spec: PathBuf::from("autobahn/fuzzingclient.json"),
                baseline: PathBuf::from("autobahn/server-results.json"),
                subject: vec!["target/debug/examples/autobahn-server".to_string()],
            },
            Role::Client => Self {
                spec: PathBuf::from("autobahn/fuzzingserver.json"),
                baseline: PathBuf::from("autobahn/client-results.json"),
                subject: vec!["target/debug/examples/autobahn-client".to_string()],
            },
        }
    }
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`]
    /// is used if present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE}; using defaults");
                    return Ok(Self::default());
                }
                candidate
            }
        };
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::io(format!("reading config {}", path.display()), e))?;
        let config = Self::from_toml_str(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.harness.program.trim().is_empty() {
            return Err(Error::Config("harness.program is empty".into()));
        }
        if self.readiness.interval_ms == 0 {
            return Err(Error::Config("readiness.interval_ms must be positive".into()));
        }
        if self.readiness.timeout_ms < self.readiness.interval_ms {
            return Err(Error::Config(
                "readiness.timeout_ms must be at least readiness.interval_ms".into(),
            ));
        }
        for (name, role) in [("server", &self.server), ("client", &self.client)] {
            if role.subject.is_empty() || role.subject[0].trim().is_empty() {
                return Err(Error::Config(format!("{name}.subject has no program")));
            }
        }
        Ok(())
    }

    /// Settings for `role`.
    #[must_use]
    pub const fn role(&self, role: Role) -> &RoleConfig {
        match role {
            Role::Server => &self.server,
            Role::Client => &self.client,
        }
    }

    /// Resolves `path` against [`Config::working_dir`].
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_in(&self.working_dir, path)
    }

    /// Readiness probe timeout.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness.timeout_ms)
    }

    /// Readiness probe interval.
    #[must_use]
    pub const fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness.interval_ms)
    }

    /// Teardown grace period.
    #[must_use]
    pub const fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown.grace_ms)
    }

    /// Overall run timeout, if any.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

/// Joins a relative `path` onto `base`; absolute paths pass through.
pub(crate) fn resolve_in(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
