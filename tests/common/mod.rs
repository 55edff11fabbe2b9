//! Shared fixtures for integration tests.
//!
//! A [`Workspace`] is a temporary working directory with shell scripts
//! standing in for the harness and the subject. The orchestrator runs both
//! with the workspace as current directory, so the scripts coordinate
//! through plain files (`subject.pid`, `harness.pid`, `out/index.json`).

#![allow(dead_code)]

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wsconform::Config;
use wsconform::harness_spec::HarnessSpec;

pub use wsconform::test_utils::init_test_logging;

/// Agent name used in canned results.
pub const AGENT: &str = "subject";

/// Canned harness output: three cases, one NON-STRICT.
pub const FRESH_INDEX: &str = r#"{
  "subject": {
    "1.1.1": {"behavior": "OK", "behaviorClose": "OK", "duration": 2, "remoteCloseCode": 1000, "reportfile": "subject_case_1_1_1.json"},
    "2.10.1": {"behavior": "OK", "behaviorClose": "OK", "duration": 7, "remoteCloseCode": 1000, "reportfile": "subject_case_2_10_1.json"},
    "2.3.1": {"behavior": "NON-STRICT", "behaviorClose": "OK", "duration": 4, "remoteCloseCode": 1000, "reportfile": "subject_case_2_3_1.json"}
  }
}
"#;

/// Same cases as [`FRESH_INDEX`] with other durations and 2.3.1 passing.
pub const STRICT_BASELINE: &str = r#"{
  "subject": {
    "1.1.1": {"behavior": "OK", "behaviorClose": "OK", "duration": 11, "remoteCloseCode": 1000, "reportfile": "subject_case_1_1_1.json"},
    "2.10.1": {"behavior": "OK", "behaviorClose": "OK", "duration": 3, "remoteCloseCode": 1000, "reportfile": "subject_case_2_10_1.json"},
    "2.3.1": {"behavior": "OK", "behaviorClose": "OK", "duration": 9, "remoteCloseCode": 1000, "reportfile": "subject_case_2_3_1.json"}
  }
}
"#;

/// Harness in `fuzzingclient` mode: waits for the subject, emits results.
pub const CLIENT_HARNESS_OK: &str = r#"
echo "$@" > harness.args
while [ ! -f subject.pid ]; do sleep 0.05; done
mkdir -p out
cp canned_index.json out/index.json
"#;

/// Subject server that records its pid and idles until terminated.
pub const IDLE_SUBJECT: &str = "echo $$ > subject.pid\nexec sleep 30\n";

/// Harness that records its pid and idles until terminated.
pub const IDLE_HARNESS: &str = "echo $$ > harness.pid\nexec sleep 30\n";

/// Harness in `fuzzingserver` mode: publishes results, then idles.
pub const SERVER_HARNESS_OK: &str = r#"
echo "$@" > harness.args
mkdir -p out
cp canned_index.json out/index.json
echo $$ > harness.pid
exec sleep 30
"#;

/// Subject client that waits for the harness and then exits cleanly.
pub const CLIENT_SUBJECT_OK: &str = r#"
while [ ! -f harness.pid ]; do sleep 0.05; done
echo $$ > subject.pid
"#;

/// A temporary working directory with a matching [`Config`].
pub struct Workspace {
    dir: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config {
            working_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        config.harness.program = "/bin/sh".to_string();
        config.readiness.timeout_ms = 3_000;
        config.readiness.interval_ms = 20;
        config.teardown.grace_ms = 500;
        config.server.baseline = PathBuf::from("server-results.json");
        config.client.baseline = PathBuf::from("client-results.json");
        fs::write(dir.path().join("canned_index.json"), FRESH_INDEX).expect("canned index");
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        fs::write(&path, contents).expect("write fixture");
        path
    }

    /// Subject server listens on `port`; harness runs `harness` with
    /// `-m fuzzingclient -s <spec>` appended.
    pub fn server_role(&mut self, port: u16, harness: &str, subject: &str) {
        let spec = HarnessSpec::default_client(AGENT, port, "out");
        spec.write(&self.path("fuzzingclient.json")).expect("spec");
        self.config.server.spec = PathBuf::from("fuzzingclient.json");
        self.set_scripts(harness, subject, true);
    }

    /// Harness listens on `port`; subject client runs to completion.
    pub fn client_role(&mut self, port: u16, harness: &str, subject: &str) {
        let spec = HarnessSpec::default_server(port, "out");
        spec.write(&self.path("fuzzingserver.json")).expect("spec");
        self.config.client.spec = PathBuf::from("fuzzingserver.json");
        self.set_scripts(harness, subject, false);
    }

    fn set_scripts(&mut self, harness: &str, subject: &str, server: bool) {
        let harness = self.write("harness.sh", harness);
        let subject = self.write("subject.sh", subject);
        self.config.harness.args = vec![harness.display().to_string()];
        let argv = vec!["/bin/sh".to_string(), subject.display().to_string()];
        if server {
            self.config.server.subject = argv;
        } else {
            self.config.client.subject = argv;
        }
    }

    /// Pid recorded by a script in `file`, if it got that far.
    pub fn recorded_pid(&self, file: &str) -> Option<i32> {
        fs::read_to_string(self.path(file))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// A port nothing listens on.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("free port")
}

/// A listener standing in for the listening role.
pub fn bound_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, port)
}

/// `true` if `pid` still names a process.
#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
