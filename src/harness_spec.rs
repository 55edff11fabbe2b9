//! Autobahn harness specification files.
//!
//! The harness takes a JSON spec per mode:
//!
//! - `fuzzingclient`: the harness connects to subject servers listed under
//!   `servers`
//! - `fuzzingserver`: the harness listens on `url` and subject clients
//!   connect to it
//!
//! Both carry the output directory (`outdir`) where `index.json` lands, and
//! the case selection (`cases`, `exclude-cases`, `exclude-agent-cases`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Harness run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarnessMode {
    /// Harness acts as the client; the subject is a server.
    FuzzingClient,
    /// Harness acts as the server; the subject is a client.
    FuzzingServer,
}

impl HarnessMode {
    /// Value passed to the harness `-m` flag.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::FuzzingClient => "fuzzingclient",
            Self::FuzzingServer => "fuzzingserver",
        }
    }
}

impl fmt::Display for HarnessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Case selection shared by both spec kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSelection {
    /// Case patterns to run (`"*"`, `"1.*"`, `"9.1.1"`).
    #[serde(default = "all_cases")]
    pub cases: Vec<String>,
    /// Case patterns to skip.
    #[serde(rename = "exclude-cases", default)]
    pub exclude_cases: Vec<String>,
    /// Case patterns to skip per agent.
    #[serde(rename = "exclude-agent-cases", default)]
    pub exclude_agent_cases: BTreeMap<String, Vec<String>>,
}

impl Default for CaseSelection {
    fn default() -> Self {
        Self {
            cases: all_cases(),
            exclude_cases: Vec::new(),
            exclude_agent_cases: BTreeMap::new(),
        }
    }
}

fn all_cases() -> Vec<String> {
    vec!["*".to_string()]
}

/// A subject server the harness connects to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerTarget {
    /// Implementation name; becomes the results document key.
    pub agent: String,
    /// WebSocket URL of the subject server.
    pub url: String,
    /// Harness options passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// `fuzzingclient` spec: harness connects to subject servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzingClientSpec {
    /// Directory the harness writes reports into.
    pub outdir: String,
    /// Subject servers under test.
    pub servers: Vec<ServerTarget>,
    /// Case selection.
    #[serde(flatten)]
    pub selection: CaseSelection,
    /// Harness options passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// `fuzzingserver` spec: harness listens for subject clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzingServerSpec {
    /// URL the harness listens on.
    pub url: String,
    /// Directory the harness writes reports into.
    pub outdir: String,
    /// Case selection.
    #[serde(flatten)]
    pub selection: CaseSelection,
    /// Harness options passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// A loaded harness spec of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum HarnessSpec {
    /// `fuzzingclient` spec.
    Client(FuzzingClientSpec),
    /// `fuzzingserver` spec.
    Server(FuzzingServerSpec),
}

impl HarnessSpec {
    /// Reads the spec for `mode` from `path`.
    pub fn load(path: &Path, mode: HarnessMode) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading harness spec {}", path.display()), e))?;
        let bad = |e: serde_json::Error| {
            Error::Config(format!("invalid {mode} spec {}: {e}", path.display()))
        };
        let spec = match mode {
            HarnessMode::FuzzingClient => Self::Client(serde_json::from_str(&text).map_err(bad)?),
            HarnessMode::FuzzingServer => Self::Server(serde_json::from_str(&text).map_err(bad)?),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Writes the spec as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = match self {
            Self::Client(spec) => serde_json::to_string_pretty(spec),
            Self::Server(spec) => serde_json::to_string_pretty(spec),
        }
        .map_err(|e| Error::Config(format!("serializing harness spec: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        fs::write(path, json + "\n")
            .map_err(|e| Error::io(format!("writing harness spec {}", path.display()), e))
    }

    /// Default `fuzzingclient` spec for one subject server.
    #[must_use]
    pub fn default_client(agent: &str, subject_port: u16, outdir: &str) -> Self {
        Self::Client(FuzzingClientSpec {
            outdir: outdir.to_string(),
            servers: vec![ServerTarget {
                agent: agent.to_string(),
                url: format!("ws://127.0.0.1:{subject_port}"),
                options: None,
            }],
            selection: CaseSelection::default(),
            options: None,
        })
    }

    /// Default `fuzzingserver` spec listening on `harness_port`.
    #[must_use]
    pub fn default_server(harness_port: u16, outdir: &str) -> Self {
        Self::Server(FuzzingServerSpec {
            url: format!("ws://127.0.0.1:{harness_port}"),
            outdir: outdir.to_string(),
            selection: CaseSelection::default(),
            options: None,
        })
    }

    /// Mode this spec drives.
    #[must_use]
    pub const fn mode(&self) -> HarnessMode {
        match self {
            Self::Client(_) => HarnessMode::FuzzingClient,
            Self::Server(_) => HarnessMode::FuzzingServer,
        }
    }

    /// Output directory as written in the spec.
    #[must_use]
    pub fn outdir(&self) -> &str {
        match self {
            Self::Client(spec) => &spec.outdir,
            Self::Server(spec) => &spec.outdir,
        }
    }

    /// Path of the results document, resolving a relative `outdir` against
    /// `base`.
    #[must_use]
    pub fn results_index(&self, base: &Path) -> PathBuf {
        base.join(self.outdir()).join("index.json")
    }

    /// Socket address of the listening role.
    ///
    /// For `fuzzingclient` this is the (first) subject server; for
    /// `fuzzingserver` it is the harness itself.
    pub fn listen_addr(&self) -> Result<String> {
        let url = match self {
            Self::Client(spec) => spec
                .servers
                .first()
                .map(|s| s.url.as_str())
                .ok_or_else(|| Error::Config("fuzzingclient spec lists no servers".into()))?,
            Self::Server(spec) => spec.url.as_str(),
        };
        socket_addr_from_url(url)
    }

    fn validate(&self) -> Result<()> {
        if self.outdir().trim().is_empty() {
            return Err(Error::Config("harness spec has an empty outdir".into()));
        }
        if let Self::Client(spec) = self {
            if spec.servers.is_empty() {
                return Err(Error::Config("fuzzingclient spec lists no servers".into()));
            }
            for server in &spec.servers {
                socket_addr_from_url(&server.url)?;
            }
        }
        if let Self::Server(spec) = self {
            socket_addr_from_url(&spec.url)?;
        }
        Ok(())
    }
}

/// Extracts `host:port` from a `ws://` or `wss://` URL.
///
/// A missing port defaults to 80 (`ws`) or 443 (`wss`).
pub fn socket_addr_from_url(url: &str) -> Result<String> {
    let (rest, default_port) = if let Some(rest) = url.strip_prefix("ws://") {
        (rest, 80)
    } else if let Some(rest) = url.strip_prefix("wss://") {
        (rest, 443)
    } else {
        return Err(Error::Config(format!("not a websocket url: {url:?}")));
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(Error::Config(format!("websocket url has no host: {url:?}")));
    }
    // Bracketed IPv6 literal: [::1]:9001
    if authority.starts_with('[') {
        return match authority.rfind("]:") {
            Some(idx) => {
                parse_port(&authority[idx + 2..], url)?;
                Ok(authority.to_string())
            }
            None => Ok(format!("{authority}:{default_port}")),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            parse_port(port, url)?;
            Ok(authority.to_string())
        }
        Some(_) => Err(Error::Config(format!("websocket url has no host: {url:?}"))),
        None => Ok(format!("{authority}:{default_port}")),
    }
}

fn parse_port(port: &str, url: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| Error::Config(format!("invalid port in websocket url {url:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fuzzingclient_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzingclient.json");
        fs::write(
            &path,
            r#"{
                "outdir": "./autobahn/server",
                "servers": [{"agent": "rust-websocket", "url": "ws://127.0.0.1:9002"}],
                "cases": ["*"],
                "exclude-cases": ["12.*", "13.*"],
                "exclude-agent-cases": {}
            }"#,
        )
        .unwrap();
        let spec = HarnessSpec::load(&path, HarnessMode::FuzzingClient).unwrap();
        assert_eq!(spec.mode(), HarnessMode::FuzzingClient);
        assert_eq!(spec.listen_addr().unwrap(), "127.0.0.1:9002");
        assert_eq!(
            spec.results_index(Path::new("/work")),
            PathBuf::from("/work/./autobahn/server/index.json")
        );
        let HarnessSpec::Client(inner) = spec else {
            panic!("expected client spec");
        };
        assert_eq!(inner.selection.exclude_cases, vec!["12.*", "13.*"]);
    }

    #[test]
    fn parses_fuzzingserver_spec_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzingserver.json");
        fs::write(&path, r#"{"url": "ws://127.0.0.1:9001", "outdir": "autobahn/client"}"#).unwrap();
        let spec = HarnessSpec::load(&path, HarnessMode::FuzzingServer).unwrap();
        assert_eq!(spec.listen_addr().unwrap(), "127.0.0.1:9001");
        let HarnessSpec::Server(inner) = spec else {
            panic!("expected server spec");
        };
        assert_eq!(inner.selection.cases, vec!["*"]);
    }

    #[test]
    fn client_spec_without_servers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fuzzingclient.json");
        fs::write(&path, r#"{"outdir": "out", "servers": []}"#).unwrap();
        let err = HarnessSpec::load(&path, HarnessMode::FuzzingClient).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn default_specs_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/fuzzingclient.json");
        let spec = HarnessSpec::default_client("rust-websocket", 9002, "autobahn/server");
        spec.write(&path).unwrap();
        let loaded = HarnessSpec::load(&path, HarnessMode::FuzzingClient).unwrap();
        assert_eq!(loaded, spec);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"exclude-agent-cases\""));
    }

    #[test]
    fn url_to_socket_addr() {
        assert_eq!(socket_addr_from_url("ws://127.0.0.1:9001").unwrap(), "127.0.0.1:9001");
        assert_eq!(socket_addr_from_url("ws://localhost:9001/runCase?case=1").unwrap(), "localhost:9001");
        assert_eq!(socket_addr_from_url("ws://example.com").unwrap(), "example.com:80");
        assert_eq!(socket_addr_from_url("wss://example.com/x").unwrap(), "example.com:443");
        assert_eq!(socket_addr_from_url("ws://[::1]:9001").unwrap(), "[::1]:9001");
        assert!(socket_addr_from_url("http://127.0.0.1:9001").is_err());
        assert!(socket_addr_from_url("ws://127.0.0.1:99999").is_err());
        assert!(socket_addr_from_url("ws://:9001").is_err());
    }

    #[test]
    fn mode_args() {
        assert_eq!(HarnessMode::FuzzingClient.as_arg(), "fuzzingclient");
        assert_eq!(HarnessMode::FuzzingServer.to_string(), "fuzzingserver");
    }
}
