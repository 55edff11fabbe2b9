//! Results document model.
//!
//! The harness writes one `index.json` per run:
//!
//! ```json
//! {
//!   "rust-websocket": {
//!     "1.1.1": {
//!       "behavior": "OK",
//!       "behaviorClose": "OK",
//!       "duration": 2,
//!       "remoteCloseCode": 1000,
//!       "reportfile": "rust_websocket_case_1_1_1.json"
//!     }
//!   }
//! }
//! ```
//!
//! [`ResultsDocument`] is the typed view used for rendering. Baseline
//! comparison works on the raw JSON value (see [`crate::verify`]) so that
//! fields this model does not know about still participate.

mod case_id;

pub use case_id::{CaseId, ParseCaseIdError, sort_case_ids};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Outcome status recorded by the harness for a case or its close handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Behavior {
    /// Strictly conformant.
    Ok,
    /// Acceptable, but not the recommended behavior.
    NonStrict,
    /// Feature not implemented by the subject.
    Unimplemented,
    /// Non-conformant.
    Failed,
    /// Recorded for information only; not a pass/fail verdict.
    Informational,
    /// Any other status string the harness emits (e.g. `WRONG CODE`).
    Other(String),
}

impl Behavior {
    /// Returns the harness status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::NonStrict => "NON-STRICT",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Failed => "FAILED",
            Self::Informational => "INFORMATIONAL",
            Self::Other(s) => s,
        }
    }

    /// Returns `true` for a close status that counts as a clean close.
    #[must_use]
    pub const fn is_clean_close(&self) -> bool {
        matches!(self, Self::Ok | Self::Informational)
    }
}

impl From<String> for Behavior {
    fn from(s: String) -> Self {
        match s.as_str() {
            "OK" => Self::Ok,
            "NON-STRICT" => Self::NonStrict,
            "UNIMPLEMENTED" => Self::Unimplemented,
            "FAILED" => Self::Failed,
            "INFORMATIONAL" => Self::Informational,
            _ => Self::Other(s),
        }
    }
}

impl From<Behavior> for String {
    fn from(b: Behavior) -> Self {
        b.as_str().to_string()
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One harness test case outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Overall outcome.
    pub behavior: Behavior,
    /// Outcome of the closing handshake.
    #[serde(
        rename = "behaviorClose",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub behavior_close: Option<Behavior>,
    /// Wall-clock duration in milliseconds. Volatile; ignored by comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Close code sent by the remote side, if any.
    #[serde(
        rename = "remoteCloseCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_close_code: Option<u16>,
    /// Per-case report file name, relative to the results directory.
    #[serde(rename = "reportfile", default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<String>,
}

impl TestCase {
    /// Returns `true` unless the close handshake was recorded as unclean.
    ///
    /// A case without a close status counts as clean.
    #[must_use]
    pub fn closed_cleanly(&self) -> bool {
        self.behavior_close
            .as_ref()
            .is_none_or(Behavior::is_clean_close)
    }
}

/// Cases of a single implementation, ordered by [`CaseId`].
pub type AgentResults = BTreeMap<CaseId, TestCase>;

/// Results of one harness run, keyed by implementation name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultsDocument {
    agents: BTreeMap<String, AgentResults>,
}

impl ResultsDocument {
    /// Loads and validates a results document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let value = load_json(path)?;
        Self::from_value(&value, path)
    }

    /// Builds a typed document from a parsed JSON value.
    ///
    /// `origin` labels schema errors.
    pub fn from_value(value: &Value, origin: &Path) -> Result<Self> {
        check_shape(value, origin)?;
        let mut agents = BTreeMap::new();
        // Shape already checked: every level below is an object.
        for (agent, cases) in value.as_object().into_iter().flatten() {
            let mut parsed = AgentResults::new();
            for (id, case) in cases.as_object().into_iter().flatten() {
                let case_id: CaseId = id.parse().map_err(|e: ParseCaseIdError| {
                    Error::schema(origin, format!("{agent}: {e}"))
                })?;
                let test_case: TestCase = serde_json::from_value(case.clone()).map_err(|e| {
                    Error::schema(origin, format!("{agent}/{id}: {e}"))
                })?;
                parsed.insert(case_id, test_case);
            }
            agents.insert(agent.clone(), parsed);
        }
        Ok(Self { agents })
    }

    /// Returns the cases recorded for `agent`.
    #[must_use]
    pub fn agent(&self, agent: &str) -> Option<&AgentResults> {
        self.agents.get(agent)
    }

    /// Iterates over implementations and their cases.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentResults)> {
        self.agents.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Reads and parses a JSON document.
pub fn load_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
    serde_json::from_str(&text).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Checks the results document shape: object of implementations, each an
/// object of case ids, each case an object.
pub fn check_shape(value: &Value, origin: &Path) -> Result<()> {
    let agents = value
        .as_object()
        .ok_or_else(|| Error::schema(origin, "top level must be an object of implementations"))?;
    for (agent, cases) in agents {
        let cases = cases.as_object().ok_or_else(|| {
            Error::schema(origin, format!("implementation {agent:?} must map case ids to cases"))
        })?;
        for (id, case) in cases {
            if !case.is_object() {
                return Err(Error::schema(
                    origin,
                    format!("case {agent}/{id} must be an object"),
                ));
            }
        }
    }
    Ok(())
}
