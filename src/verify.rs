//! Baseline comparison.
//!
//! [`verify`] decides whether a freshly produced results document matches
//! the committed baseline:
//!
//! 1. check both documents have the results shape
//! 2. optionally collapse `NON-STRICT` statuses into `OK`
//! 3. strip the `duration` field of every case record
//! 4. canonicalize key order
//! 5. compare structurally
//!
//! A mismatch carries a [`Diff`] listing each differing path, so the report
//! names the affected cases directly.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use wsconform::verify::{verify, MatchResult, VerifyOptions};
//!
//! let baseline = json!({"ok-impl": {"1.1.1": {"behavior": "OK", "duration": 3}}});
//! let fresh = json!({"ok-impl": {"1.1.1": {"behavior": "OK", "duration": 9}}});
//!
//! let result = verify(&baseline, &fresh, &VerifyOptions::default()).unwrap();
//! assert!(result.is_match());
//! ```

use crate::error::{Error, Result};
use crate::results::{check_shape, load_json, sort_case_ids};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// Field stripped before comparison.
const VOLATILE_FIELD: &str = "duration";

/// Fields holding a harness status string.
const STATUS_FIELDS: [&str; 2] = ["behavior", "behaviorClose"];

const NON_STRICT: &str = "NON-STRICT";
const OK: &str = "OK";

/// Comparison policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Treat `NON-STRICT` as `OK` on both sides.
    ///
    /// Weakens the regression signal; opt-in only.
    pub relax_non_strict: bool,
}

impl VerifyOptions {
    /// Options with NON-STRICT relaxation enabled.
    #[must_use]
    pub const fn relaxed() -> Self {
        Self {
            relax_non_strict: true,
        }
    }
}

/// One differing location between baseline and fresh documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Difference {
    /// Slash-separated path, e.g. `/agent/1.1.1/behavior`.
    pub path: String,
    /// Value in the baseline, `None` if absent.
    pub baseline: Option<Value>,
    /// Value in the fresh document, `None` if absent.
    pub fresh: Option<Value>,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.baseline, &self.fresh) {
            (Some(b), Some(n)) => write!(f, "~ {}: {} -> {}", self.path, b, n),
            (Some(b), None) => write!(f, "- {}: {}", self.path, b),
            (None, Some(n)) => write!(f, "+ {}: {}", self.path, n),
            (None, None) => write!(f, "  {}", self.path),
        }
    }
}

/// Structural diff of two canonical documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    /// Differences in document order (implementations, then cases by id).
    pub entries: Vec<Difference>,
}

impl Diff {
    /// Returns `true` if there are no differences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the distinct `agent/case` pairs touched by the diff.
    #[must_use]
    pub fn affected_cases(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in &self.entries {
            let key: Vec<&str> = entry
                .path
                .trim_start_matches('/')
                .splitn(3, '/')
                .take(2)
                .collect();
            let joined = key.join("/");
            if !out.contains(&joined) {
                out.push(joined);
            }
        }
        out
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Outcome of a baseline comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    /// Canonical forms are equal.
    Match,
    /// Canonical forms differ.
    Mismatch {
        /// What differs.
        diff: Diff,
    },
}

impl MatchResult {
    /// Returns `true` for [`MatchResult::Match`].
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Converts a mismatch into a [`Error::Regression`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Match => Ok(()),
            Self::Mismatch { diff } => Err(Error::Regression {
                diff: diff.to_string(),
            }),
        }
    }
}

/// Strips volatile fields and applies the relaxation policy in place.
///
/// Only case records are touched (`document -> agent -> case`); agent names
/// and case ids are data, so an implementation called `duration` survives.
pub fn normalize(value: &mut Value, options: &VerifyOptions) {
    let Value::Object(agents) = value else {
        return;
    };
    for cases in agents.values_mut() {
        let Value::Object(cases) = cases else {
            continue;
        };
        for case in cases.values_mut() {
            if let Value::Object(record) = case {
                normalize_case(record, options);
            }
        }
    }
}

fn normalize_case(record: &mut Map<String, Value>, options: &VerifyOptions) {
    record.remove(VOLATILE_FIELD);
    if !options.relax_non_strict {
        return;
    }
    for field in STATUS_FIELDS {
        if let Some(status) = record.get_mut(field) {
            if status.as_str() == Some(NON_STRICT) {
                *status = Value::String(OK.to_string());
            }
        }
    }
}

/// Returns a copy of `value` with object keys in sorted order.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Normalizes and serializes `value` in canonical pretty form.
pub fn canonical_string(value: &Value, options: &VerifyOptions) -> String {
    let mut normalized = value.clone();
    normalize(&mut normalized, options);
    // Serializing a Value cannot fail: all keys are strings.
    serde_json::to_string_pretty(&canonicalize(&normalized)).unwrap_or_default()
}

/// Compares `fresh` against `baseline`.
///
/// Fails with [`Error::Schema`] if either document has the wrong shape or an
/// implementation recorded in the baseline is missing from `fresh`.
pub fn verify(baseline: &Value, fresh: &Value, options: &VerifyOptions) -> Result<MatchResult> {
    verify_labeled(baseline, Path::new("<baseline>"), fresh, Path::new("<fresh>"), options)
}

/// Loads both documents from disk and compares them.
pub fn verify_files(
    baseline_path: &Path,
    fresh_path: &Path,
    options: &VerifyOptions,
) -> Result<MatchResult> {
    let baseline = load_json(baseline_path)?;
    let fresh = load_json(fresh_path)?;
    verify_labeled(&baseline, baseline_path, &fresh, fresh_path, options)
}

fn verify_labeled(
    baseline: &Value,
    baseline_origin: &Path,
    fresh: &Value,
    fresh_origin: &Path,
    options: &VerifyOptions,
) -> Result<MatchResult> {
    check_shape(baseline, baseline_origin)?;
    check_shape(fresh, fresh_origin)?;

    // Shapes checked above, so both are objects.
    if let (Some(expected), Some(actual)) = (baseline.as_object(), fresh.as_object()) {
        if let Some(missing) = expected.keys().find(|agent| !actual.contains_key(*agent)) {
            return Err(Error::schema(
                fresh_origin,
                format!("implementation {missing:?} from the baseline has no results"),
            ));
        }
    }

    let mut left = baseline.clone();
    let mut right = fresh.clone();
    normalize(&mut left, options);
    normalize(&mut right, options);
    let left = canonicalize(&left);
    let right = canonicalize(&right);

    if left == right {
        tracing::debug!("fresh results match baseline");
        return Ok(MatchResult::Match);
    }

    let mut diff = Diff::default();
    diff_values(&left, &right, &mut String::new(), &mut diff.entries);
    tracing::info!(differences = diff.entries.len(), "fresh results differ from baseline");
    Ok(MatchResult::Mismatch { diff })
}

fn diff_values(left: &Value, right: &Value, path: &mut String, out: &mut Vec<Difference>) {
    match (left, right) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&str> = a
                .keys()
                .chain(b.keys())
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            sort_case_ids(&mut keys);
            for key in keys {
                let len = path.len();
                path.push('/');
                path.push_str(key);
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => diff_values(x, y, path, out),
                    (x, y) => out.push(Difference {
                        path: path.clone(),
                        baseline: x.cloned(),
                        fresh: y.cloned(),
                    }),
                }
                path.truncate(len);
            }
        }
        (a, b) if a != b => out.push(Difference {
            path: if path.is_empty() { "/".into() } else { path.clone() },
            baseline: Some(a.clone()),
            fresh: Some(b.clone()),
        }),
        _ => {}
    }
}

/// Rewrites `baseline_path` from the fresh document in canonical form.
///
/// Durations are stripped; NON-STRICT statuses are kept as recorded.
pub fn bless(fresh_path: &Path, baseline_path: &Path) -> Result<()> {
    let fresh = load_json(fresh_path)?;
    check_shape(&fresh, fresh_path)?;
    let mut text = canonical_string(&fresh, &VerifyOptions::default());
    text.push('\n');
    fs::write(baseline_path, text)
        .map_err(|e| Error::io(format!("writing {}", baseline_path.display()), e))?;
    tracing::info!(
        baseline = %baseline_path.display(),
        fresh = %fresh_path.display(),
        "baseline updated"
    );
    Ok(())
}
