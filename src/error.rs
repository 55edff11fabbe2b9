//! Error taxonomy for conformance runs.
//!
//! Errors fall into three classes that CI must be able to tell apart:
//!
//! - infrastructure failures (harness or subject crashed, port in use,
//!   readiness never reached, malformed inputs)
//! - regressions (the fresh results differ from the baseline)
//! - interruption (a termination signal arrived mid-run)
//!
//! [`Error::exit_code`] maps regressions to [`EXIT_REGRESSION`] and every
//! other failure to `1`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit code signalling "results differ from baseline".
pub const EXIT_REGRESSION: u8 = 64;

/// Exit code for any failure that is not a regression.
pub const EXIT_FAILURE: u8 = 1;

/// Errors produced by the orchestrator, verifier and configuration layers.
#[derive(Debug, Error)]
pub enum Error {
    /// The harness or subject failed to start, crashed, or exited non-zero.
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),

    /// The listening role never accepted a connection within the bound.
    #[error("{addr} not accepting connections after {}ms", .waited.as_millis())]
    ReadinessTimeout {
        /// Address that was probed.
        addr: String,
        /// How long the probe kept trying.
        waited: Duration,
    },

    /// Fresh results differ structurally from the baseline.
    #[error("results differ from baseline:\n{diff}")]
    Regression {
        /// Human-readable diff of the canonical forms.
        diff: String,
    },

    /// A results or spec document is not valid JSON.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A results document parsed but has the wrong shape.
    #[error("schema error in {}: {detail}", .path.display())]
    Schema {
        /// Document path (or a label for in-memory documents).
        path: PathBuf,
        /// What was wrong.
        detail: String,
    },

    /// The configuration file or a harness spec file is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or process I/O failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The HTML summary template failed to render.
    #[error("rendering html summary: {source}")]
    Render {
        /// Underlying template error.
        #[source]
        source: handlebars::RenderError,
    },

    /// A report could not be serialized as JSON.
    #[error("serializing {what}: {source}")]
    Serialize {
        /// What was being serialized.
        what: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A termination signal was received while the run was in progress.
    #[error("interrupted by signal")]
    Interrupted,
}

impl Error {
    /// Creates an infrastructure error.
    pub fn infrastructure(msg: impl Into<String>) -> Self {
        Self::Infrastructure(msg.into())
    }

    /// Creates a schema error for `path`.
    pub fn schema(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// Wraps an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` if this error reports a baseline regression.
    #[must_use]
    pub const fn is_regression(&self) -> bool {
        matches!(self, Self::Regression { .. })
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Regression { .. } => EXIT_REGRESSION,
            _ => EXIT_FAILURE,
        }
    }
}

/// Result type for conformance operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_uses_distinguished_exit_code() {
        let err = Error::Regression {
            diff: "~ /agent/1.1.1/behavior".into(),
        };
        assert!(err.is_regression());
        assert_eq!(err.exit_code(), 64);
    }

    #[test]
    fn other_errors_use_generic_exit_code() {
        let errs = [
            Error::infrastructure("harness exited with status 3"),
            Error::ReadinessTimeout {
                addr: "127.0.0.1:9001".into(),
                waited: Duration::from_secs(5),
            },
            Error::schema("index.json", "top level must be an object"),
            Error::Config("bad toml".into()),
            Error::Serialize {
                what: "summary",
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            },
            Error::Interrupted,
        ];
        for err in errs {
            assert!(!err.is_regression());
            assert_eq!(err.exit_code(), EXIT_FAILURE, "{err}");
        }
    }

    #[test]
    fn readiness_display_names_address_and_wait() {
        let err = Error::ReadinessTimeout {
            addr: "127.0.0.1:9002".into(),
            waited: Duration::from_millis(1500),
        };
        let display = err.to_string();
        assert!(display.contains("127.0.0.1:9002"));
        assert!(display.contains("1500ms"));
    }

    #[test]
    fn io_error_keeps_context() {
        let err = Error::io(
            "reading autobahn/server/index.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().starts_with("reading autobahn/server/index.json"));
    }
}
