//! wsconform: WebSocket conformance gate.
//!
//! # Overview
//!
//! wsconform drives an external WebSocket conformance harness (Autobahn
//! `wstest`) against a subject implementation and decides whether the fresh
//! results still match a committed baseline. A run is a regression gate:
//! it either passes, reports a regression with a structural diff, or fails
//! on infrastructure problems. The three outcomes map to distinct exit codes
//! so CI can tell them apart.
//!
//! # Core Guarantees
//!
//! - **No leaked processes**: every harness and subject process is owned by a
//!   [`ManagedChild`](orchestrator::ManagedChild) that terminates and reaps
//!   it on every exit path
//! - **No blind waits**: the listening role is probed until it accepts
//!   connections, bounded by a timeout
//! - **Deterministic comparison**: volatile fields are stripped and keys are
//!   canonicalized before structural equality
//! - **No retries**: conformance runs are compared as-is
//!
//! # Module Structure
//!
//! - [`results`]: Results document model (case ids, behaviors, test cases)
//! - [`verify`]: Baseline comparison and normalization
//! - [`render`]: Text and HTML summaries of a results document
//! - [`orchestrator`]: Harness/subject process lifecycle and readiness
//! - [`harness_spec`]: Autobahn spec files (`fuzzingclient.json`, `fuzzingserver.json`)
//! - [`config`]: TOML configuration with conventional defaults
//! - [`gate`]: End-to-end run-then-verify pipeline
//! - [`error`](mod@error): Error taxonomy and exit codes

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod gate;
pub mod harness_spec;
pub mod orchestrator;
pub mod render;
pub mod results;
pub mod verify;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use config::Config;
pub use error::{Error, Result, EXIT_REGRESSION};
pub use gate::{GateOutcome, Role};
pub use results::{Behavior, CaseId, ResultsDocument, TestCase};
pub use verify::{MatchResult, VerifyOptions, verify};
