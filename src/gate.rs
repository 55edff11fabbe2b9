//! End-to-end conformance gate: run, then compare against the baseline.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::harness_spec::HarnessSpec;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::render::Summary;
use crate::results::ResultsDocument;
use crate::verify::{MatchResult, VerifyOptions, verify_files};
use serde::Serialize;
use std::path::PathBuf;

pub use crate::orchestrator::Role;

/// Result of a completed gate run.
#[derive(Debug, Clone, Serialize)]
pub struct GateOutcome {
    /// What the orchestrator produced.
    pub run: RunReport,
    /// Baseline used for comparison.
    pub baseline: PathBuf,
    /// Whether NON-STRICT was relaxed.
    pub relaxed: bool,
    /// Comparison result.
    pub result: MatchResult,
}

impl GateOutcome {
    /// Converts a mismatch into [`Error::Regression`].
    pub fn into_result(self) -> Result<RunReport> {
        let run = self.run;
        self.result.into_result().map(|()| run)
    }
}

/// Verification options implied by `config`.
#[must_use]
pub const fn verify_options(config: &Config) -> VerifyOptions {
    VerifyOptions {
        relax_non_strict: config.relax_non_strict,
    }
}

/// Runs `role` against the harness and compares the fresh results with the
/// role's baseline.
///
/// Infrastructure failures are returned as errors; a regression is returned
/// as an outcome with a [`MatchResult::Mismatch`].
pub fn run_gate(config: &Config, role: Role, orchestrator: &Orchestrator) -> Result<GateOutcome> {
    let role_config = config.role(role);
    let baseline = config.resolve(&role_config.baseline);
    if !baseline.is_file() {
        // Checked before running so a missing baseline doesn't cost a full run.
        return Err(Error::infrastructure(format!(
            "baseline {} not found",
            baseline.display()
        )));
    }

    let run = orchestrator.run(role, role_config)?;
    log_summary(&run);

    let options = verify_options(config);
    let result = verify_files(&baseline, &run.results_path, &options)?;
    Ok(GateOutcome {
        run,
        baseline,
        relaxed: options.relax_non_strict,
        result,
    })
}

/// Where the harness writes results for `role`, per the role's spec file.
pub fn fresh_results_path(config: &Config, role: Role) -> Result<PathBuf> {
    let spec_path = config.resolve(&config.role(role).spec);
    let spec = HarnessSpec::load(&spec_path, role.harness_mode())?;
    Ok(spec.results_index(&config.working_dir))
}

/// Compares the results already on disk for `role` with its baseline,
/// without running anything.
pub fn verify_role(config: &Config, role: Role) -> Result<MatchResult> {
    let baseline = config.resolve(&config.role(role).baseline);
    let fresh = fresh_results_path(config, role)?;
    verify_files(&baseline, &fresh, &verify_options(config))
}

fn log_summary(run: &RunReport) {
    match ResultsDocument::load(&run.results_path) {
        Ok(doc) => {
            for agent in Summary::from_document(&doc).agents {
                let c = agent.counts;
                tracing::info!(
                    agent = %agent.agent,
                    total = c.total,
                    passed = c.passed,
                    unclean_close = c.unclean_close,
                    non_strict = c.non_strict,
                    unimplemented = c.unimplemented,
                    failed = c.failed,
                    informational = c.informational,
                    "results summary"
                );
            }
        }
        // The verifier reports the same problem with full context.
        Err(e) => tracing::debug!(error = %e, "results summary unavailable"),
    }
}
