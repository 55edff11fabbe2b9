#![cfg(unix)]
#![allow(missing_docs)]

//! End-to-end gate: orchestrated run followed by baseline comparison.

mod common;

use common::{
    CLIENT_HARNESS_OK, FRESH_INDEX, IDLE_SUBJECT, STRICT_BASELINE, Workspace, bound_listener,
    init_test_logging,
};
use wsconform::gate::{self, run_gate};
use wsconform::orchestrator::Orchestrator;
use wsconform::verify::MatchResult;
use wsconform::{EXIT_REGRESSION, Error, Role};

fn server_workspace(port: u16, baseline: &str) -> Workspace {
    let mut ws = Workspace::new();
    ws.server_role(port, CLIENT_HARNESS_OK, IDLE_SUBJECT);
    ws.write("server-results.json", baseline);
    ws
}

#[test]
fn matching_results_pass() {
    init_test_logging();
    wsconform::test_phase!("matching_results_pass");
    let (_listener, port) = bound_listener();
    let ws = server_workspace(port, FRESH_INDEX);

    let orch = Orchestrator::from_config(&ws.config).with_port_precheck(false);
    let outcome = run_gate(&ws.config, Role::Server, &orch).unwrap();
    assert!(outcome.result.is_match());
    assert!(!outcome.relaxed);
    assert_eq!(outcome.baseline, ws.path("server-results.json"));
    outcome.into_result().unwrap();
    wsconform::test_complete!("matching_results_pass");
}

#[test]
fn changed_behavior_is_a_regression() {
    init_test_logging();
    let (_listener, port) = bound_listener();
    let ws = server_workspace(port, STRICT_BASELINE);

    let orch = Orchestrator::from_config(&ws.config).with_port_precheck(false);
    let outcome = run_gate(&ws.config, Role::Server, &orch).unwrap();
    let MatchResult::Mismatch { diff } = &outcome.result else {
        panic!("expected mismatch");
    };
    // Durations differ everywhere but only the status change is reported.
    assert_eq!(diff.entries.len(), 1, "{diff}");
    assert_eq!(diff.entries[0].path, "/subject/2.3.1/behavior");
    assert_eq!(diff.affected_cases(), vec!["subject/2.3.1".to_string()]);

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, Error::Regression { .. }));
    assert_eq!(err.exit_code(), EXIT_REGRESSION);
}

#[test]
fn relaxed_gate_accepts_non_strict() {
    init_test_logging();
    let (_listener, port) = bound_listener();
    let mut ws = server_workspace(port, STRICT_BASELINE);
    ws.config.relax_non_strict = true;

    let orch = Orchestrator::from_config(&ws.config).with_port_precheck(false);
    let outcome = run_gate(&ws.config, Role::Server, &orch).unwrap();
    assert!(outcome.relaxed);
    assert!(outcome.result.is_match());
}

#[test]
fn verify_role_uses_results_on_disk() {
    init_test_logging();
    let mut ws = Workspace::new();
    ws.server_role(9002, CLIENT_HARNESS_OK, IDLE_SUBJECT);
    ws.write("server-results.json", STRICT_BASELINE);
    std::fs::create_dir_all(ws.path("out")).unwrap();
    ws.write("out/index.json", FRESH_INDEX);

    assert_eq!(
        gate::fresh_results_path(&ws.config, Role::Server).unwrap(),
        ws.root().join("out").join("index.json")
    );
    let result = gate::verify_role(&ws.config, Role::Server).unwrap();
    assert!(!result.is_match());

    ws.config.relax_non_strict = true;
    assert!(gate::verify_role(&ws.config, Role::Server).unwrap().is_match());
}

#[test]
fn infrastructure_failure_is_not_a_regression() {
    init_test_logging();
    let (_listener, port) = bound_listener();
    let mut ws = Workspace::new();
    ws.server_role(port, "exit 2\n", IDLE_SUBJECT);
    ws.write("server-results.json", FRESH_INDEX);

    let orch = Orchestrator::from_config(&ws.config).with_port_precheck(false);
    let err = run_gate(&ws.config, Role::Server, &orch).unwrap_err();
    assert!(!err.is_regression());
    assert_ne!(err.exit_code(), EXIT_REGRESSION);
}
