//! Test helpers: shared logging setup and phase markers.
//!
//! Not for production use.

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `debug` for this crate.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wsconform=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Logs the start of a named test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        ::tracing::info!(phase = %$name, "test phase start");
    };
}

/// Logs the completion of a named test.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        ::tracing::info!(test = %$name, "test complete");
    };
}

/// Asserts a condition, logging expected and actual values first.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {{
        let cond = $cond;
        ::tracing::debug!(
            what = %$what,
            expected = ?$expected,
            actual = ?$actual,
            passed = cond,
            "assertion"
        );
        assert!(
            cond,
            "{}: expected {:?}, got {:?}",
            $what, $expected, $actual
        );
    }};
}
