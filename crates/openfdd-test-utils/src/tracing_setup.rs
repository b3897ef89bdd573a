//! Tracing initialisation for tests that are not wrapped in `test_log`.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness writer.
///
/// Honours `RUST_LOG`; otherwise shows client debug output so failing
/// socket tests print the frames they exchanged. Repeated calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,openfdd_core=debug,openfdd_test_utils=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
