//! Configuration builders for tests.

use std::path::Path;

use openfdd_config::ClientConfig;

/// Fluent builder for [`ClientConfig`] in tests.
///
/// Starts from defaults with short I/O deadlines so a misbehaving test fails
/// quickly instead of hanging.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_path(daemon.socket_path())
///     .read_timeout_ms(100)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: ClientConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = ClientConfig::default();
        config.connection.connect_timeout_ms = 1_000;
        config.connection.read_timeout_ms = 2_000;
        config.connection.write_timeout_ms = 2_000;
        Self { config }
    }

    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.connection.socket_path = path.as_ref().display().to_string();
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connection.read_timeout_ms = ms;
        self
    }

    pub fn header_prefix(mut self, prefix: &str) -> Self {
        self.config.protocol.header_prefix = prefix.to_string();
        self
    }

    pub fn escape_outgoing(mut self, escape: bool) -> Self {
        self.config.protocol.escape_outgoing = escape;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
