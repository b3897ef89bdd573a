//! Request lines understood by the daemon.

use std::fmt;

use super::codec;

/// One request line: a verb followed by positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    fields: Vec<String>,
    trailing_delimiter: bool,
}

impl Command {
    /// Start a command with the given verb and no arguments.
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            fields: vec![verb.into()],
            trailing_delimiter: false,
        }
    }

    /// Append one positional argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.fields.push(value.into());
        self
    }

    /// End the line with an extra delimiter after the last field.
    pub fn with_trailing_delimiter(mut self) -> Self {
        self.trailing_delimiter = true;
        self
    }

    /// `list-devices`
    pub fn list_devices() -> Self {
        Self::new("list-devices")
    }

    /// `list-actions,<device>`
    pub fn list_actions(device_id: &str) -> Self {
        Self::new("list-actions").arg(device_id)
    }

    /// `list-action-params,<device>,<action>`
    pub fn list_action_params(device_id: &str, action_id: &str) -> Self {
        Self::new("list-action-params").arg(device_id).arg(action_id)
    }

    /// `action-run,<device>,<action>,<value>,...,`
    ///
    /// The daemon expects a delimiter after the action id and after every
    /// value, so the line always ends in `,` even with no values.
    pub fn action_run<S: AsRef<str>>(device_id: &str, action_id: &str, values: &[S]) -> Self {
        values
            .iter()
            .fold(
                Self::new("action-run").arg(device_id).arg(action_id),
                |cmd, value| cmd.arg(value.as_ref()),
            )
            .with_trailing_delimiter()
    }

    pub fn verb(&self) -> &str {
        &self.fields[0]
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Wire bytes for this command, terminator included.
    pub fn encode(&self, escape: bool) -> Vec<u8> {
        codec::encode(&self.fields, self.trailing_delimiter, escape)
    }
}

/// Renders the line as sent with escaping on, without the terminator.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode(true);
        let line = String::from_utf8_lossy(&encoded[..encoded.len() - 1]);
        f.write_str(&line)
    }
}
