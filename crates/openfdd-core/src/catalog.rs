//! Resource catalog: devices, their actions, and action parameters.
//!
//! Every list operation sends one command and then reads frames until a
//! terminal `done` or `fail`. Only the first field decides whether a frame is
//! terminal; anything else is a data record for the active command.
//!
//! The returned values are plain snapshots. They hold ids, not a session, so
//! every call that talks to the daemon takes the [`Session`] explicitly.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::protocol::{Command, Frame, Terminal};
use crate::session::{Session, SessionError};

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("daemon rejected `{command}`: {reason}")]
    OperationFailed { command: String, reason: String },

    #[error("action did not run for `{command}` (response {response:?})")]
    ActionRunFailed {
        command: String,
        response: Vec<String>,
    },

    #[error("malformed record for `{command}`: expected {expected}, got {fields:?}")]
    MalformedRecord {
        command: String,
        expected: &'static str,
        fields: Vec<String>,
    },

    #[error("no value given for parameter {name:?}")]
    MissingParam { name: String },

    #[error("action has no parameter named {name:?}")]
    UnknownParam { name: String },
}

impl CatalogError {
    /// Whether the session was torn down by this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            CatalogError::Session(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// A daemon-managed controllable unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
}

/// An operation exposed by a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub description: String,
    pub device_id: String,
}

/// Describes one positional argument of an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// The descriptor's tail from the type field onward, verbatim.
    ///
    /// Shape depends on the type (enum choices, numeric bounds, ...).
    pub type_info: Vec<String>,
}

impl Device {
    fn from_record(fields: Vec<String>) -> Option<Self> {
        if fields.len() > 2 {
            debug!(extra = fields.len() - 2, "ignoring extra device fields");
        }
        let mut it = fields.into_iter();
        Some(Self {
            id: it.next()?,
            name: it.next()?,
        })
    }

    /// List this device's actions.
    pub async fn actions(&self, session: &mut Session) -> Result<Vec<Action>, CatalogError> {
        list_actions(session, &self.id).await
    }
}

impl Action {
    fn from_record(device_id: &str, fields: Vec<String>) -> Option<Self> {
        if fields.len() > 3 {
            debug!(extra = fields.len() - 3, "ignoring extra action fields");
        }
        let mut it = fields.into_iter();
        Some(Self {
            id: it.next()?,
            name: it.next()?,
            description: it.next()?,
            device_id: device_id.to_string(),
        })
    }

    /// Fetch the parameter descriptors, in the order `run` expects values.
    pub async fn params(&self, session: &mut Session) -> Result<Vec<Param>, CatalogError> {
        list_action_params(session, &self.device_id, &self.id).await
    }

    /// Run with values given positionally, in descriptor order.
    pub async fn run<S: AsRef<str>>(
        &self,
        session: &mut Session,
        values: &[S],
    ) -> Result<(), CatalogError> {
        run_action(session, &self.device_id, &self.id, values).await
    }

    /// Run with values keyed by parameter name.
    ///
    /// Fetches the descriptors first to put the values in wire order.
    pub async fn run_named(
        &self,
        session: &mut Session,
        named: &HashMap<String, String>,
    ) -> Result<(), CatalogError> {
        let params = self.params(session).await?;
        let values = order_values(&params, named)?;
        self.run(session, &values).await
    }
}

impl Param {
    fn from_record(fields: Vec<String>) -> Option<Self> {
        if fields.len() < 3 {
            return None;
        }
        let type_info = fields[2..].to_vec();
        let mut it = fields.into_iter();
        Some(Self {
            name: it.next()?,
            description: it.next()?,
            kind: it.next()?,
            type_info,
        })
    }
}

/// `list-devices`
pub async fn list_devices(session: &mut Session) -> Result<Vec<Device>, CatalogError> {
    collect_records(
        session,
        Command::list_devices(),
        "[id, name]",
        Device::from_record,
    )
    .await
}

/// `list-actions,<device>`
pub async fn list_actions(
    session: &mut Session,
    device_id: &str,
) -> Result<Vec<Action>, CatalogError> {
    collect_records(
        session,
        Command::list_actions(device_id),
        "[id, name, description]",
        |fields| Action::from_record(device_id, fields),
    )
    .await
}

/// `list-action-params,<device>,<action>`
pub async fn list_action_params(
    session: &mut Session,
    device_id: &str,
    action_id: &str,
) -> Result<Vec<Param>, CatalogError> {
    collect_records(
        session,
        Command::list_action_params(device_id, action_id),
        "[name, description, type, ...]",
        Param::from_record,
    )
    .await
}

/// `action-run,<device>,<action>,<value>,...,`
///
/// Values are positional; the caller orders them like the descriptors from
/// [`list_action_params`]. The daemon answers with a single frame.
pub async fn run_action<S: AsRef<str>>(
    session: &mut Session,
    device_id: &str,
    action_id: &str,
    values: &[S],
) -> Result<(), CatalogError> {
    let command = Command::action_run(device_id, action_id, values);
    session.send_command(&command).await?;

    let response = session.read_frame().await?;
    if response.terminal() == Some(Terminal::Done) {
        debug!(%command, "action ran");
        return Ok(());
    }

    warn!(%command, response = ?response.fields(), "action run rejected");
    Err(CatalogError::ActionRunFailed {
        command: command.to_string(),
        response: response.into_fields(),
    })
}

/// Put `named` values into the positional order of `params`.
pub fn order_values(
    params: &[Param],
    named: &HashMap<String, String>,
) -> Result<Vec<String>, CatalogError> {
    if let Some(unknown) = named
        .keys()
        .find(|key| !params.iter().any(|p| &p.name == *key))
    {
        return Err(CatalogError::UnknownParam {
            name: unknown.clone(),
        });
    }

    params
        .iter()
        .map(|param| {
            named
                .get(&param.name)
                .cloned()
                .ok_or_else(|| CatalogError::MissingParam {
                    name: param.name.clone(),
                })
        })
        .collect()
}

/// Send `command` and gather records until the terminal frame.
///
/// A short record does not stop the loop: the remaining frames are still
/// drained so the session stays aligned, then the first bad record is
/// reported.
async fn collect_records<T, F>(
    session: &mut Session,
    command: Command,
    expected: &'static str,
    parse: F,
) -> Result<Vec<T>, CatalogError>
where
    F: Fn(Vec<String>) -> Option<T>,
{
    session.send_command(&command).await?;

    let mut records = Vec::new();
    let mut malformed: Option<Vec<String>> = None;
    loop {
        let frame: Frame = session.read_frame().await?;
        match frame.terminal() {
            Some(Terminal::Done) => break,
            Some(Terminal::Fail) => {
                let reason = frame.detail();
                warn!(%command, %reason, "daemon reported failure");
                return Err(CatalogError::OperationFailed {
                    command: command.to_string(),
                    reason,
                });
            }
            None => {
                let fields = frame.into_fields();
                match parse(fields.clone()) {
                    Some(record) => records.push(record),
                    None => {
                        warn!(%command, ?fields, "malformed record");
                        malformed.get_or_insert(fields);
                    }
                }
            }
        }
    }

    if let Some(fields) = malformed {
        return Err(CatalogError::MalformedRecord {
            command: command.to_string(),
            expected,
            fields,
        });
    }

    debug!(%command, count = records.len(), "listing complete");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn param(name: &str) -> Param {
        Param {
            name: name.to_string(),
            description: String::new(),
            kind: "string".to_string(),
            type_info: strings(&["string"]),
        }
    }

    #[test]
    fn test_device_record() {
        let device = Device::from_record(strings(&["dev3", "done"])).unwrap();
        assert_eq!(
            device,
            Device {
                id: "dev3".into(),
                name: "done".into()
            }
        );
        assert!(Device::from_record(strings(&["lonely"])).is_none());
    }

    #[test]
    fn test_action_record_carries_device_id() {
        let action =
            Action::from_record("dev1", strings(&["on", "Turn on", "Powers the lamp"])).unwrap();
        assert_eq!(action.device_id, "dev1");
        assert_eq!(action.description, "Powers the lamp");
        assert!(Action::from_record("dev1", strings(&["on", "Turn on"])).is_none());
    }

    #[test]
    fn test_param_record_keeps_type_info_verbatim() {
        let param = Param::from_record(strings(&[
            "level",
            "Brightness",
            "int",
            "0",
            "100",
        ]))
        .unwrap();
        assert_eq!(param.kind, "int");
        assert_eq!(param.type_info, strings(&["int", "0", "100"]));
        assert!(Param::from_record(strings(&["level", "Brightness"])).is_none());
    }

    #[test]
    fn test_order_values_follows_descriptors() {
        let params = vec![param("level"), param("mode")];
        let named = HashMap::from([
            ("mode".to_string(), "on".to_string()),
            ("level".to_string(), "5".to_string()),
        ]);
        assert_eq!(order_values(&params, &named).unwrap(), strings(&["5", "on"]));
    }

    #[test]
    fn test_order_values_missing_param() {
        let params = vec![param("level"), param("mode")];
        let named = HashMap::from([("level".to_string(), "5".to_string())]);
        let err = order_values(&params, &named).unwrap_err();
        assert!(matches!(err, CatalogError::MissingParam { name } if name == "mode"));
    }

    #[test]
    fn test_order_values_unknown_param() {
        let params = vec![param("level")];
        let named = HashMap::from([
            ("level".to_string(), "5".to_string()),
            ("colour".to_string(), "red".to_string()),
        ]);
        let err = order_values(&params, &named).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownParam { name } if name == "colour"));
    }

    #[test]
    fn test_param_serializes_kind_as_type() {
        let json = serde_json::to_value(param("level")).unwrap();
        assert_eq!(json["type"], "string");
    }

    #[test]
    fn test_protocol_failures_are_not_fatal() {
        let err = CatalogError::OperationFailed {
            command: "list-actions,X".into(),
            reason: "no such device".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "daemon rejected `list-actions,X`: no such device"
        );
        assert!(CatalogError::Session(SessionError::Closed).is_fatal());
    }
}
