#![deny(unsafe_code)]

//! OpenFDD control protocol client.
//!
//! Talks to the OpenFDD daemon over its Unix domain socket and exposes the
//! daemon's device tree: devices offer actions, actions take typed
//! parameters. Layers, leaves first:
//!
//! - [`protocol`]: line framing, escaping, and the request grammar.
//! - [`session`]: the socket, header check, and send/read primitives.
//! - [`catalog`]: typed list/run operations built on a session.
//!
//! ```ignore
//! let config = openfdd_config::ClientConfig::default();
//! let mut session = openfdd_core::Session::open(&config).await?;
//! for device in openfdd_core::list_devices(&mut session).await? {
//!     for action in device.actions(&mut session).await? {
//!         println!("{}: {}", device.name, action.name);
//!     }
//! }
//! ```

/// Devices, actions, and parameter descriptors.
pub mod catalog;
/// Line codec and command grammar.
pub mod protocol;
/// Unix socket session to the daemon.
pub mod session;

pub use catalog::{
    Action, CatalogError, Device, Param, list_action_params, list_actions, list_devices,
    order_values, run_action,
};
pub use protocol::{Command, Frame};
pub use session::{CancelHandle, Session, SessionError, SessionOptions};
