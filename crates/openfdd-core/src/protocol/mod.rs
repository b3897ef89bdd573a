//! OpenFDD wire protocol: line framing and request grammar.
//!
//! The daemon speaks ASCII lines over a Unix domain socket. Each line is a
//! comma-separated list of fields; a backslash makes the following byte
//! literal, so `\,` keeps a comma inside a field and an escaped newline does
//! not end the line.
//!
//! ## Exchange
//!
//! ```text
//! ┌──────────┐  openfddv1\n                ┌──────────────┐
//! │          │◀────────────────────────────│              │
//! │  Client  │  list-actions,dev1\n        │    Daemon    │
//! │          │────────────────────────────▶│              │
//! │          │  on,Turn on,Powers up\n     │              │
//! │          │◀────────────────────────────│              │
//! │          │  done\n                     │              │
//! │          │◀────────────────────────────│              │
//! └──────────┘                             └──────────────┘
//! ```
//!
//! [`codec`] is pure framing with no knowledge of commands; [`command`]
//! builds the request lines the daemon understands.

pub mod codec;
pub mod command;

pub use codec::{Frame, FrameDecoder, FrameError, Terminal};
pub use command::Command;
