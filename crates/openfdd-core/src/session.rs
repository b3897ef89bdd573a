//! Transport session: one Unix socket connection to the OpenFDD daemon.
//!
//! A [`Session`] owns the socket, checks the daemon's greeting line, and
//! exposes the two primitives everything else is built on:
//! [`Session::send_command`] and [`Session::read_frame`].
//!
//! The protocol carries no request ids, so a session serves one command at
//! a time. Methods take `&mut self`; callers that share a session across
//! tasks must serialise access themselves (or open one session per task).
//!
//! The daemon may emit unsolicited notification lines; these are not
//! supported and will be misread as responses.
//!
//! Framing and I/O failures are fatal: the socket is closed and every later
//! call fails with [`SessionError::Closed`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use openfdd_config::ClientConfig;

use crate::protocol::codec::{self, Frame, FrameError};
use crate::protocol::Command;

/// Label used as the in-flight command while the greeting is read.
const HEADER_LABEL: &str = "<header>";

/// Errors from the transport session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("endpoint is not an OpenFDD daemon (header {header:?})")]
    ProtocolMismatch { header: String },

    #[error("daemon header must be verified before sending `{command}`")]
    HeaderNotVerified { command: String },

    #[error("transport error during `{command}`: {source}")]
    Transport {
        command: String,
        source: std::io::Error,
    },

    #[error("connection closed before a complete line was read during `{command}`")]
    TruncatedFrame { command: String },

    #[error("timed out after {after:?} during `{command}`")]
    Timeout { command: String, after: Duration },

    #[error("cancelled during `{command}`")]
    Cancelled { command: String },

    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Whether this error left the session unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::HeaderNotVerified { .. })
    }
}

/// Tunables for a session, usually derived from [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub header_prefix: String,
    pub escape_outgoing: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for SessionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connection.connect_timeout(),
            read_timeout: config.connection.read_timeout(),
            write_timeout: config.connection.write_timeout(),
            header_prefix: config.protocol.header_prefix.clone(),
            escape_outgoing: config.protocol.escape_outgoing,
        }
    }
}

/// Aborts pending and future I/O on the session it was taken from.
///
/// Cloneable and `Send`, so it can be handed to another task or a signal
/// handler.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Outcome of the greeting check.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderState {
    Unread,
    Accepted(String),
    Rejected(String),
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

enum Interrupt {
    TimedOut(Duration),
    Cancelled,
}

/// A live connection to the daemon plus its framing state.
pub struct Session {
    socket_path: PathBuf,
    options: SessionOptions,
    conn: Option<Connection>,
    header: HeaderState,
    in_flight: Option<String>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl Session {
    /// Open the socket at `socket_path`. Does not read the header.
    pub async fn connect(
        socket_path: impl Into<PathBuf>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let socket_path = socket_path.into();
        if !socket_path.exists() {
            return Err(SessionError::NotRunning(socket_path));
        }

        let connect = UnixStream::connect(&socket_path);
        let stream = match options.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no answer within {limit:?}"),
                )),
            },
            None => connect.await,
        }
        .map_err(|source| SessionError::Connect {
            path: socket_path.clone(),
            source,
        })?;

        info!(path = %socket_path.display(), "connected to OpenFDD daemon");

        let (read_half, write_half) = stream.into_split();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            socket_path,
            options,
            conn: Some(Connection {
                reader: BufReader::new(read_half),
                writer: write_half,
            }),
            header: HeaderState::Unread,
            in_flight: None,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        })
    }

    /// Connect to the configured socket and verify the daemon's header.
    ///
    /// On a header mismatch the socket is closed and
    /// [`SessionError::ProtocolMismatch`] is returned.
    pub async fn open(config: &ClientConfig) -> Result<Self, SessionError> {
        let mut session =
            Self::connect(&config.connection.socket_path, SessionOptions::from(config)).await?;
        if !session.verify_header().await? {
            let header = session.header().unwrap_or_default().to_string();
            return Err(SessionError::ProtocolMismatch { header });
        }
        Ok(session)
    }

    /// Read the greeting line and check it starts with the header prefix.
    ///
    /// Only the first call reads from the socket; later calls return the
    /// stored verdict. A rejected header closes the session.
    pub async fn verify_header(&mut self) -> Result<bool, SessionError> {
        match &self.header {
            HeaderState::Accepted(_) => return Ok(true),
            HeaderState::Rejected(_) => return Ok(false),
            HeaderState::Unread => {}
        }

        self.in_flight = Some(HEADER_LABEL.to_string());
        let frame = self.read_frame().await?;
        self.in_flight = None;

        let header = frame.first().to_string();
        if header.starts_with(&self.options.header_prefix) {
            info!(%header, "daemon header accepted");
            self.header = HeaderState::Accepted(header);
            Ok(true)
        } else {
            warn!(%header, prefix = %self.options.header_prefix, "unexpected daemon header");
            self.header = HeaderState::Rejected(header);
            self.close();
            Ok(false)
        }
    }

    /// The greeting's first field, once it has been read.
    pub fn header(&self) -> Option<&str> {
        match &self.header {
            HeaderState::Accepted(h) | HeaderState::Rejected(h) => Some(h),
            HeaderState::Unread => None,
        }
    }

    /// Encode and write one command.
    pub async fn send_command(&mut self, command: &Command) -> Result<(), SessionError> {
        let label = command.to_string();
        match &self.header {
            HeaderState::Accepted(_) => {}
            HeaderState::Rejected(header) => {
                return Err(SessionError::ProtocolMismatch {
                    header: header.clone(),
                });
            }
            HeaderState::Unread => {
                return Err(SessionError::HeaderNotVerified { command: label });
            }
        }

        let bytes = command.encode(self.options.escape_outgoing);
        let timeout = self.options.write_timeout;
        let mut cancel = self.cancel_rx.clone();
        let conn = self.conn.as_mut().ok_or(SessionError::Closed)?;

        debug!(command = %label, "sending command");
        let write = async {
            conn.writer.write_all(&bytes).await?;
            conn.writer.flush().await
        };
        let outcome = with_deadline(write, timeout, &mut cancel).await;

        self.in_flight = Some(label.clone());
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(self.fail(SessionError::Transport {
                command: label,
                source,
            })),
            Err(interrupt) => Err(self.fail(interrupt.into_error(label))),
        }
    }

    /// Block until one full line has been read and decoded.
    pub async fn read_frame(&mut self) -> Result<Frame, SessionError> {
        let label = self.in_flight_label();
        let timeout = self.options.read_timeout;
        let mut cancel = self.cancel_rx.clone();
        let conn = self.conn.as_mut().ok_or(SessionError::Closed)?;

        let outcome = with_deadline(codec::read_frame(&mut conn.reader), timeout, &mut cancel).await;

        match outcome {
            Ok(Ok(frame)) => {
                trace!(command = %label, fields = ?frame.fields(), "received frame");
                Ok(frame)
            }
            Ok(Err(FrameError::Truncated { buffered })) => {
                debug!(command = %label, buffered, "stream ended mid-frame");
                Err(self.fail(SessionError::TruncatedFrame { command: label }))
            }
            Ok(Err(FrameError::Io(source))) => Err(self.fail(SessionError::Transport {
                command: label,
                source,
            })),
            Err(interrupt) => Err(self.fail(interrupt.into_error(label))),
        }
    }

    /// A handle that aborts this session's I/O from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Close the socket. Idempotent.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!(path = %self.socket_path.display(), "session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn in_flight_label(&self) -> String {
        self.in_flight
            .clone()
            .unwrap_or_else(|| "<no command>".to_string())
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(error = %err, "session failed, closing");
        self.close();
        err
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("socket_path", &self.socket_path)
            .field("open", &self.is_open())
            .field("header", &self.header())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

impl Interrupt {
    fn into_error(self, command: String) -> SessionError {
        match self {
            Interrupt::TimedOut(after) => SessionError::Timeout { command, after },
            Interrupt::Cancelled => SessionError::Cancelled { command },
        }
    }
}

/// Run `fut` unless the deadline passes or the session is cancelled first.
async fn with_deadline<F: Future>(
    fut: F,
    timeout: Option<Duration>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<F::Output, Interrupt> {
    if *cancel.borrow() {
        return Err(Interrupt::Cancelled);
    }

    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Interrupt::TimedOut(limit)),
            None => Ok(fut.await),
        }
    };

    tokio::select! {
        result = bounded => result,
        Ok(_) = cancel.wait_for(|cancelled| *cancelled) => Err(Interrupt::Cancelled),
    }
}
