//! Scripted stand-in for the OpenFDD daemon.
//!
//! [`MockDaemon`] binds a Unix socket inside a temp directory, greets every
//! connection with a configurable header, and answers exact command lines
//! with canned raw bytes. Every line it receives is recorded so tests can
//! assert on the precise wire format the client produced.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::debug;

use openfdd_config::ClientConfig;

use crate::config::TestConfigBuilder;

/// How the mock answers one command line.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Write these bytes verbatim (include the `\n` terminators).
    Raw(String),
    /// Write these bytes, then close the connection.
    RawThenHangup(String),
    /// Close the connection without answering.
    Hangup,
    /// Read the command and never answer.
    Silent,
}

struct Script {
    header: Vec<u8>,
    hang_up_after_header: bool,
    replies: HashMap<String, Reply>,
    fallback: Reply,
}

/// Builder for [`MockDaemon`].
pub struct MockDaemonBuilder {
    script: Script,
}

impl MockDaemonBuilder {
    /// Greet with `line` followed by a terminator.
    pub fn header(mut self, line: &str) -> Self {
        self.script.header = format!("{line}\n").into_bytes();
        self
    }

    /// Greet with exactly these bytes.
    pub fn raw_header(mut self, bytes: &str) -> Self {
        self.script.header = bytes.as_bytes().to_vec();
        self
    }

    /// Close every connection right after the header is written.
    pub fn hang_up_after_header(mut self) -> Self {
        self.script.hang_up_after_header = true;
        self
    }

    /// Answer `command` (a line as received, without terminator) with raw
    /// `response` bytes.
    pub fn reply(mut self, command: &str, response: &str) -> Self {
        self.script
            .replies
            .insert(command.to_string(), Reply::Raw(response.to_string()));
        self
    }

    /// Answer `command` with `response`, then close the connection.
    pub fn reply_then_hang_up(mut self, command: &str, response: &str) -> Self {
        self.script.replies.insert(
            command.to_string(),
            Reply::RawThenHangup(response.to_string()),
        );
        self
    }

    pub fn hang_up_on(mut self, command: &str) -> Self {
        self.script
            .replies
            .insert(command.to_string(), Reply::Hangup);
        self
    }

    pub fn silent_on(mut self, command: &str) -> Self {
        self.script
            .replies
            .insert(command.to_string(), Reply::Silent);
        self
    }

    /// Reply for commands with no scripted answer. Defaults to
    /// `fail,unknown command`.
    pub fn fallback(mut self, reply: Reply) -> Self {
        self.script.fallback = reply;
        self
    }

    /// Bind the socket and start serving connections one at a time.
    pub async fn start(self) -> MockDaemon {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("openfdd.socket");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind mock socket");

        let received = Arc::new(Mutex::new(Vec::new()));
        let handle = tokio::spawn(serve(
            listener,
            Arc::new(self.script),
            Arc::clone(&received),
        ));

        MockDaemon {
            socket_path,
            received,
            handle,
            _temp_dir: temp_dir,
        }
    }
}

/// A running scripted daemon. The socket and its temp directory are removed
/// when this value is dropped.
pub struct MockDaemon {
    socket_path: PathBuf,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl MockDaemon {
    /// A daemon greeting with `openfddv1` and answering nothing else.
    pub fn builder() -> MockDaemonBuilder {
        MockDaemonBuilder {
            script: Script {
                header: b"openfddv1\n".to_vec(),
                hang_up_after_header: false,
                replies: HashMap::new(),
                fallback: Reply::Raw("fail,unknown command\n".to_string()),
            },
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Client config pointing at this daemon with short test deadlines.
    pub fn config(&self) -> ClientConfig {
        TestConfigBuilder::new()
            .socket_path(&self.socket_path)
            .build()
    }

    /// Every command line received so far, across all connections, in order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(listener: UnixListener, script: Arc<Script>, received: Arc<Mutex<Vec<String>>>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                debug!(error = %e, "mock daemon accept failed");
                return;
            }
        };
        if let Err(e) = serve_connection(stream, &script, &received).await {
            debug!(error = %e, "mock daemon connection ended with error");
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    script: &Script,
    received: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half.write_all(&script.header).await?;
    if script.hang_up_after_header {
        return Ok(());
    }

    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let body = line.strip_suffix(b"\n").unwrap_or(&line);
        let command = String::from_utf8_lossy(body).into_owned();
        debug!(%command, "mock daemon received");
        if let Ok(mut lines) = received.lock() {
            lines.push(command.clone());
        }

        match script.replies.get(&command).unwrap_or(&script.fallback) {
            Reply::Raw(response) => write_half.write_all(response.as_bytes()).await?,
            Reply::RawThenHangup(response) => {
                write_half.write_all(response.as_bytes()).await?;
                return Ok(());
            }
            Reply::Hangup => return Ok(()),
            Reply::Silent => {}
        }
    }
}
