//! Command connection to the server's CLI port
//!
//! One TCP stream, one outstanding command. `execute` holds the stream mutex
//! across write and read, so concurrent callers queue instead of
//! interleaving on the wire.

use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CliError, Result};
use crate::protocol::encode_token;

pub const DEFAULT_CLI_PORT: u16 = 9090;
pub const DEFAULT_HTTP_PORT: u16 = 9000;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server address: CLI port for commands, HTTP port for artwork URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub cli_port: u16,
    pub http_port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            cli_port: DEFAULT_CLI_PORT,
            http_port: DEFAULT_HTTP_PORT,
        }
    }

    pub fn cli_addr(&self) -> String {
        format!("{}:{}", self.host, self.cli_port)
    }

    /// `http://host:port`, no trailing slash
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost")
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoint: Endpoint,
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            credentials: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Line-framed CLI stream, shared by the command connection and the push
/// listener
pub(crate) struct CliStream {
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl CliStream {
    /// Connect and, when credentials are given, log in
    pub(crate) async fn open(
        addr: &str,
        connect_timeout: Duration,
        credentials: Option<&Credentials>,
    ) -> Result<Self> {
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(CliError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(CliError::ConnectTimeout {
                    addr: addr.to_string(),
                    timeout: connect_timeout,
                })
            }
        };
        // Command/reply traffic is tiny; don't let Nagle delay it
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY on {}: {}", addr, e);
        }

        let (reader, writer) = stream.into_split();
        let mut cli = Self {
            addr: addr.to_string(),
            reader: BufReader::new(reader),
            writer,
        };

        if let Some(credentials) = credentials {
            cli.login(credentials, connect_timeout).await?;
        }
        Ok(cli)
    }

    /// The server drops the socket on bad credentials instead of replying
    async fn login(&mut self, credentials: &Credentials, timeout: Duration) -> Result<()> {
        debug!("Logging in to {} as {}", self.addr, credentials.username);
        let command = format!(
            "login {} {}",
            encode_token(&credentials.username),
            encode_token(&credentials.password)
        );
        self.send(&command).await?;
        match tokio::time::timeout(timeout, self.read_line()).await {
            Ok(Ok(Some(_))) => Ok(()),
            Ok(Ok(None)) | Ok(Err(_)) => Err(CliError::AuthenticationFailed {
                addr: self.addr.clone(),
            }),
            Err(_) => Err(CliError::ResponseTimeout(timeout)),
        }
    }

    pub(crate) async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next line without its terminator, `None` on EOF
    pub(crate) async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(len);
        Ok(Some(line))
    }

    async fn round_trip(&mut self, command: &str, timeout: Duration) -> Result<String> {
        self.send(command).await?;
        match tokio::time::timeout(timeout, self.read_line()).await {
            Ok(Ok(Some(reply))) => Ok(reply),
            Ok(Ok(None)) => Err(CliError::ConnectionClosed),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CliError::ResponseTimeout(timeout)),
        }
    }
}

/// Command connection
pub struct Connection {
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
    stream: Mutex<Option<CliStream>>,
    lifecycle: StdMutex<CancellationToken>,
}

impl Connection {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            state: watch::channel(ConnectionState::Disconnected).0,
            stream: Mutex::new(None),
            lifecycle: StdMutex::new(CancellationToken::new()),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.settings.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for state transitions, including the drop to
    /// `Disconnected` after a failed command
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Last known state only; a failing `execute` is the real liveness check
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Token cancelled by [`disconnect`](Self::disconnect) or the next
    /// [`connect`](Self::connect). Listeners started for this connection
    /// hang off it.
    pub fn lifecycle_token(&self) -> CancellationToken {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Connection {:?} -> {:?}", previous, state);
        }
    }

    /// Open the command stream. No-op when already connected; fails fast
    /// while another connect is running.
    pub async fn connect(&self) -> Result<()> {
        let addr = self.settings.endpoint.cli_addr();
        let mut found = ConnectionState::Disconnected;
        self.state.send_if_modified(|state| {
            found = *state;
            if found == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                return true;
            }
            false
        });
        match found {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting => return Err(CliError::ConnectInProgress { addr }),
            ConnectionState::Disconnected => {}
        }

        info!("Connecting to CLI at {}", addr);
        let opened = CliStream::open(
            &addr,
            self.settings.connect_timeout,
            self.settings.credentials.as_ref(),
        )
        .await;

        match opened {
            Ok(stream) => {
                *self.stream.lock().await = Some(stream);
                let previous = std::mem::replace(
                    &mut *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner),
                    CancellationToken::new(),
                );
                previous.cancel();
                self.set_state(ConnectionState::Connected);
                info!("Connected to CLI at {}", addr);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", addr, e);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Send one command and return its one-line reply.
    ///
    /// A transport failure drops the stream and marks the connection
    /// disconnected (visible through [`watch_state`](Self::watch_state));
    /// later calls fail with [`CliError::NotConnected`] until the next
    /// `connect`.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(CliError::NotConnected);
        };

        debug!("CLI -> {}", command);
        match stream
            .round_trip(command, self.settings.response_timeout)
            .await
        {
            Ok(reply) => {
                debug!("CLI <- {}", reply);
                Ok(reply)
            }
            Err(e) => {
                warn!("CLI command '{}' failed: {}", command, e);
                *guard = None;
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Close the command stream and cancel the lifecycle token
    pub async fn disconnect(&self) {
        let had_stream = self.stream.lock().await.take().is_some();
        self.set_state(ConnectionState::Disconnected);
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        if had_stream {
            info!("Disconnected from {}", self.settings.endpoint.cli_addr());
        }
    }
}
