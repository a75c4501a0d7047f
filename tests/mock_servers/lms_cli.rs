//! Mock media server CLI for testing
//!
//! Line-oriented TCP server on a random port. Command connections get one
//! reply line per command: a scripted reply if one was set, otherwise the
//! command echoed back (as the real server does for transport commands).
//! A connection whose command is `listen ...` or `subscribe ...` becomes a
//! push connection and receives whatever the test sends with [`MockCliServer::push`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum PushMessage {
    Line(String),
    Close,
}

#[derive(Default)]
struct MockCliState {
    /// Exact command -> reply line
    replies: HashMap<String, String>,
    /// Every complete line received on command connections, in order
    received: Vec<String>,
    /// Raw bytes received on command connections, in arrival order
    raw: Vec<u8>,
    /// Push connections opened so far
    listen_connections: usize,
    /// Required `login` credentials; a mismatch closes the socket
    credentials: Option<(String, String)>,
    /// Delay before each command reply
    reply_delay: Duration,
    /// Close command connections instead of replying
    drop_commands: bool,
}

/// Mock CLI server
pub struct MockCliServer {
    addr: SocketAddr,
    state: Arc<Mutex<MockCliState>>,
    push_tx: broadcast::Sender<PushMessage>,
    handle: JoinHandle<()>,
}

impl MockCliServer {
    /// Start a mock CLI server on a random port
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(MockCliState::default()));
        let (push_tx, _) = broadcast::channel(64);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_state = state.clone();
        let accept_tx = push_tx.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = accept_state.clone();
                let push_tx = accept_tx.clone();
                tokio::spawn(handle_connection(socket, state, push_tx));
            }
        });

        Self {
            addr,
            state,
            push_tx,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Script the reply line for an exact command
    pub async fn set_reply(&self, command: &str, reply: &str) {
        self.state
            .lock()
            .await
            .replies
            .insert(command.to_string(), reply.to_string());
    }

    pub async fn require_login(&self, username: &str, password: &str) {
        self.state.lock().await.credentials = Some((username.to_string(), password.to_string()));
    }

    pub async fn set_reply_delay(&self, delay: Duration) {
        self.state.lock().await.reply_delay = delay;
    }

    /// Make command connections hang up instead of replying
    pub async fn drop_commands(&self, drop: bool) {
        self.state.lock().await.drop_commands = drop;
    }

    /// Command lines received so far (push connections excluded)
    pub async fn received(&self) -> Vec<String> {
        self.state.lock().await.received.clone()
    }

    pub async fn raw_bytes(&self) -> Vec<u8> {
        self.state.lock().await.raw.clone()
    }

    pub async fn listen_connections(&self) -> usize {
        self.state.lock().await.listen_connections
    }

    /// Wait until at least `count` push connections have been opened
    pub async fn wait_for_listeners(&self, count: usize) -> bool {
        for _ in 0..200 {
            if self.listen_connections().await >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Send a line to every open push connection
    pub fn push(&self, line: &str) {
        let _ = self.push_tx.send(PushMessage::Line(line.to_string()));
    }

    /// Close every open push connection
    pub fn close_listeners(&self) {
        let _ = self.push_tx.send(PushMessage::Close);
    }
}

impl Drop for MockCliServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn is_listen_command(line: &str) -> bool {
    line.starts_with("listen") || line.starts_with("subscribe")
}

async fn handle_connection(
    mut socket: TcpStream,
    state: Arc<Mutex<MockCliState>>,
    push_tx: broadcast::Sender<PushMessage>,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);

        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim_end_matches('\r')
                .to_string();

            if let Some(rest) = line.strip_prefix("login ") {
                let expected = state.lock().await.credentials.clone();
                let mut parts = rest.split(' ');
                let given = (
                    urlencoding::decode(parts.next().unwrap_or(""))
                        .unwrap()
                        .into_owned(),
                    urlencoding::decode(parts.next().unwrap_or(""))
                        .unwrap()
                        .into_owned(),
                );
                if let Some(expected) = expected {
                    if expected != given {
                        return;
                    }
                }
                let user = rest.split(' ').next().unwrap_or("");
                let reply = format!("login {} ******\n", user);
                if socket.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
                continue;
            }

            if is_listen_command(&line) {
                let rx = push_tx.subscribe();
                state.lock().await.listen_connections += 1;
                if socket
                    .write_all(format!("{}\n", line).as_bytes())
                    .await
                    .is_err()
                {
                    return;
                }
                serve_push(socket, rx).await;
                return;
            }

            let (reply, delay, drop_commands) = {
                let mut s = state.lock().await;
                s.raw.extend_from_slice(&line_bytes);
                s.received.push(line.clone());
                (
                    s.replies.get(&line).cloned().unwrap_or_else(|| line.clone()),
                    s.reply_delay,
                    s.drop_commands,
                )
            };
            if drop_commands {
                return;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if socket
                .write_all(format!("{}\r\n", reply).as_bytes())
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

async fn serve_push(mut socket: TcpStream, mut rx: broadcast::Receiver<PushMessage>) {
    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(PushMessage::Line(line)) => {
                    if socket.write_all(format!("{}\n", line).as_bytes()).await.is_err() {
                        return;
                    }
                }
                Ok(PushMessage::Close) | Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            },
            read = socket.read(&mut buf) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            },
        }
    }
}
