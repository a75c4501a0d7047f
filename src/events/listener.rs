//! Push-stream reader
//!
//! Opens its own CLI connection, sends the subscription command, and turns
//! every line that follows into at most one [`Event`]. The read loop runs on
//! a spawned task and never awaits a status refresh: song and playlist lines
//! are queued to a refresher task that asks the [`StatusSource`] (which takes
//! the command connection's lock) and dispatches in arrival order. Time
//! events are dispatched straight from the read loop, so they may overtake
//! a song or playlist event that is still waiting for its refresh.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::registry::{EventHandler, SubscriptionId, SubscriptionRegistry};
use super::{Event, EventKind, PlayerScope};
use crate::connection::{CliStream, ConnectionSettings, Credentials};
use crate::error::Result;
use crate::model::{PlaybackState, PlayerStatus, Song};
use crate::protocol::push::{parse_push_line, PushLine};

pub const DEFAULT_LISTEN_COMMAND: &str = "listen 1";

/// Song and playlist lines waiting for a status refresh
const REFRESH_QUEUE: usize = 32;

/// Where fresh player status comes from when a song or playlist event
/// arrives
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn player_status(&self, player_id: &str) -> Result<PlayerStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Push stream failed. Stays here until restarted.
    Faulted,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    /// `host:port` of the CLI
    pub addr: String,
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    /// Sent once after connecting; turns the connection into a push stream
    pub listen_command: String,
}

impl ListenerSettings {
    /// Same server and credentials as the command connection
    pub fn for_connection(settings: &ConnectionSettings) -> Self {
        Self {
            addr: settings.endpoint.cli_addr(),
            credentials: settings.credentials.clone(),
            connect_timeout: settings.connect_timeout,
            listen_command: DEFAULT_LISTEN_COMMAND.to_string(),
        }
    }

    pub fn with_listen_command(mut self, command: impl Into<String>) -> Self {
        self.listen_command = command.into();
        self
    }
}

struct RunningTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

struct Inner {
    settings: ListenerSettings,
    registry: Arc<SubscriptionRegistry>,
    status_source: RwLock<Option<Arc<dyn StatusSource>>>,
    state: watch::Sender<ListenerState>,
    task: Mutex<Option<RunningTask>>,
}

/// Cloneable handle to one push listener
#[derive(Clone)]
pub struct EventListener {
    inner: Arc<Inner>,
}

impl EventListener {
    pub fn new(settings: ListenerSettings, registry: Arc<SubscriptionRegistry>) -> Self {
        let (state, _) = watch::channel(ListenerState::Stopped);
        Self {
            inner: Arc::new(Inner {
                settings,
                registry,
                status_source: RwLock::new(None),
                state,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn set_status_source(&self, source: Arc<dyn StatusSource>) {
        *self
            .inner
            .status_source
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }

    pub fn state(&self) -> ListenerState {
        *self.inner.state.borrow()
    }

    /// Receiver for state transitions
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.inner.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            debug!("Event listener {} -> {}", previous, state);
        }
    }

    /// Connect the push stream and spawn the read loop. The loop ends when
    /// `parent` (normally the command connection's lifecycle token) is
    /// cancelled, when [`stop`](Self::stop) is called, or when the stream
    /// fails. Starting a listener that is already running is a no-op.
    pub async fn start(&self, parent: &CancellationToken) -> Result<()> {
        let mut task = self.inner.task.lock().await;
        if matches!(
            self.state(),
            ListenerState::Starting | ListenerState::Running
        ) {
            return Ok(());
        }
        if let Some(previous) = task.take() {
            previous.cancel.cancel();
            let _ = previous.handle.await;
        }

        self.set_state(ListenerState::Starting);
        let stream = match self.open_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Event listener failed to connect to {}: {}", self.inner.settings.addr, e);
                self.set_state(ListenerState::Faulted);
                return Err(e);
            }
        };

        let cancel = parent.child_token();
        self.set_state(ListenerState::Running);
        info!("Event listener running on {}", self.inner.settings.addr);

        let listener = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { listener.run(stream, token).await });
        *task = Some(RunningTask { handle, cancel });
        Ok(())
    }

    async fn open_stream(&self) -> Result<CliStream> {
        let settings = &self.inner.settings;
        let mut stream = CliStream::open(
            &settings.addr,
            settings.connect_timeout,
            settings.credentials.as_ref(),
        )
        .await?;
        stream.send(&settings.listen_command).await?;
        debug!("Sent '{}' on push stream", settings.listen_command);
        Ok(stream)
    }

    /// Stop the read loop and wait for it. No `Disconnected` event is
    /// emitted for an explicit stop.
    pub async fn stop(&self) {
        let Some(task) = self.inner.task.lock().await.take() else {
            if self.state() == ListenerState::Faulted {
                self.set_state(ListenerState::Stopped);
            }
            return;
        };
        task.cancel.cancel();
        let _ = task.handle.await;
        self.set_state(ListenerState::Stopped);
    }

    async fn run(self, mut stream: CliStream, cancel: CancellationToken) {
        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE);
        let refresh_cancel = cancel.child_token();
        let refresher = tokio::spawn(self.clone().run_refresher(refresh_rx, refresh_cancel.clone()));

        let faulted = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ListenerState::Stopping);
                    info!("Event listener received shutdown signal");
                    break false;
                }
                result = stream.read_line() => match result {
                    Ok(Some(line)) => self.route_line(&line, &refresh_tx),
                    Ok(None) => {
                        warn!("Push stream closed by server");
                        break true;
                    }
                    Err(e) => {
                        warn!("Push stream read error: {}", e);
                        break true;
                    }
                }
            }
        };

        // Refreshes still queued are dropped; one already in flight finishes
        // so the command stream is never abandoned mid-reply.
        refresh_cancel.cancel();
        drop(refresh_tx);
        if let Err(e) = refresher.await {
            warn!("Status refresher ended abnormally: {}", e);
        }

        if faulted {
            self.fault();
        } else {
            self.set_state(ListenerState::Stopped);
        }
    }

    /// Dispatch time events now; queue song and playlist lines for a
    /// refresh. A full queue falls back to the fields on the push line.
    fn route_line(&self, line: &str, refresh: &mpsc::Sender<PushLine>) {
        let push = parse_push_line(line);
        let push = match push {
            PushLine::NewSong { .. } | PushLine::Playlist { .. } => {
                match refresh.try_send(push) {
                    Ok(()) => return,
                    Err(TrySendError::Full(push)) | Err(TrySendError::Closed(push)) => {
                        warn!("Status refresh queue unavailable, dispatching push fields only");
                        push
                    }
                }
            }
            other => other,
        };
        match event_from_push(&push) {
            Some(event) => self.dispatch(&event),
            None => trace!("Ignoring push line: {}", line),
        }
    }

    async fn run_refresher(self, mut queue: mpsc::Receiver<PushLine>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                push = queue.recv() => match push {
                    Some(push) => {
                        if let Some(event) = self.refreshed_event(&push).await {
                            self.dispatch(&event);
                        }
                    }
                    None => break,
                }
            }
        }
        debug!("Status refresher stopped");
    }

    fn fault(&self) {
        self.set_state(ListenerState::Faulted);
        let delivered = self.inner.registry.dispatch(&Event::Disconnected);
        debug!("Disconnected delivered to {} handler(s)", delivered);
    }

    fn dispatch(&self, event: &Event) {
        debug!("Push event {:?} for {:?}", event.kind(), event.player_id());
        self.inner.registry.dispatch(event);
    }

    /// Parse one push line, refresh status if the line calls for it, and
    /// dispatch the resulting event. Returns the dispatched event.
    pub async fn process_line(&self, line: &str) -> Option<Event> {
        let push = parse_push_line(line);
        let Some(event) = self.refreshed_event(&push).await else {
            trace!("Ignoring push line: {}", line);
            return None;
        };
        self.dispatch(&event);
        Some(event)
    }

    async fn refreshed_event(&self, push: &PushLine) -> Option<Event> {
        match push {
            PushLine::NewSong { player_id, .. } => Some(Event::SongChanged {
                player_id: player_id.clone(),
                status: self.status_for(player_id, push).await,
            }),
            PushLine::Playlist { player_id, .. } => Some(Event::PlaylistChanged {
                player_id: player_id.clone(),
                status: self.status_for(player_id, push).await,
            }),
            other => event_from_push(other),
        }
    }

    async fn status_for(&self, player_id: &str, push: &PushLine) -> PlayerStatus {
        let source = self
            .inner
            .status_source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(source) = source {
            match source.player_status(player_id).await {
                Ok(status) => return status,
                Err(e) => warn!("Status refresh for {} failed: {}", player_id, e),
            }
        }
        status_from_push(push)
    }

    pub fn subscribe<H>(&self, kind: EventKind, scope: PlayerScope, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.inner.registry.subscribe(kind, scope, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, scope: &PlayerScope, id: SubscriptionId) -> bool {
        self.inner.registry.unsubscribe(kind, scope, id)
    }

    pub fn unsubscribe_all(&self, kind: EventKind) -> usize {
        self.inner.registry.unsubscribe_all(kind)
    }
}

/// Event built from the push line alone
fn event_from_push(push: &PushLine) -> Option<Event> {
    let event = match push {
        PushLine::NewSong { player_id, .. } => Event::SongChanged {
            player_id: player_id.clone(),
            status: status_from_push(push),
        },
        PushLine::Playlist { player_id, .. } => Event::PlaylistChanged {
            player_id: player_id.clone(),
            status: status_from_push(push),
        },
        PushLine::Time { player_id, seconds } => Event::TimeChanged {
            player_id: player_id.clone(),
            seconds: *seconds,
        },
        PushLine::Unknown { .. } => return None,
    };
    Some(event)
}

/// Best-effort status from the push line alone
fn status_from_push(push: &PushLine) -> PlayerStatus {
    match push {
        PushLine::NewSong { title, index, .. } => PlayerStatus {
            current_song: title.as_ref().map(|name| Song {
                name: name.clone(),
                ..Default::default()
            }),
            current_index: *index,
            state: PlaybackState::Playing,
            ..Default::default()
        },
        PushLine::Playlist { state, .. } => PlayerStatus {
            state: state.unwrap_or_default(),
            ..Default::default()
        },
        PushLine::Time { seconds, .. } => PlayerStatus {
            position: *seconds,
            ..Default::default()
        },
        PushLine::Unknown { .. } => PlayerStatus::default(),
    }
}
