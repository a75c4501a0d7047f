//! Session object tying one server's connections together

use std::sync::Arc;

use tracing::info;

use crate::browse::BrowseService;
use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionSettings};
use crate::error::Result;
use crate::events::{EventListener, ListenerSettings, SubscriptionRegistry};
use crate::playback::PlaybackController;

/// Owns the command connection, the push listener and the subscription
/// registry for one server. Browse and playback services share the command
/// connection; the listener refreshes status through the browse service.
pub struct SqueezeService {
    connection: Arc<Connection>,
    browse: BrowseService,
    playback: PlaybackController,
    listener: EventListener,
}

impl SqueezeService {
    pub fn new(settings: ConnectionSettings, listener_settings: ListenerSettings) -> Self {
        let connection = Arc::new(Connection::new(settings));
        let browse = BrowseService::new(connection.clone());
        let playback = PlaybackController::new(connection.clone());
        let listener = EventListener::new(listener_settings, Arc::new(SubscriptionRegistry::new()));
        listener.set_status_source(Arc::new(browse.clone()));
        Self {
            connection,
            browse,
            playback,
            listener,
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(server.connection_settings(), server.listener_settings())
    }

    /// Connect the command stream, then start the push listener on the
    /// connection's lifecycle. If the listener cannot start, the command
    /// stream is closed again.
    pub async fn connect(&self) -> Result<()> {
        self.connection.connect().await?;
        if let Err(e) = self
            .listener
            .start(&self.connection.lifecycle_token())
            .await
        {
            self.connection.disconnect().await;
            return Err(e);
        }
        info!(
            "Session connected to {}",
            self.connection.endpoint().cli_addr()
        );
        Ok(())
    }

    /// Stop the listener and close the command stream. Subscriptions are
    /// kept for the next `connect`.
    pub async fn disconnect(&self) {
        self.listener.stop().await;
        self.connection.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn browse(&self) -> &BrowseService {
        &self.browse
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn events(&self) -> &EventListener {
        &self.listener
    }
}
