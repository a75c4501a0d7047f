//! Squeeze Control - command-line monitor
//!
//! Connects to the configured server, logs the player list and the default
//! player's status, then logs every push event until interrupted.

use squeeze_control::config;
use squeeze_control::events::{Event, EventKind, PlayerScope};
use squeeze_control::session::{RetryConfig, Session, SessionHooks};
use squeeze_control::SqueezeService;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Logs what the server knows after every (re)connect
struct StartupReport {
    default_player: Option<String>,
}

#[async_trait]
impl SessionHooks for StartupReport {
    async fn connected(&self, service: &SqueezeService) -> Result<()> {
        let players = service.browse().get_players().await?;
        tracing::info!("{} player(s) on server", players.len());
        for player in &players {
            tracing::info!("  {} ({})", player.name, player.id);
        }

        let player_id = self
            .default_player
            .clone()
            .or_else(|| players.first().map(|p| p.id.clone()));
        if let Some(player_id) = player_id {
            let status = service.browse().get_player_status(&player_id).await?;
            let title = status
                .current_song
                .as_ref()
                .map(|s| s.name.as_str())
                .unwrap_or("-");
            tracing::info!(
                "{}: {} '{}' at {:.0}s, volume {}{}",
                player_id,
                status.state,
                title,
                status.position,
                status.volume,
                if status.muted { " (muted)" } else { "" }
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "squeeze_control=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Squeeze Control v{} ({})",
        env!("SQUEEZE_VERSION"),
        env!("SQUEEZE_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config()?;
    tracing::info!(
        "Configuration loaded, server: {}:{}",
        config.server.host,
        config.server.cli_port
    );

    let service = Arc::new(SqueezeService::from_config(&config.server));

    // Log every push event; subscriptions survive reconnects
    for kind in [
        EventKind::SongChanged,
        EventKind::PlaylistChanged,
        EventKind::TimeChanged,
        EventKind::Disconnected,
    ] {
        service
            .events()
            .subscribe(kind, PlayerScope::All, |event: &Event| match event {
                Event::SongChanged { player_id, status } => tracing::info!(
                    "{}: now playing '{}'",
                    player_id,
                    status
                        .current_song
                        .as_ref()
                        .map(|s| s.name.as_str())
                        .unwrap_or("-")
                ),
                Event::PlaylistChanged { player_id, status } => tracing::info!(
                    "{}: playlist changed ({}, {} tracks)",
                    player_id,
                    status.state,
                    status.playlist_tracks
                ),
                Event::TimeChanged { player_id, seconds } => {
                    tracing::debug!("{}: {:.1}s", player_id, seconds)
                }
                Event::Disconnected => tracing::warn!("Push stream lost"),
            });
    }

    let shutdown = CancellationToken::new();
    let session = Session::with_hooks(
        service.clone(),
        StartupReport {
            default_player: config.player.clone(),
        },
        shutdown.clone(),
    );
    let retry = RetryConfig::from(&config.reconnect);
    let runner = tokio::spawn(async move { session.run_with_retry(retry).await });

    shutdown_signal().await;
    shutdown.cancel();

    runner.await??;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
