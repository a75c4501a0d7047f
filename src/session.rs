//! Session runner - keeps a [`SqueezeService`] connected
//!
//! The core never reconnects on its own; this loop does it from the outside:
//! connect, wait until either connection is lost (or shutdown), tear down,
//! back off, repeat. The push stream reports loss with a `Disconnected`
//! event; the command connection through its state channel.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ReconnectConfig;
use crate::connection::ConnectionState;
use crate::events::{Event, EventKind, PlayerScope};
use crate::service::SqueezeService;

/// Retry configuration for the reconnect loop
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay (backoff caps at this value)
    pub max_delay: Duration,
    /// A session that stayed up at least this long resets the backoff
    pub stable_run_threshold: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            stable_run_threshold: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            ..Default::default()
        }
    }
}

impl From<&ReconnectConfig> for RetryConfig {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_delay_secs),
            Duration::from_secs(config.max_delay_secs),
        )
    }
}

/// Exponential backoff capped at `max`
pub fn next_delay(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Called after every successful connect
#[async_trait]
pub trait SessionHooks: Send + Sync {
    async fn connected(&self, _service: &SqueezeService) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing
pub struct NoHooks;

impl SessionHooks for NoHooks {}

pub struct Session<H: SessionHooks = NoHooks> {
    service: Arc<SqueezeService>,
    hooks: H,
    shutdown: CancellationToken,
}

impl Session<NoHooks> {
    pub fn new(service: Arc<SqueezeService>, shutdown: CancellationToken) -> Self {
        Self::with_hooks(service, NoHooks, shutdown)
    }
}

impl<H: SessionHooks> Session<H> {
    pub fn with_hooks(service: Arc<SqueezeService>, hooks: H, shutdown: CancellationToken) -> Self {
        Self {
            service,
            hooks,
            shutdown,
        }
    }

    pub fn service(&self) -> &Arc<SqueezeService> {
        &self.service
    }

    /// Keep the session connected until shutdown.
    ///
    /// Each failed attempt or lost connection waits with exponential backoff
    /// before the next one. The backoff is reset if the previous session
    /// stayed up for at least `config.stable_run_threshold`.
    pub async fn run_with_retry(&self, config: RetryConfig) -> Result<()> {
        let mut delay = config.initial_delay;

        loop {
            if self.shutdown.is_cancelled() {
                info!("session: shutdown before attempt");
                break;
            }

            let start = Instant::now();
            match self.run_once().await {
                Ok(()) => {
                    info!("session: clean exit");
                    break;
                }
                Err(e) => {
                    let run_duration = start.elapsed();
                    if run_duration >= config.stable_run_threshold {
                        info!(
                            "session: ran for {:?} before failure, resetting backoff",
                            run_duration
                        );
                        delay = config.initial_delay;
                    }

                    warn!("session: {}, retrying in {:?}", e, delay);

                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!("session: shutdown during backoff");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {
                            delay = next_delay(delay, config.max_delay);
                        }
                    }
                }
            }
        }

        info!("session: stopped");
        Ok(())
    }

    /// One connected session.
    ///
    /// Returns:
    /// - `Ok(())` on shutdown
    /// - `Err(...)` when connecting failed or either connection dropped
    async fn run_once(&self) -> Result<()> {
        let lost = Arc::new(Notify::new());
        let signal = lost.clone();
        let events = self.service.events();
        let id = events.subscribe(
            EventKind::Disconnected,
            PlayerScope::All,
            move |_: &Event| signal.notify_one(),
        );

        let result = self.stay_connected(&lost).await;

        events.unsubscribe(EventKind::Disconnected, &PlayerScope::All, id);
        self.service.disconnect().await;
        result
    }

    async fn stay_connected(&self, lost: &Notify) -> Result<()> {
        self.service.connect().await?;
        let mut command_state = self.service.connection().watch_state();
        if let Err(e) = self.hooks.connected(&self.service).await {
            error!("session: connect hook failed: {}", e);
        }
        tokio::select! {
            _ = lost.notified() => Err(anyhow!("push stream disconnected")),
            _ = command_state.wait_for(|s| *s == ConnectionState::Disconnected) => {
                Err(anyhow!("command connection lost"))
            }
            _ = self.shutdown.cancelled() => Ok(()),
        }
    }
}
