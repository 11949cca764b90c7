use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::prelude::GatewayIntents;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::constants::{OVERVIEW_COOLDOWN_SECS, RECONNECT_BACKOFF_SECS, REFRESH_INTERVAL_SECS};
use crate::db::Database;
use crate::error::BotError;
use crate::handlers::Handler;
use crate::presence::DiscordPresence;
use crate::ratelimit::RateLimiter;
use crate::refresh::RefreshRegistry;
use crate::store::SettingsStore;

/// One gateway session, from login to disconnect
///
/// `run` resolves when the session is over: `Ok` for a deliberate
/// shutdown, `Err` when the connection failed or was lost. The trait
/// exists so the supervisor's retry behavior can be tested with
/// simulated failure sequences.
#[async_trait]
pub trait Session: Send {
    async fn run(&mut self) -> Result<(), BotError>;
}

/// Drives login with fixed-backoff retry
///
/// Disconnected -> Connecting -> Connected and back, cyclically, for as
/// long as reconnection is enabled. With reconnection disabled a single
/// session end leaves the bot offline for good.
pub struct ConnectionSupervisor {
    reconnect: bool,
    backoff: Duration,
}

impl ConnectionSupervisor {
    pub fn new(reconnect: bool) -> Self {
        Self {
            reconnect,
            backoff: Duration::from_secs(RECONNECT_BACKOFF_SECS),
        }
    }

    #[cfg(test)]
    fn with_backoff(reconnect: bool, backoff: Duration) -> Self {
        Self { reconnect, backoff }
    }

    /// Run sessions until one ends cleanly or reconnection is disabled
    pub async fn supervise<S: Session>(&self, session: &mut S) {
        loop {
            info!("Connecting to Discord...");
            match session.run().await {
                Ok(()) => {
                    info!("Session ended cleanly, shutting down");
                    return;
                }
                Err(e) => error!("Connection lost: {}", e),
            }

            if !self.reconnect {
                warn!("Reconnection is disabled, staying offline");
                return;
            }

            info!("Retrying in {} seconds", self.backoff.as_secs());
            // A scheduled resumption, never a blocking wait
            sleep(self.backoff).await;
        }
    }
}

/// A Discord gateway session
///
/// Each attempt builds a fresh registry and handler, so no refresh task
/// handle can survive from one session into the next; the guild set is
/// re-learned from the new session's ready event.
pub struct DiscordSession {
    token: String,
    store: Arc<Database>,
}

impl DiscordSession {
    pub fn new(token: String, store: Arc<Database>) -> Self {
        Self { token, store }
    }
}

#[async_trait]
impl Session for DiscordSession {
    async fn run(&mut self) -> Result<(), BotError> {
        let http = Arc::new(Http::new(&self.token));
        let presence = Arc::new(DiscordPresence::new(http));
        let registry = Arc::new(RefreshRegistry::new(
            Arc::clone(&self.store) as Arc<dyn SettingsStore>,
            presence,
            Duration::from_secs(REFRESH_INTERVAL_SECS),
        ));

        let handler = Handler::new(
            Arc::clone(&registry),
            Arc::clone(&self.store),
            RateLimiter::new(Duration::from_secs(OVERVIEW_COOLDOWN_SECS)),
        );

        // Reading the `!time` prefix requires the message content intent
        let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;

        let client = serenity::client::ClientBuilder::new(&self.token, intents)
            .event_handler(handler)
            .await;

        let result = match client {
            Ok(mut client) => client.start().await.map_err(BotError::Connection),
            Err(e) => Err(BotError::Connection(e)),
        };

        // Whatever ended the session, no refresh task may outlive it
        registry.stop_all().await;
        result
    }
}
