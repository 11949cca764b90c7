use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serenity::model::id::GuildId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::constants::{INVALID_TIMEZONES_LABEL, NICKNAME_ZONE_LIMIT, NOT_CONFIGURED_LABEL};
use crate::presence::Presence;
use crate::render::render_zone;
use crate::store::{GuildSettings, SettingsStore};

/// Handle to one guild's running refresh task
///
/// Owned exclusively by the registry. Dropping the watch sender alone is
/// not how a task stops; `shutdown` signals it and waits for the loop to
/// exit so no nickname write can land afterwards.
struct RefreshHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Owns the set of per-guild refresh tasks
///
/// One task per joined guild, keyed by guild id. Start and stop are
/// idempotent: a spurious re-join cannot spawn a second task and leaving
/// an unknown guild is a no-op. Only registry methods touch the map.
pub struct RefreshRegistry {
    tasks: DashMap<GuildId, RefreshHandle>,
    store: Arc<dyn SettingsStore>,
    presence: Arc<dyn Presence>,
    tick_interval: Duration,
}

impl RefreshRegistry {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        presence: Arc<dyn Presence>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            tasks: DashMap::new(),
            store,
            presence,
            tick_interval,
        }
    }

    /// Start one refresh task per guild in the current guild set
    pub async fn start_all(&self, guild_ids: Vec<GuildId>) {
        for guild_id in guild_ids {
            self.start(guild_id).await;
        }
        info!("Refresh tasks running for {} guilds", self.active_count());
    }

    /// Start the refresh task for a guild; no-op if one is already running
    pub async fn start(&self, guild_id: GuildId) {
        if self.tasks.contains_key(&guild_id) {
            return;
        }

        // The bot must actually be a member before it can edit its nickname.
        // Should not fail in practice, but a guild we cannot resolve is
        // skipped rather than treated as fatal.
        if let Err(e) = self.presence.resolve_membership(guild_id).await {
            warn!("Skipping guild {}: cannot resolve own membership: {}", guild_id, e);
            return;
        }

        match self.tasks.entry(guild_id) {
            Entry::Occupied(_) => {
                // Lost the race against another start for the same guild
            }
            Entry::Vacant(entry) => {
                let (stop_tx, stop_rx) = watch::channel(false);
                let task = tokio::spawn(run_refresh_loop(
                    guild_id,
                    Arc::clone(&self.store),
                    Arc::clone(&self.presence),
                    self.tick_interval,
                    stop_rx,
                ));
                entry.insert(RefreshHandle {
                    stop: stop_tx,
                    task,
                });
                info!("Started refresh task for guild {}", guild_id);
            }
        }
    }

    /// Stop and remove the refresh task for a guild; no-op if unknown
    pub async fn stop(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.tasks.remove(&guild_id) {
            handle.shutdown().await;
            info!("Stopped refresh task for guild {}", guild_id);
        }
    }

    /// Stop every running refresh task
    ///
    /// Called when the gateway session goes away, before any reconnection
    /// attempt, so no stale nickname update fires against a dead session.
    pub async fn stop_all(&self) {
        let guild_ids: Vec<GuildId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for guild_id in guild_ids {
            self.stop(guild_id).await;
        }
    }

    #[allow(dead_code)]
    pub fn is_running(&self, guild_id: GuildId) -> bool {
        self.tasks.contains_key(&guild_id)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Per-guild refresh loop
///
/// The first tick fires immediately, then every `tick_interval`. The stop
/// branch is biased ahead of the timer so a cancelled task never executes
/// another tick body; a tick in flight finishes before the signal is seen.
async fn run_refresh_loop(
    guild_id: GuildId,
    store: Arc<dyn SettingsStore>,
    presence: Arc<dyn Presence>,
    tick_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut timer = interval(tick_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = timer.tick() => {
                run_tick(guild_id, store.as_ref(), presence.as_ref()).await;
            }
        }
    }
}

/// One refresh tick: read config, render, push the nickname
///
/// Every failure is logged and ends this tick only; the next tick retries
/// naturally and other guilds are unaffected.
async fn run_tick(guild_id: GuildId, store: &dyn SettingsStore, presence: &dyn Presence) {
    let settings = match store.load(guild_id).await {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load settings for guild {}: {}", guild_id, e);
            return;
        }
    };

    let nickname = nickname_text(&settings, Utc::now());

    if let Err(e) = presence.set_display_name(guild_id, &nickname).await {
        warn!("Failed to update nickname in guild {}: {}", guild_id, e);
    }
}

/// Derive the label set for one tick
///
/// Empty configuration gets a placeholder. If any stored zone fails to
/// render the whole set degrades to a single placeholder instead of a
/// partial list; guessing which zone is bad is left to `!time remove`.
fn nickname_labels(settings: &GuildSettings, now: DateTime<Utc>) -> Vec<String> {
    if settings.is_empty() {
        return vec![NOT_CONFIGURED_LABEL.to_string()];
    }

    settings
        .timezones
        .iter()
        .map(|tz| render_zone(tz, now))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|_| vec![INVALID_TIMEZONES_LABEL.to_string()])
}

/// Join the first two labels into the nickname string
fn nickname_text(settings: &GuildSettings, now: DateTime<Utc>) -> String {
    nickname_labels(settings, now)
        .into_iter()
        .take(NICKNAME_ZONE_LIMIT)
        .collect::<Vec<_>>()
        .join(", ")
}
