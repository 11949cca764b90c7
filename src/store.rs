use async_trait::async_trait;
use serenity::model::id::GuildId;

use crate::db::Database;
use crate::error::BotError;

/// Per-guild configuration record
///
/// `timezones` is ordered and duplicate-free. Insertion order is
/// meaningful: the nickname shows the first entries, and re-adding an
/// existing zone moves it to the end of the list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuildSettings {
    pub timezones: Vec<String>,
}

impl GuildSettings {
    /// Add a timezone, moving it to the most-recent position if it already exists
    pub fn upsert_timezone(&mut self, tz: &str) {
        self.timezones.retain(|zone| zone != tz);
        self.timezones.push(tz.to_string());
    }

    /// Remove a timezone; returns whether it was present
    pub fn remove_timezone(&mut self, tz: &str) -> bool {
        let before = self.timezones.len();
        self.timezones.retain(|zone| zone != tz);
        self.timezones.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.timezones.is_empty()
    }
}

/// Durable per-guild settings storage
///
/// `load` never reports an absent record as an error: a guild without a
/// stored row gets the default empty settings. A load-then-save sequence
/// is not transactional; the refresh loop may read a value that a command
/// is about to replace and will pick up the committed one on its next tick.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self, guild_id: GuildId) -> Result<GuildSettings, BotError>;

    async fn save(&self, guild_id: GuildId, settings: &GuildSettings) -> Result<(), BotError>;
}

#[async_trait]
impl SettingsStore for Database {
    async fn load(&self, guild_id: GuildId) -> Result<GuildSettings, BotError> {
        let timezones = self.get_guild_timezones(guild_id).await?;
        Ok(GuildSettings {
            timezones: timezones.unwrap_or_default(),
        })
    }

    async fn save(&self, guild_id: GuildId, settings: &GuildSettings) -> Result<(), BotError> {
        self.set_guild_timezones(guild_id, &settings.timezones)
            .await?;
        Ok(())
    }
}

/// In-memory settings store for tests
///
/// Counts loads and saves so tests can assert that command paths which
/// must not touch storage really don't.
#[cfg(test)]
pub struct MemoryStore {
    records: std::sync::Mutex<std::collections::HashMap<GuildId, GuildSettings>>,
    pub loads: std::sync::atomic::AtomicUsize,
    pub saves: std::sync::atomic::AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: std::sync::Mutex::new(std::collections::HashMap::new()),
            loads: std::sync::atomic::AtomicUsize::new(0),
            saves: std::sync::atomic::AtomicUsize::new(0),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make every subsequent load and save fail with a storage error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self, guild_id: GuildId) -> Result<GuildSettings, BotError> {
        self.loads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BotError::Storage(sqlx::Error::PoolClosed));
        }
        Ok(self
            .records
            .lock()
            .expect("store lock")
            .get(&guild_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, guild_id: GuildId, settings: &GuildSettings) -> Result<(), BotError> {
        self.saves
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(BotError::Storage(sqlx::Error::PoolClosed));
        }
        self.records
            .lock()
            .expect("store lock")
            .insert(guild_id, settings.clone());
        Ok(())
    }
}
