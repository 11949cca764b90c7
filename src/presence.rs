use std::sync::Arc;

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::GuildId;

use crate::error::BotError;

/// Capability surface for the bot's own guild presence
///
/// The refresh loop only needs two things from Discord: proof that the bot
/// is actually a member of a guild, and the ability to set its nickname
/// there. Keeping this behind a trait lets the registry and refresh tests
/// run without a gateway.
#[async_trait]
pub trait Presence: Send + Sync {
    /// Resolve the bot's own membership in a guild
    async fn resolve_membership(&self, guild_id: GuildId) -> Result<(), BotError>;

    /// Set the bot's displayed nickname in a guild
    async fn set_display_name(&self, guild_id: GuildId, name: &str) -> Result<(), BotError>;
}

/// Presence backed by the Discord REST API
pub struct DiscordPresence {
    http: Arc<Http>,
}

impl DiscordPresence {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Presence for DiscordPresence {
    async fn resolve_membership(&self, guild_id: GuildId) -> Result<(), BotError> {
        self.http
            .get_current_user_guild_member(guild_id)
            .await
            .map(|_| ())
            .map_err(BotError::PresenceUpdate)
    }

    async fn set_display_name(&self, guild_id: GuildId, name: &str) -> Result<(), BotError> {
        guild_id
            .edit_nickname(&*self.http, Some(name))
            .await
            .map_err(BotError::PresenceUpdate)
    }
}

/// Recording presence for tests
#[cfg(test)]
pub struct MockPresence {
    pub calls: std::sync::Mutex<Vec<(GuildId, String)>>,
    resolvable: bool,
}

#[cfg(test)]
impl MockPresence {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            resolvable: true,
        }
    }

    /// A presence whose membership lookups always fail
    pub fn unresolvable() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            resolvable: false,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn last_name(&self) -> Option<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .last()
            .map(|(_, name)| name.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Presence for MockPresence {
    async fn resolve_membership(&self, _guild_id: GuildId) -> Result<(), BotError> {
        if self.resolvable {
            Ok(())
        } else {
            Err(BotError::PresenceUpdate(serenity::Error::Other(
                "not a member",
            )))
        }
    }

    async fn set_display_name(&self, guild_id: GuildId, name: &str) -> Result<(), BotError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((guild_id, name.to_string()));
        Ok(())
    }
}
