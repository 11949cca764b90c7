use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serenity::model::id::GuildId;

/// Per-guild debounce for the overview command
///
/// At most one allowed call per guild inside the window; throttled calls
/// are simply dropped by the caller. Mutating subcommands never go
/// through this.
pub struct RateLimiter {
    window: Duration,
    last_seen: DashMap<GuildId, Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: DashMap::new(),
        }
    }

    /// Check whether a call is allowed now, stamping the guild if so
    pub fn check(&self, guild_id: GuildId) -> bool {
        let now = Instant::now();
        match self.last_seen.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= self.window {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_is_allowed() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        assert!(limiter.check(GuildId::new(1)));
    }

    #[test]
    fn test_second_call_within_window_is_throttled() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let guild = GuildId::new(1);

        assert!(limiter.check(guild));
        assert!(!limiter.check(guild));
    }

    #[test]
    fn test_guilds_are_throttled_independently() {
        let limiter = RateLimiter::new(Duration::from_secs(10));

        assert!(limiter.check(GuildId::new(1)));
        assert!(limiter.check(GuildId::new(2)));
        assert!(!limiter.check(GuildId::new(1)));
    }

    #[test]
    fn test_call_after_window_is_allowed_again() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        let guild = GuildId::new(1);

        assert!(limiter.check(guild));
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check(guild));
    }
}
