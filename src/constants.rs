/// Prefix that marks a message as a command for this bot
pub const COMMAND_PREFIX: &str = "!time";

/// Seconds between two nickname refreshes of the same guild
pub const REFRESH_INTERVAL_SECS: u64 = 60;

/// How many configured timezones fit into the nickname
pub const NICKNAME_ZONE_LIMIT: usize = 2;

/// Nickname shown while a guild has no timezones configured
pub const NOT_CONFIGURED_LABEL: &str = "Not Configured";

/// Nickname shown when a stored timezone can no longer be rendered
pub const INVALID_TIMEZONES_LABEL: &str = "Invalid timezones";

/// Seconds to wait between reconnection attempts
pub const RECONNECT_BACKOFF_SECS: u64 = 3;

/// Minimum seconds between two `!time` overviews in the same guild
pub const OVERVIEW_COOLDOWN_SECS: u64 = 10;

/// Log directive for the application
pub const LOG_DIRECTIVE: &str = "tzbot=info";
