use chrono::{DateTime, Utc};
use serenity::model::id::GuildId;
use tracing::error;

use crate::constants::COMMAND_PREFIX;
use crate::render::render_zone;
use crate::store::SettingsStore;

/// A parsed `!time` invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeCommand {
    /// `!time` with no subcommand: list configured zones with their times
    Overview,
    /// `!time help`
    Help,
    /// `!time add <tz>`; the argument may be missing
    Add(Option<String>),
    /// `!time remove <tz>`; the argument may be missing
    Remove(Option<String>),
    /// `!time reset`
    Reset,
    /// `!time <anything else>`
    Unknown,
}

impl TimeCommand {
    /// Whether this subcommand mutates configuration and needs admin rights
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            TimeCommand::Add(_) | TimeCommand::Remove(_) | TimeCommand::Reset
        )
    }
}

/// The single chat response produced by one command invocation
///
/// Rendered as one embed: either a title with a description, or a title
/// with inline fields (the overview).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<(String, String, bool)>,
}

impl CommandOutcome {
    fn text(title: &str, description: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            description: Some(description.into()),
            fields: Vec::new(),
        }
    }

    fn fields(title: &str, fields: Vec<(String, String, bool)>) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            fields,
        }
    }
}

/// Parse a message into a command
///
/// Returns `None` unless the first whitespace-delimited token is the
/// command prefix; everything else in the channel is not for us.
pub fn parse(content: &str) -> Option<TimeCommand> {
    let mut words = content.split_whitespace();
    if words.next()? != COMMAND_PREFIX {
        return None;
    }

    // Subcommand matching is case-sensitive; the zone argument is taken
    // verbatim as the next token.
    Some(match words.next() {
        None => TimeCommand::Overview,
        Some("help") => TimeCommand::Help,
        Some("add") => TimeCommand::Add(words.next().map(str::to_string)),
        Some("remove") => TimeCommand::Remove(words.next().map(str::to_string)),
        Some("reset") => TimeCommand::Reset,
        Some(_) => TimeCommand::Unknown,
    })
}

/// Execute a parsed command against a guild's settings
///
/// The permission check runs before any argument validation, and exactly
/// one outcome is produced per invocation. Storage failures are logged
/// and reported to the user as a generic error.
pub async fn dispatch(
    command: TimeCommand,
    guild_id: GuildId,
    is_admin: bool,
    store: &dyn SettingsStore,
    now: DateTime<Utc>,
) -> CommandOutcome {
    if command.requires_admin() && !is_admin {
        return CommandOutcome::text("Error", "You lack the necessary permissions");
    }

    match command {
        TimeCommand::Help => help_outcome(),
        TimeCommand::Unknown => {
            CommandOutcome::text("Invalid command", "Sorry, the command was not recognized")
        }
        TimeCommand::Add(None) => {
            CommandOutcome::text("Error", format!("Usage: {} add <timezone>", COMMAND_PREFIX))
        }
        TimeCommand::Remove(None) => CommandOutcome::text(
            "Error",
            format!("Usage: {} remove <timezone>", COMMAND_PREFIX),
        ),
        TimeCommand::Add(Some(tz)) => add_timezone(guild_id, &tz, store, now).await,
        TimeCommand::Remove(Some(tz)) => remove_timezone(guild_id, &tz, store).await,
        TimeCommand::Reset => reset_timezones(guild_id, store).await,
        TimeCommand::Overview => overview(guild_id, store, now).await,
    }
}

/// Static command reference text
fn help_outcome() -> CommandOutcome {
    CommandOutcome::text(
        "Commands available",
        format!(
            "{p} - list all configured timezones with their current local time\n\
             {p} help - show this message\n\
             {p} add <timezone> - add an IANA timezone such as Europe/Berlin or America/Los_Angeles\n\
             {p} remove <timezone> - remove <timezone> from the configuration, if present\n\
             {p} reset - remove all saved timezones\n\
             \n\
             Note that only the first two timezones are shown in the nickname of the bot",
            p = COMMAND_PREFIX
        ),
    )
}

/// Validate and upsert a timezone into the guild's list
async fn add_timezone(
    guild_id: GuildId,
    tz: &str,
    store: &dyn SettingsStore,
    now: DateTime<Utc>,
) -> CommandOutcome {
    // Validate before touching storage
    if render_zone(tz, now).is_err() {
        return CommandOutcome::text("Error", format!("{} is not a valid timezone!", tz));
    }

    let mut settings = match store.load(guild_id).await {
        Ok(settings) => settings,
        Err(e) => return storage_error(guild_id, e),
    };
    settings.upsert_timezone(tz);

    match store.save(guild_id, &settings).await {
        Ok(()) => CommandOutcome::text(
            "Success",
            format!(
                "The timezone {} was added successfully - updates to the nickname take up to one minute",
                tz
            ),
        ),
        Err(e) => storage_error(guild_id, e),
    }
}

/// Remove a timezone from the guild's list, if present
async fn remove_timezone(guild_id: GuildId, tz: &str, store: &dyn SettingsStore) -> CommandOutcome {
    let mut settings = match store.load(guild_id).await {
        Ok(settings) => settings,
        Err(e) => return storage_error(guild_id, e),
    };

    if !settings.remove_timezone(tz) {
        return CommandOutcome::text(
            "Nothing to remove",
            format!("{} was never configured in the first place", tz),
        );
    }

    match store.save(guild_id, &settings).await {
        Ok(()) => CommandOutcome::text(
            "Success",
            format!(
                "{} removed from the configuration - updates to the nickname take up to one minute",
                tz
            ),
        ),
        Err(e) => storage_error(guild_id, e),
    }
}

/// Replace the guild's list with the empty default
async fn reset_timezones(guild_id: GuildId, store: &dyn SettingsStore) -> CommandOutcome {
    match store.save(guild_id, &Default::default()).await {
        Ok(()) => CommandOutcome::text("Success", "All stored timezones were removed"),
        Err(e) => storage_error(guild_id, e),
    }
}

/// List the configured zones with their current local times
async fn overview(guild_id: GuildId, store: &dyn SettingsStore, now: DateTime<Utc>) -> CommandOutcome {
    let settings = match store.load(guild_id).await {
        Ok(settings) => settings,
        Err(e) => return storage_error(guild_id, e),
    };

    if settings.is_empty() {
        return CommandOutcome::text("Timezone overview", "No timezones configured!");
    }

    let fields = settings
        .timezones
        .iter()
        .map(|tz| {
            let time = render_zone(tz, now).unwrap_or_else(|_| "Invalid timezone".to_string());
            (tz.clone(), time, true)
        })
        .collect();

    CommandOutcome::fields("Timezone overview", fields)
}

fn storage_error(guild_id: GuildId, e: crate::error::BotError) -> CommandOutcome {
    error!("Storage operation failed for guild {}: {}", guild_id, e);
    CommandOutcome::text("Error", "A storage error occurred. Please try again later.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GuildSettings, MemoryStore};
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 11, 30, 0).unwrap()
    }

    fn guild() -> GuildId {
        GuildId::new(99)
    }

    async fn dispatch_admin(command: TimeCommand, store: &MemoryStore) -> CommandOutcome {
        dispatch(command, guild(), true, store, fixed_now()).await
    }

    #[test]
    fn test_parse_requires_prefix() {
        assert_eq!(parse("hello world"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("!timer add UTC"), None);
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse("!time"), Some(TimeCommand::Overview));
        assert_eq!(parse("!time help"), Some(TimeCommand::Help));
        assert_eq!(
            parse("!time add Europe/Berlin"),
            Some(TimeCommand::Add(Some("Europe/Berlin".to_string())))
        );
        assert_eq!(parse("!time add"), Some(TimeCommand::Add(None)));
        assert_eq!(
            parse("!time remove UTC"),
            Some(TimeCommand::Remove(Some("UTC".to_string())))
        );
        assert_eq!(parse("!time reset"), Some(TimeCommand::Reset));
        assert_eq!(parse("!time frobnicate"), Some(TimeCommand::Unknown));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(parse("!time HELP"), Some(TimeCommand::Unknown));
        assert_eq!(parse("!Time help"), None);
    }

    #[tokio::test]
    async fn test_add_persists_and_reports_success() {
        let store = MemoryStore::new();
        let outcome =
            dispatch_admin(TimeCommand::Add(Some("Europe/Berlin".to_string())), &store).await;

        assert_eq!(outcome.title, "Success");
        let settings = store.load(guild()).await.unwrap();
        assert_eq!(settings.timezones, vec!["Europe/Berlin"]);
    }

    #[tokio::test]
    async fn test_re_add_moves_zone_to_end() {
        let store = MemoryStore::new();
        dispatch_admin(TimeCommand::Add(Some("Europe/Berlin".to_string())), &store).await;
        dispatch_admin(TimeCommand::Add(Some("UTC".to_string())), &store).await;
        dispatch_admin(TimeCommand::Add(Some("Europe/Berlin".to_string())), &store).await;

        let settings = store.load(guild()).await.unwrap();
        assert_eq!(settings.timezones, vec!["UTC", "Europe/Berlin"]);
    }

    #[tokio::test]
    async fn test_add_invalid_zone_does_not_touch_storage() {
        let store = MemoryStore::new();
        let outcome =
            dispatch_admin(TimeCommand::Add(Some("Not/AZone".to_string())), &store).await;

        assert_eq!(outcome.title, "Error");
        assert!(outcome.description.unwrap().contains("Not/AZone"));
        assert_eq!(store.load_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_absent_zone_is_informational() {
        let store = MemoryStore::new();
        let outcome =
            dispatch_admin(TimeCommand::Remove(Some("Asia/Tokyo".to_string())), &store).await;

        assert!(
            outcome
                .description
                .unwrap()
                .contains("never configured in the first place")
        );
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_present_zone_persists() {
        let store = MemoryStore::new();
        dispatch_admin(TimeCommand::Add(Some("Europe/Berlin".to_string())), &store).await;
        dispatch_admin(TimeCommand::Add(Some("UTC".to_string())), &store).await;

        let outcome =
            dispatch_admin(TimeCommand::Remove(Some("Europe/Berlin".to_string())), &store).await;
        assert_eq!(outcome.title, "Success");

        let settings = store.load(guild()).await.unwrap();
        assert_eq!(settings.timezones, vec!["UTC"]);
    }

    #[tokio::test]
    async fn test_reset_clears_regardless_of_prior_state() {
        let store = MemoryStore::new();
        dispatch_admin(TimeCommand::Add(Some("Europe/Berlin".to_string())), &store).await;

        let outcome = dispatch_admin(TimeCommand::Reset, &store).await;
        assert_eq!(outcome.title, "Success");

        let settings = store.load(guild()).await.unwrap();
        assert!(settings.is_empty());

        // Resetting an already-empty guild is still a success
        let outcome = dispatch_admin(TimeCommand::Reset, &store).await;
        assert_eq!(outcome.title, "Success");
    }

    #[tokio::test]
    async fn test_permission_check_precedes_argument_validation() {
        let store = MemoryStore::new();

        // The invalid zone must not even be inspected without admin rights
        let outcome = dispatch(
            TimeCommand::Add(Some("Not/AZone".to_string())),
            guild(),
            false,
            &store,
            fixed_now(),
        )
        .await;

        assert_eq!(
            outcome.description.as_deref(),
            Some("You lack the necessary permissions")
        );
        assert_eq!(store.load_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_remove_or_reset() {
        let store = MemoryStore::new();

        for command in [
            TimeCommand::Remove(Some("UTC".to_string())),
            TimeCommand::Reset,
        ] {
            let outcome = dispatch(command, guild(), false, &store, fixed_now()).await;
            assert_eq!(outcome.title, "Error");
        }
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_help_and_unknown_never_touch_storage() {
        let store = MemoryStore::new();

        let help = dispatch_admin(TimeCommand::Help, &store).await;
        assert_eq!(help.title, "Commands available");

        let unknown = dispatch_admin(TimeCommand::Unknown, &store).await;
        assert_eq!(unknown.title, "Invalid command");

        assert_eq!(store.load_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_argument_returns_usage() {
        let store = MemoryStore::new();

        let outcome = dispatch_admin(TimeCommand::Add(None), &store).await;
        assert!(outcome.description.unwrap().contains("Usage"));

        let outcome = dispatch_admin(TimeCommand::Remove(None), &store).await;
        assert!(outcome.description.unwrap().contains("Usage"));

        assert_eq!(store.load_count(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_overview_empty_config() {
        let store = MemoryStore::new();
        let outcome = dispatch_admin(TimeCommand::Overview, &store).await;

        assert_eq!(outcome.title, "Timezone overview");
        assert_eq!(outcome.description.as_deref(), Some("No timezones configured!"));
        assert!(outcome.fields.is_empty());
    }

    #[tokio::test]
    async fn test_overview_lists_each_zone_with_time() {
        let store = MemoryStore::new();
        let mut settings = GuildSettings::default();
        settings.upsert_timezone("Europe/Berlin");
        settings.upsert_timezone("UTC");
        store.save(guild(), &settings).await.unwrap();

        let outcome = dispatch_admin(TimeCommand::Overview, &store).await;

        assert_eq!(
            outcome.fields,
            vec![
                ("Europe/Berlin".to_string(), "12:30pm CET".to_string(), true),
                ("UTC".to_string(), "11:30am UTC".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_overview_marks_unrenderable_stored_zone() {
        let store = MemoryStore::new();
        let settings = GuildSettings {
            timezones: vec!["Europe/Berlin".to_string(), "Not/AZone".to_string()],
        };
        store.save(guild(), &settings).await.unwrap();

        let outcome = dispatch_admin(TimeCommand::Overview, &store).await;

        assert_eq!(outcome.fields[1].0, "Not/AZone");
        assert_eq!(outcome.fields[1].1, "Invalid timezone");
    }

    #[tokio::test]
    async fn test_storage_failure_yields_error_payload() {
        let store = MemoryStore::new();
        store.set_failing(true);

        let outcome =
            dispatch_admin(TimeCommand::Add(Some("Europe/Berlin".to_string())), &store).await;

        assert_eq!(outcome.title, "Error");
        assert!(outcome.description.unwrap().contains("storage error"));
    }
}
