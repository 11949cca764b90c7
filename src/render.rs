use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::BotError;

/// Parse an IANA timezone id
pub fn parse_zone(zone: &str) -> Result<Tz, BotError> {
    zone.parse()
        .map_err(|_| BotError::InvalidZone(zone.to_string()))
}

/// Render an instant in the given timezone as e.g. `4:05pm CET`
///
/// 12-hour clock with minutes, am/pm marker and the zone abbreviation,
/// which is what fits into a nickname next to the zone name.
pub fn render_zone(zone: &str, instant: DateTime<Utc>) -> Result<String, BotError> {
    let tz = parse_zone(zone)?;
    Ok(instant
        .with_timezone(&tz)
        .format("%-I:%M%P %Z")
        .to_string())
}
