use thiserror::Error;

/// Error types for bot operations
///
/// Every variant is recovered at the boundary of the unit of work that
/// produced it: a refresh tick, a command invocation, or a session of the
/// connection supervisor. None of them terminate the process.
#[derive(Debug, Error)]
pub enum BotError {
    /// A user-supplied or stored timezone id could not be resolved
    #[error("{0} is not a valid timezone")]
    InvalidZone(String),

    /// A read or write against the settings store failed
    #[error("storage operation failed: {0}")]
    Storage(#[from] sqlx::Error),

    /// Updating the bot's displayed nickname was rejected
    #[error("failed to update display name: {0}")]
    PresenceUpdate(#[source] serenity::Error),

    /// Sending a chat response failed
    #[error("failed to send message: {0}")]
    MessageSend(#[source] serenity::Error),

    /// The gateway session could not be established or was lost
    #[error("connection failed: {0}")]
    Connection(#[source] serenity::Error),
}
