use serenity::model::id::GuildId;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

/// Database connection pool wrapper
///
/// Holds the per-guild timezone configuration. One row per guild; a guild
/// without a row is simply unconfigured.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection and run migrations
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Database connected and migrations completed");
        Ok(db)
    }

    /// Run database migrations to create tables
    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_settings (
                guild_id BIGINT PRIMARY KEY,
                timezones TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMP NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the stored timezone list for a guild, if a row exists
    pub async fn get_guild_timezones(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<Vec<String>>, sqlx::Error> {
        let result: Option<(Vec<String>,)> =
            sqlx::query_as("SELECT timezones FROM guild_settings WHERE guild_id = $1")
                .bind(guild_id.get() as i64)
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.map(|(timezones,)| timezones))
    }

    /// Replace the stored timezone list for a guild
    pub async fn set_guild_timezones(
        &self,
        guild_id: GuildId,
        timezones: &[String],
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, timezones, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (guild_id)
            DO UPDATE SET timezones = $2, updated_at = NOW()
            "#,
        )
        .bind(guild_id.get() as i64)
        .bind(timezones)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
