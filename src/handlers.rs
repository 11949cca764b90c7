use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serenity::gateway::{ConnectionStage, ShardStageUpdateEvent};
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::Ready;
use serenity::model::guild::{Guild, UnavailableGuild};
use serenity::model::id::GuildId;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, error, info, warn};

use crate::commands::{self, CommandOutcome, TimeCommand};
use crate::db::Database;
use crate::error::BotError;
use crate::ratelimit::RateLimiter;
use crate::refresh::RefreshRegistry;

/// Gateway event handler
///
/// Routes guild lifecycle events into the refresh registry and inbound
/// messages into the command router. Owns the overview rate limiter.
pub struct Handler {
    registry: Arc<RefreshRegistry>,
    store: Arc<Database>,
    limiter: RateLimiter,
}

impl Handler {
    pub fn new(registry: Arc<RefreshRegistry>, store: Arc<Database>, limiter: RateLimiter) -> Self {
        Self {
            registry,
            store,
            limiter,
        }
    }

    /// Handle one inbound message end to end
    async fn handle_message(&self, ctx: &Context, msg: &Message) {
        if msg.author.bot {
            return;
        }

        let Some(command) = commands::parse(&msg.content) else {
            return;
        };

        let Some(guild_id) = msg.guild_id else {
            return;
        };

        if !is_text_channel(ctx, guild_id, msg) {
            return;
        }

        // The author's membership carries the permission set; a message we
        // cannot attribute to a member is dropped without a response.
        let member = match guild_id.member(ctx, msg.author.id).await {
            Ok(member) => member,
            Err(e) => {
                info!("Ignoring message without resolvable membership: {}", e);
                return;
            }
        };

        let is_admin = match ctx.cache.guild(guild_id) {
            Some(guild) => guild.member_permissions(&member).administrator(),
            None => false,
        };

        if matches!(command, TimeCommand::Overview) && !self.limiter.check(guild_id) {
            debug!("Throttled overview request in guild {}", guild_id);
            return;
        }

        let outcome =
            commands::dispatch(command, guild_id, is_admin, self.store.as_ref(), Utc::now()).await;

        self.send_outcome(ctx, msg, outcome).await;
    }

    /// Send the command response; a failed send is logged and swallowed
    async fn send_outcome(&self, ctx: &Context, msg: &Message, outcome: CommandOutcome) {
        let mut embed = serenity::builder::CreateEmbed::new().title(outcome.title);
        if let Some(description) = outcome.description {
            embed = embed.description(description);
        }
        if !outcome.fields.is_empty() {
            embed = embed.fields(outcome.fields);
        }

        let message = serenity::builder::CreateMessage::new().embed(embed);
        if let Err(e) = msg.channel_id.send_message(&ctx.http, message).await {
            error!("{}", BotError::MessageSend(e));
        }
    }
}

/// Whether the message arrived in an ordinary guild text channel
fn is_text_channel(ctx: &Context, guild_id: GuildId, msg: &Message) -> bool {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| {
            guild
                .channels
                .get(&msg.channel_id)
                .map(|channel| channel.kind == ChannelType::Text)
        })
        .unwrap_or(false)
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Connected as {}", ready.user.name);

        let guild_ids: Vec<GuildId> = ready.guilds.iter().map(|guild| guild.id).collect();
        self.registry.start_all(guild_ids).await;
    }

    async fn resume(&self, ctx: Context, _event: serenity::model::event::ResumedEvent) {
        // Tasks were torn down when the connection dropped; the resumed
        // session re-learns its guild set from the cache
        info!("Gateway session resumed");
        self.registry.start_all(ctx.cache.guilds()).await;
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        self.registry.start(guild.id).await;
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        self.registry.stop(incomplete.id).await;
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        // Any stage away from Connected means nickname updates would fire
        // against a dead session; stop everything until ready/resume
        if event.new != ConnectionStage::Connected {
            warn!("Shard {} moved to stage {:?}", event.shard_id, event.new);
            self.registry.stop_all().await;
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        self.handle_message(&ctx, &msg).await;
    }
}
