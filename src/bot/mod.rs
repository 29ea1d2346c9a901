//! # Bot Module
//!
//! Discord glue for Pixie.
//!
//! [`PixieBot`] implements Serenity's [`EventHandler`]: it reads prefix
//! commands from guild messages, looks up the author's voice channel in the
//! cache, forwards the command to the shared [`MusicPlayer`] and replies with
//! the outcome. [`platform::DiscordPlatform`] is the reverse direction, the
//! player's handle on voice connections and text channels.

use serenity::{
    all::{ChannelId, Context, EventHandler, Guild, Message, Ready, UnavailableGuild},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod platform;

use crate::audio::player::MusicPlayer;
use commands::{Command, Invocation};

pub struct PixieBot {
    player: Arc<MusicPlayer>,
    prefix: String,
}

impl PixieBot {
    pub fn new(player: Arc<MusicPlayer>, prefix: impl Into<String>) -> Self {
        Self {
            player,
            prefix: prefix.into(),
        }
    }

    /// Voice channel the author currently sits in, from the gateway cache.
    fn author_voice_channel(ctx: &Context, msg: &Message) -> Option<ChannelId> {
        let guild = msg.guild(&ctx.cache)?;
        guild
            .voice_states
            .get(&msg.author.id)
            .and_then(|state| state.channel_id)
    }
}

#[async_trait]
impl EventHandler for PixieBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        self.player.on_client_ready().await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(command) = Command::parse(&self.prefix, &msg.content) else {
            return;
        };

        debug!(
            "⌨️ {} from {} in guild {}",
            command.name(),
            msg.author.name,
            guild_id
        );

        let invocation = Invocation {
            guild_id,
            text_channel_id: msg.channel_id,
            author_voice_channel: Self::author_voice_channel(&ctx, &msg),
        };
        let outcome = commands::execute(&self.player, command, invocation).await;

        if let Err(e) = msg.reply(&ctx.http, &outcome.message).await {
            error!("Could not reply in channel {}: {:?}", msg.channel_id, e);
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Outages mark guilds unavailable; only a real removal drops the session.
        if incomplete.unavailable {
            return;
        }
        self.player.forget(incomplete.id).await;
    }
}
