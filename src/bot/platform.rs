use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::info;

use crate::audio::backend::ChatPlatform;

/// Discord side of the orchestrator: voice connections through Songbird,
/// status text through the REST client.
pub struct DiscordPlatform {
    http: Arc<Http>,
    songbird: Arc<Songbird>,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, songbird: Arc<Songbird>) -> Self {
        Self { http, songbird }
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .with_context(|| format!("Could not join voice channel {}", channel_id))?;

        info!("🔊 Connected to voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.songbird
            .remove(guild_id)
            .await
            .with_context(|| format!("Could not leave voice channel {}", channel_id))?;

        info!("👋 Left voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn notify(&self, channel_id: ChannelId, message: &str) -> Result<()> {
        channel_id
            .say(&self.http, message)
            .await
            .with_context(|| format!("Could not send message to {}", channel_id))?;
        Ok(())
    }
}
