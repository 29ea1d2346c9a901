use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::player::PlayerSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Playback
    pub idle_disconnect_secs: u64,
    pub max_track_retries: u8,

    // yt-dlp
    pub search_results: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            command_prefix: std::env::var("BOT_PREFIX").unwrap_or_else(|_| "!".to_string()),

            idle_disconnect_secs: std::env::var("IDLE_DISCONNECT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("IDLE_DISCONNECT_SECS must be a number of seconds")?,
            max_track_retries: std::env::var("MAX_TRACK_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("MAX_TRACK_RETRIES must be between 0 and 255")?,

            search_results: std::env::var("YTDLP_SEARCH_RESULTS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("YTDLP_SEARCH_RESULTS must be a positive number")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks that `load` alone cannot express.
    ///
    /// - The prefix must be non-empty, otherwise every message is a command
    /// - The idle timeout must be at least one second
    /// - Searches must return at least one result
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.idle_disconnect_secs == 0 {
            anyhow::bail!("Idle disconnect timeout must be greater than 0");
        }

        if self.search_results == 0 {
            anyhow::bail!("Search results must be greater than 0");
        }

        Ok(())
    }

    /// Token-free description for startup logs.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix `{}`\n  \
            Playback: {}s idle disconnect, {} retries per track\n  \
            Search: {} yt-dlp results",
            self.command_prefix,
            self.idle_disconnect_secs,
            self.max_track_retries,
            self.search_results,
        )
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            idle_timeout: Duration::from_secs(self.idle_disconnect_secs),
            max_track_retries: self.max_track_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // No default token, it must be provided
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            idle_disconnect_secs: 120,
            max_track_retries: 3,

            search_results: 1,
        }
    }
}
