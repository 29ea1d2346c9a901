//! Boundaries of the orchestrator: the playback backend that streams audio and
//! the chat platform that owns voice connections and text channels.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;

use super::queue::Track;

/// Why the backend stopped a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
}

impl EndReason {
    /// Whether the next queued track should start.
    pub fn may_start_next(self) -> bool {
        matches!(self, EndReason::Finished | EndReason::LoadFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    pub uptime: Duration,
    pub active_players: usize,
}

#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    TrackStarted {
        guild_id: GuildId,
        track: Track,
    },
    TrackEnded {
        guild_id: GuildId,
        track: Track,
        reason: EndReason,
    },
    TrackException {
        guild_id: GuildId,
        track: Track,
        message: String,
    },
    TrackStuck {
        guild_id: GuildId,
        track: Track,
        threshold: Duration,
    },
    StatsReceived(NodeStats),
    ConnectionClosed {
        guild_id: GuildId,
        reason: String,
    },
}

impl PlaybackEvent {
    /// Guild the event belongs to; stats are node-wide.
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            PlaybackEvent::TrackStarted { guild_id, .. }
            | PlaybackEvent::TrackEnded { guild_id, .. }
            | PlaybackEvent::TrackException { guild_id, .. }
            | PlaybackEvent::TrackStuck { guild_id, .. }
            | PlaybackEvent::ConnectionClosed { guild_id, .. } => Some(*guild_id),
            PlaybackEvent::StatsReceived(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Tracks {
        /// Set when the query resolved to a playlist.
        playlist: Option<String>,
        tracks: Vec<Track>,
    },
    NoMatches,
    LoadFailed(String),
}

#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    /// Event stream of this backend instance.
    fn subscribe(&self) -> flume::Receiver<PlaybackEvent>;

    async fn connect(&self) -> Result<()>;

    async fn search(&self, query: &str) -> Result<SearchOutcome>;

    /// Loads `track`, replacing whatever the guild was playing.
    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<()>;

    async fn pause(&self, guild_id: GuildId) -> Result<()>;

    async fn resume(&self, guild_id: GuildId) -> Result<()>;

    async fn stop(&self, guild_id: GuildId) -> Result<()>;

    /// Releases per-guild bookkeeping once the bot has left the guild.
    async fn forget(&self, guild_id: GuildId);
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;

    async fn leave(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;

    async fn notify(&self, channel_id: ChannelId, message: &str) -> Result<()>;
}
