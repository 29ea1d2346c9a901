//! # Audio Module
//!
//! Per-guild playback orchestration for Pixie.
//!
//! ## Architecture
//!
//! ### [`queue`] - Track Queue
//! - FIFO of pending tracks, one per session
//! - Tracks carry an identity so late backend events can be recognised
//!
//! ### [`idle`] - Idle Disconnect
//! - One cancellable countdown per voice channel
//! - Cancel and expiry race on a single map entry; exactly one wins
//!
//! ### [`session`] - Sessions
//! - `Disconnected → Idle → Playing ⇄ Paused`
//! - Registry of guild sessions, each behind its own async mutex
//!
//! ### [`player`] and [`events`] - Orchestrator
//! - Guard-checked commands (join, leave, play, pause, resume, stop, skip, queue)
//! - Backend lifecycle events fanned out into ordered per-guild lanes
//!
//! ### [`songbird_backend`] - Playback Backend
//! - Songbird driver + yt-dlp inputs behind [`backend::PlaybackBackend`]
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pixie_bot::audio::player::{MusicPlayer, PlayerSettings};
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(
//! #     backend: std::sync::Arc<dyn pixie_bot::audio::backend::PlaybackBackend>,
//! #     platform: std::sync::Arc<dyn pixie_bot::audio::backend::ChatPlatform>,
//! # ) {
//! let player = MusicPlayer::start(backend, platform, PlayerSettings::default());
//! let guild_id = GuildId::new(123456789);
//!
//! player.join(guild_id, Some(ChannelId::new(1)), ChannelId::new(2)).await;
//! let outcome = player.play(guild_id, "https://example.com/song.mp3").await;
//! println!("{}", outcome.message);
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod events;
pub mod idle;
pub mod player;
pub mod queue;
pub mod session;
pub mod songbird_backend;

#[cfg(test)]
pub(crate) mod testing;
