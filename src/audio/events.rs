//! Backend event routing and the playback state machine.
//!
//! Events are fanned out into one ordered lane per guild, so a slow guild
//! never delays another while each guild still sees its events in emission
//! order.

use serenity::model::id::GuildId;
use std::sync::Weak;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{
    backend::{EndReason, PlaybackEvent},
    player::{format_duration, MusicPlayer},
    queue::Track,
};

pub(super) fn spawn_router(
    player: Weak<MusicPlayer>,
    events: flume::Receiver<PlaybackEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = events.recv_async().await {
            let Some(strong) = player.upgrade() else {
                break;
            };
            let Some(guild_id) = event.guild_id() else {
                strong.handle_event(event).await;
                continue;
            };

            let lane = strong
                .lanes
                .entry(guild_id)
                .or_insert_with(|| spawn_lane(player.clone(), guild_id))
                .clone();
            if lane.send(event).is_err() {
                debug!("Event lane for guild {} closed", guild_id);
                strong.lanes.remove(&guild_id);
            }
        }

        debug!("Backend event stream closed");
    })
}

fn spawn_lane(player: Weak<MusicPlayer>, guild_id: GuildId) -> flume::Sender<PlaybackEvent> {
    let (sender, receiver) = flume::unbounded();
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv_async().await {
            let Some(player) = player.upgrade() else {
                break;
            };
            player.handle_event(event).await;
        }
        debug!("Event lane for guild {} stopped", guild_id);
    });
    sender
}

impl MusicPlayer {
    pub(crate) async fn handle_event(&self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::TrackStarted { guild_id, track } => {
                self.on_track_started(guild_id, track).await
            }
            PlaybackEvent::TrackEnded {
                guild_id,
                track,
                reason,
            } => self.on_track_ended(guild_id, track, reason).await,
            PlaybackEvent::TrackException {
                guild_id,
                track,
                message,
            } => {
                error!(
                    "Track {} threw an exception in guild {}: {}",
                    track.title, guild_id, message
                );
                self.on_track_failed(guild_id, track, "throwing an exception")
                    .await
            }
            PlaybackEvent::TrackStuck {
                guild_id,
                track,
                threshold,
            } => {
                error!(
                    "Track {} got stuck for {}ms in guild {}",
                    track.title,
                    threshold.as_millis(),
                    guild_id
                );
                self.on_track_failed(guild_id, track, "getting stuck").await
            }
            PlaybackEvent::StatsReceived(stats) => info!(
                "📊 Audio service up for {}, {} active players",
                format_duration(stats.uptime),
                stats.active_players
            ),
            PlaybackEvent::ConnectionClosed { guild_id, reason } => warn!(
                "🔌 Voice connection closed in guild {}: {}",
                guild_id, reason
            ),
        }
    }

    async fn on_track_started(&self, guild_id: GuildId, track: Track) {
        let Some(handle) = self.sessions.get(guild_id) else {
            return;
        };
        let session = handle.lock().await;
        debug!("▶️ {} started in guild {}", track.title, guild_id);

        let Some(voice) = session.voice_channel_id() else {
            return;
        };
        if self.idle.cancel(voice) {
            self.notify(&session, "Auto disconnect has been cancelled!")
                .await;
        }
    }

    async fn on_track_ended(&self, guild_id: GuildId, track: Track, reason: EndReason) {
        let Some(handle) = self.sessions.get(guild_id) else {
            debug!("Dropping end of {} for unknown guild {}", track.title, guild_id);
            return;
        };
        let mut session = handle.lock().await;
        if !session.is_current(track.id()) {
            debug!(
                "Dropping stale end of {} ({}) in guild {}",
                track.title,
                track.id(),
                guild_id
            );
            return;
        }
        if !reason.may_start_next() {
            debug!("{} ended with {:?}, not advancing", track.title, reason);
            return;
        }

        self.advance(&mut session).await;
    }

    async fn on_track_failed(&self, guild_id: GuildId, track: Track, cause: &str) {
        let Some(handle) = self.sessions.get(guild_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if !session.is_current(track.id()) {
            debug!("Dropping failure of stale track {} ({})", track.title, track.id());
            return;
        }

        self.requeue_failed(&mut session, &track, cause).await;
    }
}
