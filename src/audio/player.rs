use dashmap::DashMap;
use serenity::model::{
    id::{ChannelId, GuildId},
    mention::Mentionable,
};
use std::{
    fmt::Write as _,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::audio::{
    backend::{ChatPlatform, PlaybackBackend, PlaybackEvent, SearchOutcome},
    error::{CommandError, CommandOutcome},
    events,
    idle::IdleDisconnect,
    queue::Track,
    session::{PlayerState, Session, SessionRegistry},
};

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// How long an idle session stays in voice before leaving.
    pub idle_timeout: Duration,
    /// Redeliveries allowed for a track that keeps failing.
    pub max_track_retries: u8,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(120),
            max_track_retries: 3,
        }
    }
}

/// Per-guild playback orchestrator.
///
/// Commands and backend events for the same guild are serialised on that
/// guild's session lock; different guilds never wait on each other.
pub struct MusicPlayer {
    pub(super) me: Weak<MusicPlayer>,
    pub(super) sessions: SessionRegistry,
    pub(super) idle: IdleDisconnect,
    /// Ordered event lanes, one per guild seen on the backend stream.
    pub(super) lanes: DashMap<GuildId, flume::Sender<PlaybackEvent>>,
    pub(super) backend: Arc<dyn PlaybackBackend>,
    pub(super) platform: Arc<dyn ChatPlatform>,
    pub(super) settings: PlayerSettings,
}

impl MusicPlayer {
    /// Builds the player and subscribes it to `backend`'s event stream.
    pub fn start(
        backend: Arc<dyn PlaybackBackend>,
        platform: Arc<dyn ChatPlatform>,
        settings: PlayerSettings,
    ) -> Arc<Self> {
        let events = backend.subscribe();
        let player = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            sessions: SessionRegistry::new(),
            idle: IdleDisconnect::new(),
            lanes: DashMap::new(),
            backend,
            platform,
            settings,
        });

        events::spawn_router(Arc::downgrade(&player), events);
        info!(
            "🎶 Music player ready (idle timeout {}, {} retries per track)",
            format_duration(player.settings.idle_timeout),
            player.settings.max_track_retries
        );
        player
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn is_idle_timer_armed(&self, voice_channel_id: ChannelId) -> bool {
        self.idle.is_armed(voice_channel_id)
    }

    /// Platform client is ready: bring the audio backend up.
    pub async fn on_client_ready(&self) {
        match self.backend.connect().await {
            Ok(()) => info!("🎼 Connected to audio service"),
            Err(e) => error!("❌ Could not connect to audio service: {:?}", e),
        }
    }

    /// Drops all state for a guild the bot no longer belongs to.
    pub async fn forget(&self, guild_id: GuildId) {
        self.lanes.remove(&guild_id);
        self.backend.forget(guild_id).await;
        let Some(handle) = self.sessions.remove(guild_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if let Some(voice) = session.voice_channel_id() {
            self.idle.cancel(voice);
        }
        session.disconnect();
        info!("🗑️ Forgot session for guild {}", guild_id);
    }

    pub async fn join(
        &self,
        guild_id: GuildId,
        user_voice_channel: Option<ChannelId>,
        notify_channel_id: ChannelId,
    ) -> CommandOutcome {
        self.try_join(guild_id, user_voice_channel, notify_channel_id)
            .await
            .into()
    }

    pub async fn leave(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_leave(guild_id).await.into()
    }

    pub async fn play(&self, guild_id: GuildId, query: &str) -> CommandOutcome {
        self.try_play(guild_id, query).await.into()
    }

    pub async fn pause(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_pause(guild_id).await.into()
    }

    pub async fn resume(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_resume(guild_id).await.into()
    }

    pub async fn stop(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_stop(guild_id).await.into()
    }

    pub async fn skip(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_skip(guild_id).await.into()
    }

    pub async fn queue(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_queue(guild_id).await.into()
    }

    pub async fn clear_queue(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_clear_queue(guild_id).await.into()
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> CommandOutcome {
        self.try_now_playing(guild_id).await.into()
    }

    async fn try_join(
        &self,
        guild_id: GuildId,
        user_voice_channel: Option<ChannelId>,
        notify_channel_id: ChannelId,
    ) -> Result<String, CommandError> {
        let mut session = self.sessions.get_or_create(guild_id).lock_owned().await;
        if session.is_connected() {
            return Err(CommandError::AlreadyConnected);
        }
        let voice = user_voice_channel.ok_or(CommandError::UserNotInVoice)?;

        if let Err(e) = self.platform.join(guild_id, voice).await {
            error!("Failed to join voice channel {}: {:?}", voice, e);
            return Err(CommandError::Backend("join voice channel"));
        }

        self.idle.cancel(voice);
        session.connect(voice, notify_channel_id);
        info!("🔊 Joined voice channel {} in guild {}", voice, guild_id);
        Ok(format!("Joined {}!", voice.mention()))
    }

    async fn try_leave(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let mut session = self.lock_connected(guild_id).await?;
        let voice = session
            .voice_channel_id()
            .ok_or(CommandError::NotConnected)?;

        if let Err(e) = self.platform.leave(guild_id, voice).await {
            error!("Failed to leave voice channel {}: {:?}", voice, e);
            return Err(CommandError::Backend("leave voice channel"));
        }
        if session.has_track() {
            if let Err(e) = self.backend.stop(guild_id).await {
                warn!("Backend did not stop after leaving guild {}: {:?}", guild_id, e);
            }
        }

        self.idle.cancel(voice);
        session.disconnect();
        info!("👋 Left voice channel {} in guild {}", voice, guild_id);
        Ok(format!("I've left {}!", voice.mention()))
    }

    async fn try_play(&self, guild_id: GuildId, query: &str) -> Result<String, CommandError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CommandError::EmptyQuery);
        }
        drop(self.lock_connected(guild_id).await?);

        let (playlist, tracks) = match self.backend.search(query).await {
            Ok(SearchOutcome::Tracks { playlist, tracks }) if !tracks.is_empty() => {
                (playlist, tracks)
            }
            Ok(SearchOutcome::LoadFailed(reason)) => {
                warn!("Loading `{}` failed: {}", query, reason);
                return Err(CommandError::NoMatches(query.to_string()));
            }
            Ok(_) => return Err(CommandError::NoMatches(query.to_string())),
            Err(e) => {
                error!("Search for `{}` failed: {:?}", query, e);
                return Err(CommandError::NoMatches(query.to_string()));
            }
        };

        // The search ran unlocked; the session may have left meanwhile.
        let mut session = self.lock_connected(guild_id).await?;
        let previous_len = session.queue().len();
        let reply = match playlist {
            Some(name) => {
                let added = session.queue_mut().enqueue_many(tracks);
                format!("Enqueued {} songs from {}.", added, name)
            }
            None if tracks.len() > 1 => {
                let added = session.queue_mut().enqueue_many(tracks);
                format!("Enqueued {} songs.", added)
            }
            None => match tracks.into_iter().next() {
                Some(track) => {
                    let reply = format!("Enqueued {}", track.title);
                    session.queue_mut().enqueue_one(track);
                    reply
                }
                None => return Err(CommandError::NoMatches(query.to_string())),
            },
        };

        if session.has_track() {
            return Ok(reply);
        }

        let Some(track) = session.queue_mut().dequeue_next() else {
            return Ok(reply);
        };
        match self.backend.play(guild_id, &track).await {
            Ok(()) => {
                if let Some(voice) = session.voice_channel_id() {
                    if self.idle.cancel(voice) {
                        self.notify(&session, "Auto disconnect has been cancelled!")
                            .await;
                    }
                }
                info!("🎵 Now playing {} in guild {}", track.title, guild_id);
                session.start_track(track);
                Ok(reply)
            }
            Err(e) => {
                error!("Failed to play {}: {:?}", track.title, e);
                session.queue_mut().push_front(track);
                session.queue_mut().truncate(previous_len);
                Err(CommandError::Backend("play song"))
            }
        }
    }

    async fn try_pause(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let mut session = self.lock_connected(guild_id).await?;
        let title = match (session.state(), session.current_track()) {
            (PlayerState::Playing, Some(track)) => track.title.clone(),
            _ => return Err(CommandError::NotPlaying),
        };

        if let Err(e) = self.backend.pause(guild_id).await {
            error!("Failed to pause track: {:?}", e);
            return Err(CommandError::Backend("pause track"));
        }
        session.pause();
        Ok(format!("Paused: {}", title))
    }

    async fn try_resume(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let mut session = self.lock_connected(guild_id).await?;
        let title = match (session.state(), session.current_track()) {
            (PlayerState::Paused, Some(track)) => track.title.clone(),
            _ => return Err(CommandError::NotPaused),
        };

        if let Err(e) = self.backend.resume(guild_id).await {
            error!("Failed to resume track: {:?}", e);
            return Err(CommandError::Backend("resume track"));
        }
        session.resume();
        Ok(format!("Resumed: {}", title))
    }

    async fn try_stop(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let mut session = self.lock_connected(guild_id).await?;
        if !session.has_track() {
            return Err(CommandError::NothingPlaying);
        }

        if let Err(e) = self.backend.stop(guild_id).await {
            error!("Failed to stop track: {:?}", e);
            return Err(CommandError::Backend("stop track"));
        }
        let dropped = session.queue_mut().clear();
        session.finish_track();
        debug!("⏹️ Stopped guild {} and dropped {} queued tracks", guild_id, dropped);
        Ok("No longer playing anything.".to_string())
    }

    async fn try_skip(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let mut session = self.lock_connected(guild_id).await?;
        let skipped = match session.current_track() {
            Some(track) if session.has_track() => track.title.clone(),
            _ => return Err(CommandError::NothingPlaying),
        };

        match session.queue_mut().dequeue_next() {
            Some(next) => {
                if let Err(e) = self.backend.play(guild_id, &next).await {
                    error!("Failed to skip to {}: {:?}", next.title, e);
                    session.queue_mut().push_front(next);
                    return Err(CommandError::Backend("skip track"));
                }
                let reply = format!("Skipped: {}\nNow Playing: {}", skipped, next.title);
                session.start_track(next);
                Ok(reply)
            }
            None => {
                if let Err(e) = self.backend.stop(guild_id).await {
                    error!("Failed to skip track: {:?}", e);
                    return Err(CommandError::Backend("skip track"));
                }
                session.finish_track();
                self.queue_exhausted(&session).await;
                Ok(format!("Skipped: {}\nThe queue is now empty.", skipped))
            }
        }
    }

    async fn try_queue(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let session = self.lock_connected(guild_id).await?;
        let queue = session.queue();
        if session.current_track().is_none() && queue.is_empty() {
            return Ok("There's nothing in queue to display".to_string());
        }

        let mut reply = String::new();
        if let Some(track) = session.current_track() {
            let _ = writeln!(reply, "Now Playing: {}", track.title);
        }
        for (position, track) in queue.list().enumerate() {
            let _ = match track.duration_hint {
                Some(duration) => writeln!(
                    reply,
                    "{}. {} ({})",
                    position + 1,
                    track.title,
                    format_duration(duration)
                ),
                None => writeln!(reply, "{}. {}", position + 1, track.title),
            };
        }
        if !queue.is_empty() {
            let _ = write!(
                reply,
                "{} queued, {} total",
                queue.len(),
                format_duration(queue.total_duration())
            );
        }
        Ok(reply.trim_end().to_string())
    }

    async fn try_clear_queue(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let mut session = self.lock_connected(guild_id).await?;
        match session.queue_mut().clear() {
            0 => Ok("There's nothing in queue to clear".to_string()),
            removed => Ok(format!("Cleared {} tracks from the queue.", removed)),
        }
    }

    async fn try_now_playing(&self, guild_id: GuildId) -> Result<String, CommandError> {
        let session = self.lock_connected(guild_id).await?;
        let track = session
            .current_track()
            .ok_or(CommandError::NothingPlaying)?;

        let mut reply = format!("Now Playing: {}", track.title);
        if let Some(duration) = track.duration_hint {
            let _ = write!(reply, " [{}]", format_duration(duration));
        }
        if session.state() == PlayerState::Paused {
            reply.push_str(" (paused)");
        }
        Ok(reply)
    }

    async fn lock_connected(
        &self,
        guild_id: GuildId,
    ) -> Result<OwnedMutexGuard<Session>, CommandError> {
        let handle = self
            .sessions
            .get(guild_id)
            .ok_or(CommandError::NotConnected)?;
        let session = handle.lock_owned().await;
        if !session.is_connected() {
            return Err(CommandError::NotConnected);
        }
        Ok(session)
    }

    /// Starts the next playable track, or idles once the queue runs dry.
    pub(super) async fn advance(&self, session: &mut Session) {
        let guild_id = session.guild_id();
        while let Some(next) = session.queue_mut().dequeue_next() {
            match self.backend.play(guild_id, &next).await {
                Ok(()) => {
                    info!("🎵 Now playing {} in guild {}", next.title, guild_id);
                    session.start_track(next);
                    return;
                }
                Err(e) => {
                    error!("Failed to load {}: {:?}", next.title, e);
                    self.requeue_failed(session, &next, "failing to load").await;
                }
            }
        }

        session.finish_track();
        self.queue_exhausted(session).await;
    }

    /// Puts a failed track back at the tail unless it ran out of retries.
    pub(super) async fn requeue_failed(&self, session: &mut Session, track: &Track, cause: &str) {
        let retry = track.retry();
        if retry.failures() > self.settings.max_track_retries {
            warn!(
                "🚫 Dropping {} after {} failed attempts",
                track.title,
                retry.failures()
            );
            let message = format!(
                "{} failed {} times and was removed from the queue.",
                track.title,
                retry.failures()
            );
            self.notify(session, &message).await;
            return;
        }

        session.queue_mut().enqueue_one(retry);
        let message = format!("{} has been re-added to queue after {}.", track.title, cause);
        self.notify(session, &message).await;
    }

    async fn queue_exhausted(&self, session: &Session) {
        let Some(voice) = session.voice_channel_id() else {
            return;
        };
        self.notify(session, "Queue completed! Please add more tracks to rock n' roll!")
            .await;

        self.arm_idle_timer(session.guild_id(), voice);
        let message = format!(
            "Auto disconnect initiated! Disconnecting in {}...",
            format_duration(self.settings.idle_timeout)
        );
        self.notify(session, &message).await;
    }

    fn arm_idle_timer(&self, guild_id: GuildId, voice: ChannelId) {
        let me = self.me.clone();
        self.idle
            .arm(voice, self.settings.idle_timeout, move || async move {
                if let Some(player) = me.upgrade() {
                    player.expire_idle(guild_id, voice).await;
                }
            });
    }

    async fn expire_idle(&self, guild_id: GuildId, voice: ChannelId) {
        let Some(handle) = self.sessions.get(guild_id) else {
            return;
        };
        let mut session = handle.lock().await;
        if session.state() != PlayerState::Idle || session.voice_channel_id() != Some(voice) {
            debug!("Idle timer for {} expired on a busy session, ignoring", voice);
            return;
        }

        if let Err(e) = self.platform.leave(guild_id, voice).await {
            error!(
                "❌ Auto disconnect from {} failed, retrying in {}: {:?}",
                voice,
                format_duration(self.settings.idle_timeout),
                e
            );
            self.arm_idle_timer(guild_id, voice);
            return;
        }
        session.disconnect();
        info!("👋 Auto-disconnected from {} in guild {}", voice, guild_id);
        self.notify(&session, "Invite me again sometime, sugar.").await;
    }

    pub(super) async fn notify(&self, session: &Session, message: &str) {
        let Some(channel) = session.notify_channel_id() else {
            return;
        };
        if let Err(e) = self.platform.notify(channel, message).await {
            warn!("Could not send notification to {}: {:?}", channel, e);
        }
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}
