use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::queue::{Track, TrackId, TrackQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Disconnected,
    Idle,
    Playing,
    Paused,
}

/// Playback context of one guild.
///
/// `Playing` and `Paused` always carry a current track; `Idle` and
/// `Disconnected` never do. The transition methods are the only writers of
/// `state` and `current`, which keeps that pairing intact.
#[derive(Debug)]
pub struct Session {
    guild_id: GuildId,
    voice_channel_id: Option<ChannelId>,
    notify_channel_id: Option<ChannelId>,
    state: PlayerState,
    queue: TrackQueue,
    current: Option<Track>,
}

impl Session {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            voice_channel_id: None,
            notify_channel_id: None,
            state: PlayerState::Disconnected,
            queue: TrackQueue::new(),
            current: None,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn voice_channel_id(&self) -> Option<ChannelId> {
        self.voice_channel_id
    }

    pub fn notify_channel_id(&self) -> Option<ChannelId> {
        self.notify_channel_id
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut TrackQueue {
        &mut self.queue
    }

    pub fn is_connected(&self) -> bool {
        self.state != PlayerState::Disconnected
    }

    /// Playing or paused.
    pub fn has_track(&self) -> bool {
        matches!(self.state, PlayerState::Playing | PlayerState::Paused)
    }

    pub fn is_current(&self, id: TrackId) -> bool {
        self.current.as_ref().is_some_and(|track| track.id() == id)
    }

    pub(crate) fn connect(&mut self, voice_channel_id: ChannelId, notify_channel_id: ChannelId) {
        self.voice_channel_id = Some(voice_channel_id);
        self.notify_channel_id = Some(notify_channel_id);
        self.current = None;
        self.state = PlayerState::Idle;
    }

    pub(crate) fn disconnect(&mut self) {
        self.voice_channel_id = None;
        self.current = None;
        self.queue.clear();
        self.state = PlayerState::Disconnected;
    }

    pub(crate) fn start_track(&mut self, track: Track) {
        debug_assert!(self.is_connected(), "starting a track on a disconnected session");
        self.current = Some(track);
        self.state = PlayerState::Playing;
    }

    pub(crate) fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.state = PlayerState::Paused;
        }
    }

    pub(crate) fn resume(&mut self) {
        if self.state == PlayerState::Paused {
            self.state = PlayerState::Playing;
        }
    }

    /// Drops the current track and returns to `Idle`.
    pub(crate) fn finish_track(&mut self) -> Option<Track> {
        let finished = self.current.take();
        if self.is_connected() {
            self.state = PlayerState::Idle;
        }
        finished
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Guild → session map. Each entry's mutex serialises work on that guild.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> SessionHandle {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(guild_id))))
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
