//! In-memory collaborators for exercising the player without Discord.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::audio::{
    backend::{ChatPlatform, PlaybackBackend, PlaybackEvent, SearchOutcome},
    player::{MusicPlayer, PlayerSettings},
    queue::Track,
    session::PlayerState,
};

pub(crate) const GUILD: GuildId = GuildId::new(100);
pub(crate) const VOICE: ChannelId = ChannelId::new(200);
pub(crate) const TEXT: ChannelId = ChannelId::new(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendCall {
    Connect,
    Search(String),
    Play(GuildId, String),
    Pause(GuildId),
    Resume(GuildId),
    Stop(GuildId),
    Forget(GuildId),
}

pub(crate) struct FakeBackend {
    calls: Mutex<Vec<BackendCall>>,
    search: Mutex<SearchOutcome>,
    failing: Mutex<HashSet<&'static str>>,
    sender: flume::Sender<PlaybackEvent>,
    receiver: flume::Receiver<PlaybackEvent>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        let (sender, receiver) = flume::unbounded();
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            search: Mutex::new(SearchOutcome::NoMatches),
            failing: Mutex::new(HashSet::new()),
            sender,
            receiver,
        })
    }

    pub(crate) fn respond_with(&self, outcome: SearchOutcome) {
        *self.search.lock() = outcome;
    }

    /// Makes every later call of `operation` fail.
    pub(crate) fn fail(&self, operation: &'static str) {
        self.failing.lock().insert(operation);
    }

    pub(crate) fn emit(&self, event: PlaybackEvent) {
        let _ = self.sender.send(event);
    }

    pub(crate) fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Titles handed to `play`, in order.
    pub(crate) fn played(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Play(_, title) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall, operation: &'static str) -> Result<()> {
        if self.failing.lock().contains(operation) {
            bail!("{} unavailable", operation);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl PlaybackBackend for FakeBackend {
    fn subscribe(&self) -> flume::Receiver<PlaybackEvent> {
        self.receiver.clone()
    }

    async fn connect(&self) -> Result<()> {
        self.record(BackendCall::Connect, "connect")
    }

    async fn search(&self, query: &str) -> Result<SearchOutcome> {
        self.record(BackendCall::Search(query.to_string()), "search")?;
        Ok(self.search.lock().clone())
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<()> {
        // Yield so concurrent callers genuinely interleave.
        tokio::task::yield_now().await;
        self.record(BackendCall::Play(guild_id, track.title.clone()), "play")
    }

    async fn pause(&self, guild_id: GuildId) -> Result<()> {
        self.record(BackendCall::Pause(guild_id), "pause")
    }

    async fn resume(&self, guild_id: GuildId) -> Result<()> {
        self.record(BackendCall::Resume(guild_id), "resume")
    }

    async fn stop(&self, guild_id: GuildId) -> Result<()> {
        tokio::task::yield_now().await;
        self.record(BackendCall::Stop(guild_id), "stop")
    }

    async fn forget(&self, guild_id: GuildId) {
        self.calls.lock().push(BackendCall::Forget(guild_id));
    }
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    joins: Mutex<Vec<(GuildId, ChannelId)>>,
    leaves: Mutex<Vec<(GuildId, ChannelId)>>,
    notifications: Mutex<Vec<(ChannelId, String)>>,
    fail_joins: Mutex<bool>,
    fail_leaves: Mutex<bool>,
}

impl FakePlatform {
    pub(crate) fn fail_joins(&self) {
        *self.fail_joins.lock() = true;
    }

    pub(crate) fn fail_leaves(&self) {
        *self.fail_leaves.lock() = true;
    }

    pub(crate) fn allow_leaves(&self) {
        *self.fail_leaves.lock() = false;
    }

    pub(crate) fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.joins.lock().clone()
    }

    pub(crate) fn leaves(&self) -> Vec<(GuildId, ChannelId)> {
        self.leaves.lock().clone()
    }

    pub(crate) fn notifications(&self) -> Vec<(ChannelId, String)> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        if *self.fail_joins.lock() {
            bail!("missing Connect permission");
        }
        self.joins.lock().push((guild_id, channel_id));
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        if *self.fail_leaves.lock() {
            bail!("voice gateway unreachable");
        }
        self.leaves.lock().push((guild_id, channel_id));
        Ok(())
    }

    async fn notify(&self, channel_id: ChannelId, message: &str) -> Result<()> {
        self.notifications
            .lock()
            .push((channel_id, message.to_string()));
        Ok(())
    }
}

pub(crate) fn tracks(playlist: Option<&str>, titles: &[&str]) -> SearchOutcome {
    SearchOutcome::Tracks {
        playlist: playlist.map(str::to_string),
        tracks: titles
            .iter()
            .map(|title| Track::new(*title, format!("https://example.com/{title}")))
            .collect(),
    }
}

/// Lets spawned tasks run; with a paused clock this returns once they block.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[derive(Debug)]
pub(crate) struct Snapshot {
    pub state: PlayerState,
    pub current: Option<String>,
    pub queue: Vec<String>,
}

pub(crate) struct Harness {
    pub backend: Arc<FakeBackend>,
    pub platform: Arc<FakePlatform>,
    pub player: Arc<MusicPlayer>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_settings(PlayerSettings::default())
    }

    pub(crate) fn with_settings(settings: PlayerSettings) -> Self {
        let backend = FakeBackend::new();
        let platform = Arc::new(FakePlatform::default());
        let player = MusicPlayer::start(backend.clone(), platform.clone(), settings);
        Self {
            backend,
            platform,
            player,
        }
    }

    pub(crate) async fn joined() -> Self {
        let harness = Self::new();
        harness.player.join(GUILD, Some(VOICE), TEXT).await;
        harness
    }

    /// Joined and playing the first title with the rest queued.
    pub(crate) async fn playing(titles: &[&str]) -> Self {
        let harness = Self::joined().await;
        harness.backend.respond_with(tracks(Some("setlist"), titles));
        harness.player.play(GUILD, "setlist").await;
        harness
    }

    pub(crate) async fn current(&self) -> Track {
        let handle = self.player.sessions().get(GUILD).expect("session exists");
        let session = handle.lock().await;
        session.current_track().cloned().expect("a track is loaded")
    }

    pub(crate) async fn snapshot(&self) -> Snapshot {
        let handle = self.player.sessions().get_or_create(GUILD);
        let session = handle.lock().await;
        Snapshot {
            state: session.state(),
            current: session.current_track().map(|track| track.title.clone()),
            queue: session.queue().list().map(|track| track.title.clone()).collect(),
        }
    }
}
