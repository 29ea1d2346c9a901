use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use songbird::{
    events::CoreEvent,
    input::{AuxMetadata, Compose, Input, YoutubeDl},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    sync::{Arc, Weak},
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::audio::{
    backend::{EndReason, NodeStats, PlaybackBackend, PlaybackEvent, SearchOutcome},
    queue::{Track, TrackId},
};

const STATS_INTERVAL: Duration = Duration::from_secs(300);

struct NowPlaying {
    track_id: TrackId,
    handle: TrackHandle,
}

/// Playback through the Songbird driver, resolving sources with yt-dlp.
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    search_results: usize,
    playing: Arc<DashMap<GuildId, NowPlaying>>,
    wired: DashMap<GuildId, Weak<Mutex<Call>>>,
    started: parking_lot::Mutex<Option<Instant>>,
    events: flume::Sender<PlaybackEvent>,
    receiver: flume::Receiver<PlaybackEvent>,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, search_results: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Could not build HTTP client")?;
        let (events, receiver) = flume::unbounded();

        Ok(Self {
            manager,
            http,
            search_results: search_results.max(1),
            playing: Arc::new(DashMap::new()),
            wired: DashMap::new(),
            started: parking_lot::Mutex::new(None),
            events,
            receiver,
        })
    }

    /// Registers the disconnect listener once per voice connection.
    async fn wire_call(&self, guild_id: GuildId, call: &Arc<Mutex<Call>>) {
        let current = Arc::downgrade(call);
        let known = self
            .wired
            .get(&guild_id)
            .is_some_and(|wired| wired.ptr_eq(&current));
        if known {
            return;
        }

        self.wired.insert(guild_id, current);
        call.lock().await.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectNotifier {
                guild_id,
                events: self.events.clone(),
            },
        );
    }

    fn spawn_stats_reporter(&self, started: Instant) {
        let playing = Arc::clone(&self.playing);
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            loop {
                interval.tick().await;
                let stats = NodeStats {
                    uptime: started.elapsed(),
                    active_players: playing.len(),
                };
                if events.send(PlaybackEvent::StatsReceived(stats)).is_err() {
                    break;
                }
            }
        });
    }
}

/// Checks that yt-dlp is installed, returning its version.
pub async fn verify_ytdlp() -> Result<String> {
    let output = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await
        .context("yt-dlp is not installed")?;

    if !output.status.success() {
        bail!("yt-dlp exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn is_web_url(query: &str) -> bool {
    Url::parse(query)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn track_from_metadata(metadata: AuxMetadata, fallback_url: Option<&str>) -> Option<Track> {
    let source = metadata
        .source_url
        .or_else(|| fallback_url.map(str::to_string))?;
    let title = metadata.title.unwrap_or_else(|| source.clone());

    let track = Track::new(title, source);
    Some(match metadata.duration {
        Some(duration) => track.with_duration(duration),
        None => track,
    })
}

#[async_trait]
impl PlaybackBackend for SongbirdBackend {
    fn subscribe(&self) -> flume::Receiver<PlaybackEvent> {
        self.receiver.clone()
    }

    async fn connect(&self) -> Result<()> {
        let version = verify_ytdlp().await?;
        info!("🎼 Using yt-dlp {}", version);

        let mut started = self.started.lock();
        if started.is_none() {
            let now = Instant::now();
            *started = Some(now);
            self.spawn_stats_reporter(now);
        }
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<SearchOutcome> {
        if is_web_url(query) {
            let mut source = YoutubeDl::new(self.http.clone(), query.to_string());
            return Ok(match source.aux_metadata().await {
                Ok(metadata) => match track_from_metadata(metadata, Some(query)) {
                    Some(track) => SearchOutcome::Tracks {
                        playlist: None,
                        tracks: vec![track],
                    },
                    None => SearchOutcome::NoMatches,
                },
                Err(e) => SearchOutcome::LoadFailed(e.to_string()),
            });
        }

        let mut source = YoutubeDl::new_search(self.http.clone(), query.to_string());
        match source.search(Some(self.search_results)).await {
            Ok(results) => {
                let tracks: Vec<Track> = results
                    .filter_map(|metadata| track_from_metadata(metadata, None))
                    .collect();
                debug!("🔍 `{}` resolved to {} tracks", query, tracks.len());
                if tracks.is_empty() {
                    Ok(SearchOutcome::NoMatches)
                } else {
                    Ok(SearchOutcome::Tracks {
                        playlist: None,
                        tracks,
                    })
                }
            }
            Err(e) => Ok(SearchOutcome::LoadFailed(e.to_string())),
        }
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<()> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or_else(|| anyhow!("No voice connection for guild {}", guild_id))?;
        self.wire_call(guild_id, &call).await;

        let input: Input = YoutubeDl::new(self.http.clone(), track.source_identifier.clone()).into();
        let handle = {
            let mut call = call.lock().await;
            let handle = call.play_only_input(input);
            self.playing.insert(
                guild_id,
                NowPlaying {
                    track_id: track.id(),
                    handle: handle.clone(),
                },
            );
            handle
        };

        for (event, kind) in [
            (TrackEvent::Play, NotifierKind::Started),
            (TrackEvent::End, NotifierKind::Ended),
            (TrackEvent::Error, NotifierKind::Errored),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackNotifier {
                        guild_id,
                        track: track.clone(),
                        kind,
                        playing: Arc::clone(&self.playing),
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| anyhow!("Could not register track events: {}", e))?;
        }

        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<()> {
        let now_playing = self
            .playing
            .get(&guild_id)
            .ok_or_else(|| anyhow!("Nothing playing in guild {}", guild_id))?;
        now_playing.handle.pause().context("Could not pause track")?;
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<()> {
        let now_playing = self
            .playing
            .get(&guild_id)
            .ok_or_else(|| anyhow!("Nothing playing in guild {}", guild_id))?;
        now_playing.handle.play().context("Could not resume track")?;
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<()> {
        if let Some((_, now_playing)) = self.playing.remove(&guild_id) {
            now_playing.handle.stop().context("Could not stop track")?;
        }
        Ok(())
    }

    async fn forget(&self, guild_id: GuildId) {
        if let Some((_, now_playing)) = self.playing.remove(&guild_id) {
            let _ = now_playing.handle.stop();
        }
        self.wired.remove(&guild_id);
        debug!("🗑️ Released playback state for guild {}", guild_id);
    }
}

#[derive(Debug, Clone, Copy)]
enum NotifierKind {
    Started,
    Ended,
    Errored,
}

/// Translates songbird track events into [`PlaybackEvent`]s.
struct TrackNotifier {
    guild_id: GuildId,
    track: Track,
    kind: NotifierKind,
    playing: Arc<DashMap<GuildId, NowPlaying>>,
    events: flume::Sender<PlaybackEvent>,
}

impl TrackNotifier {
    /// Forgets this track if it is still the guild's current one.
    fn release(&self) -> bool {
        self.playing
            .remove_if(&self.guild_id, |_, now_playing| {
                now_playing.track_id == self.track.id()
            })
            .is_some()
    }

    fn emit(&self, event: PlaybackEvent) {
        if self.events.send(event).is_err() {
            warn!("Playback event for guild {} dropped, no subscriber", self.guild_id);
        }
    }
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match self.kind {
            NotifierKind::Started => self.emit(PlaybackEvent::TrackStarted {
                guild_id: self.guild_id,
                track: self.track.clone(),
            }),
            NotifierKind::Ended => {
                let reason = if self.release() {
                    EndReason::Finished
                } else if self.playing.contains_key(&self.guild_id) {
                    EndReason::Replaced
                } else {
                    EndReason::Stopped
                };
                self.emit(PlaybackEvent::TrackEnded {
                    guild_id: self.guild_id,
                    track: self.track.clone(),
                    reason,
                });
            }
            NotifierKind::Errored => {
                self.release();
                let message = match ctx {
                    EventContext::Track(states) => states
                        .iter()
                        .map(|(state, _)| format!("{:?}", state.playing))
                        .collect::<Vec<_>>()
                        .join(", "),
                    _ => "unknown playback error".to_string(),
                };
                self.emit(PlaybackEvent::TrackException {
                    guild_id: self.guild_id,
                    track: self.track.clone(),
                    message,
                });
                self.emit(PlaybackEvent::TrackEnded {
                    guild_id: self.guild_id,
                    track: self.track.clone(),
                    reason: EndReason::LoadFailed,
                });
            }
        }

        None
    }
}

struct DisconnectNotifier {
    guild_id: GuildId,
    events: flume::Sender<PlaybackEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            let reason = data
                .reason
                .as_ref()
                .map(|reason| format!("{:?}", reason))
                .unwrap_or_else(|| "requested".to_string());
            let _ = self.events.send(PlaybackEvent::ConnectionClosed {
                guild_id: self.guild_id,
                reason,
            });
        }

        None
    }
}
