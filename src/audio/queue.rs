use std::{
    collections::VecDeque,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a loaded track.
///
/// Two tracks with the same title and source are still different tracks; the
/// event router relies on this to recognise late or duplicated backend events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    pub title: String,
    /// URL or backend-resolved identifier handed back to the backend on play.
    pub source_identifier: String,
    pub duration_hint: Option<Duration>,
    failures: u8,
}

impl Track {
    pub fn new(title: impl Into<String>, source_identifier: impl Into<String>) -> Self {
        Self {
            id: TrackId::next(),
            title: title.into(),
            source_identifier: source_identifier.into(),
            duration_hint: None,
            failures: 0,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_hint = Some(duration);
        self
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// How many times this track already failed during playback.
    pub fn failures(&self) -> u8 {
        self.failures
    }

    /// Copy of this track for redelivery after a failed attempt.
    pub(crate) fn retry(&self) -> Self {
        Self {
            id: TrackId::next(),
            failures: self.failures.saturating_add(1),
            ..self.clone()
        }
    }
}

/// FIFO of pending tracks for one session.
///
/// Not synchronised: the owning session's lock guards it.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_one(&mut self, track: Track) {
        debug!("➕ Enqueued: {}", track.title);
        self.items.push_back(track);
    }

    /// Appends every track in order, returning how many were added.
    pub fn enqueue_many(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let before = self.items.len();
        self.items.extend(tracks);
        let added = self.items.len() - before;
        debug!("➕ Enqueued {} tracks", added);
        added
    }

    pub fn dequeue_next(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Empties the queue, returning how many tracks were dropped.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    pub fn list(&self) -> impl ExactSizeIterator<Item = &Track> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the known duration hints.
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|track| track.duration_hint).sum()
    }

    pub(crate) fn push_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }
}
