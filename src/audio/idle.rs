use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::model::id::ChannelId;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    armed_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Cancellable auto-disconnect countdowns, at most one per voice channel.
///
/// A timer leaves the map either through [`IdleDisconnect::cancel`] or through
/// its own expiry; both sides remove the entry atomically, so exactly one of
/// them observes it and the expiry callback can never run after a cancel.
#[derive(Debug, Clone, Default)]
pub struct IdleDisconnect {
    timers: Arc<DashMap<ChannelId, ArmedTimer>>,
    generation: Arc<AtomicU64>,
}

impl IdleDisconnect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a countdown for `channel_id`, replacing any live one.
    pub fn arm<F, Fut>(&self, channel_id: ChannelId, duration: Duration, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let timer = ArmedTimer {
            generation,
            armed_at: Utc::now(),
            cancel: cancel.clone(),
        };

        if let Some(previous) = self.timers.insert(channel_id, timer) {
            previous.cancel.cancel();
            debug!("⏲️ Replaced idle timer for channel {}", channel_id);
        }

        let timers = Arc::clone(&self.timers);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(duration) => {}
            }

            let claimed = timers
                .remove_if(&channel_id, |_, timer| timer.generation == generation)
                .is_some();
            if claimed {
                debug!("⏰ Idle timer expired for channel {}", channel_id);
                on_expire().await;
            }
        });
    }

    /// Invalidates the live timer for `channel_id`; returns whether one existed.
    pub fn cancel(&self, channel_id: ChannelId) -> bool {
        match self.timers.remove(&channel_id) {
            Some((_, timer)) => {
                timer.cancel.cancel();
                debug!(
                    "⏲️ Cancelled idle timer for channel {} after {}s",
                    channel_id,
                    (Utc::now() - timer.armed_at).num_seconds()
                );
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, channel_id: ChannelId) -> bool {
        self.timers.contains_key(&channel_id)
    }
}
