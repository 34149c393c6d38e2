use std::sync::{Arc, PoisonError};

use chrono::Utc;
use domain::tag::EntrySource;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tag_cache::CacheInner;

/// What one poll tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub batches: usize,
    pub failed_batches: usize,
    /// Symbolic tags whose value changed
    pub changes: usize,
    /// The tick was skipped because the link could not be (re)connected
    pub skipped: bool,
}

/// Background loop: one tick per interval until cancelled.
///
/// The first tick fires one full interval after start; initialize already
/// seeded the cache.
pub(super) async fn run_poll_loop(inner: Arc<CacheInner>, cancel: CancellationToken) {
    let period = inner.config.poll_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Poll loop shutdown signal received");
                return;
            }
            _ = ticker.tick() => {
                inner.poll_tick().await;
            }
        }
    }
}

impl CacheInner {
    /// Read the primary group in batches and publish what changed.
    ///
    /// A failed batch is logged and skipped; the rest of the tick proceeds
    /// and the next tick is a fresh attempt.
    pub(super) async fn poll_tick(&self) -> PollSummary {
        let _tick = self.tick_lock.lock().await;
        let names = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .primary
            .clone();
        let mut summary = PollSummary::default();
        if names.is_empty() {
            return summary;
        }

        let mut link = self.primary.lock().await;
        if !link.is_connected() {
            info!(link = %link.link_name(), "Primary link disconnected, reconnecting");
            if let Err(e) = link.connect().await {
                warn!(link = %link.link_name(), error = %e, "Reconnect failed, skipping tick");
                let mut stats = self.stats();
                stats.ticks += 1;
                stats.last_error = Some(e.to_string());
                summary.skipped = true;
                return summary;
            }
        }

        let mut last_error = None;
        for chunk in names.chunks(self.config.effective_batch_size()) {
            summary.batches += 1;
            match link.get(chunk).await {
                Ok(batch) => {
                    let changes = self.apply_batch(batch, EntrySource::Poll);
                    summary.changes += changes.len();
                    self.emit(changes);
                }
                Err(e) => {
                    warn!(link = %link.link_name(), size = chunk.len(), error = %e, "Poll batch failed, skipping");
                    summary.failed_batches += 1;
                    last_error = Some(e.to_string());
                }
            }
        }
        drop(link);

        let mut stats = self.stats();
        stats.ticks += 1;
        stats.failed_batches += summary.failed_batches as u64;
        stats.last_poll = Some(Utc::now());
        stats.last_error = last_error;
        debug!(
            batches = summary.batches,
            failed = summary.failed_batches,
            changes = summary.changes,
            "Poll tick complete"
        );
        summary
    }
}
