//! Download statistics side channel
//!
//! Downloads are counted in memory, keyed by [`RepoPath`], and flushed to a
//! [`StatsSink`] periodically. Flushing is independent of any unit of work:
//! a crash loses at most one interval of counts, and the hot download path
//! never waits on durable storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use binrepo_core::RepoPath;

use crate::error::Result;

/// Aggregated downloads of one item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    pub count: u64,
    pub last_downloaded: Option<DateTime<Utc>>,
    pub last_downloaded_by: Option<String>,
}

impl DownloadStats {
    /// Fold newer stats into these
    pub fn merge(&mut self, other: DownloadStats) {
        self.count += other.count;
        if other.last_downloaded >= self.last_downloaded {
            self.last_downloaded = other.last_downloaded;
            self.last_downloaded_by = other.last_downloaded_by;
        }
    }
}

/// Durable destination of flushed statistics
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn persist(&self, batch: Vec<(RepoPath, DownloadStats)>) -> Result<()>;
}

/// In-memory buffer of pending download statistics
#[derive(Debug, Default)]
pub struct StatsBuffer {
    pending: Mutex<HashMap<RepoPath, DownloadStats>>,
}

impl StatsBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<RepoPath, DownloadStats>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_download(&self, path: &RepoPath, user: &str) {
        let mut pending = self.pending();
        let stats = pending.entry(path.clone()).or_default();
        stats.count += 1;
        stats.last_downloaded = Some(Utc::now());
        stats.last_downloaded_by = Some(user.to_string());
    }

    /// Number of items with unflushed stats
    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    /// Unflushed stats of one item
    pub fn get(&self, path: &RepoPath) -> Option<DownloadStats> {
        self.pending().get(path).cloned()
    }

    /// Take everything buffered so far
    pub fn drain(&self) -> Vec<(RepoPath, DownloadStats)> {
        self.pending().drain().collect()
    }

    /// Put stats back after a failed flush
    fn restore(&self, batch: Vec<(RepoPath, DownloadStats)>) {
        let mut pending = self.pending();
        for (path, stats) in batch {
            // Anything recorded since the drain is newer
            let newer = pending.remove(&path);
            let mut merged = stats;
            if let Some(newer) = newer {
                merged.merge(newer);
            }
            pending.insert(path, merged);
        }
    }

    /// Flush buffered stats into `sink`; returns the number of items written.
    ///
    /// On failure the stats are kept for the next flush.
    pub async fn flush(&self, sink: &dyn StatsSink) -> Result<usize> {
        let batch = self.drain();
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        match sink.persist(batch.clone()).await {
            Ok(()) => {
                tracing::debug!(items = count, "download stats flushed");
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Failed to flush download stats: {}", e);
                self.restore(batch);
                Err(e)
            }
        }
    }
}

/// Flush `buffer` every `every` until `shutdown` flips to `true`, then flush
/// one last time
pub async fn run_flush_loop(
    buffer: Arc<StatsBuffer>,
    sink: Arc<dyn StatsSink>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Errors are logged by flush and retried next tick
                let _ = buffer.flush(sink.as_ref()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = buffer.flush(sink.as_ref()).await;
    tracing::debug!("download stats flush loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoError;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MemorySink {
        persisted: Mutex<HashMap<RepoPath, DownloadStats>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl StatsSink for MemorySink {
        async fn persist(&self, batch: Vec<(RepoPath, DownloadStats)>) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepoError::storage("stats store offline"));
            }
            let mut persisted = self.persisted.lock().unwrap();
            for (path, stats) in batch {
                persisted.entry(path).or_default().merge(stats);
            }
            Ok(())
        }
    }

    fn path(p: &str) -> RepoPath {
        RepoPath::new("libs-local", p)
    }

    #[test]
    fn test_record_aggregates_per_path() {
        let buffer = StatsBuffer::new();
        buffer.record_download(&path("a.jar"), "alice");
        buffer.record_download(&path("a.jar"), "bob");
        buffer.record_download(&path("b.jar"), "alice");

        assert_eq!(buffer.pending_len(), 2);
        let stats = buffer.get(&path("a.jar")).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.last_downloaded_by.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_flush_drains_into_sink() {
        let buffer = StatsBuffer::new();
        let sink = MemorySink::default();
        buffer.record_download(&path("a.jar"), "alice");

        assert_eq!(buffer.flush(&sink).await.unwrap(), 1);
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(sink.persisted.lock().unwrap()[&path("a.jar")].count, 1);
        assert_eq!(buffer.flush(&sink).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_stats() {
        let buffer = StatsBuffer::new();
        let sink = MemorySink::default();
        sink.fail.store(true, Ordering::SeqCst);
        buffer.record_download(&path("a.jar"), "alice");

        assert!(buffer.flush(&sink).await.is_err());
        buffer.record_download(&path("a.jar"), "bob");
        let stats = buffer.get(&path("a.jar")).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.last_downloaded_by.as_deref(), Some("bob"));

        sink.fail.store(false, Ordering::SeqCst);
        assert_eq!(buffer.flush(&sink).await.unwrap(), 1);
        assert_eq!(sink.persisted.lock().unwrap()[&path("a.jar")].count, 2);
    }

    #[tokio::test]
    async fn test_flush_loop_flushes_on_shutdown() {
        let buffer = Arc::new(StatsBuffer::new());
        let sink = Arc::new(MemorySink::default());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_flush_loop(
            Arc::clone(&buffer),
            sink.clone(),
            Duration::from_secs(3600),
            rx,
        ));

        buffer.record_download(&path("a.jar"), "alice");
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(sink.persisted.lock().unwrap()[&path("a.jar")].count, 1);
    }
}
