//! Background write supervisor
//!
//! Cache writes never extend request latency: they run on tasks owned by a
//! process-wide [`TaskTracker`] rather than by the request. A request that
//! is dropped mid-flight does not cancel the writes it scheduled. Each write
//! carries its own timeout; failures are logged and dropped.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use tokio::sync::Notify;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::telemetry;

/// Counters for background writes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub scheduled: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
}

#[derive(Debug, Default)]
struct AtomicWriterStats {
    scheduled: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Sequence numbers of writes that have not finished yet.
#[derive(Debug, Default)]
struct PendingWrites {
    next_seq: AtomicU64,
    seqs: DashSet<u64>,
    settled: Notify,
}

/// Clears a write from [`PendingWrites`] when its task ends, including
/// when the runtime drops the task before it completes.
struct PendingGuard {
    seq: u64,
    pending: Arc<PendingWrites>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.seqs.remove(&self.seq);
        self.pending.settled.notify_waiters();
    }
}

/// Supervisor for fire-and-forget cache writes.
///
/// Cloning is cheap; clones share the same task set.
#[derive(Debug, Clone)]
pub struct BackgroundWriter {
    tracker: TaskTracker,
    timeout: Duration,
    stats: Arc<AtomicWriterStats>,
    pending: Arc<PendingWrites>,
}

impl BackgroundWriter {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            tracker: TaskTracker::new(),
            timeout,
            stats: Arc::new(AtomicWriterStats::default()),
            pending: Arc::new(PendingWrites::default()),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `write` on a detached task bounded by the writer timeout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(&self, operation: &'static str, key: String, write: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::clone(&self.stats);
        let timeout = self.timeout;
        let seq = self.pending.next_seq.fetch_add(1, Ordering::SeqCst);
        self.pending.seqs.insert(seq);
        let guard = PendingGuard {
            seq,
            pending: Arc::clone(&self.pending),
        };

        self.tracker.spawn(async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, write).await {
                Ok(Ok(())) => {
                    stats.succeeded.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_background_write("success");
                    debug!(operation, key = %key, "Background cache write completed");
                }
                Ok(Err(e)) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_background_write("error");
                    warn!(operation, key = %key, error = %format!("{e:#}"), "Background cache write failed, dropping");
                }
                Err(_) => {
                    stats.timed_out.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_background_write("timeout");
                    warn!(operation, key = %key, timeout_ms = %timeout.as_millis(), "Background cache write timed out, dropping");
                }
            }
        });
    }

    /// Wait until every write scheduled before this call has finished.
    ///
    /// Writes scheduled while waiting are not awaited, so a steady stream of
    /// new writes cannot hold the caller up.
    pub async fn quiesce(&self) {
        let cutoff = self.pending.next_seq.load(Ordering::SeqCst);
        loop {
            let settled = self.pending.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            if !self.pending.seqs.iter().any(|seq| *seq < cutoff) {
                return;
            }
            settled.await;
        }
    }

    /// Writes currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    #[must_use]
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            scheduled: self.stats.scheduled.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quiesce_waits_for_writes() {
        let writer = BackgroundWriter::new(Duration::from_secs(1));
        let done = Arc::new(AtomicU64::new(0));
        for _ in 0..5 {
            let done = Arc::clone(&done);
            writer.spawn("set", "k".to_string(), async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }

        writer.quiesce().await;
        assert_eq!(done.load(Ordering::Relaxed), 5);
        assert_eq!(writer.in_flight(), 0);
        assert_eq!(writer.stats().succeeded, 5);
    }

    #[tokio::test]
    async fn test_failed_and_slow_writes_are_dropped() {
        let writer = BackgroundWriter::new(Duration::from_millis(20));
        writer.spawn("set", "bad".to_string(), async { anyhow::bail!("boom") });
        writer.spawn("set", "slow".to_string(), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });

        writer.quiesce().await;
        let stats = writer.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.timed_out, 1);
    }

    #[tokio::test]
    async fn test_quiesce_ignores_writes_scheduled_while_waiting() {
        let writer = BackgroundWriter::new(Duration::from_secs(1));
        let first_done = Arc::new(AtomicU64::new(0));
        {
            let first_done = Arc::clone(&first_done);
            writer.spawn("set", "first".to_string(), async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                first_done.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }

        // 50 ms writes arriving every 10 ms keep the tracker busy forever.
        let producer = {
            let writer = writer.clone();
            tokio::spawn(async move {
                loop {
                    writer.spawn("set", "steady".to_string(), async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    });
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let waited = tokio::time::timeout(Duration::from_secs(2), writer.quiesce()).await;
        producer.abort();

        assert!(waited.is_ok(), "quiesce must not wait for writes scheduled after it");
        assert_eq!(first_done.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_quiesce_with_nothing_pending_returns() {
        let writer = BackgroundWriter::new(Duration::from_secs(1));
        let waited = tokio::time::timeout(Duration::from_millis(100), writer.quiesce()).await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn test_writes_survive_caller_cancellation() {
        let writer = BackgroundWriter::new(Duration::from_secs(1));
        let done = Arc::new(AtomicU64::new(0));

        let request = {
            let writer = writer.clone();
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                writer.spawn("set", "k".to_string(), async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    done.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                });
                // The request keeps running until it is aborted.
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        request.abort();

        writer.quiesce().await;
        assert_eq!(done.load(Ordering::Relaxed), 1);
    }
}
