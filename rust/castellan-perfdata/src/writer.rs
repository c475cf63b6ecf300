//! The worker loop every writer shares, parameterized over the transport-specific
//! [`OutputSink`]. `resume()`/`pause()` match the contract every writer in this
//! crate exposes; only `connect()`/`write_batch()` differ between line-protocol,
//! HTTP bulk and OTLP.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::queue::{PriorityQueue, DEFAULT_CAPACITY};
use crate::record::PerfdataRecord;
use crate::sink::OutputSink;
use crate::stats::StatsHandle;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub queue_capacity: usize,
    pub batch_bytes: usize,
    pub batch_interval: Duration,
    pub max_batch_len: usize,
    pub drain_grace: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            batch_bytes: 64 * 1024,
            batch_interval: Duration::from_secs(1),
            max_batch_len: 10_000,
            drain_grace: Duration::from_secs(5),
        }
    }
}

pub struct PerfdataWriter<S: OutputSink + 'static> {
    queue: Arc<PriorityQueue>,
    stats: Arc<StatsHandle>,
    config: WriterConfig,
    sink_factory: Arc<dyn Fn() -> S + Send + Sync>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: OutputSink + 'static> PerfdataWriter<S> {
    pub fn new(config: WriterConfig, sink_factory: impl Fn() -> S + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            queue: PriorityQueue::new(config.queue_capacity),
            stats: StatsHandle::new(),
            config,
            sink_factory: Arc::new(sink_factory),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    pub fn stats(&self) -> Arc<crate::stats::WriterStats> {
        self.stats.snapshot()
    }

    /// Non-blocking; evicts the oldest queued record rather than ever stalling
    /// the caller (the result processor).
    pub fn enqueue(&self, record: PerfdataRecord) {
        let outcome = self.queue.try_enqueue(record);
        self.stats.update(|s| {
            s.queued += 1;
            if outcome.evicted {
                s.dropped += 1;
            }
        });
    }

    pub fn resume(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        let this = self.clone();
        *task = Some(tokio::spawn(async move { this.run(token).await }));
    }

    /// Cancels the socket and waits up to `drain_grace` for the worker to exit,
    /// discarding whatever is still queued afterward.
    pub async fn pause(&self) {
        let token = self.cancel.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.config.drain_grace, handle).await.is_err() {
                warn!("perfdata writer did not stop within drain grace period; abandoning task");
            }
        }
        let dropped = self.queue.clear() as u64;
        if dropped > 0 {
            self.stats.update(|s| s.dropped += dropped);
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        while !cancel.is_cancelled() {
            let mut sink = (self.sink_factory)();
            if !self.connect_with_backoff(&mut sink, &cancel).await {
                return;
            }
            self.drain_until_error_or_cancel(&mut sink, &cancel).await;
            sink.close().await;
        }
    }

    /// Returns `false` if cancelled before a connection was established.
    async fn connect_with_backoff(&self, sink: &mut S, cancel: &CancellationToken) -> bool {
        let mut backoff = Backoff::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                res = sink.connect() => match res {
                    Ok(()) => return true,
                    Err(err) => {
                        self.stats.update(|s| s.last_error = Some(err.to_string()));
                        warn!(error = %err, "perfdata writer connect failed, backing off");
                        let delay = backoff.next_delay();
                        tokio::select! {
                            _ = cancel.cancelled() => return false,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }
    }

    async fn drain_until_error_or_cancel(&self, sink: &mut S, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.queue.wait_for_item(), if self.queue.is_empty() => {}
                _ = tokio::time::sleep(self.config.batch_interval) => {}
            }
            if cancel.is_cancelled() {
                return;
            }
            let batch = self.queue.pop_batch(self.config.max_batch_len);
            if batch.is_empty() {
                continue;
            }
            match sink.write_batch(&batch).await {
                Ok(()) => {
                    self.stats.update(|s| s.sent += batch.len() as u64);
                    debug!(count = batch.len(), "perfdata batch flushed");
                }
                Err(err) => {
                    self.stats.update(|s| s.last_error = Some(err.to_string()));
                    warn!(error = %err, "perfdata batch send failed, reconnecting");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerfdataResult;
    use castellan_registry::CheckState;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        sent: Arc<AtomicUsize>,
        fail_connects: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl OutputSink for CountingSink {
        async fn connect(&mut self) -> PerfdataResult<()> {
            if self.fail_connects.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(crate::error::PerfdataError::Connect("simulated".into()));
            }
            self.fail_connects.store(0, Ordering::SeqCst);
            Ok(())
        }

        async fn write_batch(&mut self, batch: &[PerfdataRecord]) -> PerfdataResult<()> {
            self.sent.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    fn record() -> PerfdataRecord {
        PerfdataRecord {
            checkable: "web1".into(),
            kind: "host",
            timestamp: Utc::now(),
            state: CheckState::Ok,
            values: Vec::new(),
        }
    }

    #[tokio::test]
    async fn resume_drains_queued_records() {
        let sent = Arc::new(AtomicUsize::new(0));
        let fail_connects = Arc::new(AtomicUsize::new(0));
        let config = WriterConfig {
            batch_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let writer = PerfdataWriter::new(config, {
            let sent = sent.clone();
            let fail_connects = fail_connects.clone();
            move || CountingSink { sent: sent.clone(), fail_connects: fail_connects.clone() }
        });

        writer.enqueue(record());
        writer.enqueue(record());
        writer.resume();

        tokio::time::sleep(Duration::from_millis(100)).await;
        writer.pause().await;

        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pause_discards_unsent_records() {
        let sent = Arc::new(AtomicUsize::new(0));
        let fail_connects = Arc::new(AtomicUsize::new(10));
        let config = WriterConfig {
            batch_interval: Duration::from_secs(60),
            drain_grace: Duration::from_millis(50),
            ..Default::default()
        };
        let writer = PerfdataWriter::new(config, {
            let sent = sent.clone();
            let fail_connects = fail_connects.clone();
            move || CountingSink { sent: sent.clone(), fail_connects: fail_connects.clone() }
        });
        writer.enqueue(record());
        writer.resume();
        writer.pause().await;

        assert_eq!(sent.load(Ordering::SeqCst), 0);
        assert_eq!(writer.stats().dropped, 1);
    }
}
