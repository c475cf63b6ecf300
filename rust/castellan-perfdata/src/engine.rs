//! Fans a processed result out to every configured writer. Each writer keeps its
//! own queue and connection independently -- a stalled OTLP endpoint never backs
//! up the line-protocol writer sitting next to it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use castellan_registry::{CheckResult, Checkable};
use castellan_results::PerfdataSink;

use crate::record::PerfdataRecord;
use crate::sink::OutputSink;
use crate::stats::WriterStats;
use crate::writer::PerfdataWriter;

/// Object-safe facade over `PerfdataWriter<S>` so the engine can hold a
/// heterogeneous list of writers (line-protocol, HTTP bulk, OTLP) uniformly.
pub trait DynWriter: Send + Sync {
    fn enqueue(&self, record: PerfdataRecord);
    fn resume(&self);
    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
    fn stats(&self) -> Arc<WriterStats>;
}

/// Wraps an `Arc<PerfdataWriter<S>>` so `resume()` can use the owning `Arc` it
/// requires internally to spawn its worker task.
struct ArcWriter<S: OutputSink + 'static>(Arc<PerfdataWriter<S>>);

impl<S: OutputSink + 'static> DynWriter for ArcWriter<S> {
    fn enqueue(&self, record: PerfdataRecord) {
        self.0.enqueue(record);
    }

    fn resume(&self) {
        self.0.resume();
    }

    fn pause(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { self.0.pause().await })
    }

    fn stats(&self) -> Arc<WriterStats> {
        self.0.stats()
    }
}

pub struct PerfdataEngine {
    writers: Vec<Arc<dyn DynWriter>>,
}

impl PerfdataEngine {
    pub fn new() -> Self {
        Self { writers: Vec::new() }
    }

    pub fn add_writer<S: OutputSink + 'static>(&mut self, writer: Arc<PerfdataWriter<S>>) {
        self.writers.push(Arc::new(ArcWriter(writer)));
    }

    pub fn resume_all(&self) {
        for writer in &self.writers {
            writer.resume();
        }
    }

    pub async fn pause_all(&self) {
        for writer in &self.writers {
            writer.pause().await;
        }
    }

    pub fn writer_stats(&self) -> Vec<Arc<WriterStats>> {
        self.writers.iter().map(|w| w.stats()).collect()
    }
}

impl Default for PerfdataEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PerfdataSink for PerfdataEngine {
    async fn enqueue(&self, checkable: Arc<Checkable>, result: Arc<CheckResult>) {
        if self.writers.is_empty() {
            return;
        }
        let record = PerfdataRecord::from_result(&checkable, &result);
        for writer in &self.writers {
            writer.enqueue(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PerfdataResult;
    use crate::writer::WriterConfig;
    use castellan_registry::{CheckState, CheckableConfig, CheckableKind};
    use chrono::Utc;

    struct NullSink;

    #[async_trait::async_trait]
    impl OutputSink for NullSink {
        async fn connect(&mut self) -> PerfdataResult<()> {
            Ok(())
        }
        async fn write_batch(&mut self, _batch: &[PerfdataRecord]) -> PerfdataResult<()> {
            Ok(())
        }
        async fn close(&mut self) {}
    }

    fn result() -> Arc<CheckResult> {
        let now = Utc::now();
        Arc::new(CheckResult {
            scheduled_start: now,
            scheduled_end: now,
            execution_start: now,
            execution_end: now,
            state: CheckState::Ok,
            output: "ok".into(),
            perfdata: Vec::new(),
            active: true,
            origin: None,
        })
    }

    #[tokio::test]
    async fn enqueue_reaches_every_registered_writer() {
        let mut engine = PerfdataEngine::new();
        let writer = PerfdataWriter::new(WriterConfig::default(), || NullSink);
        engine.add_writer(writer.clone());

        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let checkable = Checkable::new(cfg, Utc::now());

        engine.enqueue(checkable, result()).await;

        assert_eq!(writer.stats().queued, 1);
    }
}
