use async_trait::async_trait;

use crate::error::PerfdataResult;
use crate::record::PerfdataRecord;

/// What a concrete transport (line-protocol TCP/TLS, HTTP(S) JSON bulk, OTLP)
/// implements. A fresh instance is built by the writer's factory on every
/// reconnect attempt, so a sink never has to recover from a half-open connection
/// -- it just gets replaced.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn connect(&mut self) -> PerfdataResult<()>;
    async fn write_batch(&mut self, batch: &[PerfdataRecord]) -> PerfdataResult<()>;
    async fn close(&mut self);
}
