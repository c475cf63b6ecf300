//! HTTP(S) JSON bulk writer. One POST per flushed batch; 429/502/503/504 retry
//! with exponential backoff honoring `Retry-After` when present, any other
//! non-2xx status is logged and the whole batch is dropped rather than retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::backoff::Backoff;
use crate::error::{PerfdataError, PerfdataResult};
use crate::record::PerfdataRecord;
use crate::sink::OutputSink;

const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub endpoint: String,
    pub bearer_token: Option<String>,
}

#[derive(Serialize)]
struct BulkRecord<'a> {
    checkable: &'a str,
    kind: &'a str,
    timestamp: i64,
    state: &'static str,
    metrics: Vec<BulkMetric<'a>>,
}

#[derive(Serialize)]
struct BulkMetric<'a> {
    label: &'a str,
    value: f64,
    unit: Option<&'a str>,
}

pub struct HttpBulkSink {
    config: HttpSinkConfig,
    client: Option<Client>,
}

impl HttpBulkSink {
    pub fn new(config: HttpSinkConfig) -> Self {
        Self { config, client: None }
    }

    fn encode(batch: &[PerfdataRecord]) -> Vec<BulkRecord<'_>> {
        batch
            .iter()
            .map(|r| BulkRecord {
                checkable: &r.checkable,
                kind: r.kind,
                timestamp: r.timestamp.timestamp(),
                state: state_label(r.state),
                metrics: r
                    .values
                    .iter()
                    .map(|v| BulkMetric {
                        label: &v.label,
                        value: v.value,
                        unit: v.unit.as_deref(),
                    })
                    .collect(),
            })
            .collect()
    }

    async fn post_once(&self, body: &[BulkRecord<'_>]) -> Result<reqwest::Response, reqwest::Error> {
        let client = self.client.as_ref().expect("connect() called before write_batch()");
        let mut req = client.post(&self.config.endpoint).json(body);
        if let Some(token) = &self.config.bearer_token {
            req = req.bearer_auth(token);
        }
        req.send().await
    }
}

fn state_label(state: castellan_registry::CheckState) -> &'static str {
    match state {
        castellan_registry::CheckState::Ok => "ok",
        castellan_registry::CheckState::Warning => "warning",
        castellan_registry::CheckState::Critical => "critical",
        castellan_registry::CheckState::Unknown => "unknown",
    }
}

fn retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
impl OutputSink for HttpBulkSink {
    async fn connect(&mut self) -> PerfdataResult<()> {
        self.client = Some(
            Client::builder()
                .build()
                .map_err(|e| PerfdataError::Connect(e.to_string()))?,
        );
        Ok(())
    }

    async fn write_batch(&mut self, batch: &[PerfdataRecord]) -> PerfdataResult<()> {
        let body = Self::encode(batch);
        let mut backoff = Backoff::new();

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .post_once(&body)
                .await
                .map_err(|e| PerfdataError::Send(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            if !retryable(status) || attempt == MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                warn!(%status, body = %text, "perfdata http writer: non-retryable status, dropping batch");
                return Err(PerfdataError::Http { status: status.as_u16(), body: text });
            }
            let delay = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| backoff.next_delay());
            warn!(%status, attempt, delay_ms = delay.as_millis() as u64, "perfdata http writer: retryable status, backing off");
            tokio::time::sleep(delay).await;
        }
        unreachable!("loop always returns within MAX_RETRIES + 1 iterations")
    }

    async fn close(&mut self) {
        self.client = None;
    }
}
