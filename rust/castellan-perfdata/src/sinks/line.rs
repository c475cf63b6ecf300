//! Plain-text line-protocol writer: one `checkable state timestamp k=v,k=v...`
//! line per record, over a long-lived TCP connection optionally upgraded to TLS.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use castellan_io::tls::TlsMaterial;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::{TlsConnector, client::TlsStream};

use crate::error::{PerfdataError, PerfdataResult};
use crate::record::PerfdataRecord;
use crate::sink::OutputSink;

#[derive(Debug, Clone)]
pub struct LineSinkConfig {
    pub addr: String,
    pub tls: Option<(Arc<TlsMaterial>, String)>, // (material, server name)
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Transport::Plain(s) => s.write_all(buf).await,
            Transport::Tls(s) => s.write_all(buf).await,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Plain(s) => s.flush().await,
            Transport::Tls(s) => s.flush().await,
        }
    }

    async fn shutdown(&mut self) {
        let _: std::io::Result<()> = match self {
            Transport::Plain(s) => s.shutdown().await,
            Transport::Tls(s) => s.shutdown().await,
        };
    }
}

pub struct LineSink {
    config: LineSinkConfig,
    transport: Option<Transport>,
}

impl LineSink {
    pub fn new(config: LineSinkConfig) -> Self {
        Self { config, transport: None }
    }

    fn encode(record: &PerfdataRecord) -> String {
        let mut line = format!(
            "{} {} {:?}",
            record.checkable,
            record.state_label(),
            record.timestamp.timestamp()
        );
        for v in &record.values {
            let _ = write!(line, " {}={}", v.label, v.value);
        }
        line.push('\n');
        line
    }
}

#[async_trait]
impl OutputSink for LineSink {
    async fn connect(&mut self) -> PerfdataResult<()> {
        let stream = TcpStream::connect(&self.config.addr)
            .await
            .map_err(|e| PerfdataError::Connect(e.to_string()))?;
        self.transport = Some(match &self.config.tls {
            None => Transport::Plain(stream),
            Some((material, server_name)) => {
                let client_config = material
                    .client_config()
                    .map_err(|e| PerfdataError::Tls(e.to_string()))?;
                let connector = TlsConnector::from(client_config);
                let name = rustls::pki_types::ServerName::try_from(server_name.clone())
                    .map_err(|e| PerfdataError::Tls(e.to_string()))?;
                let tls_stream = connector
                    .connect(name, stream)
                    .await
                    .map_err(|e| PerfdataError::Tls(e.to_string()))?;
                Transport::Tls(Box::new(tls_stream))
            }
        });
        Ok(())
    }

    async fn write_batch(&mut self, batch: &[PerfdataRecord]) -> PerfdataResult<()> {
        let transport = self.transport.as_mut().ok_or_else(|| PerfdataError::Send("not connected".into()))?;
        for record in batch {
            let line = Self::encode(record);
            transport.write_all(line.as_bytes()).await.map_err(PerfdataError::Io)?;
        }
        transport.flush().await.map_err(PerfdataError::Io)?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await;
        }
    }
}

impl PerfdataRecord {
    fn state_label(&self) -> &'static str {
        match self.state {
            castellan_registry::CheckState::Ok => "OK",
            castellan_registry::CheckState::Warning => "WARNING",
            castellan_registry::CheckState::Critical => "CRITICAL",
            castellan_registry::CheckState::Unknown => "UNKNOWN",
        }
    }
}
