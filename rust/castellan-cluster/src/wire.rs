//! Netstring-style framing: an ASCII decimal length, a colon, the JSON payload, and
//! a trailing comma. Chosen so a reader never has to buffer an unbounded amount of
//! data to find a delimiter -- the length is known before the payload is read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ClusterError, ClusterResult};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
const MAX_LENGTH_DIGITS: usize = 9;

/// A JSON-RPC 2.0-shaped cluster message. `id` is present for request/response
/// pairs and absent for fire-and-forget events; `ts` is set on heartbeats and any
/// message whose handler cares about send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl Message {
    pub fn event(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: None,
            ts: None,
        }
    }

    pub fn request(method: impl Into<String>, params: Value, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: Some(id.into()),
            ts: None,
        }
    }

    pub fn with_ts(mut self, ts: i64) -> Self {
        self.ts = Some(ts);
        self
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, msg: &Message) -> ClusterResult<usize> {
    let body = serde_json::to_vec(msg)?;
    let header = format!("{}:", body.len());
    w.write_all(header.as_bytes()).await?;
    w.write_all(&body).await?;
    w.write_all(b",").await?;
    w.flush().await?;
    Ok(header.len() + body.len() + 1)
}

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R, max_len: usize) -> ClusterResult<(Message, usize)> {
    let mut digits = Vec::with_capacity(MAX_LENGTH_DIGITS);
    loop {
        let mut b = [0u8; 1];
        r.read_exact(&mut b).await?;
        if b[0] == b':' {
            break;
        }
        if !b[0].is_ascii_digit() {
            return Err(ClusterError::Protocol(format!(
                "expected ascii digit or ':' in frame length prefix, got {:#x}",
                b[0]
            )));
        }
        digits.push(b[0]);
        if digits.len() > MAX_LENGTH_DIGITS {
            return Err(ClusterError::Protocol("frame length prefix too long".into()));
        }
    }
    let len: usize = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ClusterError::Protocol("invalid frame length prefix".into()))?;
    if len > max_len {
        return Err(ClusterError::FrameTooLarge { max: max_len, actual: len });
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body).await?;
    let mut trailer = [0u8; 1];
    r.read_exact(&mut trailer).await?;
    if trailer[0] != b',' {
        return Err(ClusterError::Protocol("frame missing trailing comma".into()));
    }
    let msg: Message = serde_json::from_slice(&body)?;
    Ok((msg, digits.len() + 1 + len + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_a_message() {
        let msg = Message::request("event::ExecuteCommand", json!({"check": "ping"}), "1");
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let (decoded, _n) = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
        assert_eq!(decoded.method, "event::ExecuteCommand");
        assert_eq!(decoded.id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn rejects_oversize_frame() {
        let msg = Message::event("event::Heartbeat", json!({}));
        let mut buf = Vec::new();
        write_frame(&mut buf, &msg).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor, 4).await.unwrap_err();
        assert!(matches!(err, ClusterError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn rejects_malformed_length_prefix() {
        let mut cursor = std::io::Cursor::new(b"12x3:{}".to_vec());
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.unwrap_err();
        assert!(matches!(err, ClusterError::Protocol(_)));
    }
}
