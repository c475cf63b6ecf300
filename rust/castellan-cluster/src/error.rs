use thiserror::Error;

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised anywhere in the cluster transport. `Protocol` is the one variant
/// that crosses connection boundaries conceptually: enough is logged locally to
/// diagnose the problem, but the peer only ever sees the connection close.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("frame of {actual} bytes exceeds the {max} byte cap")]
    FrameTooLarge { max: usize, actual: usize },

    #[error("no frame received within the liveness timeout")]
    LivenessTimeout,

    #[error("connection canceled")]
    Canceled,

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("endpoint {0} is not connected")]
    EndpointUnavailable(String),

    #[error("endpoint {0} is syncing and cannot accept dispatches")]
    EndpointSyncing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Replay(#[from] sled::Error),
}

impl From<castellan_io::IoError> for ClusterError {
    fn from(e: castellan_io::IoError) -> Self {
        match e {
            castellan_io::IoError::Canceled => ClusterError::Canceled,
            castellan_io::IoError::Timeout => ClusterError::LivenessTimeout,
            castellan_io::IoError::FrameTooLarge { max, actual } => {
                ClusterError::FrameTooLarge { max, actual }
            }
            castellan_io::IoError::Tls(s) => ClusterError::Tls(s),
            castellan_io::IoError::Io(e) => ClusterError::Io(e),
        }
    }
}
