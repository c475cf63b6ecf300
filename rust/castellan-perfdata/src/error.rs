use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerfdataError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("tls error: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type PerfdataResult<T> = Result<T, PerfdataError>;
