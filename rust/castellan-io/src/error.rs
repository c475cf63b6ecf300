use thiserror::Error;

pub type IoResult<T> = Result<T, IoError>;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("operation canceled")]
    Canceled,

    #[error("operation timed out")]
    Timeout,

    #[error("frame of {actual} bytes exceeds the {max} byte cap")]
    FrameTooLarge { max: usize, actual: usize },

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
