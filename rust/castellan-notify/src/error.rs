use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification command for user {user} failed: {reason}")]
    CommandFailed { user: String, reason: String },

    #[error("notification command for user {user} timed out")]
    Timeout { user: String },
}

pub type NotifyResult<T> = Result<T, NotifyError>;
