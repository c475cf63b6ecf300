use thiserror::Error;

use crate::TimerId;

pub type TimerResult<T> = Result<T, TimerError>;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer {0:?} not found")]
    NotFound(TimerId),
}
