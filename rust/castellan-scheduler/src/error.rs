use thiserror::Error;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("checkable {0} not found")]
    NotFound(String),

    #[error("remote check timed out after {0:?}")]
    RemoteTimeout(std::time::Duration),

    #[error(transparent)]
    Cluster(#[from] castellan_cluster::ClusterError),
}
