use billing_core::{DomainError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job {0} is already running")]
    AlreadyRunning(&'static str),
    #[error("job run {0} not found")]
    JobRunNotFound(i64),
}

impl DomainError for SchedulerError {
    fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::AlreadyRunning(_) => ErrorKind::Conflict,
            SchedulerError::JobRunNotFound(_) => ErrorKind::NotFound,
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
