//! Error taxonomy shared by the coordinator and the workers.
//!
//! Every lower-layer failure is expressed as a `ClusterError` variant so the
//! orchestrator can decide whether to degrade (fall back to local
//! summarization) or surface the failure. Only validation failures are ever
//! returned to the caller of `TaskDistributor::distribute`.

use crate::transport::types::TaskId;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("worker {0} is no longer active")]
    WorkerInactive(String),

    #[error("task {0} is already pending")]
    DuplicateTask(TaskId),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("payload of {len} chars exceeds the limit of {limit}")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("task {task_id} timed out after {after:?}")]
    Timeout { task_id: TaskId, after: Duration },

    #[error("worker failed to process task {task_id}: {reason}")]
    WorkerFailed { task_id: TaskId, reason: String },

    #[error("pending entry for task {0} was dropped before resolution")]
    Abandoned(TaskId),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid task: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ClusterError::Protocol(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ClusterError::Validation(msg.into())
    }

    /// Timeouts and worker-side failures are expected under churn; everything
    /// else points at a local problem worth an `error!` line.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClusterError::Timeout { .. }
                | ClusterError::WorkerFailed { .. }
                | ClusterError::WorkerInactive(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
