use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::membership::types::{WorkerId, WorkerSnapshot};
use crate::transport::types::TaskId;

/// One part of a split task.
#[derive(Debug, Clone)]
pub struct SubTask {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub text: String,
    /// Position of the part in the original text.
    pub index: usize,
    pub processed: bool,
    /// Filled by the dispatcher on success, or by a late result that arrived
    /// after the dispatcher gave up.
    pub result: Option<String>,
}

/// Coordinator-side record of a split task, kept until merged or abandoned.
#[derive(Debug, Clone)]
pub struct DistributedTask {
    pub task_id: TaskId,
    pub ratio: f32,
    pub file_name: String,
    pub created_at: Instant,
    pub sub_tasks: Vec<SubTask>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Summarized on the coordinator (no worker, or every remote path failed).
    Local,
    /// Local run requested by the caller; the cluster is never consulted.
    SingleThread,
    Direct { worker: WorkerId },
    Distributed { parts: usize, workers: Vec<WorkerId> },
}

/// What `TaskDistributor::distribute` hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutcome {
    pub task_id: TaskId,
    pub summary: String,
    /// Characters in the input.
    pub original_length: usize,
    /// Characters in the summary.
    pub summary_length: usize,
    /// `1 - summary_length / original_length`
    pub compression_ratio: f32,
    pub mode: ProcessingMode,
    pub elapsed_ms: u64,
}

impl SummaryOutcome {
    pub fn compression(original_length: usize, summary_length: usize) -> f32 {
        if original_length == 0 {
            return 0.0;
        }
        1.0 - summary_length as f32 / original_length as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub pending_tasks: usize,
    pub tasks_processed: u64,
    pub distributed_tasks: usize,
    pub active_workers: usize,
    pub workers: Vec<WorkerSnapshot>,
}
