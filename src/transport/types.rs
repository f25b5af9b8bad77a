use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a unit of work.
///
/// Top-level tasks get a UUID; split sub-tasks derive theirs from the parent
/// as `<parent>_part_<index>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generates a new random UUID v4-based TaskId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn part(&self, index: usize) -> Self {
        Self(format!("{}_part_{}", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A whole task carried in a single `TASK` datagram.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlaveTask {
    pub task_id: TaskId,
    pub text: String,
    pub ratio: f32,
    pub file_name: String,
    /// Coordinator port the result must be sent to.
    pub master_callback_port: u16,
}

/// Announces a chunked task (`TASK_START`). Lengths are in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub task_id: TaskId,
    pub ratio: f32,
    pub file_name: String,
    pub total_chunks: usize,
    pub chunk_size: usize,
    pub text_length: usize,
    pub master_callback_port: u16,
}

/// One slice of a chunked task (`TASK_CHUNK`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskChunk {
    pub task_id: TaskId,
    pub chunk_index: usize,
    pub data: String,
    pub is_last_chunk: bool,
}

/// Outcome reported by a worker (`TASK_RESULT`).
///
/// A failed report always carries an empty summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_id: TaskId,
    pub summary: String,
    pub success: bool,
    pub file_name: String,
}

impl TaskReport {
    pub fn success(task_id: TaskId, summary: String, file_name: String) -> Self {
        Self {
            task_id,
            summary,
            success: true,
            file_name,
        }
    }

    pub fn failure(task_id: TaskId, file_name: String) -> Self {
        Self {
            task_id,
            summary: String::new(),
            success: false,
            file_name,
        }
    }
}
