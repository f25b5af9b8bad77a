//! Worker Execution Engine
//!
//! Runs on every worker process. Receives whole or chunked tasks from the
//! coordinator, rebuilds chunked input, summarizes it off the I/O path and
//! reports back.
//!
//! ## Task Lifecycle
//! - **Direct**: `TASK` → validate → summarize → `TASK_RESULT` (+ `TASK_COMPLETE` on success).
//! - **Chunked**: `TASK_START` → `TASK_CHUNK`s in any order → finalize → summarize → `TASK_RESULT` (+ `TASK_COMPLETE`).
//!
//! ## Submodules
//! - **`reassembly`**: Per-task chunk buffers, duplicate tolerant, swept when stalled.
//! - **`node`**: Socket ownership, registration, heartbeat and the receive loop.

pub mod node;
pub mod reassembly;
pub mod types;

#[cfg(test)]
mod tests;
