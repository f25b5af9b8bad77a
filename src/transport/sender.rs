//! Task Sender
//!
//! Delivers one unit of work to one worker and waits for its result.
//!
//! ## Responsibilities
//! - **Path Selection**: A task whose encoded `TASK` datagram fits the datagram limit goes out in one piece; anything larger is announced with `TASK_START` and streamed as `TASK_CHUNK`s.
//! - **Pending Registration**: Every dispatch inserts its pending entry before the first byte leaves, so a fast result can never arrive unregistered.
//! - **Load Release**: Every failure path (inactive worker, duplicate id, too large, send error, timeout, worker failure) releases the worker slot exactly once. Success is released by the worker's `TASK_COMPLETE`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use super::chunking::split_into_chunks;
use super::pending::{PendingTasks, TaskOutcome};
use super::types::{ChunkMetadata, SlaveTask, TaskChunk, TaskId};
use super::wire::WireMessage;
use crate::config::TransportConfig;
use crate::error::{ClusterError, Result};
use crate::membership::service::WorkerRegistry;
use crate::membership::types::WorkerRecord;

#[derive(Clone)]
pub struct TaskSender {
    socket: Arc<UdpSocket>,
    registry: Arc<WorkerRegistry>,
    pending: Arc<PendingTasks>,
    config: TransportConfig,
    /// Coordinator port workers send `TASK_RESULT` to.
    result_port: u16,
}

impl TaskSender {
    pub fn new(
        socket: Arc<UdpSocket>,
        registry: Arc<WorkerRegistry>,
        pending: Arc<PendingTasks>,
        config: TransportConfig,
        result_port: u16,
    ) -> Self {
        Self {
            socket,
            registry,
            pending,
            config,
            result_port,
        }
    }

    pub fn pending(&self) -> &Arc<PendingTasks> {
        &self.pending
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Sends a whole task to an already-charged worker and waits up to 30s
    /// (60s when it has to be chunked).
    pub async fn send_direct(
        &self,
        worker: &WorkerRecord,
        task_id: TaskId,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> Result<String> {
        let task = self.build_task(task_id, text, ratio, file_name);
        self.dispatch(
            worker,
            task,
            self.config.direct_timeout,
            self.config.chunked_timeout,
        )
        .await
    }

    /// Sends one part of a split task under the sub-task deadline (45s).
    pub async fn send_sub_task(
        &self,
        worker: &WorkerRecord,
        task_id: TaskId,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> Result<String> {
        let task = self.build_task(task_id, text, ratio, file_name);
        self.dispatch(
            worker,
            task,
            self.config.part_timeout,
            self.config.part_timeout,
        )
        .await
    }

    fn build_task(&self, task_id: TaskId, text: &str, ratio: f32, file_name: &str) -> SlaveTask {
        SlaveTask {
            task_id,
            text: text.to_string(),
            ratio,
            file_name: file_name.to_string(),
            master_callback_port: self.result_port,
        }
    }

    async fn dispatch(
        &self,
        worker: &WorkerRecord,
        task: SlaveTask,
        direct_deadline: Duration,
        chunked_deadline: Duration,
    ) -> Result<String> {
        if !self.registry.is_active(&worker.id) {
            self.registry.release(&worker.id);
            return Err(ClusterError::WorkerInactive(worker.id.to_string()));
        }

        let encoded = match WireMessage::Task(task.clone()).encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                self.registry.release(&worker.id);
                return Err(e);
            }
        };

        if encoded.len() > self.config.max_datagram_bytes {
            tracing::info!(
                "Task {} is {} bytes encoded, switching to chunked transfer",
                task.task_id,
                encoded.len()
            );
            return self.send_chunked(worker, task, chunked_deadline).await;
        }

        let rx = self.register_or_release(worker, &task.task_id)?;

        if let Err(e) = self.send_with_retry(encoded.as_bytes(), worker.addr).await {
            tracing::error!("Failed to send task {} to {}: {}", task.task_id, worker.id, e);
            self.abort(worker, &task.task_id);
            return Err(e);
        }

        tracing::debug!(
            "Sent task {} ({} bytes) to {} at {}",
            task.task_id,
            encoded.len(),
            worker.id,
            worker.addr
        );

        let outcome = self.pending.wait(&task.task_id, rx, direct_deadline).await;
        self.settle(worker, &task.task_id, outcome)
    }

    /// Streams `task` as metadata plus fixed-size chunks.
    pub async fn send_chunked(
        &self,
        worker: &WorkerRecord,
        task: SlaveTask,
        deadline: Duration,
    ) -> Result<String> {
        let text_length = task.text.chars().count();
        if text_length > self.config.max_chunked_chars {
            tracing::warn!(
                "Task {} has {} chars, above the chunked limit of {}",
                task.task_id,
                text_length,
                self.config.max_chunked_chars
            );
            self.registry.release(&worker.id);
            return Err(ClusterError::PayloadTooLarge {
                len: text_length,
                limit: self.config.max_chunked_chars,
            });
        }

        let chunks = split_into_chunks(&task.text, self.config.chunk_chars);
        let total_chunks = chunks.len();
        let rx = self.register_or_release(worker, &task.task_id)?;

        let metadata = WireMessage::TaskStart(ChunkMetadata {
            task_id: task.task_id.clone(),
            ratio: task.ratio,
            file_name: task.file_name.clone(),
            total_chunks,
            chunk_size: self.config.chunk_chars,
            text_length,
            master_callback_port: task.master_callback_port,
        });

        if let Err(e) = self.send_message(&metadata, worker.addr).await {
            tracing::error!("Failed to announce chunked task {}: {}", task.task_id, e);
            self.abort(worker, &task.task_id);
            return Err(e);
        }

        tracing::info!(
            "Announced chunked task {} to {}: {} chunks, {} chars",
            task.task_id,
            worker.id,
            total_chunks,
            text_length
        );

        tokio::time::sleep(self.config.metadata_settle).await;

        for (chunk_index, data) in chunks.into_iter().enumerate() {
            let chunk = WireMessage::TaskChunk(TaskChunk {
                task_id: task.task_id.clone(),
                chunk_index,
                data: data.to_string(),
                is_last_chunk: chunk_index + 1 == total_chunks,
            });

            if let Err(e) = self.send_message(&chunk, worker.addr).await {
                tracing::error!(
                    "Chunk {}/{} of task {} could not be sent: {}",
                    chunk_index + 1,
                    total_chunks,
                    task.task_id,
                    e
                );
                self.abort(worker, &task.task_id);
                return Err(e);
            }

            tracing::debug!(
                "Sent chunk {}/{} of task {}",
                chunk_index + 1,
                total_chunks,
                task.task_id
            );

            if chunk_index + 1 < total_chunks {
                tokio::time::sleep(self.config.chunk_spacing).await;
            }
        }

        let outcome = self.pending.wait(&task.task_id, rx, deadline).await;
        self.settle(worker, &task.task_id, outcome)
    }

    fn register_or_release(
        &self,
        worker: &WorkerRecord,
        task_id: &TaskId,
    ) -> Result<tokio::sync::oneshot::Receiver<TaskOutcome>> {
        self.pending.register(task_id).inspect_err(|_| {
            tracing::error!("Task {} is already pending, refusing dispatch", task_id);
            self.registry.release(&worker.id);
        })
    }

    fn abort(&self, worker: &WorkerRecord, task_id: &TaskId) {
        self.pending.discard(task_id);
        self.registry.release(&worker.id);
    }

    fn settle(&self, worker: &WorkerRecord, task_id: &TaskId, outcome: TaskOutcome) -> TaskOutcome {
        if let Err(e) = &outcome {
            if e.is_transient() {
                tracing::warn!("Task {} on {} did not succeed: {}", task_id, worker.id, e);
            } else {
                tracing::error!("Task {} on {} failed: {}", task_id, worker.id, e);
            }
            self.registry.release(&worker.id);
        }
        outcome
    }

    async fn send_message(&self, message: &WireMessage, addr: SocketAddr) -> Result<()> {
        let encoded = message.encode()?;
        self.send_with_retry(encoded.as_bytes(), addr).await
    }

    /// Up to `send_attempts` sends with doubling backoff (150ms, capped at
    /// 1200ms) plus jitter.
    async fn send_with_retry(&self, bytes: &[u8], addr: SocketAddr) -> Result<()> {
        let attempts = self.config.send_attempts.max(1);
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            match self.socket.send_to(bytes, addr).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(ClusterError::Transport(e));
                    }
                    tracing::debug!("Send to {} failed (attempt {}): {}", addr, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(ClusterError::protocol("retry attempts exhausted"))
    }
}
