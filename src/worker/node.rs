//! Worker Node
//!
//! A stateless executor: it registers with the coordinator, keeps its
//! heartbeat going, and turns every `TASK` (or reassembled chunked task) into
//! a `TASK_RESULT`. Successful tasks are followed by a `TASK_COMPLETE` notice
//! on the coordinator's registration port so it can release the slot.
//!
//! ## Responsibilities
//! - **Port Selection**: Binds the first free port of the configured range and advertises it in `REGISTER`.
//! - **Receive Loop**: Decodes datagrams and hands work to spawned tasks; it never blocks on summarization.
//! - **Finalization**: Waits a bounded time for straggling chunks and reports failure if any index is still missing.
//! - **Stall Sweep**: Drops reassembly buffers that stopped receiving chunks.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use super::reassembly::ChunkAssembler;
use super::types::{Assembled, ChunkAccept};
use crate::config::WorkerConfig;
use crate::error::{ClusterError, Result};
use crate::membership::types::WorkerId;
use crate::summarizer::Summarizer;
use crate::transport::types::{SlaveTask, TaskId, TaskReport};
use crate::transport::wire::WireMessage;

const RECEIVE_BUFFER: usize = 65_536;

pub struct SlaveNode {
    id: WorkerId,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    config: WorkerConfig,
    assembler: ChunkAssembler,
    summarizer: Arc<dyn Summarizer>,
}

impl SlaveNode {
    /// Binds the first free port of `config.port_range`.
    pub async fn bind(
        config: WorkerConfig,
        summarizer: Arc<dyn Summarizer>,
    ) -> anyhow::Result<Arc<Self>> {
        let mut last_err = None;
        let mut bound = None;

        for port in config.port_range.clone() {
            match UdpSocket::bind(SocketAddr::new(config.bind_ip, port)).await {
                Ok(socket) => {
                    bound = Some(socket);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        let socket = match (bound, last_err) {
            (Some(socket), _) => socket,
            (None, Some(e)) => {
                return Err(e).with_context(|| {
                    format!("no free port in {:?}", config.port_range)
                });
            }
            (None, None) => anyhow::bail!("empty port range {:?}", config.port_range),
        };

        let local_addr = socket.local_addr()?;
        let id = WorkerId::new();
        tracing::info!("Worker {} listening on {}", id, local_addr);

        Ok(Arc::new(Self {
            id,
            socket: Arc::new(socket),
            local_addr,
            config,
            assembler: ChunkAssembler::new(),
            summarizer,
        }))
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn pending_reassemblies(&self) -> usize {
        self.assembler.len()
    }

    /// Registers with the coordinator and spawns the background loops.
    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting worker {}...", self.id);

        if let Err(e) = self.register().await {
            tracing::error!("Registration with {} failed: {}", self.config.master_addr, e);
        }

        let _receive_handle = {
            let node = self.clone();
            tokio::spawn(async move {
                node.receive_loop().await;
            })
        };

        let _heartbeat_handle = {
            let node = self.clone();
            tokio::spawn(async move {
                node.heartbeat_loop().await;
            })
        };

        let _sweep_handle = {
            let node = self.clone();
            tokio::spawn(async move {
                node.stall_sweep_loop().await;
            })
        };

        tracing::info!("All worker tasks started");
    }

    pub async fn register(&self) -> Result<()> {
        let message = WireMessage::Register {
            worker_id: self.id.clone(),
            port: self.local_addr.port(),
        };
        self.send(&message, self.config.master_addr).await?;
        tracing::info!("Registered with coordinator at {}", self.config.master_addr);
        Ok(())
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        let message = WireMessage::Heartbeat {
            worker_id: self.id.clone(),
        };

        loop {
            interval.tick().await;
            match self.send(&message, self.config.master_addr).await {
                Ok(()) => tracing::debug!("Heartbeat sent"),
                Err(e) => tracing::warn!("Heartbeat failed: {}", e),
            }
        }
    }

    async fn stall_sweep_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.stall_sweep_interval);

        loop {
            interval.tick().await;
            let removed = self.assembler.sweep_stalled(self.config.stall_timeout);
            if !removed.is_empty() {
                tracing::info!("Stall sweep dropped {} task(s)", removed.len());
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; RECEIVE_BUFFER];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match WireMessage::decode(&buf[..len]) {
                    Ok(message) => self.handle_message(message, src).await,
                    Err(e) => {
                        tracing::warn!("Failed to decode datagram from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, message: WireMessage, src: SocketAddr) {
        match message {
            WireMessage::Task(task) => {
                tracing::info!(
                    "Received task {} ({} chars)",
                    task.task_id,
                    task.text.chars().count()
                );
                let node = self.clone();
                tokio::spawn(async move {
                    node.process_direct(task, src).await;
                });
            }

            WireMessage::TaskStart(metadata) => {
                let reply_to = self.reply_addr(src, metadata.master_callback_port);
                let task_id = metadata.task_id.clone();
                let file_name = metadata.file_name.clone();
                if let Err(e) = self.assembler.begin(metadata, reply_to) {
                    tracing::warn!("Rejected chunked task {}: {}", task_id, e);
                    self.report(TaskReport::failure(task_id, file_name), reply_to)
                        .await;
                }
            }

            WireMessage::TaskChunk(chunk) => {
                let task_id = chunk.task_id.clone();
                let index = chunk.chunk_index;
                match self.assembler.accept_chunk(chunk, src) {
                    ChunkAccept::Stored => tracing::debug!("Stored chunk {} of {}", index, task_id),
                    ChunkAccept::Duplicate => {
                        tracing::debug!("Duplicate chunk {} of {}", index, task_id)
                    }
                    ChunkAccept::OutOfRange => {
                        tracing::warn!("Chunk index {} out of range for {}", index, task_id)
                    }
                    ChunkAccept::UnknownTask => {
                        tracing::warn!("Chunk {} for unknown task {}", index, task_id)
                    }
                    ChunkAccept::Finalize => {
                        let node = self.clone();
                        tokio::spawn(async move {
                            node.finalize(task_id).await;
                        });
                    }
                }
            }

            other => {
                tracing::warn!("Ignoring {} message from {}", other.tag(), src);
            }
        }
    }

    fn reply_addr(&self, src: SocketAddr, callback_port: u16) -> SocketAddr {
        let port = if callback_port == 0 {
            self.config.result_port
        } else {
            callback_port
        };
        SocketAddr::new(src.ip(), port)
    }

    async fn process_direct(&self, task: SlaveTask, src: SocketAddr) {
        let reply_to = self.reply_addr(src, task.master_callback_port);

        if task.text.trim().is_empty() || !(task.ratio > 0.0 && task.ratio <= 1.0) {
            tracing::warn!(
                "Task {} is invalid (empty text or ratio {})",
                task.task_id,
                task.ratio
            );
            self.report(TaskReport::failure(task.task_id, task.file_name), reply_to)
                .await;
            return;
        }

        self.complete(task.task_id, task.file_name, task.text, task.ratio, reply_to)
            .await;
    }

    /// Waits (bounded) for the task's missing chunks, then summarizes the
    /// assembled text or reports failure.
    async fn finalize(&self, task_id: TaskId) {
        if !self.assembler.is_complete(&task_id) {
            let deadline = Instant::now() + self.config.finalize_grace;
            while Instant::now() < deadline && !self.assembler.is_complete(&task_id) {
                tokio::time::sleep(self.config.finalize_poll).await;
            }
        }

        match self.assembler.take(&task_id) {
            None => tracing::warn!("Task {} vanished before finalization", task_id),
            Some(Assembled::Incomplete {
                metadata,
                missing,
                reply_to,
            }) => {
                tracing::error!(
                    "Task {} is missing {} of {} chunks: {:?}",
                    task_id,
                    missing.len(),
                    metadata.total_chunks,
                    missing
                );
                self.report(TaskReport::failure(task_id, metadata.file_name), reply_to)
                    .await;
            }
            Some(Assembled::Complete {
                metadata,
                text,
                reply_to,
            }) => {
                tracing::info!(
                    "Reassembled task {}: {} chars (declared {})",
                    task_id,
                    text.chars().count(),
                    metadata.text_length
                );
                self.complete(task_id, metadata.file_name, text, metadata.ratio, reply_to)
                    .await;
            }
        }
    }

    async fn complete(
        &self,
        task_id: TaskId,
        file_name: String,
        text: String,
        ratio: f32,
        reply_to: SocketAddr,
    ) {
        let report = match self.summarize(&task_id, text, ratio).await {
            Ok(summary) => TaskReport::success(task_id.clone(), summary, file_name),
            Err(e) => {
                tracing::error!("Summarization of {} failed: {}", task_id, e);
                TaskReport::failure(task_id.clone(), file_name)
            }
        };

        if self.report(report, reply_to).await {
            self.send_completion(&task_id).await;
        }
    }

    async fn summarize(&self, task_id: &TaskId, text: String, ratio: f32) -> Result<String> {
        let summarizer = self.summarizer.clone();
        let summary = tokio::task::spawn_blocking(move || summarizer.summarize(&text, ratio))
            .await
            .map_err(|e| ClusterError::WorkerFailed {
                task_id: task_id.clone(),
                reason: e.to_string(),
            })?;

        if summary.trim().is_empty() {
            return Err(ClusterError::WorkerFailed {
                task_id: task_id.clone(),
                reason: "empty summary".into(),
            });
        }
        Ok(summary)
    }

    /// Sends a result. Returns `true` only when a successful report went out.
    ///
    /// A success that does not fit one datagram is downgraded to a failure.
    async fn report(&self, report: TaskReport, reply_to: SocketAddr) -> bool {
        let task_id = report.task_id.clone();
        let mut success = report.success;
        let mut message = WireMessage::TaskResult(report);

        let encoded = match message.encode() {
            Ok(encoded) if encoded.len() <= self.config.max_datagram_bytes => encoded,
            Ok(encoded) => {
                tracing::warn!(
                    "Result for {} is {} bytes, reporting failure instead",
                    task_id,
                    encoded.len()
                );
                success = false;
                if let WireMessage::TaskResult(report) = &mut message {
                    report.success = false;
                    report.summary.clear();
                }
                match message.encode() {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::error!("Failed to encode result for {}: {}", task_id, e);
                        return false;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to encode result for {}: {}", task_id, e);
                return false;
            }
        };

        match self.socket.send_to(encoded.as_bytes(), reply_to).await {
            Ok(bytes) => {
                tracing::info!(
                    "Sent {} result for {} to {} ({} bytes)",
                    if success { "success" } else { "failure" },
                    task_id,
                    reply_to,
                    bytes
                );
                success
            }
            Err(e) => {
                tracing::error!("Error sending result for {}: {}", task_id, e);
                false
            }
        }
    }

    async fn send_completion(&self, task_id: &TaskId) {
        let message = WireMessage::TaskComplete {
            worker_id: self.id.clone(),
            task_id: task_id.clone(),
        };
        if let Err(e) = self.send(&message, self.config.master_addr).await {
            tracing::error!("Error sending completion for {}: {}", task_id, e);
        }
    }

    async fn send(&self, message: &WireMessage, addr: SocketAddr) -> Result<()> {
        let encoded = message.encode()?;
        self.socket.send_to(encoded.as_bytes(), addr).await?;
        Ok(())
    }
}
