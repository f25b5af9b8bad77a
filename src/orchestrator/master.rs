//! Coordinator Node
//!
//! Owns the two coordinator sockets and the background loops around the
//! `TaskDistributor`.
//!
//! ## Core Mechanisms
//! - **Registration Socket** (default 6000): `REGISTER`, `HEARTBEAT` and `TASK_COMPLETE` come in here; tasks go out from here.
//! - **Result Socket** (default 6001): `TASK_RESULT`s come in here.
//! - **Background Loops**: one receive loop per socket, the membership sweep and a periodic status report.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use super::distributor::TaskDistributor;
use super::types::{ClusterStatus, SummaryOutcome};
use crate::config::MasterConfig;
use crate::error::Result;
use crate::membership::service::WorkerRegistry;
use crate::summarizer::Summarizer;
use crate::transport::pending::PendingTasks;
use crate::transport::sender::TaskSender;
use crate::transport::wire::WireMessage;

const RECEIVE_BUFFER: usize = 65_536;

pub struct MasterNode {
    config: MasterConfig,
    registration_socket: Arc<UdpSocket>,
    result_socket: Arc<UdpSocket>,
    registry: Arc<WorkerRegistry>,
    distributor: Arc<TaskDistributor>,
}

impl MasterNode {
    pub async fn bind(
        config: MasterConfig,
        summarizer: Arc<dyn Summarizer>,
    ) -> anyhow::Result<Arc<Self>> {
        let registration_socket = UdpSocket::bind(config.registration_addr())
            .await
            .with_context(|| format!("binding registration port {}", config.registration_addr()))?;
        let result_socket = UdpSocket::bind(config.result_addr())
            .await
            .with_context(|| format!("binding result port {}", config.result_addr()))?;

        let registration_socket = Arc::new(registration_socket);
        let result_socket = Arc::new(result_socket);
        let result_port = result_socket.local_addr()?.port();

        let registry = Arc::new(WorkerRegistry::new(config.membership.clone()));
        let sender = TaskSender::new(
            registration_socket.clone(),
            registry.clone(),
            Arc::new(PendingTasks::new()),
            config.transport.clone(),
            result_port,
        );
        let distributor = Arc::new(TaskDistributor::new(
            sender,
            summarizer,
            config.orchestrator.clone(),
        ));

        tracing::info!(
            "Coordinator listening on {} (registration) and {} (results)",
            registration_socket.local_addr()?,
            result_socket.local_addr()?
        );

        Ok(Arc::new(Self {
            config,
            registration_socket,
            result_socket,
            registry,
            distributor,
        }))
    }

    pub fn registration_addr(&self) -> std::io::Result<SocketAddr> {
        self.registration_socket.local_addr()
    }

    pub fn result_addr(&self) -> std::io::Result<SocketAddr> {
        self.result_socket.local_addr()
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn distributor(&self) -> &Arc<TaskDistributor> {
        &self.distributor
    }

    pub async fn summarize(&self, text: &str, ratio: f32, file_name: &str) -> Result<SummaryOutcome> {
        self.distributor.distribute(text, ratio, file_name).await
    }

    pub async fn summarize_local(
        &self,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> Result<SummaryOutcome> {
        self.distributor.distribute_local(text, ratio, file_name).await
    }

    pub fn status(&self) -> ClusterStatus {
        self.distributor.status()
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!("Starting coordinator...");

        let _registration_handle = {
            let node = self.clone();
            let socket = self.registration_socket.clone();
            tokio::spawn(async move {
                node.receive_loop(socket, "registration").await;
            })
        };

        let _result_handle = {
            let node = self.clone();
            let socket = self.result_socket.clone();
            tokio::spawn(async move {
                node.receive_loop(socket, "result").await;
            })
        };

        let _sweep_handle = {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                registry.run_sweep_loop().await;
            })
        };

        let _status_handle = {
            let node = self.clone();
            tokio::spawn(async move {
                node.status_loop().await;
            })
        };

        tracing::info!("All background tasks started");
    }

    async fn receive_loop(self: Arc<Self>, socket: Arc<UdpSocket>, name: &'static str) {
        let mut buf = vec![0u8; RECEIVE_BUFFER];

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, src)) => match WireMessage::decode(&buf[..len]) {
                    Ok(message) => self.handle_message(message, src),
                    Err(e) => {
                        tracing::warn!("Failed to decode datagram from {} on {} socket: {}", src, name, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet on {} socket: {}", name, e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Never awaits: results resolve oneshot channels, everything else is
    /// a registry update.
    fn handle_message(&self, message: WireMessage, src: SocketAddr) {
        match message {
            WireMessage::Register { worker_id, port } => {
                self.registry.register_or_refresh(worker_id, src.ip(), port);
            }
            WireMessage::Heartbeat { worker_id } => {
                tracing::debug!("Heartbeat from {}", worker_id);
                self.registry.heartbeat(&worker_id);
            }
            WireMessage::TaskResult(report) => {
                self.distributor.resolve_result(report);
            }
            WireMessage::TaskComplete { worker_id, task_id } => {
                self.distributor.resolve_completion_notice(&worker_id, &task_id);
            }
            other => {
                tracing::warn!("Discarding {} message from {}", other.tag(), src);
            }
        }
    }

    async fn status_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.status_interval);
        interval.tick().await;

        loop {
            interval.tick().await;
            let status = self.status();
            tracing::info!(
                "Cluster: {} worker(s), {} active, {} pending, {} processed, {} split in flight, {} task(s) timed",
                status.workers.len(),
                status.active_workers,
                status.pending_tasks,
                status.tasks_processed,
                status.distributed_tasks,
                self.distributor.in_flight()
            );
        }
    }
}
