//! Worker Registry
//!
//! Holds every worker the coordinator has heard from, together with the
//! number of tasks it currently owes us. All operations take one mutex so that
//! "pick the least-loaded worker" and "charge it one task" happen as a single
//! step; two concurrent dispatches can never both see the same idle worker.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::time::Instant;

use super::types::{WorkerId, WorkerRecord, WorkerSnapshot};
use crate::config::MembershipConfig;

pub struct WorkerRegistry {
    workers: Mutex<HashMap<WorkerId, WorkerRecord>>,
    config: MembershipConfig,
}

impl WorkerRegistry {
    pub fn new(config: MembershipConfig) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    /// Inserts a new worker or refreshes a known one.
    ///
    /// A refresh overwrites the address and resets the task count to zero: a
    /// worker that registers again is assumed to have restarted and dropped
    /// whatever it was doing.
    pub fn register_or_refresh(&self, worker_id: WorkerId, ip: IpAddr, port: u16) {
        let addr = SocketAddr::new(ip, port);
        let mut workers = self.workers.lock();

        match workers.get_mut(&worker_id) {
            Some(existing) => {
                tracing::info!(
                    "Worker {} re-registered at {} (dropping {} in-flight)",
                    worker_id,
                    addr,
                    existing.current_tasks
                );
                existing.addr = addr;
                existing.current_tasks = 0;
                existing.last_heartbeat = Instant::now();
            }
            None => {
                tracing::info!("Worker {} registered at {}", worker_id, addr);
                workers.insert(worker_id.clone(), WorkerRecord::new(worker_id, addr));
                tracing::info!("Cluster size now: {}", workers.len());
            }
        }
    }

    /// Refreshes the heartbeat of a known worker. Unknown ids are ignored;
    /// only `REGISTER` adds workers.
    pub fn heartbeat(&self, worker_id: &WorkerId) {
        match self.workers.lock().get_mut(worker_id) {
            Some(worker) => worker.last_heartbeat = Instant::now(),
            None => tracing::debug!("Heartbeat from unknown worker {}", worker_id),
        }
    }

    /// Picks the active worker with the fewest tasks and charges it one task.
    /// Ties are broken uniformly at random.
    pub fn select_one(&self) -> Option<WorkerRecord> {
        let now = Instant::now();
        let mut workers = self.workers.lock();

        let min_load = workers
            .values()
            .filter(|w| w.is_active(now, self.config.heartbeat_timeout))
            .map(|w| w.current_tasks)
            .min()?;

        let candidates: Vec<WorkerId> = workers
            .values()
            .filter(|w| {
                w.is_active(now, self.config.heartbeat_timeout) && w.current_tasks == min_load
            })
            .map(|w| w.id.clone())
            .collect();

        let chosen = candidates.choose(&mut rand::thread_rng())?;
        let worker = workers.get_mut(chosen)?;
        worker.current_tasks += 1;

        Some(worker.clone())
    }

    /// Picks up to `min(n, max_fan_out, active)` workers in ascending load
    /// order and charges each one task.
    pub fn select_many(&self, n: usize) -> Vec<WorkerRecord> {
        let now = Instant::now();
        let mut workers = self.workers.lock();

        let mut active: Vec<(u32, WorkerId)> = workers
            .values()
            .filter(|w| w.is_active(now, self.config.heartbeat_timeout))
            .map(|w| (w.current_tasks, w.id.clone()))
            .collect();
        active.sort_by_key(|(load, _)| *load);

        let take = n.min(self.config.max_fan_out);

        active
            .into_iter()
            .take(take)
            .filter_map(|(_, id)| {
                let worker = workers.get_mut(&id)?;
                worker.current_tasks += 1;
                Some(worker.clone())
            })
            .collect()
    }

    /// Charges one more task to a specific worker. Returns `false` when the
    /// worker is unknown or no longer active.
    pub fn acquire(&self, worker_id: &WorkerId) -> bool {
        let now = Instant::now();
        let mut workers = self.workers.lock();

        match workers.get_mut(worker_id) {
            Some(worker) if worker.is_active(now, self.config.heartbeat_timeout) => {
                worker.current_tasks += 1;
                true
            }
            _ => false,
        }
    }

    /// Releases one task slot, floored at zero.
    pub fn release(&self, worker_id: &WorkerId) {
        if let Some(worker) = self.workers.lock().get_mut(worker_id) {
            worker.current_tasks = worker.current_tasks.saturating_sub(1);
        }
    }

    pub fn is_active(&self, worker_id: &WorkerId) -> bool {
        let now = Instant::now();
        self.workers
            .lock()
            .get(worker_id)
            .is_some_and(|w| w.is_active(now, self.config.heartbeat_timeout))
    }

    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        self.workers
            .lock()
            .values()
            .filter(|w| w.is_active(now, self.config.heartbeat_timeout))
            .count()
    }

    pub fn current_tasks(&self, worker_id: &WorkerId) -> Option<u32> {
        self.workers.lock().get(worker_id).map(|w| w.current_tasks)
    }

    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every worker whose heartbeat is stale. Returns the removed ids.
    pub fn sweep_inactive(&self) -> Vec<WorkerId> {
        let now = Instant::now();
        let mut workers = self.workers.lock();

        let stale: Vec<WorkerId> = workers
            .values()
            .filter(|w| !w.is_active(now, self.config.heartbeat_timeout))
            .map(|w| w.id.clone())
            .collect();

        for id in &stale {
            if let Some(worker) = workers.remove(id) {
                tracing::warn!(
                    "Removing inactive worker {} at {} (last heartbeat {:?} ago)",
                    worker.id,
                    worker.addr,
                    now.saturating_duration_since(worker.last_heartbeat)
                );
            }
        }

        stale
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let now = Instant::now();
        let mut snapshot: Vec<WorkerSnapshot> = self
            .workers
            .lock()
            .values()
            .map(|w| WorkerSnapshot {
                id: w.id.clone(),
                addr: w.addr,
                current_tasks: w.current_tasks,
                secs_since_heartbeat: now.saturating_duration_since(w.last_heartbeat).as_secs(),
                active: w.is_active(now, self.config.heartbeat_timeout),
            })
            .collect();
        snapshot.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        snapshot
    }

    /// Runs `sweep_inactive` on the configured interval until the task is
    /// dropped.
    pub async fn run_sweep_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);

        loop {
            interval.tick().await;
            let removed = self.sweep_inactive();
            if !removed.is_empty() {
                tracing::info!(
                    "Sweep removed {} worker(s), {} remaining",
                    removed.len(),
                    self.len()
                );
            }
        }
    }
}
