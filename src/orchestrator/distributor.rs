//! Task Distributor
//!
//! Decides where each summarization job runs and turns whatever comes back
//! into a final summary.
//!
//! ## Responsibilities
//! - **Routing**: Long inputs (over 20,000 chars) with at least two active workers are split; everything else goes to one worker; with no worker the job runs locally.
//! - **Single-Thread Mode**: `distribute_local` skips the cluster entirely and times a local run.
//! - **Merging**: Part results are joined in order and summarized once more when still longer than half the input.
//! - **Degradation**: Any remote failure ends in a local summary. Only invalid input is returned as an error.
//! - **Result Routing**: Incoming `TASK_RESULT`s resolve pending dispatches; late ones are attached to their split-task record when it is still around.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::splitter::split_for_distribution;
use super::types::{ClusterStatus, DistributedTask, ProcessingMode, SubTask, SummaryOutcome};
use crate::config::OrchestratorConfig;
use crate::error::{ClusterError, Result};
use crate::membership::service::WorkerRegistry;
use crate::membership::types::WorkerId;
use crate::summarizer::Summarizer;
use crate::transport::sender::TaskSender;
use crate::transport::types::{TaskId, TaskReport};

pub struct TaskDistributor {
    registry: Arc<WorkerRegistry>,
    sender: TaskSender,
    summarizer: Arc<dyn Summarizer>,
    config: OrchestratorConfig,
    distributed: DashMap<TaskId, DistributedTask>,
    started: DashMap<TaskId, Instant>,
    tasks_processed: AtomicU64,
}

impl TaskDistributor {
    pub fn new(
        sender: TaskSender,
        summarizer: Arc<dyn Summarizer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry: sender.registry().clone(),
            sender,
            summarizer,
            config,
            distributed: DashMap::new(),
            started: DashMap::new(),
            tasks_processed: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Summarizes `text` on the cluster, falling back to local processing
    /// whenever the remote path cannot deliver.
    pub async fn distribute(
        &self,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> Result<SummaryOutcome> {
        self.process(text, ratio, file_name, false).await
    }

    /// Summarizes `text` on the coordinator alone. The registry is never
    /// consulted, so no worker slot is taken.
    pub async fn distribute_local(
        &self,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> Result<SummaryOutcome> {
        self.process(text, ratio, file_name, true).await
    }

    async fn process(
        &self,
        text: &str,
        ratio: f32,
        file_name: &str,
        single_thread: bool,
    ) -> Result<SummaryOutcome> {
        if text.trim().is_empty() {
            return Err(ClusterError::validation("text is empty"));
        }
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ClusterError::validation(format!(
                "ratio {ratio} is outside (0, 1]"
            )));
        }

        let task_id = TaskId::new();
        let started_at = Instant::now();
        self.started.insert(task_id.clone(), started_at);

        let original_length = text.chars().count();
        let active = self.registry.active_count();

        tracing::info!(
            "Task {} ({}): {} chars, ratio {}, {} active worker(s)",
            task_id,
            file_name,
            original_length,
            ratio,
            active
        );

        let (summary, mode) = if single_thread {
            (self.summarize_local(text, ratio).await, ProcessingMode::SingleThread)
        } else if original_length > self.config.split_threshold
            && active >= self.config.min_split_workers
        {
            self.run_split(&task_id, text, ratio, file_name).await
        } else {
            self.run_direct(&task_id, text, ratio, file_name).await
        };

        let started_at = self
            .started
            .remove(&task_id)
            .map(|(_, at)| at)
            .unwrap_or(started_at);

        let summary_length = summary.chars().count();
        let outcome = SummaryOutcome {
            compression_ratio: SummaryOutcome::compression(original_length, summary_length),
            task_id,
            summary,
            original_length,
            summary_length,
            mode,
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "Task {} done via {:?}: {} -> {} chars ({:.0}% compression) in {}ms",
            outcome.task_id,
            outcome.mode,
            outcome.original_length,
            outcome.summary_length,
            outcome.compression_ratio * 100.0,
            outcome.elapsed_ms
        );

        Ok(outcome)
    }

    async fn run_direct(
        &self,
        task_id: &TaskId,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> (String, ProcessingMode) {
        let Some(worker) = self.registry.select_one() else {
            tracing::info!("No active worker, summarizing {} locally", task_id);
            return (self.summarize_local(text, ratio).await, ProcessingMode::Local);
        };

        match self
            .sender
            .send_direct(&worker, task_id.clone(), text, ratio, file_name)
            .await
        {
            Ok(summary) => (summary, ProcessingMode::Direct { worker: worker.id }),
            Err(e) => {
                tracing::warn!("Task {} on {} failed ({}), falling back", task_id, worker.id, e);
                (self.summarize_local(text, ratio).await, ProcessingMode::Local)
            }
        }
    }

    async fn run_split(
        &self,
        task_id: &TaskId,
        text: &str,
        ratio: f32,
        file_name: &str,
    ) -> (String, ProcessingMode) {
        let parts = split_for_distribution(
            text,
            self.config.max_part_chars,
            self.config.max_parts,
            self.config.merge_factor,
        );
        let part_count = parts.len();

        let workers = self.registry.select_many(part_count);
        if workers.is_empty() {
            tracing::warn!("No workers left for split task {}, summarizing locally", task_id);
            return (self.summarize_local(text, ratio).await, ProcessingMode::Local);
        }

        let part_ratio = (ratio * self.config.part_ratio_boost).min(self.config.part_ratio_cap);
        tracing::info!(
            "Split task {} into {} parts over {} worker(s), part ratio {:.2}",
            task_id,
            part_count,
            workers.len(),
            part_ratio
        );

        let mut record = DistributedTask {
            task_id: task_id.clone(),
            ratio,
            file_name: file_name.to_string(),
            created_at: Instant::now(),
            sub_tasks: Vec::with_capacity(part_count),
        };
        let mut dispatches = Vec::with_capacity(part_count);

        for (index, part) in parts.into_iter().enumerate() {
            let worker = workers[index % workers.len()].clone();
            let sub_id = task_id.part(index);

            // The first pass over `workers` is already charged by `select_many`.
            let charged = index < workers.len() || self.registry.acquire(&worker.id);

            record.sub_tasks.push(SubTask {
                task_id: sub_id.clone(),
                worker_id: worker.id.clone(),
                text: part.clone(),
                index,
                processed: false,
                result: None,
            });

            if charged {
                self.started.insert(sub_id.clone(), Instant::now());
                dispatches.push((index, worker, sub_id, part));
            } else {
                tracing::warn!("Worker {} went inactive, part {} skipped", worker.id, index);
            }
        }

        self.distributed.insert(task_id.clone(), record);

        let mut set = JoinSet::new();
        for (index, worker, sub_id, part) in dispatches {
            let sender = self.sender.clone();
            let file_name = file_name.to_string();
            set.spawn(async move {
                let outcome = sender
                    .send_sub_task(&worker, sub_id, &part, part_ratio, &file_name)
                    .await;
                (index, outcome)
            });
        }

        let mut results: Vec<Option<String>> = vec![None; part_count];
        let deadline = tokio::time::sleep(self.config.merge_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((index, Ok(summary)))) => {
                        let elapsed = self.part_elapsed(task_id, index);
                        tracing::debug!("Part {} of {} done in {:?}", index, task_id, elapsed);
                        self.mark_processed(task_id, index, &summary);
                        results[index] = Some(summary);
                    }
                    Some(Ok((index, Err(e)))) => {
                        let elapsed = self.part_elapsed(task_id, index);
                        tracing::warn!(
                            "Part {} of {} failed after {:?}: {}",
                            index,
                            task_id,
                            elapsed,
                            e
                        );
                    }
                    Some(Err(e)) => {
                        tracing::error!("Part dispatch of {} aborted: {}", task_id, e);
                    }
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        "Split task {} missed the {:?} deadline, summarizing locally",
                        task_id,
                        self.config.merge_deadline
                    );
                    // Dispatches finish on their own and release their slots.
                    set.detach_all();
                    self.clear_parts(task_id, part_count);
                    self.distributed.remove(task_id);
                    return (self.summarize_local(text, ratio).await, ProcessingMode::Local);
                }
            }
        }

        self.clear_parts(task_id, part_count);
        let record = self.distributed.remove(task_id).map(|(_, record)| record);
        if let Some(record) = &record {
            for sub in &record.sub_tasks {
                if results[sub.index].is_none()
                    && let Some(late) = sub.result.as_ref().filter(|s| !s.is_empty())
                {
                    tracing::info!("Using late result for {}", sub.task_id);
                    results[sub.index] = Some(late.clone());
                }
            }
        }

        let valid: Vec<String> = results
            .into_iter()
            .flatten()
            .filter(|summary| !summary.trim().is_empty())
            .collect();
        let failed = part_count - valid.len();

        if valid.is_empty() {
            tracing::warn!("Every part of {} failed, summarizing locally", task_id);
            return (self.summarize_local(text, ratio).await, ProcessingMode::Local);
        }

        tracing::info!(
            "Split task {}: {}/{} parts succeeded",
            task_id,
            valid.len(),
            part_count
        );

        let combined = valid.join(" ");
        let combined_chars = combined.chars().count();
        let original_chars = text.chars().count();

        let summary = if failed > 0 {
            tracing::info!("Summarizing partial combination of {}", task_id);
            self.summarize_local(&combined, ratio).await
        } else if combined_chars as f64 > original_chars as f64 * 0.5 {
            self.summarize_local(&combined, ratio).await
        } else {
            combined
        };

        let mode = ProcessingMode::Distributed {
            parts: part_count,
            workers: workers.into_iter().map(|w| w.id).collect(),
        };
        (summary, mode)
    }

    fn part_elapsed(&self, task_id: &TaskId, index: usize) -> Option<Duration> {
        self.started
            .remove(&task_id.part(index))
            .map(|(_, at)| at.elapsed())
    }

    fn clear_parts(&self, task_id: &TaskId, part_count: usize) {
        for index in 0..part_count {
            self.started.remove(&task_id.part(index));
        }
    }

    fn mark_processed(&self, task_id: &TaskId, index: usize, summary: &str) {
        if let Some(mut record) = self.distributed.get_mut(task_id)
            && let Some(sub) = record.sub_tasks.get_mut(index)
        {
            sub.processed = true;
            sub.result = Some(summary.to_string());
        }
    }

    async fn summarize_local(&self, text: &str, ratio: f32) -> String {
        let summarizer = self.summarizer.clone();
        let text = text.to_string();
        match tokio::task::spawn_blocking(move || summarizer.summarize(&text, ratio)).await {
            Ok(summary) => summary,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::error!("Local summarization was cancelled: {}", e);
                String::new()
            }
        }
    }

    /// Routes a `TASK_RESULT` to its waiting dispatcher.
    pub fn resolve_result(&self, report: TaskReport) {
        let task_id = report.task_id.clone();

        let resolved = if report.success {
            let resolved = self
                .sender
                .pending()
                .resolve(&task_id, Ok(report.summary.clone()));
            if resolved {
                self.tasks_processed.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Result received for task {}", task_id);
            }
            resolved
        } else {
            let resolved = self.sender.pending().resolve(
                &task_id,
                Err(ClusterError::WorkerFailed {
                    task_id: task_id.clone(),
                    reason: "worker reported failure".into(),
                }),
            );
            if resolved {
                tracing::warn!("Worker reported failure for task {}", task_id);
            }
            resolved
        };

        if !resolved {
            tracing::warn!(
                "Orphaned result for task {}: already completed or timed out",
                task_id
            );
            if report.success {
                self.attach_orphan(&task_id, report.summary);
            }
        }
    }

    fn attach_orphan(&self, task_id: &TaskId, summary: String) {
        for mut record in self.distributed.iter_mut() {
            if let Some(sub) = record.sub_tasks.iter_mut().find(|s| &s.task_id == task_id) {
                sub.processed = true;
                sub.result = Some(summary);
                tracing::info!("Attached orphan {} to split task {}", task_id, record.task_id);
                return;
            }
        }
    }

    /// Handles `TASK_COMPLETE`: the worker is done, release its slot.
    pub fn resolve_completion_notice(&self, worker_id: &WorkerId, task_id: &TaskId) {
        tracing::debug!("Worker {} completed {}", worker_id, task_id);
        self.registry.release(worker_id);
    }

    pub fn status(&self) -> ClusterStatus {
        ClusterStatus {
            pending_tasks: self.sender.pending().len(),
            tasks_processed: self.tasks_processed.load(Ordering::Relaxed),
            distributed_tasks: self.distributed.len(),
            active_workers: self.registry.active_count(),
            workers: self.registry.snapshot(),
        }
    }

    /// Requests and split parts currently being timed.
    pub fn in_flight(&self) -> usize {
        self.started.len()
    }

    #[cfg(test)]
    pub(crate) fn track(&self, record: DistributedTask) {
        self.distributed.insert(record.task_id.clone(), record);
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self, task_id: &TaskId) -> Option<DistributedTask> {
        self.distributed.get(task_id).map(|r| r.clone())
    }
}
