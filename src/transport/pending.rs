//! Pending-Task Table
//!
//! One entry per dispatched task that is still waiting for its result. The
//! entry owns the sending half of a oneshot channel; the dispatcher keeps the
//! receiving half and races it against a deadline.
//!
//! ## Single Resolution
//! Resolving an entry means removing it from the map and then sending on the
//! channel. Both the result path and the timeout path go through `remove`, so
//! whichever removes the entry first decides the outcome and the other one
//! becomes a no-op. A result that finds no entry is an orphan.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::sync::oneshot;

use super::types::TaskId;
use crate::error::{ClusterError, Result};

pub type TaskOutcome = Result<String>;

#[derive(Default)]
pub struct PendingTasks {
    entries: DashMap<TaskId, oneshot::Sender<TaskOutcome>>,
}

impl PendingTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry for `task_id` unless one already exists.
    pub fn register(&self, task_id: &TaskId) -> Result<oneshot::Receiver<TaskOutcome>> {
        match self.entries.entry(task_id.clone()) {
            Entry::Occupied(_) => Err(ClusterError::DuplicateTask(task_id.clone())),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Completes the entry for `task_id`. Returns `false` when no entry was
    /// waiting (late or unknown result).
    pub fn resolve(&self, task_id: &TaskId, outcome: TaskOutcome) -> bool {
        match self.entries.remove(task_id) {
            Some((_, tx)) => {
                // The waiter may already have given up; nothing left to do then.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Drops the entry without resolving it.
    pub fn discard(&self, task_id: &TaskId) -> bool {
        self.entries.remove(task_id).is_some()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.entries.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for `rx` for at most `after`.
    ///
    /// On deadline the entry is removed and a timeout returned, unless the
    /// result path removed it first, in which case its outcome is used.
    pub async fn wait(
        &self,
        task_id: &TaskId,
        mut rx: oneshot::Receiver<TaskOutcome>,
        after: Duration,
    ) -> TaskOutcome {
        match tokio::time::timeout(after, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClusterError::Abandoned(task_id.clone())),
            Err(_) => {
                if self.discard(task_id) {
                    Err(ClusterError::Timeout {
                        task_id: task_id.clone(),
                        after,
                    })
                } else {
                    rx.await
                        .unwrap_or_else(|_| Err(ClusterError::Abandoned(task_id.clone())))
                }
            }
        }
    }
}
