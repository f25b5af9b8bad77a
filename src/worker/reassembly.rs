//! Chunk Reassembly
//!
//! Collects `TASK_CHUNK`s for announced tasks. Each task lives in its own
//! `DashMap` entry, so concurrent chunks of one task serialize on that entry's
//! lock while different tasks proceed in parallel.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{Assembled, ChunkAccept, ReassemblyState};
use crate::error::{ClusterError, Result};
use crate::transport::types::{ChunkMetadata, TaskChunk, TaskId};

#[derive(Default)]
pub struct ChunkAssembler {
    states: DashMap<TaskId, ReassemblyState>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the buffer for an announced task. A repeated announcement
    /// keeps the buffer that is already filling.
    pub fn begin(&self, metadata: ChunkMetadata, reply_to: SocketAddr) -> Result<()> {
        if metadata.total_chunks == 0 {
            return Err(ClusterError::validation(format!(
                "task {} announced zero chunks",
                metadata.task_id
            )));
        }

        match self.states.entry(metadata.task_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!("Repeated TASK_START for {}, keeping buffer", metadata.task_id);
            }
            Entry::Vacant(slot) => {
                tracing::info!(
                    "Expecting {} chunks ({} chars) for task {}",
                    metadata.total_chunks,
                    metadata.text_length,
                    metadata.task_id
                );
                slot.insert(ReassemblyState::new(metadata, reply_to));
            }
        }

        Ok(())
    }

    /// Stores a chunk. Returns `Finalize` exactly once per task: when the
    /// last slot fills or the chunk flagged as last arrives, whichever is
    /// first.
    pub fn accept_chunk(&self, chunk: TaskChunk, src: SocketAddr) -> ChunkAccept {
        let Some(mut state) = self.states.get_mut(&chunk.task_id) else {
            return ChunkAccept::UnknownTask;
        };

        if chunk.chunk_index >= state.chunks.len() {
            return ChunkAccept::OutOfRange;
        }

        state.last_activity = Instant::now();
        state.reply_to = SocketAddr::new(src.ip(), state.reply_to.port());

        let index = chunk.chunk_index;
        let stored = state.chunks[index].is_none();
        if stored {
            state.chunks[index] = Some(chunk.data);
            state.received += 1;
        }

        if !state.finalizing && (state.is_complete() || chunk.is_last_chunk) {
            state.finalizing = true;
            return ChunkAccept::Finalize;
        }

        if stored {
            ChunkAccept::Stored
        } else {
            ChunkAccept::Duplicate
        }
    }

    pub fn is_complete(&self, task_id: &TaskId) -> bool {
        self.states
            .get(task_id)
            .is_some_and(|state| state.is_complete())
    }

    /// Removes the task and returns either its text in index order or the
    /// list of missing chunk indexes.
    pub fn take(&self, task_id: &TaskId) -> Option<Assembled> {
        let (_, state) = self.states.remove(task_id)?;

        if !state.is_complete() {
            return Some(Assembled::Incomplete {
                missing: state.missing(),
                metadata: state.metadata,
                reply_to: state.reply_to,
            });
        }

        let text: String = state.chunks.into_iter().flatten().collect();
        Some(Assembled::Complete {
            metadata: state.metadata,
            text,
            reply_to: state.reply_to,
        })
    }

    /// Drops buffers that saw no chunk for `max_idle`.
    pub fn sweep_stalled(&self, max_idle: Duration) -> Vec<TaskId> {
        let now = Instant::now();
        let mut removed = Vec::new();

        self.states.retain(|task_id, state| {
            let keep = now.saturating_duration_since(state.last_activity) < max_idle;
            if !keep {
                tracing::warn!(
                    "Dropping stalled task {} ({}/{} chunks received)",
                    task_id,
                    state.received,
                    state.chunks.len()
                );
                removed.push(task_id.clone());
            }
            keep
        });

        removed
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
