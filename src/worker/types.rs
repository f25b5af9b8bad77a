use std::net::SocketAddr;
use tokio::time::Instant;

use crate::transport::types::ChunkMetadata;

/// Worker-side buffer for one chunked task.
#[derive(Debug)]
pub struct ReassemblyState {
    pub metadata: ChunkMetadata,
    /// One slot per declared chunk, filled as chunks arrive in any order.
    pub chunks: Vec<Option<String>>,
    /// Number of filled slots; never exceeds `chunks.len()`.
    pub received: usize,
    pub last_activity: Instant,
    /// Where the result goes: sender IP plus the announced callback port.
    pub reply_to: SocketAddr,
    /// Set once finalization has been scheduled.
    pub finalizing: bool,
}

impl ReassemblyState {
    pub fn new(metadata: ChunkMetadata, reply_to: SocketAddr) -> Self {
        Self {
            chunks: vec![None; metadata.total_chunks],
            metadata,
            received: 0,
            last_activity: Instant::now(),
            reply_to,
            finalizing: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.chunks.len()
    }

    pub fn missing(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// What happened to an incoming chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAccept {
    /// No metadata seen for this task (or it was already finalized).
    UnknownTask,
    OutOfRange,
    Stored,
    /// Slot was already filled; nothing changed.
    Duplicate,
    /// The chunk was handled and the caller must now schedule finalization.
    Finalize,
}

/// Result of taking a task out of the assembler.
#[derive(Debug)]
pub enum Assembled {
    Complete {
        metadata: ChunkMetadata,
        text: String,
        reply_to: SocketAddr,
    },
    Incomplete {
        metadata: ChunkMetadata,
        missing: Vec<usize>,
        reply_to: SocketAddr,
    },
}
