//! Task Orchestrator Module
//!
//! The coordinator's brain: routes each summarization request to a worker,
//! a group of workers, or local processing, and always comes back with a
//! summary unless the input itself is invalid.
//!
//! ## Submodules
//! - **`distributor`**: Routing, split/merge, fallback and result resolution.
//! - **`splitter`**: Sentence-aligned partitioning of long inputs.
//! - **`master`**: Coordinator sockets and background loops.
//! - **`types`**: Split-task records, outcomes and status views.

pub mod distributor;
pub mod master;
pub mod splitter;
pub mod types;

#[cfg(test)]
mod tests;
