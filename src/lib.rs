//! Distributed Summarization Cluster Library
//!
//! A coordinator ("master") hands text-summarization work to a pool of
//! stateless workers ("slaves") over UDP, and falls back to summarizing
//! locally whenever the cluster cannot deliver. The binary (`main.rs`) runs
//! either role.
//!
//! ## Architecture Modules
//! - **`membership`**: Worker registry with heartbeat liveness and least-loaded selection.
//! - **`transport`**: Tagged datagram codec, chunked transfer of large payloads, and the pending-result table.
//! - **`orchestrator`**: Routing (direct, split or local), merging of partial results, and the coordinator node.
//! - **`worker`**: Registration, heartbeat, chunk reassembly and task execution on worker processes.
//! - **`summarizer`**: The `Summarizer` trait and the bundled TextRank implementation.
//! - **`config`** / **`error`**: Typed settings with environment overrides, and the shared error taxonomy.

pub mod config;
pub mod error;
pub mod membership;
pub mod orchestrator;
pub mod summarizer;
pub mod transport;
pub mod worker;
