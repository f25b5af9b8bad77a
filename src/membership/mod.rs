//! Membership & Load Balancing Module
//!
//! Tracks the workers known to the coordinator, decides which of them are
//! alive, and hands out the least-loaded ones for new work.
//!
//! ## Core Mechanisms
//! - **Registration**: Workers announce themselves with `REGISTER:<id>:<port>`; a repeat registration refreshes the record and resets its load.
//! - **Heartbeat Liveness**: A worker is active while its last heartbeat is younger than the configured timeout (30s). There is no unregister message.
//! - **Sweeping**: A background loop removes stale workers outright every 15s.
//! - **Load Accounting**: Every dispatched task charges one slot; completion, timeout and failed dispatch each release exactly one.

pub mod service;
pub mod types;
