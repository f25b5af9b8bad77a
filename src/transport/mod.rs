//! Task Transport Module
//!
//! Moves work from the coordinator to workers over UDP and routes results back
//! to the dispatcher that is waiting for them.
//!
//! ## Core Mechanisms
//! - **Tagged Datagrams**: `<TAG>:<payload>` text framing with JSON payloads for structured messages (`wire`).
//! - **Fragmentation**: Payloads above the 65,507-byte datagram limit are split into 8,000-char chunks and streamed after a metadata announcement (`chunking`, `sender`).
//! - **Pending Futures**: Each dispatch parks on a oneshot channel held in a concurrent table and races it against a deadline (`pending`).

pub mod chunking;
pub mod pending;
pub mod sender;
pub mod types;
pub mod wire;
