//! Node Configuration
//!
//! Typed settings for the coordinator and the workers. Every struct carries
//! the protocol defaults in its `Default` impl; the node-level configs can be
//! overridden from `SUMMARY_*` environment variables and, in the binary, from
//! command-line flags.

use anyhow::{Context, Result};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_REGISTRATION_PORT: u16 = 6000;
pub const DEFAULT_RESULT_PORT: u16 = 6001;
pub const DEFAULT_WORKER_PORTS: RangeInclusive<u16> = 7000..=7100;

/// Liveness and fan-out policy of the worker registry.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// A worker is active while its last heartbeat is younger than this.
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
    /// Upper bound on workers handed out by a single `select_many`.
    pub max_fan_out: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(15),
            max_fan_out: 3,
        }
    }
}

/// Datagram limits, chunking and per-dispatch deadlines.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest payload that fits a single UDP datagram over IPv4.
    pub max_datagram_bytes: usize,
    pub chunk_chars: usize,
    /// Inputs above this many chars are refused by the chunked path.
    pub max_chunked_chars: usize,
    pub send_attempts: usize,
    pub chunk_spacing: Duration,
    pub metadata_settle: Duration,
    pub direct_timeout: Duration,
    pub chunked_timeout: Duration,
    pub part_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_datagram_bytes: 65_507,
            chunk_chars: 8_000,
            max_chunked_chars: 1_000_000,
            send_attempts: 3,
            chunk_spacing: Duration::from_millis(50),
            metadata_settle: Duration::from_millis(100),
            direct_timeout: Duration::from_secs(30),
            chunked_timeout: Duration::from_secs(60),
            part_timeout: Duration::from_secs(45),
        }
    }
}

/// Routing thresholds for splitting large inputs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Inputs longer than this (in chars) are split when enough workers exist.
    pub split_threshold: usize,
    pub min_split_workers: usize,
    pub max_part_chars: usize,
    pub max_parts: usize,
    /// Re-merge limit as a multiple of `max_part_chars`.
    pub merge_factor: f32,
    pub merge_deadline: Duration,
    pub part_ratio_boost: f32,
    pub part_ratio_cap: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            split_threshold: 20_000,
            min_split_workers: 2,
            max_part_chars: 15_000,
            max_parts: 10,
            merge_factor: 1.5,
            merge_deadline: Duration::from_secs(90),
            part_ratio_boost: 1.5,
            part_ratio_cap: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub bind_ip: IpAddr,
    pub registration_port: u16,
    pub result_port: u16,
    pub status_interval: Duration,
    pub membership: MembershipConfig,
    pub transport: TransportConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            registration_port: DEFAULT_REGISTRATION_PORT,
            result_port: DEFAULT_RESULT_PORT,
            status_interval: Duration::from_secs(30),
            membership: MembershipConfig::default(),
            transport: TransportConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl MasterConfig {
    /// Reads `SUMMARY_BIND_IP`, `SUMMARY_REGISTRATION_PORT` and
    /// `SUMMARY_RESULT_PORT` on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(ip) = env_var("SUMMARY_BIND_IP") {
            config.bind_ip = ip.parse().context("SUMMARY_BIND_IP")?;
        }
        if let Some(port) = env_var("SUMMARY_REGISTRATION_PORT") {
            config.registration_port = port.parse().context("SUMMARY_REGISTRATION_PORT")?;
        }
        if let Some(port) = env_var("SUMMARY_RESULT_PORT") {
            config.result_port = port.parse().context("SUMMARY_RESULT_PORT")?;
        }
        Ok(config)
    }

    pub fn registration_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.registration_port)
    }

    pub fn result_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.result_port)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub bind_ip: IpAddr,
    /// Candidate ports, tried in order; `0..=0` binds an ephemeral port.
    pub port_range: RangeInclusive<u16>,
    /// Coordinator registration socket (REGISTER, HEARTBEAT, TASK_COMPLETE).
    pub master_addr: SocketAddr,
    /// Used for results when a task does not carry its own callback port.
    pub result_port: u16,
    pub heartbeat_interval: Duration,
    /// Upper bound on waiting for straggling chunks once finalization starts.
    pub finalize_grace: Duration,
    pub finalize_poll: Duration,
    pub stall_timeout: Duration,
    pub stall_sweep_interval: Duration,
    pub max_datagram_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port_range: DEFAULT_WORKER_PORTS,
            master_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_REGISTRATION_PORT,
            ),
            result_port: DEFAULT_RESULT_PORT,
            heartbeat_interval: Duration::from_secs(10),
            finalize_grace: Duration::from_millis(1_500),
            finalize_poll: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(300),
            stall_sweep_interval: Duration::from_secs(30),
            max_datagram_bytes: 65_507,
        }
    }
}

impl WorkerConfig {
    /// Reads `SUMMARY_MASTER_ADDR`, `SUMMARY_RESULT_PORT`,
    /// `SUMMARY_BIND_IP` and `SUMMARY_WORKER_PORTS` (`start-end`).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(addr) = env_var("SUMMARY_MASTER_ADDR") {
            config.master_addr = addr.parse().context("SUMMARY_MASTER_ADDR")?;
        }
        if let Some(port) = env_var("SUMMARY_RESULT_PORT") {
            config.result_port = port.parse().context("SUMMARY_RESULT_PORT")?;
        }
        if let Some(ip) = env_var("SUMMARY_BIND_IP") {
            config.bind_ip = ip.parse().context("SUMMARY_BIND_IP")?;
        }
        if let Some(range) = env_var("SUMMARY_WORKER_PORTS") {
            config.port_range = parse_port_range(&range)?;
        }
        Ok(config)
    }
}

/// Parses `7000-7100` (or a single port) into an inclusive range.
pub fn parse_port_range(raw: &str) -> Result<RangeInclusive<u16>> {
    let (start, end) = match raw.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (raw.trim(), raw.trim()),
    };
    let start: u16 = start.parse().with_context(|| format!("bad port range {raw}"))?;
    let end: u16 = end.parse().with_context(|| format!("bad port range {raw}"))?;
    if start > end {
        anyhow::bail!("port range {raw} is empty");
    }
    Ok(start..=end)
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
