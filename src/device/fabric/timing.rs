//! NoC timing model.
//!
//! Cycle costs used by the software fabric and the multicast cost estimate.
//!
//! # Timing Model
//!
//! A non-posted write has these phases:
//!
//! ```text
//! ┌───────────┐  ┌───────────────┐  ┌──────────┐  ┌─────────────┐  ┌──────────┐
//! │ Cmd slot  │─►│ Serialize     │─►│ NIU +    │─►│ Ack         │─►│ Ack      │
//! │ accept    │  │ (bytes/link)  │  │ hops out │  │ turnaround  │  │ hops back│
//! └───────────┘  └───────────────┘  └──────────┘  └─────────────┘  └──────────┘
//!                      ▲ departure (posted writes complete here)
//! ```
//!
//! A read sends a small request out the egress port, then the data
//! serializes back through the ingress port. Egress and ingress are
//! independent, so a write issued after a read overlaps with it, while a
//! read issued after a large write queues behind it on egress.

use serde::{Deserialize, Serialize};

use crate::device::noc_spec;

/// NoC timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NocTimingConfig {
    /// Fixed NIU inject + eject cost.
    pub niu_latency_cycles: u32,

    /// Router traversal per hop.
    pub hop_latency_cycles: u32,

    /// Destination cycles to turn a write into an ack.
    pub ack_turnaround_cycles: u32,

    /// Cycles a read request header occupies the egress port.
    pub read_request_cycles: u32,

    /// Cycles a command slot stays busy after accepting a command.
    pub cmd_accept_cycles: u32,

    /// Cycles each returning ack occupies the ingress port.
    pub ack_ingress_cycles: u32,
}

impl Default for NocTimingConfig {
    fn default() -> Self {
        Self::from_noc_spec()
    }
}

impl NocTimingConfig {
    /// Timing from the [`noc_spec`](crate::device::noc_spec) constants.
    pub fn from_noc_spec() -> Self {
        Self {
            niu_latency_cycles: noc_spec::NIU_LATENCY_CYCLES,
            hop_latency_cycles: noc_spec::HOP_LATENCY_CYCLES,
            ack_turnaround_cycles: noc_spec::ACK_TURNAROUND_CYCLES,
            read_request_cycles: 1,
            cmd_accept_cycles: noc_spec::CMD_ACCEPT_CYCLES,
            ack_ingress_cycles: 1,
        }
    }

    /// No latency anywhere; only serialization remains.
    pub fn instant() -> Self {
        Self {
            niu_latency_cycles: 0,
            hop_latency_cycles: 0,
            ack_turnaround_cycles: 0,
            read_request_cycles: 0,
            cmd_accept_cycles: 0,
            ack_ingress_cycles: 0,
        }
    }

    /// Cycles to push `bytes` through a link moving `bytes_per_cycle`.
    pub fn serialization_cycles(&self, bytes: u32, bytes_per_cycle: u32) -> u64 {
        let bw = bytes_per_cycle.max(1) as u64;
        (bytes as u64).div_ceil(bw).max(1)
    }

    /// Cycles for a request to travel `hops` once it has departed.
    pub fn flight_cycles(&self, hops: u32) -> u64 {
        self.niu_latency_cycles as u64 + (hops as u64) * self.hop_latency_cycles as u64
    }

    /// Cycles from departure until the ack lands back at the sender.
    pub fn ack_cycles(&self, hops_out: u32, hops_back: u32) -> u64 {
        self.flight_cycles(hops_out)
            + self.ack_turnaround_cycles as u64
            + (hops_back as u64) * self.hop_latency_cycles as u64
    }

    /// Total cycles for an isolated non-posted unicast write.
    pub fn write_cycles(&self, bytes: u32, bytes_per_cycle: u32, hops_out: u32, hops_back: u32) -> u64 {
        self.cmd_accept_cycles as u64
            + self.serialization_cycles(bytes, bytes_per_cycle)
            + self.ack_cycles(hops_out, hops_back)
    }

    /// Total cycles for an isolated unicast read.
    pub fn read_cycles(&self, bytes: u32, bytes_per_cycle: u32, hops_out: u32, hops_back: u32) -> u64 {
        self.cmd_accept_cycles as u64
            + self.read_request_cycles as u64
            + self.flight_cycles(hops_out)
            + (hops_back as u64) * self.hop_latency_cycles as u64
            + self.serialization_cycles(bytes, bytes_per_cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_config_default() {
        let config = NocTimingConfig::default();
        assert_eq!(config.niu_latency_cycles, 24);
        assert_eq!(config.hop_latency_cycles, 2);
    }

    #[test]
    fn test_serialization_rounds_up() {
        let config = NocTimingConfig::default();
        assert_eq!(config.serialization_cycles(512, 32), 16);
        assert_eq!(config.serialization_cycles(33, 32), 2);
        // Never free, even for tiny payloads
        assert_eq!(config.serialization_cycles(4, 32), 1);
    }

    #[test]
    fn test_write_cycles() {
        let config = NocTimingConfig::default();
        // accept (1) + serialize 512B (16) + NIU (24) + 3 hops out (6)
        // + turnaround (6) + 7 hops back (14) = 67
        assert_eq!(config.write_cycles(512, 32, 3, 7), 67);
    }

    #[test]
    fn test_read_cycles() {
        let config = NocTimingConfig::default();
        // accept (1) + request (1) + NIU (24) + 2 hops (4) + 8 hops back (16) + 16 = 62
        assert_eq!(config.read_cycles(512, 32, 2, 8), 62);
    }

    #[test]
    fn test_instant_only_serializes() {
        let config = NocTimingConfig::instant();
        assert_eq!(config.write_cycles(512, 32, 5, 5), 16);
        assert_eq!(config.read_cycles(64, 32, 5, 5), 2);
    }

    #[test]
    fn test_partial_toml() {
        let config: NocTimingConfig = toml::from_str("hop_latency_cycles = 9").unwrap();
        assert_eq!(config.hop_latency_cycles, 9);
        assert_eq!(config.niu_latency_cycles, noc_spec::NIU_LATENCY_CYCLES);
    }
}
