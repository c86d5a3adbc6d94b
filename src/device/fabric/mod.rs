//! The boundary between the engine and the NoC hardware.
//!
//! The engine never models routers. It hands requests to a [`NocFabric`]
//! and learns about progress only through [`FabricEvent`]s, the same way
//! firmware only sees the NIU's issued/acked counters.
//!
//! - `SimFabric`: deterministic cycle-counted software fabric, used by tests
//!   and by the scenario runner
//! - Real hardware: an implementation would read the NIU status registers
//!   in `tick`/`drain_events`

pub mod timing;
pub mod sim;

pub use timing::NocTimingConfig;
pub use sim::{FabricStats, SimFabric};

use super::address::NocAddress;
use super::vc::{TransferKind, VirtualChannel};

/// A request as the hardware sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricRequest {
    /// Engine sequence number, echoed in events.
    pub seq: u64,
    /// Transfer kind.
    pub kind: TransferKind,
    /// Request VC.
    pub vc: VirtualChannel,
    /// Remote address: data source for reads, destination for writes.
    pub remote: NocAddress,
    /// Payload bytes.
    pub size: u32,
    /// Posted write: no acknowledgment will be generated.
    pub posted: bool,
    /// Cores that will acknowledge a multicast (1 for unicast).
    pub num_dests: u32,
    /// Multicast also writes the sender's own L1.
    pub loopback: bool,
}

/// Progress reported by the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FabricEvent {
    /// A write finished leaving the issuing core.
    Departed {
        /// Request sequence number.
        seq: u64,
    },
    /// Every destination of a non-posted write acknowledged it.
    Acked {
        /// Request sequence number.
        seq: u64,
    },
    /// Read data fully landed in local memory.
    ReadReturned {
        /// Request sequence number.
        seq: u64,
    },
}

impl FabricEvent {
    /// Sequence number the event refers to.
    pub fn seq(&self) -> u64 {
        match *self {
            FabricEvent::Departed { seq } | FabricEvent::Acked { seq } | FabricEvent::ReadReturned { seq } => seq,
        }
    }
}

/// Something that carries NoC requests and reports their progress.
pub trait NocFabric {
    /// Current cycle.
    fn now(&self) -> u64;

    /// Hand a request to the NIU. Never blocks; command-slot readiness is
    /// the issuer's concern.
    fn submit(&mut self, request: FabricRequest);

    /// Advance one cycle.
    fn tick(&mut self);

    /// Move every event that has happened so far into `out`.
    fn drain_events(&mut self, out: &mut Vec<FabricEvent>);

    /// Requests submitted whose final event has not been drained.
    fn in_flight(&self) -> usize;

    /// Advance several cycles (models local compute between transfers).
    fn advance(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.tick();
        }
    }
}
