//! Congestion and backpressure tracking.
//!
//! Counts issued vs acknowledged transactions per (kind, VC) and tells the
//! issue path when another request would overrun router buffering.
//!
//! # Buffer Sharing
//!
//! Router buffering is shared between VCs. Measured behaviour: up to three
//! VCs can be simultaneously active and stalled while the rest still see
//! full bandwidth; past that, everyone else drops to roughly 1/16th. That
//! is modelled as a [`SaturationCurve`], not as a formula, and both numbers
//! are configuration.
//!
//! # Usage
//!
//! ```
//! use noc_engine::engine::congestion::{CongestionMonitor, SaturationCurve};
//! use noc_engine::device::{TransferKind, VirtualChannel};
//!
//! let mut monitor = CongestionMonitor::new(2, SaturationCurve::default());
//! let vc = VirtualChannel::for_kind(1, TransferKind::Write).unwrap();
//!
//! monitor.record_issue(TransferKind::Write, vc);
//! monitor.record_issue(TransferKind::Write, vc);
//! assert!(monitor.would_block(TransferKind::Write, vc));
//!
//! monitor.record_ack(TransferKind::Write, vc);
//! assert!(!monitor.would_block(TransferKind::Write, vc));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::device::noc_spec;
use crate::device::{TransferKind, VirtualChannel};

/// Empirical buffer-sharing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationCurve {
    /// Stalled VCs tolerated before the others degrade.
    pub full_bandwidth_vcs: usize,
    /// Bandwidth and capacity divisor once degraded.
    pub degraded_divisor: u32,
}

impl Default for SaturationCurve {
    fn default() -> Self {
        Self {
            full_bandwidth_vcs: noc_spec::SATURATION_FULL_BANDWIDTH_VCS,
            degraded_divisor: noc_spec::SATURATION_DEGRADED_DIVISOR,
        }
    }
}

impl SaturationCurve {
    /// Whether `active_vcs` concurrently busy VCs exceed the sharing budget.
    pub fn is_degraded(&self, active_vcs: usize) -> bool {
        active_vcs > self.full_bandwidth_vcs
    }

    /// Slowdown factor applied to link time at this many active VCs.
    pub fn slowdown(&self, active_vcs: usize) -> u32 {
        if self.is_degraded(active_vcs) {
            self.degraded_divisor.max(1)
        } else {
            1
        }
    }

    /// Fraction of nominal bandwidth available at this many active VCs.
    pub fn bandwidth_fraction(&self, active_vcs: usize) -> f64 {
        1.0 / self.slowdown(active_vcs) as f64
    }

    /// Capacity left for a VC once buffering is degraded.
    pub fn degrade(&self, capacity: u32) -> u32 {
        (capacity / self.degraded_divisor.max(1)).max(1)
    }
}

/// Outcome of checking a VC configuration against the curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferPressure {
    /// Every VC sees full bandwidth.
    Nominal,
    /// Too many VCs share the buffers.
    Degraded {
        /// VCs in use.
        active_vcs: usize,
        /// Remaining fraction of nominal bandwidth.
        bandwidth_fraction: f64,
    },
}

/// Counters for one (kind, VC) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CongestionCounters {
    /// Requests issued.
    pub issued: u64,
    /// Requests acknowledged or completed.
    pub acked: u64,
    /// Largest outstanding count seen.
    pub peak_outstanding: u64,
}

impl CongestionCounters {
    /// Requests still in flight.
    pub fn outstanding(&self) -> u64 {
        self.issued.saturating_sub(self.acked)
    }
}

/// Aggregate stall statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CongestionStats {
    /// Issues that had to wait for buffer space.
    pub stalls: u64,
    /// Cycles spent waiting for buffer space.
    pub stall_cycles: u64,
    /// Acks that arrived with nothing outstanding.
    pub spurious_acks: u64,
}

/// Issued/acked bookkeeping with a saturation guard.
#[derive(Debug, Clone)]
pub struct CongestionMonitor {
    /// Outstanding requests one (kind, VC) may hold.
    capacity: u32,
    curve: SaturationCurve,
    counters: BTreeMap<(TransferKind, VirtualChannel), CongestionCounters>,
    stats: CongestionStats,
}

impl CongestionMonitor {
    /// Create a monitor with per-(kind, VC) `capacity`.
    pub fn new(capacity: u32, curve: SaturationCurve) -> Self {
        Self {
            capacity: capacity.max(1),
            curve,
            counters: BTreeMap::new(),
            stats: CongestionStats::default(),
        }
    }

    /// The configured curve.
    pub fn curve(&self) -> &SaturationCurve {
        &self.curve
    }

    /// Nominal per-(kind, VC) capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Record a request leaving the issue path.
    pub fn record_issue(&mut self, kind: TransferKind, vc: VirtualChannel) {
        let c = self.counters.entry((kind, vc)).or_default();
        c.issued += 1;
        c.peak_outstanding = c.peak_outstanding.max(c.outstanding());
    }

    /// Record a request's completion.
    pub fn record_ack(&mut self, kind: TransferKind, vc: VirtualChannel) {
        let c = self.counters.entry((kind, vc)).or_default();
        if c.outstanding() == 0 {
            log::warn!("ack for {} on {} with nothing outstanding", kind, vc);
            self.stats.spurious_acks += 1;
            return;
        }
        c.acked += 1;
    }

    /// Counters for a pair.
    pub fn counters(&self, kind: TransferKind, vc: VirtualChannel) -> CongestionCounters {
        self.counters.get(&(kind, vc)).copied().unwrap_or_default()
    }

    /// Outstanding requests for a pair.
    pub fn outstanding(&self, kind: TransferKind, vc: VirtualChannel) -> u64 {
        self.counters(kind, vc).outstanding()
    }

    /// Total outstanding across every pair.
    pub fn total_outstanding(&self) -> u64 {
        self.counters.values().map(CongestionCounters::outstanding).sum()
    }

    /// VCs with anything in flight.
    pub fn active_vcs(&self) -> BTreeSet<VirtualChannel> {
        self.counters
            .iter()
            .filter(|(_, c)| c.outstanding() > 0)
            .map(|((_, vc), _)| *vc)
            .collect()
    }

    /// VCs where some kind has filled its nominal capacity.
    pub fn stalled_vcs(&self) -> BTreeSet<VirtualChannel> {
        self.counters
            .iter()
            .filter(|(_, c)| c.outstanding() >= self.capacity as u64)
            .map(|((_, vc), _)| *vc)
            .collect()
    }

    /// Capacity currently available to a pair after buffer sharing.
    pub fn effective_capacity(&self, vc: VirtualChannel) -> u32 {
        let others_stalled = self.stalled_vcs().into_iter().filter(|v| *v != vc).count();
        if others_stalled >= self.curve.full_bandwidth_vcs {
            self.curve.degrade(self.capacity)
        } else {
            self.capacity
        }
    }

    /// Whether issuing one more request on this pair would overrun buffering.
    pub fn would_block(&self, kind: TransferKind, vc: VirtualChannel) -> bool {
        self.outstanding(kind, vc) >= self.effective_capacity(vc) as u64
    }

    /// Check a VC count against the curve.
    pub fn assess(&self, vcs_in_use: usize) -> BufferPressure {
        if self.curve.is_degraded(vcs_in_use) {
            BufferPressure::Degraded {
                active_vcs: vcs_in_use,
                bandwidth_fraction: self.curve.bandwidth_fraction(vcs_in_use),
            }
        } else {
            BufferPressure::Nominal
        }
    }

    /// Pressure if `vc` joined the currently active set.
    pub fn assess_with(&self, vc: VirtualChannel) -> BufferPressure {
        let mut active = self.active_vcs();
        active.insert(vc);
        self.assess(active.len())
    }

    /// Record time spent stalled on backpressure.
    pub fn record_stall(&mut self, cycles: u64) {
        self.stats.stalls += 1;
        self.stats.stall_cycles += cycles;
    }

    /// Stall statistics.
    pub fn stats(&self) -> CongestionStats {
        self.stats
    }
}
