//! Multicast planning and cost estimate.
//!
//! The planner never changes what the caller asked for. It reports:
//!
//! - which of the ten schemes the geometry falls into
//! - the physical multicast addresses that cover the rectangle (one per
//!   block of physically contiguous workers, since a hardware rectangle
//!   must not span DRAM or Ethernet columns)
//! - how many cores will acknowledge
//! - whether the ack return path reuses links the write is still using
//! - whether loopback is worth turning off
//!
//! # Usage
//!
//! ```
//! use noc_engine::device::{CoreCoord, Platform};
//! use noc_engine::multicast::{MulticastPlanner, MulticastRequest};
//!
//! let planner = MulticastPlanner::new(&Platform::default());
//! let plan = planner
//!     .plan(&MulticastRequest::new(CoreCoord::new(0, 0), CoreCoord::new(0, 0), CoreCoord::new(3, 3)))
//!     .unwrap();
//! assert_eq!(plan.scheme.number(), 1);
//! assert!(plan.recommend_disable_loopback);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use super::MulticastScheme;
use crate::device::address::{check_rect, AddressTranslator, CoreCoord, NocAddress};
use crate::device::fabric::NocTimingConfig;
use crate::device::routing::{Link, NocId, Torus};
use crate::device::Platform;
use crate::error::Result;

/// What to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastRequest {
    /// Logical sender position.
    pub sender: CoreCoord,
    /// Logical rectangle start (inclusive).
    pub start: CoreCoord,
    /// Logical rectangle end (inclusive).
    pub end: CoreCoord,
    /// Also write the sender's L1. Enabled by default.
    pub loopback: bool,
    /// NoC carrying the write.
    pub noc: NocId,
    /// Destination offset in every core's L1.
    pub remote_offset: u64,
}

impl MulticastRequest {
    /// Loopback-enabled request on NoC0.
    pub fn new(sender: CoreCoord, start: CoreCoord, end: CoreCoord) -> Self {
        Self { sender, start, end, loopback: true, noc: NocId::Noc0, remote_offset: 0 }
    }

    /// Set loopback.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Route over `noc`.
    pub fn on_noc(mut self, noc: NocId) -> Self {
        self.noc = noc;
        self
    }
}

/// Non-fatal findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanWarning {
    /// Acks travel over links the write also uses.
    AckPathSharesWritePath {
        /// Directed links on both paths.
        shared_links: usize,
    },
    /// Loopback requested but the sender is outside the rectangle.
    LoopbackIgnored,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::AckPathSharesWritePath { shared_links } => {
                write!(f, "ack path shares {} link(s) with the write path", shared_links)
            }
            PlanWarning::LoopbackIgnored => write!(f, "loopback has no effect for a sender outside the rectangle"),
        }
    }
}

/// Planner output.
#[derive(Debug, Clone, PartialEq)]
pub struct MulticastPlan {
    /// Geometry class.
    pub scheme: MulticastScheme,
    /// Logical sub-rectangles, one per effective address.
    pub segments: Vec<(CoreCoord, CoreCoord)>,
    /// Physical multicast addresses covering the rectangle.
    pub effective_addresses: Vec<NocAddress>,
    /// Cores that receive the data and acknowledge.
    pub num_destinations: u32,
    /// Loopback as requested.
    pub loopback: bool,
    /// Findings.
    pub warnings: Vec<PlanWarning>,
    /// Loopback is on for an inside sender.
    pub recommend_disable_loopback: bool,
    /// Directed links the write uses.
    pub write_links: usize,
    /// Links shared between write and ack paths.
    pub shared_links: usize,
    /// Hops to the farthest destination.
    pub farthest_hops: u32,
    /// Hops from the farthest destination back to the sender.
    pub farthest_ack_hops: u32,
}

impl MulticastPlan {
    /// Whether the sender's own L1 is actually written.
    pub fn loopback_active(&self) -> bool {
        self.loopback && self.scheme.sender_inside()
    }

    /// Whether `warning`'s kind was reported.
    pub fn has_warning(&self, warning: &PlanWarning) -> bool {
        self.warnings
            .iter()
            .any(|w| std::mem::discriminant(w) == std::mem::discriminant(warning))
    }
}

/// Cost model output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputEstimate {
    /// Cycles from issue to the last ack.
    pub cycles: u64,
    /// Payload bytes.
    pub bytes: u32,
    /// Payload bytes per cycle.
    pub bytes_per_cycle: f64,
    /// Cores written.
    pub destinations: u32,
}

/// Plans multicasts on one platform.
#[derive(Debug, Clone)]
pub struct MulticastPlanner {
    translator: AddressTranslator,
    torus: Torus,
    link_bytes_per_cycle: u32,
}

impl MulticastPlanner {
    /// Planner for `platform`.
    pub fn new(platform: &Platform) -> Self {
        Self {
            translator: AddressTranslator::new(platform),
            torus: Torus::new(platform.grid_width, platform.grid_height),
            link_bytes_per_cycle: platform.link_bytes_per_cycle,
        }
    }

    /// Plan a multicast.
    pub fn plan(&self, request: &MulticastRequest) -> Result<MulticastPlan> {
        let MulticastRequest { sender, start, end, loopback, noc, remote_offset } = *request;
        check_rect(start, end)?;
        let sender_phys = self.translator.to_physical(sender)?;
        let scheme = MulticastScheme::classify(sender, start, end);
        let inside = scheme.sender_inside();

        let blocks = self.translator.contiguous_blocks(start, end)?;
        let mut segments = Vec::with_capacity(blocks.len());
        let mut effective_addresses = Vec::with_capacity(blocks.len());
        let mut write_links = BTreeSet::new();
        let mut farthest_hops = 0;
        for (s, e) in blocks {
            effective_addresses.push(self.translator.translate_multicast(s, e, remote_offset)?);
            let (ps, pe) = (self.translator.to_physical(s)?, self.translator.to_physical(e)?);
            write_links.extend(self.torus.multicast_links(sender_phys, ps, pe, noc));
            farthest_hops = farthest_hops.max(self.torus.farthest_hops(sender_phys, ps, pe, noc));
            segments.push((s, e));
        }

        let mut ack_links: BTreeSet<Link> = BTreeSet::new();
        let mut farthest_ack_hops = 0;
        for x in start.x..=end.x {
            for y in start.y..=end.y {
                let dest = self.translator.to_physical(CoreCoord::new(x, y))?;
                if dest == sender_phys {
                    continue;
                }
                ack_links.extend(self.torus.route(dest, sender_phys, noc));
                farthest_ack_hops = farthest_ack_hops.max(self.torus.hops(dest, sender_phys, noc));
            }
        }
        let shared_links = write_links.intersection(&ack_links).count();

        let cores = (end.x - start.x + 1) as u32 * (end.y - start.y + 1) as u32;
        let num_destinations = if inside && !loopback { cores - 1 } else { cores };

        let mut warnings = Vec::new();
        if shared_links > 0 {
            warnings.push(PlanWarning::AckPathSharesWritePath { shared_links });
        }
        if loopback && !inside {
            warnings.push(PlanWarning::LoopbackIgnored);
        }
        for w in &warnings {
            log::debug!("multicast {} -> {}..{}: {}", sender, start, end, w);
        }

        Ok(MulticastPlan {
            scheme,
            segments,
            effective_addresses,
            num_destinations,
            loopback,
            warnings,
            recommend_disable_loopback: inside && loopback,
            write_links: write_links.len(),
            shared_links,
            farthest_hops,
            farthest_ack_hops,
        })
    }

    /// Estimate one `bytes`-sized multicast under `timing`.
    ///
    /// Each segment serializes once, loopback adds a local copy, every
    /// destination's ack takes an ingress slot, and acks on shared links
    /// queue behind the write.
    pub fn estimate(&self, plan: &MulticastPlan, bytes: u32, timing: &NocTimingConfig) -> ThroughputEstimate {
        let serialize = timing.serialization_cycles(bytes, self.link_bytes_per_cycle);
        let mut copies = plan.effective_addresses.len() as u64;
        if plan.loopback_active() {
            copies += 1;
        }
        let cycles = timing.cmd_accept_cycles as u64
            + serialize * copies
            + timing.ack_cycles(plan.farthest_hops, plan.farthest_ack_hops)
            + plan.num_destinations as u64 * timing.ack_ingress_cycles as u64
            + plan.shared_links as u64 * timing.hop_latency_cycles as u64;
        let cycles = cycles.max(1);
        ThroughputEstimate {
            cycles,
            bytes,
            bytes_per_cycle: bytes as f64 / cycles as f64,
            destinations: plan.num_destinations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PlatformFamily;
    use crate::error::NocError;

    fn c(x: u8, y: u8) -> CoreCoord {
        CoreCoord::new(x, y)
    }

    fn planner() -> MulticastPlanner {
        MulticastPlanner::new(&Platform::preset(PlatformFamily::Wormhole))
    }

    #[test]
    fn test_plan_terminates_for_every_geometry() {
        let p = planner();
        for sx in 0..4 {
            for sy in 0..4 {
                for ex in sx..4 {
                    for ey in sy..4 {
                        for px in 0..6 {
                            for py in 0..6 {
                                let req = MulticastRequest::new(c(px, py), c(sx, sy), c(ex, ey));
                                let plan = p.plan(&req).unwrap();
                                assert!((1..=10).contains(&plan.scheme.number()));
                                assert_eq!(plan.loopback, req.loopback);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_invalid_geometry() {
        let err = planner().plan(&MulticastRequest::new(c(0, 0), c(3, 0), c(1, 2))).unwrap_err();
        assert_eq!(err, NocError::InvalidGeometry { start: c(3, 0), end: c(1, 2) });
    }

    #[test]
    fn test_inside_sender_loopback() {
        let p = planner();
        let on = p.plan(&MulticastRequest::new(c(1, 1), c(0, 0), c(3, 3))).unwrap();
        assert_eq!(on.scheme, MulticastScheme::InsideTopLeft);
        assert!(on.loopback);
        assert!(on.recommend_disable_loopback);
        assert_eq!(on.num_destinations, 16);

        let off = p.plan(&MulticastRequest::new(c(1, 1), c(0, 0), c(3, 3)).with_loopback(false)).unwrap();
        assert!(!off.recommend_disable_loopback);
        assert_eq!(off.num_destinations, 15);
        // Geometry untouched
        assert_eq!(off.effective_addresses, on.effective_addresses);
    }

    #[test]
    fn test_outside_sender_loopback_ignored() {
        let plan = planner().plan(&MulticastRequest::new(c(0, 5), c(2, 2), c(4, 4))).unwrap();
        assert_eq!(plan.scheme, MulticastScheme::AntiDiagonal);
        assert!(plan.has_warning(&PlanWarning::LoopbackIgnored));
        assert!(!plan.recommend_disable_loopback);
        assert!(!plan.loopback_active());
        assert_eq!(plan.num_destinations, 9);
    }

    #[test]
    fn test_rect_split_at_non_worker_column() {
        // Logical columns 2..=5 sit at physical x = 3, 4, 6, 7 (DRAM at x = 5)
        let plan = planner().plan(&MulticastRequest::new(c(0, 0), c(2, 0), c(5, 0))).unwrap();
        assert_eq!(plan.segments, vec![(c(2, 0), c(3, 0)), (c(4, 0), c(5, 0))]);
        assert_eq!(plan.effective_addresses.len(), 2);
        assert!(plan.effective_addresses.iter().all(|a| a.multicast));
        assert_eq!(plan.num_destinations, 4);
    }

    #[test]
    fn test_ack_path_overlap() {
        let p = planner();
        // One destination right of the sender: the ack wraps the ring and never
        // touches the single write link
        let single = p.plan(&MulticastRequest::new(c(0, 0), c(1, 0), c(1, 0))).unwrap();
        assert_eq!(single.scheme, MulticastScheme::RowLeft);
        assert!(!single.has_warning(&PlanWarning::AckPathSharesWritePath { shared_links: 0 }));

        // Two destinations: the nearer one's ack rides the link to the farther
        let pair = p.plan(&MulticastRequest::new(c(0, 0), c(1, 0), c(2, 0))).unwrap();
        assert!(pair.warnings.contains(&PlanWarning::AckPathSharesWritePath { shared_links: 1 }));
    }

    #[test]
    fn test_estimate_loopback_off_never_slower() {
        let p = planner();
        let timing = NocTimingConfig::default();
        for sender in [c(0, 0), c(3, 0), c(0, 3), c(3, 3), c(1, 2)] {
            let req = MulticastRequest::new(sender, c(0, 0), c(3, 3));
            let on = p.estimate(&p.plan(&req).unwrap(), 4096, &timing);
            let off = p.estimate(&p.plan(&req.with_loopback(false)).unwrap(), 4096, &timing);
            assert!(off.bytes_per_cycle >= on.bytes_per_cycle, "sender {}", sender);
            assert!(off.cycles < on.cycles);
        }

        // Outside sender: loopback changes nothing
        let req = MulticastRequest::new(c(6, 6), c(0, 0), c(3, 3));
        let on = p.estimate(&p.plan(&req).unwrap(), 4096, &timing);
        let off = p.estimate(&p.plan(&req.with_loopback(false)).unwrap(), 4096, &timing);
        assert_eq!(on.cycles, off.cycles);
    }

    #[test]
    fn test_noc1_entry_corner() {
        let p = planner();
        let noc0 = p.plan(&MulticastRequest::new(c(0, 0), c(2, 2), c(3, 3))).unwrap();
        let noc1 = p.plan(&MulticastRequest::new(c(0, 0), c(2, 2), c(3, 3)).on_noc(NocId::Noc1)).unwrap();
        assert_eq!(noc0.scheme, noc1.scheme);
        assert_ne!(noc0.farthest_hops, noc1.farthest_hops);
    }
}
