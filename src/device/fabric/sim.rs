//! Cycle-counted software fabric.
//!
//! Not a router model. Each request gets completion times from the timing
//! model the moment it is submitted:
//!
//! - writes serialize on the egress port, then depart
//! - acks come back after the flight/turnaround latency, one per
//!   destination through the ack port
//! - read requests take a short egress slot, read data serializes on the
//!   ingress port
//!
//! Egress and ingress are independent. A read queued behind a large write
//! waits for the egress port; a write issued after a read does not wait for
//! the read's data.
//!
//! Link time is stretched by the saturation curve when more VCs are busy
//! than buffer sharing sustains.

use std::collections::{BTreeMap, BTreeSet};

use super::timing::NocTimingConfig;
use super::{FabricEvent, FabricRequest, NocFabric};
use crate::device::address::{AddressLayout, CoreCoord};
use crate::device::routing::{NocId, Torus};
use crate::device::vc::{TransferKind, VirtualChannel};
use crate::device::Platform;
use crate::engine::congestion::SaturationCurve;

/// Counters kept by the software fabric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FabricStats {
    /// Requests submitted.
    pub requests: u64,
    /// Payload bytes written (loopback copies included).
    pub bytes_written: u64,
    /// Payload bytes read.
    pub bytes_read: u64,
    /// Requests that were slowed by buffer sharing.
    pub degraded_requests: u64,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    vc: VirtualChannel,
    posted: bool,
}

/// Deterministic software fabric for one issuing core.
#[derive(Debug, Clone)]
pub struct SimFabric {
    now: u64,
    origin: CoreCoord,
    torus: Torus,
    noc: NocId,
    layout: AddressLayout,
    link_bytes_per_cycle: u32,
    timing: NocTimingConfig,
    curve: SaturationCurve,
    /// Cycle the egress port frees up.
    egress_free_at: u64,
    /// Cycle the ingress port frees up.
    ingress_free_at: u64,
    scheduled: BTreeMap<u64, Vec<FabricEvent>>,
    ready: Vec<FabricEvent>,
    in_flight: BTreeMap<u64, InFlight>,
    stats: FabricStats,
}

impl SimFabric {
    /// Create a fabric for a core at physical position `origin`.
    pub fn new(platform: &Platform, origin: CoreCoord, timing: NocTimingConfig, curve: SaturationCurve) -> Self {
        log::debug!(
            "SimFabric::new family={} origin={} grid={}x{} link={}B/cyc",
            platform.family,
            origin,
            platform.grid_width,
            platform.grid_height,
            platform.link_bytes_per_cycle
        );
        Self {
            now: 0,
            origin,
            torus: Torus::new(platform.grid_width, platform.grid_height),
            noc: NocId::Noc0,
            layout: platform.layout,
            link_bytes_per_cycle: platform.link_bytes_per_cycle,
            timing,
            curve,
            egress_free_at: 0,
            ingress_free_at: 0,
            scheduled: BTreeMap::new(),
            ready: Vec::new(),
            in_flight: BTreeMap::new(),
            stats: FabricStats::default(),
        }
    }

    /// Route requests over the given NoC.
    pub fn with_noc(mut self, noc: NocId) -> Self {
        self.noc = noc;
        self
    }

    /// Physical position of the issuing core.
    pub fn origin(&self) -> CoreCoord {
        self.origin
    }

    /// Counters.
    pub fn stats(&self) -> FabricStats {
        self.stats
    }

    fn schedule(&mut self, at: u64, event: FabricEvent) {
        log::trace!("fabric: {:?} scheduled for cycle {}", event, at);
        self.scheduled.entry(at).or_default().push(event);
    }

    fn active_vcs_with(&self, vc: VirtualChannel) -> usize {
        let mut vcs: BTreeSet<VirtualChannel> = self.in_flight.values().map(|f| f.vc).collect();
        vcs.insert(vc);
        vcs.len()
    }

    fn link_cycles(&self, bytes: u32, slowdown: u32) -> u64 {
        self.timing.serialization_cycles(bytes, self.link_bytes_per_cycle) * slowdown as u64
    }

    /// (hops out to the farthest destination, hops back from the farthest).
    fn hop_span(&self, request: &FabricRequest) -> (u32, u32) {
        if request.kind.is_multicast() {
            let (start, end, _) = self.layout.unpack_multicast(request.remote.raw);
            let out = self.torus.farthest_hops(self.origin, start, end, self.noc);
            let mut back = 0;
            for x in start.x..=end.x {
                for y in start.y..=end.y {
                    back = back.max(self.torus.hops(CoreCoord::new(x, y), self.origin, self.noc));
                }
            }
            (out, back)
        } else {
            let (coord, _) = self.layout.unpack_unicast(request.remote.raw);
            (
                self.torus.hops(self.origin, coord, self.noc),
                self.torus.hops(coord, self.origin, self.noc),
            )
        }
    }

    fn submit_read(&mut self, request: &FabricRequest, slowdown: u32) {
        let (out, back) = self.hop_span(request);
        let start = self.now.max(self.egress_free_at);
        let request_sent = start + self.timing.read_request_cycles as u64;
        self.egress_free_at = request_sent;

        let data_ready = request_sent + self.timing.flight_cycles(out) + back as u64 * self.timing.hop_latency_cycles as u64;
        let data_start = data_ready.max(self.ingress_free_at);
        let done = data_start + self.link_cycles(request.size, slowdown);
        self.ingress_free_at = done;

        self.stats.bytes_read += request.size as u64;
        self.schedule(done, FabricEvent::ReadReturned { seq: request.seq });
    }

    fn submit_write(&mut self, request: &FabricRequest, slowdown: u32) {
        let mut serialize = self.link_cycles(request.size, slowdown);
        if request.loopback {
            // The local copy goes through the same NIU.
            serialize += self.link_cycles(request.size, slowdown);
            self.stats.bytes_written += request.size as u64;
        }
        let start = self.now.max(self.egress_free_at);
        let departed = start + serialize;
        self.egress_free_at = departed;
        self.stats.bytes_written += request.size as u64;
        self.schedule(departed, FabricEvent::Departed { seq: request.seq });

        if !request.posted {
            let (out, back) = self.hop_span(request);
            let acks = request.num_dests.max(1) as u64 * self.timing.ack_ingress_cycles as u64;
            let acked = departed + self.timing.ack_cycles(out, back) + acks;
            self.schedule(acked, FabricEvent::Acked { seq: request.seq });
        }
    }
}

impl NocFabric for SimFabric {
    fn now(&self) -> u64 {
        self.now
    }

    fn submit(&mut self, request: FabricRequest) {
        let active = self.active_vcs_with(request.vc);
        let slowdown = self.curve.slowdown(active);
        if slowdown > 1 {
            self.stats.degraded_requests += 1;
            log::debug!("fabric: {} VCs active, #{} runs at 1/{} bandwidth", active, request.seq, slowdown);
        }
        self.stats.requests += 1;

        match request.kind {
            TransferKind::Read => self.submit_read(&request, slowdown),
            TransferKind::Write | TransferKind::MulticastWrite => self.submit_write(&request, slowdown),
        }

        let posted = request.posted && request.kind.is_write();
        self.in_flight.insert(request.seq, InFlight { vc: request.vc, posted });
    }

    fn tick(&mut self) {
        self.now += 1;
        let later = self.scheduled.split_off(&(self.now + 1));
        let due = std::mem::replace(&mut self.scheduled, later);
        for (_, events) in due {
            self.ready.extend(events);
        }
    }

    fn drain_events(&mut self, out: &mut Vec<FabricEvent>) {
        for event in self.ready.drain(..) {
            let finished = match event {
                FabricEvent::Departed { seq } => self.in_flight.get(&seq).map(|f| f.posted).unwrap_or(false),
                FabricEvent::Acked { .. } | FabricEvent::ReadReturned { .. } => true,
            };
            if finished {
                self.in_flight.remove(&event.seq());
            }
            out.push(event);
        }
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::address::NocAddress;
    use crate::device::PlatformFamily;

    fn fabric() -> (SimFabric, Platform) {
        let platform = Platform::preset(PlatformFamily::Wormhole);
        let fabric = SimFabric::new(&platform, CoreCoord::new(1, 1), NocTimingConfig::default(), SaturationCurve::default());
        (fabric, platform)
    }

    fn request(platform: &Platform, seq: u64, kind: TransferKind, vc: u8, size: u32, posted: bool) -> FabricRequest {
        FabricRequest {
            seq,
            kind,
            vc: VirtualChannel::for_kind(vc, kind).unwrap(),
            remote: NocAddress {
                raw: platform.layout.pack_unicast(CoreCoord::new(3, 2), 0),
                multicast: false,
            },
            size,
            posted,
            num_dests: 1,
            loopback: false,
        }
    }

    fn run_until_idle(fabric: &mut SimFabric) -> Vec<(u64, FabricEvent)> {
        let mut seen = Vec::new();
        let mut buf = Vec::new();
        for _ in 0..10_000 {
            fabric.tick();
            fabric.drain_events(&mut buf);
            for e in buf.drain(..) {
                seen.push((fabric.now(), e));
            }
            if fabric.in_flight() == 0 {
                break;
            }
        }
        seen
    }

    #[test]
    fn test_posted_write_only_departs() {
        let (mut f, p) = fabric();
        f.submit(request(&p, 1, TransferKind::Write, 1, 512, true));
        let events = run_until_idle(&mut f);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], (16, FabricEvent::Departed { seq: 1 }));
    }

    #[test]
    fn test_non_posted_write_departs_then_acks() {
        let (mut f, p) = fabric();
        f.submit(request(&p, 7, TransferKind::Write, 1, 512, false));
        let events = run_until_idle(&mut f);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1, FabricEvent::Departed { seq: 7 });
        assert_eq!(events[1].1, FabricEvent::Acked { seq: 7 });
        assert!(events[1].0 > events[0].0);
        assert_eq!(f.in_flight(), 0);
    }

    #[test]
    fn test_write_after_read_overlaps() {
        let (mut f, p) = fabric();
        f.submit(request(&p, 1, TransferKind::Read, 2, 4096, false));
        f.submit(request(&p, 2, TransferKind::Write, 1, 4096, true));
        let events = run_until_idle(&mut f);
        let depart = events.iter().find(|(_, e)| e.seq() == 2).unwrap().0;
        let read_done = events.iter().find(|(_, e)| e.seq() == 1).unwrap().0;
        // Write only waited for the 1-cycle read request, not the read data
        assert_eq!(depart, 1 + 128);
        assert!(read_done > 128);
    }

    #[test]
    fn test_read_after_write_queues_on_egress() {
        let (mut alone, p) = fabric();
        alone.submit(request(&p, 1, TransferKind::Read, 2, 512, false));
        let alone_done = run_until_idle(&mut alone)[0].0;

        let (mut behind, _) = fabric();
        behind.submit(request(&p, 1, TransferKind::Write, 1, 8192, true));
        behind.submit(request(&p, 2, TransferKind::Read, 2, 512, false));
        let events = run_until_idle(&mut behind);
        let read_done = events.iter().find(|(_, e)| e.seq() == 2).unwrap().0;
        // 8 KB write holds egress for 256 cycles first
        assert_eq!(read_done, alone_done + 256);
    }

    #[test]
    fn test_fourth_vc_is_degraded() {
        let (mut f, p) = fabric();
        for (seq, vc) in [(1, 0), (2, 1), (3, 2)] {
            f.submit(request(&p, seq, TransferKind::Write, vc, 32, false));
        }
        assert_eq!(f.stats().degraded_requests, 0);
        f.submit(request(&p, 4, TransferKind::Write, 3, 32, false));
        assert_eq!(f.stats().degraded_requests, 1);
    }

    #[test]
    fn test_multicast_loopback_departs_later() {
        let (mut plain, p) = fabric();
        let rect = NocAddress {
            raw: p.layout.pack_multicast(CoreCoord::new(1, 1), CoreCoord::new(4, 4), 0),
            multicast: true,
        };
        let mcast = |loopback: bool, num_dests: u32| FabricRequest {
            seq: 1,
            kind: TransferKind::MulticastWrite,
            vc: VirtualChannel::MULTICAST,
            remote: rect,
            size: 1024,
            posted: false,
            num_dests,
            loopback,
        };
        plain.submit(mcast(false, 15));
        let plain_ack = run_until_idle(&mut plain).last().unwrap().0;

        let (mut looped, _) = fabric();
        looped.submit(mcast(true, 16));
        let looped_ack = run_until_idle(&mut looped).last().unwrap().0;
        assert!(looped_ack > plain_ack);
    }
}
