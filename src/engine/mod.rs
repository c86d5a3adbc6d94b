//! Asynchronous NoC transaction engine.
//!
//! One engine per issuing core. Issue calls return immediately with a
//! [`TransactionHandle`]; completion is observed later through a
//! transaction ID, a handle, or one of the bulk barriers.
//!
//! # Issue Path
//!
//! ```text
//! IssueRequest ─► validate ─► classify VC ─► translate ─► command slot ─► backpressure ─► fabric
//!                   │            │              │             (spin)          (spin)
//!                   └────────────┴──────────────┴── errors here leave no trace
//! ```
//!
//! # Completion
//!
//! | Kind | Complete when |
//! |------|---------------|
//! | Read | data landed locally |
//! | Posted write | payload departed |
//! | Non-posted write | every destination acked |
//!
//! # Barriers
//!
//! - [`NocEngine::flush_departed`]: every write has left the core
//! - [`NocEngine::write_barrier`]: every write is complete
//! - [`NocEngine::read_barrier`]: every read is complete
//! - [`NocEngine::wait_all`]: everything is complete
//!
//! # Usage
//!
//! ```
//! use noc_engine::config::EngineConfig;
//! use noc_engine::device::{CoreCoord, Destination, Platform};
//! use noc_engine::engine::{IssueRequest, NocEngine};
//! use noc_engine::engine::transaction::TransactionId;
//!
//! let mut engine = NocEngine::simulated(Platform::default(), EngineConfig::default(), CoreCoord::new(0, 0)).unwrap();
//! let trid = TransactionId::new(0);
//!
//! engine.issue(IssueRequest::read(Destination::DramBank(0), 0, 0x1000, 512).with_trid(trid)).unwrap();
//! engine.wait(trid).unwrap();
//! assert_eq!(engine.in_flight_count(), 0);
//! ```

pub mod circular_buffer;
pub mod congestion;
pub mod issue;
pub mod transaction;
pub mod trid;

pub use circular_buffer::{CircularBuffer, PagedCircularBuffer};
pub use congestion::{BufferPressure, CongestionMonitor, SaturationCurve};
pub use issue::{CommandSlot, CommandSlots, SlotState};
pub use transaction::{split_transfer, Chunk, IssueRequest, Target, Transaction, TransactionHandle, TransactionId};
pub use trid::{TridRotation, TridSlot, TridTracker, TridTurn};

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::device::address::{AddressTranslator, CoreCoord, Destination, NocAddress};
use crate::device::fabric::{FabricEvent, FabricRequest, NocFabric, SimFabric};
use crate::device::noc_spec;
use crate::device::vc::{TrafficClass, TransferKind, VcClassifier, VirtualChannel};
use crate::device::Platform;
use crate::error::{NocError, Result};

/// Engine-level counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Transactions issued.
    pub issued: u64,
    /// Transactions completed.
    pub completed: u64,
    /// Address translations performed.
    pub translations: u64,
    /// Bytes read by completed reads.
    pub bytes_read: u64,
    /// Bytes written by completed writes (per destination copy not counted).
    pub bytes_written: u64,
    /// Cycles spent waiting for a busy command slot.
    pub slot_wait_cycles: u64,
    /// Times a degraded VC configuration was entered.
    pub pressure_warnings: u64,
}

/// The transaction engine for one core.
pub struct NocEngine<F: NocFabric = SimFabric> {
    platform: Platform,
    config: EngineConfig,
    /// Logical position of the issuing core.
    origin_logical: CoreCoord,
    /// Physical position of the issuing core.
    origin: CoreCoord,
    translator: AddressTranslator,
    classifier: VcClassifier,
    monitor: CongestionMonitor,
    tracker: TridTracker,
    slots: CommandSlots,
    fabric: F,
    next_seq: u64,
    in_flight: BTreeMap<u64, Transaction>,
    events: Vec<FabricEvent>,
    pressure_warned: bool,
    stats: EngineStats,
}

impl NocEngine<SimFabric> {
    /// Engine over a software fabric for the core at logical `origin`.
    pub fn simulated(platform: Platform, config: EngineConfig, origin: CoreCoord) -> Result<Self> {
        let physical = AddressTranslator::new(&platform).to_physical(origin)?;
        let fabric = SimFabric::new(&platform, physical, config.timing, config.saturation);
        Self::new(platform, config, origin, fabric)
    }
}

impl<F: NocFabric> NocEngine<F> {
    /// Engine for the core at logical `origin` over `fabric`.
    pub fn new(platform: Platform, config: EngineConfig, origin: CoreCoord, fabric: F) -> Result<Self> {
        config.validate()?;
        let translator = AddressTranslator::new(&platform);
        let physical = translator.to_physical(origin)?;
        let capacity = platform.outstanding_capacity();
        log::debug!(
            "NocEngine::new family={} origin={} (phys {}) trids={} checked={} capacity={}",
            platform.family,
            origin,
            physical,
            config.num_trids,
            config.checked_trids,
            capacity
        );
        Ok(Self {
            monitor: CongestionMonitor::new(capacity, config.saturation),
            tracker: TridTracker::new(config.num_trids, config.checked_trids),
            slots: CommandSlots::new(config.cmd_accept_cycles),
            classifier: VcClassifier::new(),
            translator,
            platform,
            config,
            origin_logical: origin,
            origin: physical,
            fabric,
            next_seq: 0,
            in_flight: BTreeMap::new(),
            events: Vec::new(),
            pressure_warned: false,
            stats: EngineStats::default(),
        })
    }

    /// Platform description.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Physical position of the issuing core.
    pub fn origin(&self) -> CoreCoord {
        self.origin
    }

    /// The fabric.
    pub fn fabric(&self) -> &F {
        &self.fabric
    }

    /// Address translator.
    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    /// Congestion monitor.
    pub fn monitor(&self) -> &CongestionMonitor {
        &self.monitor
    }

    /// Transaction ID tracker.
    pub fn tracker(&self) -> &TridTracker {
        &self.tracker
    }

    /// VC classifier.
    pub fn classifier(&self) -> &VcClassifier {
        &self.classifier
    }

    /// Counters.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Current cycle.
    pub fn now(&self) -> u64 {
        self.fabric.now()
    }

    /// Transactions not yet complete.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// An in-flight transaction by handle.
    pub fn transaction(&self, handle: &TransactionHandle) -> Option<&Transaction> {
        self.in_flight.get(&handle.seq)
    }

    /// Whether the transaction behind `handle` has completed.
    pub fn is_complete(&self, handle: &TransactionHandle) -> bool {
        !self.in_flight.contains_key(&handle.seq)
    }

    /// Translate a unicast destination, counting the translation.
    pub fn translate(&mut self, dest: Destination, local_offset: u64) -> Result<NocAddress> {
        let addr = self.translator.translate(dest, local_offset)?;
        self.stats.translations += 1;
        Ok(addr)
    }

    // ---- issue ----

    /// Issue a fully specified transfer.
    pub fn issue(&mut self, request: IssueRequest) -> Result<TransactionHandle> {
        let slot = CommandSlot::for_kind(request.kind);
        check_target(slot, &request.target)?;
        let class = request.traffic_class();
        self.check_size(request.size, self.max_payload(slot, class))?;
        self.check_local_offset(request.local_offset)?;
        let vc = self.classifier.classify(class, request.kind, request.vc)?;
        self.preflight(vc, request.trid)?;
        let (remote, num_dests, loopback) = self.resolve_target(request.target, request.remote_offset)?;

        let state = SlotState { kind: request.kind, remote, size: request.size, vc, class, num_dests, loopback };
        let posted = request.posted && request.kind.is_write();
        self.issue_resolved(slot, state, request.local_offset, request.trid, posted)
    }

    /// Non-posted read into local L1.
    pub fn read(&mut self, src: Destination, remote_offset: u64, local_offset: u64, size: u32) -> Result<TransactionHandle> {
        self.issue(IssueRequest::read(src, remote_offset, local_offset, size))
    }

    /// Non-posted write from local L1.
    pub fn write(&mut self, dst: Destination, remote_offset: u64, local_offset: u64, size: u32) -> Result<TransactionHandle> {
        self.issue(IssueRequest::write(dst, remote_offset, local_offset, size))
    }

    /// Posted write from local L1. Completes when the payload departs.
    pub fn write_posted(
        &mut self,
        dst: Destination,
        remote_offset: u64,
        local_offset: u64,
        size: u32,
    ) -> Result<TransactionHandle> {
        self.issue(IssueRequest::write(dst, remote_offset, local_offset, size).posted())
    }

    /// Non-posted write to every core in the logical rectangle `start..=end`.
    pub fn multicast_write(
        &mut self,
        start: CoreCoord,
        end: CoreCoord,
        loopback: bool,
        remote_offset: u64,
        local_offset: u64,
        size: u32,
    ) -> Result<TransactionHandle> {
        self.issue(IssueRequest::multicast_write(start, end, loopback, remote_offset, local_offset, size))
    }

    /// Write a 32-bit value through the inline-write slot.
    pub fn inline_write(&mut self, dst: Destination, remote_offset: u64, value: u32) -> Result<TransactionHandle> {
        let slot = CommandSlot::InlineWrite;
        let target = Target::Unicast(dst);
        let class = target.default_class();
        let vc = self.classifier.classify(class, TransferKind::Write, None)?;
        self.preflight(vc, None)?;
        let (remote, num_dests, loopback) = self.resolve_target(target, remote_offset)?;
        log::trace!("inline write 0x{:08X} -> {}", value, remote);
        let state = SlotState {
            kind: TransferKind::Write,
            remote,
            size: noc_spec::INLINE_WRITE_BYTES,
            vc,
            class,
            num_dests,
            loopback,
        };
        self.issue_resolved(slot, state, 0, None, false)
    }

    /// Cache a translated target in `slot` for [`issue_with_state`](Self::issue_with_state).
    pub fn set_state(
        &mut self,
        slot: CommandSlot,
        target: Target,
        remote_offset: u64,
        size: u32,
        vc: Option<u8>,
    ) -> Result<()> {
        check_target(slot, &target)?;
        let kind = slot.kind();
        let class = target.default_class();
        self.check_size(size, self.max_payload(slot, class))?;
        let vc = self.classifier.classify(class, kind, vc)?;
        let (remote, num_dests, loopback) = self.resolve_target(target, remote_offset)?;
        self.slots.set_state(slot, SlotState { kind, remote, size, vc, class, num_dests, loopback })?;
        log::debug!("slot {} state: {} {} bytes on {}", slot, remote, size, vc);
        Ok(())
    }

    /// Issue through `slot` using its cached state. No translation happens.
    pub fn issue_with_state(
        &mut self,
        slot: CommandSlot,
        local_offset: u64,
        trid: Option<TransactionId>,
    ) -> Result<TransactionHandle> {
        let state = self.slots.state(slot)?;
        self.check_local_offset(local_offset)?;
        // Occupancy may have changed since the state was cached
        self.classifier.classify(state.class, state.kind, Some(state.vc.id()))?;
        self.preflight(state.vc, trid)?;
        self.issue_resolved(slot, state, local_offset, trid, false)
    }

    /// Read `pages` pages from `src` into reserved pages of `cb`, starting
    /// at reservation page `page_index`.
    ///
    /// The pages must be reserved and contiguous in the ring.
    pub fn read_into_cb<C: CircularBuffer + ?Sized>(
        &mut self,
        cb: &C,
        src: Destination,
        remote_offset: u64,
        page_index: u32,
        pages: u32,
        trid: Option<TransactionId>,
    ) -> Result<TransactionHandle> {
        cb.check_reserved(page_index, pages)?;
        let first = cb.ring_page(page_index);
        let end = first + pages;
        if end > cb.num_pages() {
            return Err(NocError::PagesWrapRing { buffer: cb.id(), first, end, num_pages: cb.num_pages() });
        }
        let size = pages.checked_mul(cb.page_size()).ok_or(NocError::PayloadTooLarge {
            size: u32::MAX,
            max: self.platform.max_packet_bytes,
        })?;
        let mut request = IssueRequest::read(src, remote_offset, cb.page_offset(first), size);
        request.trid = trid;
        self.issue(request)
    }

    fn max_payload(&self, slot: CommandSlot, class: TrafficClass) -> u32 {
        match (slot, class) {
            (CommandSlot::InlineWrite, _) => noc_spec::INLINE_WRITE_BYTES,
            (_, TrafficClass::FlowControl) => noc_spec::FLOW_CONTROL_MAX_BYTES,
            _ => self.platform.max_packet_bytes,
        }
    }

    fn check_size(&self, size: u32, max: u32) -> Result<()> {
        if size == 0 {
            return Err(NocError::EmptyTransfer);
        }
        if size > max {
            return Err(NocError::PayloadTooLarge { size, max });
        }
        Ok(())
    }

    fn check_local_offset(&self, offset: u64) -> Result<()> {
        let layout = self.translator.layout();
        if offset > layout.local_mask() {
            return Err(NocError::OffsetOutOfRange { offset, bits: layout.local_bits });
        }
        Ok(())
    }

    /// Checks that must pass before anything is counted.
    fn preflight(&mut self, vc: VirtualChannel, trid: Option<TransactionId>) -> Result<()> {
        if let Some(id) = trid {
            self.tracker.check(id)?;
        }
        match self.monitor.assess_with(vc) {
            BufferPressure::Nominal => {
                self.pressure_warned = false;
                Ok(())
            }
            BufferPressure::Degraded { active_vcs, bandwidth_fraction } => {
                let supported = self.monitor.curve().full_bandwidth_vcs;
                if self.config.reject_oversubscribed {
                    return Err(NocError::VcOversubscribed { in_use: active_vcs, supported });
                }
                if !self.pressure_warned {
                    log::warn!(
                        "{} VCs active with {} added; buffer sharing sustains {}, bandwidth drops to {:.3}",
                        active_vcs,
                        vc,
                        supported,
                        bandwidth_fraction
                    );
                    self.pressure_warned = true;
                    self.stats.pressure_warnings += 1;
                }
                Ok(())
            }
        }
    }

    /// Translate a target. Returns (address, acking destinations, loopback).
    fn resolve_target(&mut self, target: Target, remote_offset: u64) -> Result<(NocAddress, u32, bool)> {
        match target {
            Target::Unicast(dest) => Ok((self.translate(dest, remote_offset)?, 1, false)),
            Target::Multicast { start, end, loopback } => {
                let addr = self.translator.translate_multicast(start, end, remote_offset)?;
                self.stats.translations += 1;
                let cores = (end.x - start.x + 1) as u32 * (end.y - start.y + 1) as u32;
                let o = self.origin_logical;
                let inside = (start.x..=end.x).contains(&o.x) && (start.y..=end.y).contains(&o.y);
                let num_dests = if inside && !loopback { cores - 1 } else { cores };
                Ok((addr, num_dests, inside && loopback))
            }
        }
    }

    fn issue_resolved(
        &mut self,
        slot: CommandSlot,
        state: SlotState,
        local_offset: u64,
        trid: Option<TransactionId>,
        posted: bool,
    ) -> Result<TransactionHandle> {
        let waited = self.spin(|e| e.slots.is_ready(slot, e.fabric.now()));
        self.stats.slot_wait_cycles += waited;

        if self.monitor.would_block(state.kind, state.vc) {
            let stalled = self.spin(|e| !e.monitor.would_block(state.kind, state.vc));
            log::debug!("{} on {} stalled {} cycles on backpressure", state.kind, state.vc, stalled);
            self.monitor.record_stall(stalled);
        }

        let seq = self.next_seq;
        if let Some(id) = trid {
            self.tracker.bind(seq, id)?;
        }
        self.next_seq += 1;

        let now = self.fabric.now();
        self.slots.accept(slot, now);
        self.monitor.record_issue(state.kind, state.vc);
        self.classifier.occupy(state.vc, state.class);

        let local = NocAddress {
            raw: self.translator.layout().pack_unicast(self.origin, local_offset),
            multicast: false,
        };
        let (src, dst) = match state.kind {
            TransferKind::Read => (state.remote, local),
            _ => (local, state.remote),
        };

        self.fabric.submit(FabricRequest {
            seq,
            kind: state.kind,
            vc: state.vc,
            remote: state.remote,
            size: state.size,
            posted,
            num_dests: state.num_dests,
            loopback: state.loopback,
        });
        self.in_flight.insert(
            seq,
            Transaction {
                seq,
                kind: state.kind,
                class: state.class,
                src,
                dst,
                size: state.size,
                vc: state.vc,
                trid,
                posted,
                issued_at: now,
                departed_at: None,
            },
        );
        self.stats.issued += 1;
        log::trace!(
            "#{} {} {} bytes {} -> {} on {} via {} slot{}",
            seq,
            state.kind,
            state.size,
            src,
            dst,
            state.vc,
            slot,
            trid.map(|t| format!(" ({})", t)).unwrap_or_default()
        );

        Ok(TransactionHandle { seq, kind: state.kind, trid, issued_at: now })
    }

    // ---- completion ----

    fn process_events(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        self.fabric.drain_events(&mut events);
        for event in events.drain(..) {
            match event {
                FabricEvent::Departed { seq } => {
                    let now = self.fabric.now();
                    let posted = match self.in_flight.get_mut(&seq) {
                        Some(tx) => {
                            tx.departed_at = Some(now);
                            tx.posted
                        }
                        None => false,
                    };
                    if posted {
                        self.retire(seq);
                    }
                }
                FabricEvent::Acked { seq } | FabricEvent::ReadReturned { seq } => self.retire(seq),
            }
        }
        self.events = events;
    }

    fn retire(&mut self, seq: u64) {
        let Some(tx) = self.in_flight.remove(&seq) else {
            log::warn!("completion for unknown transaction #{}", seq);
            return;
        };
        self.monitor.record_ack(tx.kind, tx.vc);
        self.classifier.vacate(tx.vc);
        self.tracker.complete(seq);
        self.stats.completed += 1;
        if tx.kind.is_write() {
            self.stats.bytes_written += tx.size as u64;
        } else {
            self.stats.bytes_read += tx.size as u64;
        }
        log::trace!("#{} {} complete after {} cycles", seq, tx.kind, self.fabric.now() - tx.issued_at);
    }

    fn step(&mut self) {
        self.fabric.tick();
        self.process_events();
    }

    /// Tick until `done`. Returns cycles spent.
    fn spin(&mut self, done: impl Fn(&Self) -> bool) -> u64 {
        let start = self.fabric.now();
        self.process_events();
        while !done(&*self) {
            self.step();
        }
        self.fabric.now() - start
    }

    /// Tick until `done` or `limit` cycles pass.
    fn spin_timeout(&mut self, limit: u64, target: impl FnOnce() -> String, done: impl Fn(&Self) -> bool) -> Result<u64> {
        let start = self.fabric.now();
        self.process_events();
        while !done(&*self) {
            let waited = self.fabric.now() - start;
            if waited >= limit {
                return Err(NocError::timeout(target(), waited));
            }
            self.step();
        }
        Ok(self.fabric.now() - start)
    }

    /// Let `cycles` cycles pass (local compute between transfers).
    pub fn advance(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Block until every request bound to `id` is complete.
    ///
    /// Returns immediately if nothing is pending on `id`.
    pub fn wait(&mut self, id: TransactionId) -> Result<()> {
        self.tracker.check_range(id)?;
        self.spin(|e| !e.tracker.is_pending(id));
        self.tracker.observe(id);
        Ok(())
    }

    /// [`wait`](Self::wait) with a deadline. On timeout nothing is released
    /// and the wait can be retried.
    pub fn wait_timeout(&mut self, id: TransactionId, cycles: u64) -> Result<()> {
        self.tracker.check_range(id)?;
        self.spin_timeout(cycles, || id.to_string(), |e| !e.tracker.is_pending(id))?;
        self.tracker.observe(id);
        Ok(())
    }

    /// Block until the transaction behind `handle` is complete.
    pub fn wait_transaction(&mut self, handle: &TransactionHandle) {
        let seq = handle.seq;
        self.spin(|e| !e.in_flight.contains_key(&seq));
    }

    /// Block until every transaction is complete.
    pub fn wait_all(&mut self) {
        self.spin(|e| e.in_flight.is_empty());
        self.tracker.observe_all();
    }

    /// [`wait_all`](Self::wait_all) with a deadline.
    pub fn wait_all_timeout(&mut self, cycles: u64) -> Result<()> {
        self.spin_timeout(cycles, || "all transactions".to_string(), |e| e.in_flight.is_empty())?;
        self.tracker.observe_all();
        Ok(())
    }

    /// Block until every issued write has left the core.
    ///
    /// Non-posted writes may still be unacknowledged afterwards; the data is
    /// not guaranteed visible at the destination. Signalling a consumer
    /// after only this flush can let it read stale data, and the engine
    /// cannot detect that. Use [`write_barrier`](Self::write_barrier) first.
    pub fn flush_departed(&mut self) {
        self.spin(|e| !e.in_flight.values().any(Transaction::awaiting_departure));
    }

    /// Block until every write is complete.
    pub fn write_barrier(&mut self) {
        self.spin(|e| !e.in_flight.values().any(|tx| tx.kind.is_write()));
    }

    /// Block until every read is complete.
    pub fn read_barrier(&mut self) {
        self.spin(|e| !e.in_flight.values().any(|tx| !tx.kind.is_write()));
    }
}

fn check_target(slot: CommandSlot, target: &Target) -> Result<()> {
    let multicast_slot = slot == CommandSlot::Multicast;
    if multicast_slot != target.is_multicast() {
        return Err(NocError::SlotKindMismatch {
            slot: slot.name(),
            kind: if target.is_multicast() { "multicast" } else { "unicast" },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PlatformFamily;

    fn engine() -> NocEngine {
        engine_with(EngineConfig::default().checked())
    }

    fn engine_with(config: EngineConfig) -> NocEngine {
        NocEngine::simulated(Platform::preset(PlatformFamily::Wormhole), config, CoreCoord::new(0, 0)).unwrap()
    }

    fn core(x: u8, y: u8) -> Destination {
        Destination::Logical(CoreCoord::new(x, y))
    }

    fn id(n: u8) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn test_read_completes() {
        let mut e = engine();
        let h = e.read(Destination::DramBank(2), 0x100, 0x2000, 512).unwrap();
        assert!(!e.is_complete(&h));
        assert_eq!(e.transaction(&h).unwrap().vc.id(), 0);
        e.wait_all();
        assert!(e.is_complete(&h));
        assert_eq!(e.stats().bytes_read, 512);
        assert_eq!(e.monitor().total_outstanding(), 0);
        assert_eq!(e.classifier().active_count(), 0);
    }

    #[test]
    fn test_posted_write_completes_on_departure() {
        let mut e = engine();
        let h = e.write_posted(core(3, 3), 0, 0, 1024).unwrap();
        e.flush_departed();
        assert!(e.is_complete(&h));
    }

    #[test]
    fn test_non_posted_needs_write_barrier() {
        let mut e = engine();
        let h = e.write(core(5, 7), 0, 0, 1024).unwrap();
        e.flush_departed();
        // Departed but not acked
        assert!(!e.is_complete(&h));
        assert!(e.transaction(&h).unwrap().departed_at.is_some());
        e.write_barrier();
        assert!(e.is_complete(&h));
    }

    #[test]
    fn test_read_barrier_ignores_writes() {
        let mut e = engine();
        let w = e.write(core(5, 7), 0, 0, 8192).unwrap();
        let r = e.read(core(1, 0), 0, 0x4000, 64).unwrap();
        e.read_barrier();
        assert!(e.is_complete(&r));
        e.wait_all();
        assert!(e.is_complete(&w));
    }

    #[test]
    fn test_checked_reuse_rejected_without_side_effects() {
        let mut e = engine();
        e.issue(IssueRequest::read(core(1, 1), 0, 0, 512).with_trid(id(3))).unwrap();
        let before = e.stats();
        let err = e.issue(IssueRequest::read(core(1, 2), 0, 0, 512).with_trid(id(3))).unwrap_err();
        assert_eq!(err, NocError::UseBeforeComplete { id: id(3), pending_seq: 0 });
        assert_eq!(e.stats(), before);
        assert_eq!(e.in_flight_count(), 1);

        e.wait(id(3)).unwrap();
        assert!(e.issue(IssueRequest::read(core(1, 2), 0, 0, 512).with_trid(id(3))).is_ok());
    }

    #[test]
    fn test_unchecked_reuse_allowed() {
        let mut config = EngineConfig::default();
        config.checked_trids = false;
        let mut e = engine_with(config);
        e.issue(IssueRequest::read(core(1, 1), 0, 0, 512).with_trid(id(0))).unwrap();
        e.issue(IssueRequest::read(core(1, 2), 0, 512, 512).with_trid(id(0))).unwrap();
        e.wait(id(0)).unwrap();
        assert_eq!(e.in_flight_count(), 0);
    }

    #[test]
    fn test_second_wait_returns_immediately() {
        let mut e = engine();
        e.issue(IssueRequest::read(core(2, 2), 0, 0, 512).with_trid(id(1))).unwrap();
        e.wait(id(1)).unwrap();
        let now = e.now();
        e.wait(id(1)).unwrap();
        assert_eq!(e.now(), now);
    }

    #[test]
    fn test_wait_on_unknown_trid() {
        let mut e = engine();
        assert!(matches!(e.wait(id(16)), Err(NocError::InvalidTransactionId { .. })));
    }

    #[test]
    fn test_wait_timeout_leaves_state() {
        let mut e = engine();
        e.issue(IssueRequest::read(core(7, 9), 0, 0, 8192).with_trid(id(2))).unwrap();
        let err = e.wait_timeout(id(2), 5).unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, NocError::TransactionTimeout { cycles: 5, .. }));
        assert!(e.tracker().is_pending(id(2)));
        assert_eq!(e.in_flight_count(), 1);

        e.wait_timeout(id(2), 10_000).unwrap();
        assert_eq!(e.tracker().slot(id(2)), Some(TridSlot::Free));
    }

    #[test]
    fn test_wait_all_timeout() {
        let mut e = engine();
        e.write(core(7, 9), 0, 0, 8192).unwrap();
        assert!(e.wait_all_timeout(1).is_err());
        assert!(e.wait_all_timeout(100_000).is_ok());
    }

    #[test]
    fn test_stateful_issue_skips_translation() {
        let mut e = engine();
        e.set_state(CommandSlot::Read, Target::Unicast(Destination::DramBank(1)), 0, 512, None).unwrap();
        let translations = e.stats().translations;
        for i in 0..8 {
            e.issue_with_state(CommandSlot::Read, i * 512, None).unwrap();
        }
        assert_eq!(e.stats().translations, translations);
        assert_eq!(e.stats().issued, 8);
        e.wait_all();

        // Stateless issue translates every time
        for i in 0..3 {
            e.read(Destination::DramBank(1), 0, i * 512, 512).unwrap();
        }
        assert_eq!(e.stats().translations, translations + 3);
    }

    #[test]
    fn test_issue_with_state_requires_state() {
        let mut e = engine();
        assert_eq!(
            e.issue_with_state(CommandSlot::Write, 0, None).unwrap_err(),
            NocError::NoSlotState { slot: "write" }
        );
        assert!(matches!(
            e.set_state(CommandSlot::Read, Target::Multicast { start: CoreCoord::new(0, 0), end: CoreCoord::new(1, 1), loopback: false }, 0, 64, None),
            Err(NocError::SlotKindMismatch { .. })
        ));
    }

    #[test]
    fn test_unicast_vc_subset() {
        let mut e = engine();
        for vc in [4, 5] {
            let err = e.issue(IssueRequest::write(core(1, 1), 0, 0, 64).with_vc(vc)).unwrap_err();
            assert!(matches!(err, NocError::UnsupportedVc { kind: "unicast", .. }), "vc {}", vc);
        }
        assert_eq!(e.stats().issued, 0);
    }

    #[test]
    fn test_multicast_vc_forced() {
        let mut e = engine();
        let h = e.multicast_write(CoreCoord::new(1, 1), CoreCoord::new(3, 3), true, 0, 0, 256).unwrap();
        assert!(e.transaction(&h).unwrap().vc.is_multicast());
        let err = e
            .issue(IssueRequest::multicast_write(CoreCoord::new(1, 1), CoreCoord::new(3, 3), true, 0, 0, 256).with_vc(1))
            .unwrap_err();
        assert!(matches!(err, NocError::UnsupportedVc { vc: 1, kind: "multicast" }));
    }

    #[test]
    fn test_inverted_rect_rejected() {
        let mut e = engine();
        let err = e.multicast_write(CoreCoord::new(3, 1), CoreCoord::new(1, 3), false, 0, 0, 64).unwrap_err();
        assert!(matches!(err, NocError::InvalidGeometry { .. }));
        assert_eq!(e.stats().translations, 0);
    }

    #[test]
    fn test_multicast_across_dram_column_rejected() {
        let mut e = engine();
        let err = e.multicast_write(CoreCoord::new(2, 0), CoreCoord::new(5, 0), false, 0, 0, 64).unwrap_err();
        assert_eq!(
            err,
            NocError::NonContiguousRect { start: CoreCoord::new(2, 0), end: CoreCoord::new(5, 0), blocks: 2 }
        );
        assert_eq!(e.in_flight_count(), 0);
        assert_eq!(e.stats().issued, 0);
        assert_eq!(e.fabric().stats().requests, 0);

        let target = Target::Multicast { start: CoreCoord::new(2, 0), end: CoreCoord::new(5, 0), loopback: false };
        assert!(matches!(
            e.set_state(CommandSlot::Multicast, target, 0, 64, None),
            Err(NocError::NonContiguousRect { .. })
        ));

        // Each physically contiguous half goes through and acks per core
        let blocks = e.translator().contiguous_blocks(CoreCoord::new(2, 0), CoreCoord::new(5, 0)).unwrap();
        for (s, end) in blocks {
            e.multicast_write(s, end, false, 0, 0, 64).unwrap();
        }
        e.write_barrier();
        assert_eq!(e.stats().issued, 2);
        assert_eq!(e.in_flight_count(), 0);
    }

    #[test]
    fn test_size_limits() {
        let mut e = engine();
        assert_eq!(e.write(core(1, 1), 0, 0, 0).unwrap_err(), NocError::EmptyTransfer);
        assert_eq!(
            e.write(core(1, 1), 0, 0, 8193).unwrap_err(),
            NocError::PayloadTooLarge { size: 8193, max: 8192 }
        );
        let fc = IssueRequest::write(core(1, 1), 0, 0, 32).with_class(TrafficClass::FlowControl);
        assert!(matches!(e.issue(fc).unwrap_err(), NocError::PayloadTooLarge { max: 16, .. }));
    }

    #[test]
    fn test_inline_write() {
        let mut e = engine();
        let h = e.inline_write(core(2, 3), 0x40, 0xDEAD_BEEF).unwrap();
        assert_eq!(e.transaction(&h).unwrap().size, 4);
        e.wait_transaction(&h);
        assert!(e.is_complete(&h));
    }

    #[test]
    fn test_backpressure_stalls_issue() {
        let mut e = engine();
        // 64 KB / 8 KB = 8 outstanding per (kind, VC)
        for i in 0..9 {
            e.write(core(4, 4), 0, i * 8192, 8192).unwrap();
        }
        assert_eq!(e.monitor().stats().stalls, 1);
        let vc = VirtualChannel::for_kind(1, TransferKind::Write).unwrap();
        assert_eq!(e.monitor().counters(TransferKind::Write, vc).peak_outstanding, 8);
        e.wait_all();
    }

    #[test]
    fn test_vc_class_conflict() {
        let mut e = engine();
        e.read(Destination::DramBank(0), 0, 0, 4096).unwrap();
        let err = e.issue(IssueRequest::write(core(1, 1), 0, 0, 64).with_vc(0)).unwrap_err();
        assert!(matches!(err, NocError::VcClassConflict { vc: 0, .. }));
        e.wait_all();
        assert!(e.issue(IssueRequest::write(core(1, 1), 0, 0, 64).with_vc(0)).is_ok());
    }

    #[test]
    fn test_oversubscription() {
        let mut config = EngineConfig::default().checked();
        config.reject_oversubscribed = true;
        let mut e = engine_with(config);
        for vc in 0..3 {
            e.issue(IssueRequest::read(core(2, 2), 0, 0, 8192).with_vc(vc)).unwrap();
        }
        let err = e.issue(IssueRequest::read(core(2, 2), 0, 0, 64).with_vc(3)).unwrap_err();
        assert_eq!(err, NocError::VcOversubscribed { in_use: 4, supported: 3 });

        // Warn-only mode lets it through once
        let mut e = engine();
        for vc in 0..4 {
            e.issue(IssueRequest::read(core(2, 2), 0, 0, 8192).with_vc(vc)).unwrap();
        }
        assert_eq!(e.stats().pressure_warnings, 1);
    }

    #[test]
    fn test_read_into_cb() {
        let mut e = engine();
        let mut cb = PagedCircularBuffer::new(0, 0x8000, 512, 4);
        assert!(matches!(
            e.read_into_cb(&cb, Destination::DramBank(0), 0, 0, 1, None),
            Err(NocError::UnreservedPages { .. })
        ));

        assert!(cb.reserve_back(2).unwrap());
        let h = e.read_into_cb(&cb, Destination::DramBank(0), 0, 0, 2, Some(id(0))).unwrap();
        let local = e.transaction(&h).unwrap().dst;
        assert_eq!(e.translator().layout().unpack_unicast(local.raw).1, 0x8000);
        e.wait(id(0)).unwrap();
        cb.push_back(2).unwrap();

        assert!(cb.wait_front(2).unwrap());
        cb.pop_front(2).unwrap();
        // Back now at ring page 2; pages 2..5 would wrap
        assert!(cb.reserve_back(3).unwrap());
        assert!(matches!(
            e.read_into_cb(&cb, Destination::DramBank(0), 0, 0, 3, None),
            Err(NocError::PagesWrapRing { first: 2, end: 5, .. })
        ));
    }

    #[test]
    fn test_multicast_counts_destinations() {
        let mut e = engine();
        // Sender (0,0) inside the 2x2 rectangle
        let h = e.multicast_write(CoreCoord::new(0, 0), CoreCoord::new(1, 1), false, 0, 0, 64).unwrap();
        e.wait_transaction(&h);
        assert_eq!(e.fabric().stats().requests, 1);
        // Loopback adds a local copy
        e.multicast_write(CoreCoord::new(0, 0), CoreCoord::new(1, 1), true, 0, 0, 64).unwrap();
        e.wait_all();
        assert_eq!(e.fabric().stats().bytes_written, 64 + 128);
    }
}
