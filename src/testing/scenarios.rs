//! Built-in throughput scenarios.
//!
//! Each scenario drives a [`NocEngine`] over the software fabric and
//! reports payload bytes per cycle.

use std::fmt;

use crate::config::EngineConfig;
use crate::device::address::{CoreCoord, Destination};
use crate::device::Platform;
use crate::engine::{CircularBuffer, NocEngine, PagedCircularBuffer, TridRotation};
use crate::error::{NocError, Result};
use crate::multicast::{MulticastPlan, MulticastPlanner, MulticastRequest, ThroughputEstimate};

/// Local L1 offset of scenario buffers.
const CB_BASE: u64 = 0x1_0000;

/// Measured throughput of one scenario run.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputReport {
    /// What ran.
    pub label: String,
    /// Payload bytes moved.
    pub bytes: u64,
    /// Cycles from first issue to last completion.
    pub cycles: u64,
    /// Transactions issued.
    pub transactions: u64,
    /// Cycles the issue path stalled on backpressure.
    pub stall_cycles: u64,
}

impl ThroughputReport {
    /// Payload bytes per cycle.
    pub fn bytes_per_cycle(&self) -> f64 {
        self.bytes as f64 / self.cycles.max(1) as f64
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<40} {:>8} B {:>8} cyc {:>7.3} B/cyc ({} txns, {} stall cyc)",
            self.label,
            self.bytes,
            self.cycles,
            self.bytes_per_cycle(),
            self.transactions,
            self.stall_cycles
        )
    }
}

/// Read pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPipeline {
    /// Blocks to read.
    pub num_blocks: u32,
    /// Bytes per block.
    pub block_bytes: u32,
    /// Transaction IDs in rotation (also the buffer depth in pages).
    pub num_trids: u8,
    /// Cycles spent consuming each block.
    pub consume_cycles: u64,
}

impl Default for ReadPipeline {
    fn default() -> Self {
        Self { num_blocks: 50, block_bytes: 512, num_trids: 2, consume_cycles: 64 }
    }
}

/// Stream blocks from DRAM into a circular buffer, consuming each one.
///
/// With one ID every read waits for the previous block to be consumed.
/// With more, reads for later blocks overlap consumption of earlier ones.
pub fn run_read_pipeline(platform: &Platform, config: EngineConfig, params: ReadPipeline) -> Result<ThroughputReport> {
    let mut engine = NocEngine::simulated(platform.clone(), config, CoreCoord::new(0, 0))?;
    let mut cb = PagedCircularBuffer::new(0, CB_BASE, params.block_bytes, params.num_trids.max(1) as u32);
    let mut rotation = TridRotation::new(params.num_trids);
    let banks = platform.dram_banks.len().max(1) as u16;
    let start = engine.now();

    for block in 0..params.num_blocks {
        let turn = rotation.next();
        if turn.wait_first {
            engine.wait(turn.id)?;
            consume(&mut engine, &mut cb, params.consume_cycles)?;
        }
        if !cb.reserve_back(1)? {
            return Err(NocError::UnreservedPages { buffer: cb.id(), first: 0, end: 1, reserved: cb.reserved() });
        }
        let src = Destination::DramBank(block as u16 % banks);
        let offset = block as u64 * params.block_bytes as u64;
        engine.read_into_cb(&cb, src, offset, 0, 1, Some(turn.id))?;
        cb.push_back(1)?;
    }

    for id in rotation.in_window() {
        engine.wait(id)?;
        consume(&mut engine, &mut cb, params.consume_cycles)?;
    }

    let report = ThroughputReport {
        label: format!("read {}x{}B, {} trid(s)", params.num_blocks, params.block_bytes, params.num_trids),
        bytes: params.num_blocks as u64 * params.block_bytes as u64,
        cycles: engine.now() - start,
        transactions: engine.stats().issued,
        stall_cycles: engine.monitor().stats().stall_cycles,
    };
    log::info!("{}", report);
    Ok(report)
}

fn consume(engine: &mut NocEngine, cb: &mut PagedCircularBuffer, cycles: u64) -> Result<()> {
    if !cb.wait_front(1)? {
        return Err(NocError::BufferOverflow { buffer: cb.id(), operation: "pop_front", requested: 1, expected: 0 });
    }
    engine.advance(cycles);
    cb.pop_front(1)
}

/// Outcome of a multicast scenario.
#[derive(Debug, Clone)]
pub struct MulticastReport {
    /// Plan the run followed.
    pub plan: MulticastPlan,
    /// Cost-model prediction for one transfer.
    pub estimate: ThroughputEstimate,
    /// Measured on the software fabric.
    pub measured: ThroughputReport,
}

/// Multicast `bytes` `iterations` times, waiting for every ack in between.
pub fn run_multicast(
    platform: &Platform,
    config: EngineConfig,
    request: MulticastRequest,
    bytes: u32,
    iterations: u32,
) -> Result<MulticastReport> {
    let planner = MulticastPlanner::new(platform);
    let plan = planner.plan(&request)?;
    let estimate = planner.estimate(&plan, bytes, &config.timing);

    let mut engine = NocEngine::simulated(platform.clone(), config, request.sender)?;
    let start = engine.now();
    for _ in 0..iterations {
        for &(seg_start, seg_end) in &plan.segments {
            engine.multicast_write(seg_start, seg_end, plan.loopback, request.remote_offset, CB_BASE, bytes)?;
        }
        engine.write_barrier();
    }

    let measured = ThroughputReport {
        label: format!(
            "mcast {} {}..{} loopback={}",
            plan.scheme.number(),
            request.start,
            request.end,
            plan.loopback
        ),
        bytes: iterations as u64 * bytes as u64,
        cycles: engine.now() - start,
        transactions: engine.stats().issued,
        stall_cycles: engine.monitor().stats().stall_cycles,
    };
    log::info!("{}", measured);
    Ok(MulticastReport { plan, estimate, measured })
}

/// Stream `count` writes, posted or not, then wait for all of them.
pub fn run_write_stream(
    platform: &Platform,
    config: EngineConfig,
    dest: CoreCoord,
    count: u32,
    bytes: u32,
    posted: bool,
) -> Result<ThroughputReport> {
    let mut engine = NocEngine::simulated(platform.clone(), config, CoreCoord::new(0, 0))?;
    let start = engine.now();
    for i in 0..count {
        let offset = i as u64 * bytes as u64;
        if posted {
            engine.write_posted(Destination::Logical(dest), offset, CB_BASE, bytes)?;
        } else {
            engine.write(Destination::Logical(dest), offset, CB_BASE, bytes)?;
        }
    }
    engine.wait_all();

    let report = ThroughputReport {
        label: format!("write {}x{}B to {} posted={}", count, bytes, dest, posted),
        bytes: count as u64 * bytes as u64,
        cycles: engine.now() - start,
        transactions: engine.stats().issued,
        stall_cycles: engine.monitor().stats().stall_cycles,
    };
    log::info!("{}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PlatformFamily;
    use crate::multicast::MulticastScheme;

    fn platform() -> Platform {
        Platform::preset(PlatformFamily::Wormhole)
    }

    #[test]
    fn test_two_trids_beat_one() {
        let p = platform();
        let one = run_read_pipeline(&p, EngineConfig::default(), ReadPipeline { num_trids: 1, ..Default::default() }).unwrap();
        let two = run_read_pipeline(&p, EngineConfig::default(), ReadPipeline { num_trids: 2, ..Default::default() }).unwrap();
        assert_eq!(one.bytes, 50 * 512);
        assert_eq!(one.transactions, 50);
        assert_eq!(two.transactions, 50);
        assert!(
            two.bytes_per_cycle() > one.bytes_per_cycle(),
            "two trids {} vs one {}",
            two.bytes_per_cycle(),
            one.bytes_per_cycle()
        );
    }

    #[test]
    fn test_pipeline_on_every_family() {
        for family in [PlatformFamily::Grayskull, PlatformFamily::Wormhole, PlatformFamily::Blackhole] {
            let report = run_read_pipeline(
                &Platform::preset(family),
                EngineConfig::default().checked(),
                ReadPipeline { num_blocks: 10, num_trids: 4, ..Default::default() },
            )
            .unwrap();
            assert_eq!(report.transactions, 10, "{}", family);
        }
    }

    #[test]
    fn test_inside_multicast_loopback_off_not_slower() {
        let p = platform();
        let req = MulticastRequest::new(CoreCoord::new(0, 0), CoreCoord::new(0, 0), CoreCoord::new(3, 3));
        let on = run_multicast(&p, EngineConfig::default(), req, 4096, 10).unwrap();
        let off = run_multicast(&p, EngineConfig::default(), req.with_loopback(false), 4096, 10).unwrap();

        assert_eq!(on.plan.scheme, MulticastScheme::InsideTopLeft);
        assert!(off.estimate.bytes_per_cycle >= on.estimate.bytes_per_cycle);
        assert!(off.measured.bytes_per_cycle() >= on.measured.bytes_per_cycle());
    }

    #[test]
    fn test_multicast_across_dram_column() {
        let p = platform();
        let req = MulticastRequest::new(CoreCoord::new(0, 5), CoreCoord::new(2, 0), CoreCoord::new(5, 3));
        let report = run_multicast(&p, EngineConfig::default(), req, 1024, 2).unwrap();
        // Two column blocks, issued once per iteration each
        assert_eq!(report.plan.segments.len(), 2);
        assert_eq!(report.measured.transactions, 4);
    }

    #[test]
    fn test_posted_writes_finish_sooner() {
        let p = platform();
        let dest = CoreCoord::new(6, 8);
        let posted = run_write_stream(&p, EngineConfig::default(), dest, 16, 2048, true).unwrap();
        let acked = run_write_stream(&p, EngineConfig::default(), dest, 16, 2048, false).unwrap();
        assert!(posted.cycles < acked.cycles);
    }
}
