//! Error types for NoC engine operations.
//!
//! All validation happens before a transaction touches any counter, so an
//! `Err` from an issue call means nothing was sent.

use thiserror::Error;

use crate::device::address::CoreCoord;
use crate::engine::transaction::TransactionId;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, NocError>;

/// Errors surfaced by the NoC engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NocError {
    /// Multicast rectangle with start > end on either axis.
    #[error("invalid multicast geometry: start {start} is past end {end}")]
    InvalidGeometry {
        /// Requested rectangle start.
        start: CoreCoord,
        /// Requested rectangle end.
        end: CoreCoord,
    },

    /// Logical rectangle whose physical image would also cover non-worker
    /// endpoints (DRAM, Ethernet, harvested rows).
    #[error("multicast rectangle {start}..{end} is not physically contiguous; split it into {blocks} blocks")]
    NonContiguousRect {
        /// Logical rectangle start.
        start: CoreCoord,
        /// Logical rectangle end.
        end: CoreCoord,
        /// Physically contiguous blocks the rectangle splits into.
        blocks: usize,
    },

    /// VC outside the allowed subset for the operation kind.
    #[error("VC {vc} is not allowed for {kind} transfers")]
    UnsupportedVc {
        /// Requested VC.
        vc: u8,
        /// Transfer kind the VC was requested for.
        kind: &'static str,
    },

    /// Transaction ID rebound while its previous occupant is still pending.
    #[error("transaction id {id} reused before transaction #{pending_seq} completed")]
    UseBeforeComplete {
        /// The reused ID.
        id: TransactionId,
        /// Sequence number of the still-pending occupant.
        pending_seq: u64,
    },

    /// Wait exceeded the caller's deadline. In-flight state is untouched.
    #[error("wait on {target} timed out after {cycles} cycles")]
    TransactionTimeout {
        /// What was being waited on.
        target: String,
        /// Cycles spent waiting.
        cycles: u64,
    },

    /// Push/pop amount disagrees with the paired reserve/wait amount.
    #[error("circular buffer {buffer}: {operation} of {requested} pages does not match {expected}")]
    BufferOverflow {
        /// Buffer identifier.
        buffer: u8,
        /// `push_back` or `pop_front`.
        operation: &'static str,
        /// Pages passed by the caller.
        requested: u32,
        /// Pages held by the paired reserve/wait.
        expected: u32,
    },

    /// Transfer larger than a single packet for its class.
    #[error("payload of {size} bytes exceeds the {max} byte packet limit")]
    PayloadTooLarge {
        /// Requested size.
        size: u32,
        /// Maximum single-packet payload.
        max: u32,
    },

    /// Zero-byte transfer.
    #[error("transfer size must be non-zero")]
    EmptyTransfer,

    /// Coordinate outside the platform grid.
    #[error("coordinate {coord} is outside the {width}x{height} grid")]
    CoordinateOutOfRange {
        /// Offending coordinate.
        coord: CoreCoord,
        /// Grid width.
        width: u8,
        /// Grid height.
        height: u8,
    },

    /// DRAM bank id with no entry in the bank table.
    #[error("DRAM bank {bank} does not exist (have {count})")]
    UnknownBank {
        /// Requested bank.
        bank: u16,
        /// Number of banks on the platform.
        count: usize,
    },

    /// Local offset wider than the address layout's local field.
    #[error("local offset 0x{offset:X} does not fit in {bits} bits")]
    OffsetOutOfRange {
        /// Offending offset.
        offset: u64,
        /// Width of the local field.
        bits: u32,
    },

    /// Transaction ID outside the configured ID space.
    #[error("transaction id {id} out of range (have {count})")]
    InvalidTransactionId {
        /// Requested ID.
        id: TransactionId,
        /// Size of the ID space.
        count: u8,
    },

    /// Issue targeted circular-buffer pages that were never reserved.
    #[error("circular buffer {buffer}: pages {first}..{end} are not reserved ({reserved} reserved)")]
    UnreservedPages {
        /// Buffer identifier.
        buffer: u8,
        /// First page of the attempted range.
        first: u32,
        /// End (exclusive) of the attempted range.
        end: u32,
        /// Pages currently reserved.
        reserved: u32,
    },

    /// Circular buffer poisoned by an earlier overflow.
    #[error("circular buffer {buffer} is poisoned by an earlier overflow")]
    BufferPoisoned {
        /// Buffer identifier.
        buffer: u8,
    },

    /// `issue_with_state` on a slot that has no cached state.
    #[error("command slot {slot} has no cached state")]
    NoSlotState {
        /// Slot name.
        slot: &'static str,
    },

    /// Cached state targets a transfer the slot cannot carry.
    #[error("command slot {slot} cannot carry {kind} transfers")]
    SlotKindMismatch {
        /// Slot name.
        slot: &'static str,
        /// Transfer kind of the target.
        kind: &'static str,
    },

    /// A single circular-buffer read would straddle the end of the ring.
    #[error("circular buffer {buffer}: pages {first}..{end} wrap past the ring end at {num_pages}")]
    PagesWrapRing {
        /// Buffer identifier.
        buffer: u8,
        /// First ring page.
        first: u32,
        /// End (exclusive) ring page.
        end: u32,
        /// Pages in the ring.
        num_pages: u32,
    },

    /// Explicit VC request would mix DRAM and L1/flow-control traffic.
    #[error("VC {vc} is carrying {active} traffic; cannot add {requested}")]
    VcClassConflict {
        /// Requested VC.
        vc: u8,
        /// Class currently occupying the VC.
        active: &'static str,
        /// Class that was requested.
        requested: &'static str,
    },

    /// More VCs in use than the buffer-pressure threshold supports.
    #[error("{in_use} VCs in use, buffer sharing sustains only {supported}")]
    VcOversubscribed {
        /// VCs that would be active.
        in_use: usize,
        /// VCs supported at full bandwidth.
        supported: usize,
    },

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl NocError {
    /// Create a timeout error.
    pub fn timeout(target: impl Into<String>, cycles: u64) -> Self {
        Self::TransactionTimeout {
            target: target.into(),
            cycles,
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// True for errors the caller may retry without losing state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransactionTimeout { .. })
    }
}
