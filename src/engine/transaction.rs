//! Transactions, issue requests and handles.

use std::fmt;

use crate::device::address::{CoreCoord, Destination, NocAddress};
use crate::device::vc::{TrafficClass, TransferKind, VirtualChannel};
use crate::error::{NocError, Result};

/// Hardware transaction ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u8);

impl TransactionId {
    /// Create an ID. Range is checked by the tracker.
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Numeric value.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trid {}", self.0)
    }
}

/// Where a request goes (writes) or comes from (reads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// One endpoint.
    Unicast(Destination),
    /// Inclusive rectangle of logical worker coordinates.
    Multicast {
        /// Rectangle start.
        start: CoreCoord,
        /// Rectangle end.
        end: CoreCoord,
        /// Also write the sender's own L1 when it lies in the rectangle.
        loopback: bool,
    },
}

impl Target {
    /// Default traffic class for this target.
    pub fn default_class(&self) -> TrafficClass {
        match self {
            Target::Unicast(Destination::DramBank(_)) => TrafficClass::Dram,
            _ => TrafficClass::L1OrEthernet,
        }
    }

    /// Whether this is a multicast target.
    pub fn is_multicast(&self) -> bool {
        matches!(self, Target::Multicast { .. })
    }
}

/// A fully specified transfer.
///
/// # Usage
///
/// ```
/// use noc_engine::engine::IssueRequest;
/// use noc_engine::engine::transaction::TransactionId;
/// use noc_engine::device::{CoreCoord, Destination};
///
/// let req = IssueRequest::read(Destination::DramBank(3), 0x4000, 0x1000, 512)
///     .with_vc(0)
///     .with_trid(TransactionId::new(1));
/// assert_eq!(req.size, 512);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueRequest {
    /// Transfer kind.
    pub kind: TransferKind,
    /// Remote end of the transfer.
    pub target: Target,
    /// Offset at the remote end.
    pub remote_offset: u64,
    /// Offset in the issuing core's L1.
    pub local_offset: u64,
    /// Payload bytes.
    pub size: u32,
    /// Traffic class; derived from the target when `None`.
    pub class: Option<TrafficClass>,
    /// Explicit VC.
    pub vc: Option<u8>,
    /// Transaction ID to bind.
    pub trid: Option<TransactionId>,
    /// Posted write (ignored for reads).
    pub posted: bool,
}

impl IssueRequest {
    /// Read `size` bytes from `src` + `remote_offset` into local L1.
    pub fn read(src: Destination, remote_offset: u64, local_offset: u64, size: u32) -> Self {
        Self::new(TransferKind::Read, Target::Unicast(src), remote_offset, local_offset, size)
    }

    /// Non-posted write of local L1 to `dst` + `remote_offset`.
    pub fn write(dst: Destination, remote_offset: u64, local_offset: u64, size: u32) -> Self {
        Self::new(TransferKind::Write, Target::Unicast(dst), remote_offset, local_offset, size)
    }

    /// Non-posted write to every core in `start..=end`.
    pub fn multicast_write(
        start: CoreCoord,
        end: CoreCoord,
        loopback: bool,
        remote_offset: u64,
        local_offset: u64,
        size: u32,
    ) -> Self {
        Self::new(
            TransferKind::MulticastWrite,
            Target::Multicast { start, end, loopback },
            remote_offset,
            local_offset,
            size,
        )
    }

    fn new(kind: TransferKind, target: Target, remote_offset: u64, local_offset: u64, size: u32) -> Self {
        Self {
            kind,
            target,
            remote_offset,
            local_offset,
            size,
            class: None,
            vc: None,
            trid: None,
            posted: false,
        }
    }

    /// Request a specific VC.
    pub fn with_vc(mut self, vc: u8) -> Self {
        self.vc = Some(vc);
        self
    }

    /// Bind a transaction ID.
    pub fn with_trid(mut self, trid: TransactionId) -> Self {
        self.trid = Some(trid);
        self
    }

    /// Override the traffic class.
    pub fn with_class(mut self, class: TrafficClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Make a write posted.
    pub fn posted(mut self) -> Self {
        self.posted = true;
        self
    }

    /// Class used for VC selection.
    pub fn traffic_class(&self) -> TrafficClass {
        self.class.unwrap_or_else(|| self.target.default_class())
    }
}

/// An in-flight transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Engine sequence number.
    pub seq: u64,
    /// Transfer kind.
    pub kind: TransferKind,
    /// Traffic class.
    pub class: TrafficClass,
    /// Source address.
    pub src: NocAddress,
    /// Destination address.
    pub dst: NocAddress,
    /// Payload bytes.
    pub size: u32,
    /// Assigned VC.
    pub vc: VirtualChannel,
    /// Bound transaction ID.
    pub trid: Option<TransactionId>,
    /// Posted write.
    pub posted: bool,
    /// Cycle the command was accepted.
    pub issued_at: u64,
    /// Cycle the payload left the core (writes).
    pub departed_at: Option<u64>,
}

impl Transaction {
    /// Whether the payload still has to leave the core.
    pub fn awaiting_departure(&self) -> bool {
        self.kind.is_write() && self.departed_at.is_none()
    }
}

/// Returned by every issue call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle {
    /// Engine sequence number.
    pub seq: u64,
    /// Transfer kind.
    pub kind: TransferKind,
    /// Bound transaction ID.
    pub trid: Option<TransactionId>,
    /// Cycle the command was accepted.
    pub issued_at: u64,
}

/// A piece of a larger transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Offset from the start of the transfer.
    pub offset: u64,
    /// Bytes in this chunk.
    pub size: u32,
}

/// Split `total` bytes into packets of at most `max_packet` bytes.
pub fn split_transfer(total: u64, max_packet: u32) -> Result<Vec<Chunk>> {
    if total == 0 {
        return Err(NocError::EmptyTransfer);
    }
    let max = max_packet.max(1) as u64;
    let mut chunks = Vec::with_capacity(total.div_ceil(max) as usize);
    let mut offset = 0;
    while offset < total {
        let size = (total - offset).min(max);
        chunks.push(Chunk { offset, size: size as u32 });
        offset += size;
    }
    Ok(chunks)
}
