//! NoC Architecture Specification Constants
//!
//! Values shared by every supported platform family. Per-platform numbers
//! (buffer capacity, grid size, link width) live in [`super::Platform`]
//! presets and can be overridden from configuration.

// ============================================================================
// Virtual Channels
// ============================================================================

/// Number of request VCs available to unicast transfers: VC 0-3.
pub const NUM_UNICAST_VCS: u8 = 4;

/// The single VC reserved for multicast writes.
pub const MULTICAST_VC: u8 = 4;

/// First VC owned by the hardware for responses and acknowledgments.
/// Software never requests these.
pub const FIRST_RESPONSE_VC: u8 = 5;

/// Total VCs per link (request + response).
pub const NUM_VCS: u8 = 8;

// ============================================================================
// Transaction IDs
// ============================================================================

/// Width of the transaction ID field in a request header.
pub const TRID_BITS: u32 = 4;

/// Number of distinguishable transaction IDs: 16.
pub const MAX_TRANSACTION_IDS: u8 = 1 << TRID_BITS;

// ============================================================================
// Address Encoding
// ============================================================================

/// Bits of local (in-core) address in a NoC address.
pub const NOC_ADDR_LOCAL_BITS: u32 = 36;

/// Bits per node coordinate (x or y) in a NoC address.
pub const NOC_ADDR_NODE_ID_BITS: u32 = 6;

// ============================================================================
// Packets
// ============================================================================

/// Largest single-packet payload for a read or write burst: 8 KB.
pub const DEFAULT_MAX_PACKET_BYTES: u32 = 8 * 1024;

/// Payload of an inline (register) write.
pub const INLINE_WRITE_BYTES: u32 = 4;

/// Flow-control messages are semaphore-sized.
pub const FLOW_CONTROL_MAX_BYTES: u32 = 16;

// ============================================================================
// Buffer Capacity (per platform family)
// ============================================================================

/// Router buffering on the smallest family: 32 KB.
pub const SMALL_BUFFER_CAPACITY: u32 = 32 * 1024;

/// Router buffering on the mid family: 64 KB.
pub const MEDIUM_BUFFER_CAPACITY: u32 = 64 * 1024;

/// Router buffering on the largest family: 256 KB.
pub const LARGE_BUFFER_CAPACITY: u32 = 256 * 1024;

// ============================================================================
// Buffer Sharing
// ============================================================================

/// VCs that can be simultaneously active and stalled while the remaining
/// VCs still see full bandwidth.
pub const SATURATION_FULL_BANDWIDTH_VCS: usize = 3;

/// Bandwidth divisor applied once that many VCs are stalled.
pub const SATURATION_DEGRADED_DIVISOR: u32 = 16;

// ============================================================================
// Timing (model defaults, measured on the mid family)
// ============================================================================

/// Bytes moved per cycle on one NoC link.
pub const LINK_BYTES_PER_CYCLE: u32 = 32;

/// Fixed cost to inject a request into the NIU and eject it at the far end.
pub const NIU_LATENCY_CYCLES: u32 = 24;

/// Router traversal cost per hop.
pub const HOP_LATENCY_CYCLES: u32 = 2;

/// Cycles for the destination to turn a write into an acknowledgment.
pub const ACK_TURNAROUND_CYCLES: u32 = 6;

/// Cycles a command slot is busy after accepting a command.
pub const CMD_ACCEPT_CYCLES: u32 = 1;
