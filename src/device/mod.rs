//! Platform models for the NoC data-movement subsystem.
//!
//! This module provides:
//! - Platform family presets (grid geometry, DRAM banks, buffer capacity)
//! - Address translation between logical destinations and NoC addresses
//! - Virtual channel classification
//! - The fabric seam ([`fabric::NocFabric`]) and a software fabric for tests
//!
//! # Grid Overview
//!
//! ```text
//!         x=0    x=1    x=2    x=3    x=4    x=5    x=6 ...
//!   y=0 | DRAM | Eth  | Eth  | Eth  | Eth  | DRAM | Eth  |
//!   y=1 | DRAM |Worker|Worker|Worker|Worker| DRAM |Worker|
//!   y=2 | DRAM |Worker|Worker|Worker|Worker| DRAM |Worker|
//!   ...
//! ```
//!
//! Worker cores are addressed by logical (column, row) on the dense worker
//! grid; the platform maps them to physical NoC positions.
//!
//! # Example
//!
//! ```
//! use noc_engine::device::{Platform, PlatformFamily};
//! use noc_engine::device::address::{AddressTranslator, CoreCoord, Destination};
//!
//! let platform = Platform::preset(PlatformFamily::Wormhole);
//! let translator = AddressTranslator::new(&platform);
//! let addr = translator.translate(Destination::Logical(CoreCoord::new(0, 0)), 0x1000).unwrap();
//! assert!(!addr.multicast);
//! ```

pub mod noc_spec;
pub mod address;
pub mod vc;
pub mod routing;
pub mod fabric;

pub use address::{AddressLayout, AddressTranslator, CoreCoord, DecodedAddress, Destination, NocAddress};
pub use vc::{TrafficClass, TransferKind, VcClassifier, VirtualChannel};
pub use routing::{Link, NocId, Torus};
pub use fabric::{FabricEvent, FabricRequest, NocFabric, NocTimingConfig, SimFabric};

use serde::{Deserialize, Serialize};

/// Platform family. Each family has its own router buffering and grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    /// 32 KB router buffering.
    Grayskull,
    /// 64 KB router buffering.
    #[default]
    Wormhole,
    /// 256 KB router buffering.
    Blackhole,
}

impl PlatformFamily {
    /// Parse a family name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "grayskull" => Some(Self::Grayskull),
            "wormhole" => Some(Self::Wormhole),
            "blackhole" => Some(Self::Blackhole),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformFamily::Grayskull => write!(f, "grayskull"),
            PlatformFamily::Wormhole => write!(f, "wormhole"),
            PlatformFamily::Blackhole => write!(f, "blackhole"),
        }
    }
}

/// A DRAM bank endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DramBank {
    /// Physical NoC position of the bank's controller.
    pub coord: CoreCoord,
    /// Base offset of the bank's window in the controller address space.
    pub base_offset: u64,
}

/// Everything the engine needs to know about a target platform.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Family this platform belongs to.
    pub family: PlatformFamily,
    /// Physical NoC grid width (torus wraps at this column).
    pub grid_width: u8,
    /// Physical NoC grid height.
    pub grid_height: u8,
    /// Physical x of each logical worker column.
    pub worker_cols: Vec<u8>,
    /// Physical y of each logical worker row.
    pub worker_rows: Vec<u8>,
    /// DRAM banks indexed by bank id.
    pub dram_banks: Vec<DramBank>,
    /// Router buffering per (kind, VC) in bytes.
    pub buffer_capacity_bytes: u32,
    /// Largest single-packet payload.
    pub max_packet_bytes: u32,
    /// Bytes per cycle on one link.
    pub link_bytes_per_cycle: u32,
    /// Address bit layout.
    pub layout: AddressLayout,
}

impl Platform {
    /// Built-in preset for a family.
    pub fn preset(family: PlatformFamily) -> Self {
        match family {
            PlatformFamily::Grayskull => Self {
                family,
                grid_width: 13,
                grid_height: 12,
                worker_cols: (1..=12).collect(),
                worker_rows: (1..=5).chain(7..=11).collect(),
                dram_banks: banks(&[(1, 0), (1, 6), (4, 0), (4, 6), (7, 0), (7, 6), (10, 0), (10, 6)], 0),
                buffer_capacity_bytes: noc_spec::SMALL_BUFFER_CAPACITY,
                max_packet_bytes: noc_spec::DEFAULT_MAX_PACKET_BYTES,
                link_bytes_per_cycle: 32,
                layout: AddressLayout { local_bits: 32, node_id_bits: noc_spec::NOC_ADDR_NODE_ID_BITS },
            },
            PlatformFamily::Wormhole => Self {
                family,
                grid_width: 10,
                grid_height: 12,
                worker_cols: vec![1, 2, 3, 4, 6, 7, 8, 9],
                worker_rows: (1..=5).chain(7..=11).collect(),
                dram_banks: banks(
                    &[(0, 0), (0, 1), (0, 11), (0, 5), (0, 6), (0, 7), (5, 0), (5, 1), (5, 11), (5, 2), (5, 9), (5, 10)],
                    0,
                ),
                buffer_capacity_bytes: noc_spec::MEDIUM_BUFFER_CAPACITY,
                max_packet_bytes: noc_spec::DEFAULT_MAX_PACKET_BYTES,
                link_bytes_per_cycle: noc_spec::LINK_BYTES_PER_CYCLE,
                layout: AddressLayout::default(),
            },
            PlatformFamily::Blackhole => Self {
                family,
                grid_width: 17,
                grid_height: 12,
                worker_cols: (1..=7).chain(10..=16).collect(),
                worker_rows: (2..=11).collect(),
                dram_banks: banks(&[(0, 0), (0, 3), (0, 6), (0, 9), (9, 0), (9, 3), (9, 6), (9, 9)], 0),
                buffer_capacity_bytes: noc_spec::LARGE_BUFFER_CAPACITY,
                max_packet_bytes: 2 * noc_spec::DEFAULT_MAX_PACKET_BYTES,
                link_bytes_per_cycle: 64,
                layout: AddressLayout::default(),
            },
        }
    }

    /// Packets of `max_packet_bytes` that fit in router buffering for one
    /// (kind, VC) pair. Never less than one.
    pub fn outstanding_capacity(&self) -> u32 {
        (self.buffer_capacity_bytes / self.max_packet_bytes.max(1)).max(1)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::preset(PlatformFamily::default())
    }
}

fn banks(coords: &[(u8, u8)], base_offset: u64) -> Vec<DramBank> {
    coords
        .iter()
        .map(|&(x, y)| DramBank { coord: CoreCoord::new(x, y), base_offset })
        .collect()
}
