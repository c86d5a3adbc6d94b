//! NoC address translation.
//!
//! Converts logical destinations (worker grid coordinates, DRAM banks,
//! multicast rectangles) into the bit-packed physical address every issuer
//! consumes, and back.
//!
//! # Address Encoding
//!
//! ```text
//! unicast:   [y:N][x:N][local:L]
//! multicast: [y_start:N][x_start:N][y_end:N][x_end:N][local:L]
//!
//! Default: L = 36, N = 6
//! ```
//!
//! All packing goes through [`AddressLayout`]; nothing else in the crate
//! shifts coordinate bits by hand.

use std::fmt;

use super::{noc_spec, Platform};
use crate::error::{NocError, Result};

/// A (x, y) position on the NoC grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CoreCoord {
    /// Column.
    pub x: u8,
    /// Row.
    pub y: u8,
}

impl CoreCoord {
    /// Create a new coordinate.
    #[inline]
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for CoreCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// A packed physical NoC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NocAddress {
    /// Packed bits.
    pub raw: u64,
    /// Whether `raw` uses the multicast encoding.
    pub multicast: bool,
}

impl fmt::Display for NocAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.multicast { "mcast" } else { "ucast" };
        write!(f, "{}:0x{:016X}", tag, self.raw)
    }
}

/// Bit layout of a NoC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressLayout {
    /// Width of the local offset field.
    pub local_bits: u32,
    /// Width of one coordinate field.
    pub node_id_bits: u32,
}

impl Default for AddressLayout {
    fn default() -> Self {
        Self {
            local_bits: noc_spec::NOC_ADDR_LOCAL_BITS,
            node_id_bits: noc_spec::NOC_ADDR_NODE_ID_BITS,
        }
    }
}

impl AddressLayout {
    /// Mask covering the local offset field.
    pub fn local_mask(&self) -> u64 {
        (1u64 << self.local_bits) - 1
    }

    fn node_mask(&self) -> u64 {
        (1u64 << self.node_id_bits) - 1
    }

    /// Largest coordinate value representable in one node field.
    pub fn max_node_id(&self) -> u8 {
        self.node_mask().min(u8::MAX as u64) as u8
    }

    /// Pack a unicast address. Fields are assumed validated.
    pub fn pack_unicast(&self, coord: CoreCoord, offset: u64) -> u64 {
        let n = self.node_id_bits;
        let node = (coord.x as u64) | ((coord.y as u64) << n);
        (offset & self.local_mask()) | (node << self.local_bits)
    }

    /// Pack a multicast address. Fields are assumed validated.
    pub fn pack_multicast(&self, start: CoreCoord, end: CoreCoord, offset: u64) -> u64 {
        let n = self.node_id_bits;
        let rect = (end.x as u64)
            | ((end.y as u64) << n)
            | ((start.x as u64) << (2 * n))
            | ((start.y as u64) << (3 * n));
        (offset & self.local_mask()) | (rect << self.local_bits)
    }

    /// Unpack a unicast address.
    pub fn unpack_unicast(&self, raw: u64) -> (CoreCoord, u64) {
        let n = self.node_id_bits;
        let node = raw >> self.local_bits;
        let coord = CoreCoord::new(
            (node & self.node_mask()) as u8,
            ((node >> n) & self.node_mask()) as u8,
        );
        (coord, raw & self.local_mask())
    }

    /// Unpack a multicast address into (start, end, offset).
    pub fn unpack_multicast(&self, raw: u64) -> (CoreCoord, CoreCoord, u64) {
        let n = self.node_id_bits;
        let mask = self.node_mask();
        let rect = raw >> self.local_bits;
        let end = CoreCoord::new((rect & mask) as u8, ((rect >> n) & mask) as u8);
        let start = CoreCoord::new(
            ((rect >> (2 * n)) & mask) as u8,
            ((rect >> (3 * n)) & mask) as u8,
        );
        (start, end, raw & self.local_mask())
    }
}

/// Logical description of a transfer target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Worker core by logical grid position.
    Logical(CoreCoord),
    /// Any NoC endpoint by physical position (Ethernet, DRAM, worker).
    Physical(CoreCoord),
    /// DRAM bank by id; the bank's base offset is added.
    DramBank(u16),
}

/// Result of decoding a [`NocAddress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedAddress {
    /// Single endpoint.
    Unicast {
        /// Physical coordinate.
        coord: CoreCoord,
        /// Local offset.
        offset: u64,
    },
    /// Rectangle of endpoints.
    Multicast {
        /// Physical start corner.
        start: CoreCoord,
        /// Physical end corner.
        end: CoreCoord,
        /// Local offset.
        offset: u64,
    },
}

/// Translates logical destinations into physical NoC addresses.
#[derive(Debug, Clone)]
pub struct AddressTranslator {
    layout: AddressLayout,
    grid_width: u8,
    grid_height: u8,
    /// Logical column -> physical x.
    worker_cols: Vec<u8>,
    /// Logical row -> physical y.
    worker_rows: Vec<u8>,
    /// DRAM bank id -> (physical coordinate, base offset).
    dram_banks: Vec<(CoreCoord, u64)>,
}

impl AddressTranslator {
    /// Build a translator for a platform.
    pub fn new(platform: &Platform) -> Self {
        Self {
            layout: platform.layout,
            grid_width: platform.grid_width,
            grid_height: platform.grid_height,
            worker_cols: platform.worker_cols.clone(),
            worker_rows: platform.worker_rows.clone(),
            dram_banks: platform
                .dram_banks
                .iter()
                .map(|bank| (bank.coord, bank.base_offset))
                .collect(),
        }
    }

    /// The address layout in use.
    pub fn layout(&self) -> AddressLayout {
        self.layout
    }

    /// Logical worker grid size as (columns, rows).
    pub fn logical_size(&self) -> (u8, u8) {
        (self.worker_cols.len() as u8, self.worker_rows.len() as u8)
    }

    /// Map a logical worker coordinate to its physical position.
    pub fn to_physical(&self, logical: CoreCoord) -> Result<CoreCoord> {
        let x = self.worker_cols.get(logical.x as usize);
        let y = self.worker_rows.get(logical.y as usize);
        match (x, y) {
            (Some(&x), Some(&y)) => Ok(CoreCoord::new(x, y)),
            _ => {
                let (width, height) = self.logical_size();
                Err(NocError::CoordinateOutOfRange { coord: logical, width, height })
            }
        }
    }

    /// Map a physical coordinate back to a logical worker coordinate.
    ///
    /// Returns `None` for non-worker endpoints (DRAM, Ethernet).
    pub fn to_logical(&self, physical: CoreCoord) -> Option<CoreCoord> {
        let x = self.worker_cols.iter().position(|&c| c == physical.x)?;
        let y = self.worker_rows.iter().position(|&r| r == physical.y)?;
        Some(CoreCoord::new(x as u8, y as u8))
    }

    /// Resolve a destination to a physical coordinate and base offset.
    pub fn resolve(&self, dest: Destination) -> Result<(CoreCoord, u64)> {
        match dest {
            Destination::Logical(coord) => Ok((self.to_physical(coord)?, 0)),
            Destination::Physical(coord) => {
                self.check_physical(coord)?;
                Ok((coord, 0))
            }
            Destination::DramBank(bank) => self
                .dram_banks
                .get(bank as usize)
                .copied()
                .ok_or(NocError::UnknownBank { bank, count: self.dram_banks.len() }),
        }
    }

    /// Translate a unicast destination and local offset.
    pub fn translate(&self, dest: Destination, local_offset: u64) -> Result<NocAddress> {
        let (coord, base) = self.resolve(dest)?;
        let offset = base
            .checked_add(local_offset)
            .ok_or(NocError::OffsetOutOfRange { offset: local_offset, bits: self.layout.local_bits })?;
        self.check_offset(offset)?;
        Ok(NocAddress {
            raw: self.layout.pack_unicast(coord, offset),
            multicast: false,
        })
    }

    /// Split a logical rectangle into physically contiguous blocks, column
    /// runs outermost. Each block can be covered by one multicast address.
    pub fn contiguous_blocks(&self, start: CoreCoord, end: CoreCoord) -> Result<Vec<(CoreCoord, CoreCoord)>> {
        check_rect(start, end)?;
        self.to_physical(start)?;
        self.to_physical(end)?;
        let cols = contiguous_runs(&self.worker_cols, start.x, end.x);
        let rows = contiguous_runs(&self.worker_rows, start.y, end.y);
        let mut blocks = Vec::with_capacity(cols.len() * rows.len());
        for &(x0, x1) in &cols {
            for &(y0, y1) in &rows {
                blocks.push((CoreCoord::new(x0, y0), CoreCoord::new(x1, y1)));
            }
        }
        Ok(blocks)
    }

    /// Translate a logical multicast rectangle (inclusive corners).
    ///
    /// The rectangle must map onto consecutive physical columns and rows;
    /// otherwise the hardware rectangle would also hit the DRAM or Ethernet
    /// endpoints in between. Use [`contiguous_blocks`](Self::contiguous_blocks)
    /// to split such a rectangle.
    pub fn translate_multicast(
        &self,
        rect_start: CoreCoord,
        rect_end: CoreCoord,
        local_offset: u64,
    ) -> Result<NocAddress> {
        let blocks = self.contiguous_blocks(rect_start, rect_end)?;
        if blocks.len() != 1 {
            return Err(NocError::NonContiguousRect { start: rect_start, end: rect_end, blocks: blocks.len() });
        }
        let start = self.to_physical(rect_start)?;
        let end = self.to_physical(rect_end)?;
        self.check_offset(local_offset)?;
        Ok(NocAddress {
            raw: self.layout.pack_multicast(start, end, local_offset),
            multicast: true,
        })
    }

    /// Inverse of [`translate`](Self::translate) and
    /// [`translate_multicast`](Self::translate_multicast).
    pub fn decode(&self, addr: NocAddress) -> DecodedAddress {
        if addr.multicast {
            let (start, end, offset) = self.layout.unpack_multicast(addr.raw);
            DecodedAddress::Multicast { start, end, offset }
        } else {
            let (coord, offset) = self.layout.unpack_unicast(addr.raw);
            DecodedAddress::Unicast { coord, offset }
        }
    }

    /// Physical grid dimensions (width, height).
    pub fn grid_size(&self) -> (u8, u8) {
        (self.grid_width, self.grid_height)
    }

    fn check_physical(&self, coord: CoreCoord) -> Result<()> {
        if coord.x >= self.grid_width || coord.y >= self.grid_height {
            return Err(NocError::CoordinateOutOfRange {
                coord,
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        Ok(())
    }

    fn check_offset(&self, offset: u64) -> Result<()> {
        if offset > self.layout.local_mask() {
            return Err(NocError::OffsetOutOfRange { offset, bits: self.layout.local_bits });
        }
        Ok(())
    }
}

/// Reject rectangles whose start lies past the end on either axis.
pub fn check_rect(start: CoreCoord, end: CoreCoord) -> Result<()> {
    if start.x > end.x || start.y > end.y {
        return Err(NocError::InvalidGeometry { start, end });
    }
    Ok(())
}

/// Split `first..=last` (indices into `table`) into runs whose physical
/// values are consecutive. Returns index (first, last) pairs.
fn contiguous_runs(table: &[u8], first: u8, last: u8) -> Vec<(u8, u8)> {
    let mut runs = Vec::new();
    // (first index, last index, last physical)
    let mut run: Option<(u8, u8, u8)> = None;
    for i in first..=last {
        let Some(&p) = table.get(i as usize) else { break };
        run = match run {
            Some((start, _, last_p)) if last_p.checked_add(1) == Some(p) => Some((start, i, p)),
            Some((start, end, _)) => {
                runs.push((start, end));
                Some((i, i, p))
            }
            None => Some((i, i, p)),
        };
    }
    if let Some((start, end, _)) = run {
        runs.push((start, end));
    }
    runs
}
