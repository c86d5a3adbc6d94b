//! Dimension-ordered routing on the NoC torus.
//!
//! Each NoC is unidirectional: NoC0 moves +x then +y, NoC1 moves -x then -y,
//! both wrapping at the grid edge. Responses ride the same NoC as their
//! request, so an ack from a destination back to its sender goes the "long
//! way round" on whichever axis the request used.
//!
//! Only route shape and hop counts are modelled here; arbitration and VC
//! allocation belong to the router.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::address::CoreCoord;

/// Which of the two NoCs carries a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NocId {
    /// +x then +y.
    #[default]
    Noc0,
    /// -x then -y.
    Noc1,
}

/// A directed link between neighbouring routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    /// Upstream router.
    pub from: CoreCoord,
    /// Downstream router.
    pub to: CoreCoord,
}

/// Torus geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Torus {
    /// Columns before wrap.
    pub width: u8,
    /// Rows before wrap.
    pub height: u8,
}

impl Torus {
    /// Create a torus of the given size.
    pub fn new(width: u8, height: u8) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }

    fn step_x(&self, x: u8, noc: NocId) -> u8 {
        match noc {
            NocId::Noc0 => ((x as u16 + 1) % self.width as u16) as u8,
            NocId::Noc1 => ((x as u16 + self.width as u16 - 1) % self.width as u16) as u8,
        }
    }

    fn step_y(&self, y: u8, noc: NocId) -> u8 {
        match noc {
            NocId::Noc0 => ((y as u16 + 1) % self.height as u16) as u8,
            NocId::Noc1 => ((y as u16 + self.height as u16 - 1) % self.height as u16) as u8,
        }
    }

    fn distance(from: u8, to: u8, size: u8, noc: NocId) -> u32 {
        let (a, b, n) = (from as u32, to as u32, size as u32);
        match noc {
            NocId::Noc0 => (b + n - a) % n,
            NocId::Noc1 => (a + n - b) % n,
        }
    }

    /// Hops along the route from `from` to `to`.
    pub fn hops(&self, from: CoreCoord, to: CoreCoord, noc: NocId) -> u32 {
        Self::distance(from.x, to.x, self.width, noc) + Self::distance(from.y, to.y, self.height, noc)
    }

    /// Directed links traversed from `from` to `to`, x first.
    pub fn route(&self, from: CoreCoord, to: CoreCoord, noc: NocId) -> Vec<Link> {
        let mut links = Vec::with_capacity(self.hops(from, to, noc) as usize);
        let mut at = from;
        while at.x != to.x {
            let next = CoreCoord::new(self.step_x(at.x, noc), at.y);
            links.push(Link { from: at, to: next });
            at = next;
        }
        while at.y != to.y {
            let next = CoreCoord::new(at.x, self.step_y(at.y, noc));
            links.push(Link { from: at, to: next });
            at = next;
        }
        links
    }

    /// Whether the route wraps past the grid edge on either axis.
    pub fn crosses_dateline(&self, from: CoreCoord, to: CoreCoord, noc: NocId) -> bool {
        match noc {
            NocId::Noc0 => to.x < from.x || to.y < from.y,
            NocId::Noc1 => to.x > from.x || to.y > from.y,
        }
    }

    /// Links used by a multicast to the inclusive rectangle `start..=end`.
    ///
    /// The packet routes to the rectangle's entry corner (the corner it
    /// reaches first given the NoC direction), runs along the entry row,
    /// then fans down every column.
    pub fn multicast_links(&self, sender: CoreCoord, start: CoreCoord, end: CoreCoord, noc: NocId) -> BTreeSet<Link> {
        let (entry, exit) = match noc {
            NocId::Noc0 => (start, end),
            NocId::Noc1 => (end, start),
        };
        let mut links: BTreeSet<Link> = self.route(sender, entry, noc).into_iter().collect();
        links.extend(self.route(entry, CoreCoord::new(exit.x, entry.y), noc));
        for x in start.x..=end.x {
            links.extend(self.route(CoreCoord::new(x, entry.y), CoreCoord::new(x, exit.y), noc));
        }
        links
    }

    /// Largest hop count from `sender` to any core in the rectangle.
    pub fn farthest_hops(&self, sender: CoreCoord, start: CoreCoord, end: CoreCoord, noc: NocId) -> u32 {
        let mut max = 0;
        for x in start.x..=end.x {
            for y in start.y..=end.y {
                max = max.max(self.hops(sender, CoreCoord::new(x, y), noc));
            }
        }
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hops_wrap() {
        let t = Torus::new(10, 12);
        let a = CoreCoord::new(8, 3);
        let b = CoreCoord::new(1, 5);
        // NoC0: 8 -> 9 -> 0 -> 1 (3 hops), 3 -> 5 (2 hops)
        assert_eq!(t.hops(a, b, NocId::Noc0), 5);
        // NoC1: 8 -> 1 going west (7 hops), 3 -> 5 going north wraps (10 hops)
        assert_eq!(t.hops(a, b, NocId::Noc1), 17);
        assert_eq!(t.hops(a, a, NocId::Noc0), 0);
    }

    #[test]
    fn test_round_trip_covers_ring() {
        let t = Torus::new(10, 12);
        let a = CoreCoord::new(2, 2);
        let b = CoreCoord::new(5, 7);
        assert_eq!(t.hops(a, b, NocId::Noc0) + t.hops(b, a, NocId::Noc0), 10 + 12);
    }

    #[test]
    fn test_route_is_x_then_y() {
        let t = Torus::new(4, 4);
        let links = t.route(CoreCoord::new(0, 0), CoreCoord::new(2, 1), NocId::Noc0);
        assert_eq!(links.len(), 3);
        assert_eq!(links[0], Link { from: CoreCoord::new(0, 0), to: CoreCoord::new(1, 0) });
        assert_eq!(links[1], Link { from: CoreCoord::new(1, 0), to: CoreCoord::new(2, 0) });
        assert_eq!(links[2], Link { from: CoreCoord::new(2, 0), to: CoreCoord::new(2, 1) });
    }

    #[test]
    fn test_dateline() {
        let t = Torus::new(8, 8);
        assert!(!t.crosses_dateline(CoreCoord::new(1, 1), CoreCoord::new(3, 3), NocId::Noc0));
        assert!(t.crosses_dateline(CoreCoord::new(5, 1), CoreCoord::new(3, 3), NocId::Noc0));
        assert!(t.crosses_dateline(CoreCoord::new(1, 1), CoreCoord::new(3, 3), NocId::Noc1));
    }

    #[test]
    fn test_multicast_links_cover_rect() {
        let t = Torus::new(8, 8);
        let links = t.multicast_links(CoreCoord::new(0, 0), CoreCoord::new(1, 1), CoreCoord::new(2, 2), NocId::Noc0);
        // Reach (1,1): 2 links; row 1..=2 on y=1: 1 link; columns x=1,2 down to y=2: 2 links
        assert_eq!(links.len(), 5);
        assert_eq!(t.farthest_hops(CoreCoord::new(0, 0), CoreCoord::new(1, 1), CoreCoord::new(2, 2), NocId::Noc0), 4);
    }
}
