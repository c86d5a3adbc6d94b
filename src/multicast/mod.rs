//! Multicast geometry.
//!
//! Where the sender sits relative to the destination rectangle decides how
//! the write fans out and how acks come back. Ten schemes cover every
//! position:
//!
//! ```text
//!             col shared
//!        9  │    7    │  10
//!    ───────┼─────────┼───────
//!  row   5  │ 1  │  2 │  6     row
//! shared    │────┼────│        shared
//!           │ 3  │  4 │
//!    ───────┼─────────┼───────
//!       10  │    8    │  9
//! ```
//!
//! - 1-4: sender inside the rectangle, by quadrant
//! - 5-8: sender outside, sharing a row (left/right) or column (above/below)
//! - 9-10: sender outside, sharing neither, on the main or anti diagonal
//!
//! Coordinates are logical; y grows downward.

pub mod planner;

pub use planner::{MulticastPlan, MulticastPlanner, MulticastRequest, PlanWarning, ThroughputEstimate};

use std::fmt;

use crate::device::address::CoreCoord;

/// Sender/rectangle geometry class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MulticastScheme {
    /// Inside, top-left quadrant.
    InsideTopLeft,
    /// Inside, top-right quadrant.
    InsideTopRight,
    /// Inside, bottom-left quadrant.
    InsideBottomLeft,
    /// Inside, bottom-right quadrant.
    InsideBottomRight,
    /// Outside, same row, left of the rectangle.
    RowLeft,
    /// Outside, same row, right of the rectangle.
    RowRight,
    /// Outside, same column, above the rectangle.
    ColumnAbove,
    /// Outside, same column, below the rectangle.
    ColumnBelow,
    /// Outside, up-left or down-right of the rectangle.
    MainDiagonal,
    /// Outside, up-right or down-left of the rectangle.
    AntiDiagonal,
}

impl MulticastScheme {
    /// Every scheme, in number order.
    pub const ALL: [MulticastScheme; 10] = [
        MulticastScheme::InsideTopLeft,
        MulticastScheme::InsideTopRight,
        MulticastScheme::InsideBottomLeft,
        MulticastScheme::InsideBottomRight,
        MulticastScheme::RowLeft,
        MulticastScheme::RowRight,
        MulticastScheme::ColumnAbove,
        MulticastScheme::ColumnBelow,
        MulticastScheme::MainDiagonal,
        MulticastScheme::AntiDiagonal,
    ];

    /// Classify `sender` against the inclusive rectangle `start..=end`.
    ///
    /// The rectangle must already be validated (start <= end).
    pub fn classify(sender: CoreCoord, start: CoreCoord, end: CoreCoord) -> Self {
        let shares_col = (start.x..=end.x).contains(&sender.x);
        let shares_row = (start.y..=end.y).contains(&sender.y);
        let left = sender.x < start.x;
        let above = sender.y < start.y;

        match (shares_col, shares_row) {
            (true, true) => {
                // Doubled to keep the centre exact; ties go top-left.
                let west = 2 * sender.x as u16 <= start.x as u16 + end.x as u16;
                let north = 2 * sender.y as u16 <= start.y as u16 + end.y as u16;
                match (west, north) {
                    (true, true) => MulticastScheme::InsideTopLeft,
                    (false, true) => MulticastScheme::InsideTopRight,
                    (true, false) => MulticastScheme::InsideBottomLeft,
                    (false, false) => MulticastScheme::InsideBottomRight,
                }
            }
            (false, true) if left => MulticastScheme::RowLeft,
            (false, true) => MulticastScheme::RowRight,
            (true, false) if above => MulticastScheme::ColumnAbove,
            (true, false) => MulticastScheme::ColumnBelow,
            (false, false) if left == above => MulticastScheme::MainDiagonal,
            (false, false) => MulticastScheme::AntiDiagonal,
        }
    }

    /// Scheme number, 1 through 10.
    pub fn number(&self) -> u8 {
        match self {
            MulticastScheme::InsideTopLeft => 1,
            MulticastScheme::InsideTopRight => 2,
            MulticastScheme::InsideBottomLeft => 3,
            MulticastScheme::InsideBottomRight => 4,
            MulticastScheme::RowLeft => 5,
            MulticastScheme::RowRight => 6,
            MulticastScheme::ColumnAbove => 7,
            MulticastScheme::ColumnBelow => 8,
            MulticastScheme::MainDiagonal => 9,
            MulticastScheme::AntiDiagonal => 10,
        }
    }

    /// Whether the sender lies inside the rectangle.
    pub fn sender_inside(&self) -> bool {
        self.number() <= 4
    }
}

impl fmt::Display for MulticastScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheme {} ({:?})", self.number(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: u8, y: u8) -> CoreCoord {
        CoreCoord::new(x, y)
    }

    #[test]
    fn test_corners_map_to_quadrants() {
        let (s, e) = (c(2, 2), c(5, 5));
        assert_eq!(MulticastScheme::classify(c(2, 2), s, e), MulticastScheme::InsideTopLeft);
        assert_eq!(MulticastScheme::classify(c(5, 2), s, e), MulticastScheme::InsideTopRight);
        assert_eq!(MulticastScheme::classify(c(2, 5), s, e), MulticastScheme::InsideBottomLeft);
        assert_eq!(MulticastScheme::classify(c(5, 5), s, e), MulticastScheme::InsideBottomRight);
    }

    #[test]
    fn test_outside_positions() {
        let (s, e) = (c(2, 2), c(4, 4));
        assert_eq!(MulticastScheme::classify(c(0, 3), s, e), MulticastScheme::RowLeft);
        assert_eq!(MulticastScheme::classify(c(6, 3), s, e), MulticastScheme::RowRight);
        assert_eq!(MulticastScheme::classify(c(3, 0), s, e), MulticastScheme::ColumnAbove);
        assert_eq!(MulticastScheme::classify(c(3, 7), s, e), MulticastScheme::ColumnBelow);
        assert_eq!(MulticastScheme::classify(c(0, 0), s, e), MulticastScheme::MainDiagonal);
        assert_eq!(MulticastScheme::classify(c(6, 6), s, e), MulticastScheme::MainDiagonal);
        assert_eq!(MulticastScheme::classify(c(6, 0), s, e), MulticastScheme::AntiDiagonal);
        assert_eq!(MulticastScheme::classify(c(0, 6), s, e), MulticastScheme::AntiDiagonal);
    }

    #[test]
    fn test_single_core_rect() {
        let p = c(3, 3);
        assert_eq!(MulticastScheme::classify(p, p, p), MulticastScheme::InsideTopLeft);
    }

    #[test]
    fn test_every_position_classifies() {
        // Exhaustive over a 6x6 grid: every rect, every sender
        let mut seen = std::collections::BTreeSet::new();
        for sx in 0..6 {
            for sy in 0..6 {
                for ex in sx..6 {
                    for ey in sy..6 {
                        for px in 0..6 {
                            for py in 0..6 {
                                let scheme = MulticastScheme::classify(c(px, py), c(sx, sy), c(ex, ey));
                                let inside = (sx..=ex).contains(&px) && (sy..=ey).contains(&py);
                                assert_eq!(scheme.sender_inside(), inside);
                                assert!((1..=10).contains(&scheme.number()));
                                seen.insert(scheme);
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(seen.len(), 10);
    }
}
