//! Transaction ID tracking.
//!
//! The hardware exposes a small set of transaction IDs (trids). Each one
//! counts the requests issued under it; a wait on an ID spins until its
//! count drains. This module keeps the same bookkeeping in software:
//!
//! - **Binding**: attach an engine sequence number to an ID at issue
//! - **Completion**: fabric events drive `complete(seq)`
//! - **Observation**: a wait that sees the completion frees the ID
//!
//! # Slot Lifecycle
//!
//! ```text
//!          bind             last completion          wait observes
//!  Free ─────────► Pending ─────────────────► Complete ─────────► Free
//!                   │  ▲                          │
//!                   └──┘ bind (unchecked only)    └─ bind (rebinds)
//! ```
//!
//! Checked mode rejects binding a `Pending` ID with `UseBeforeComplete`.
//! Unchecked mode mirrors the hardware counter: the new request joins the
//! outstanding count and the ID completes once all of them are done.
//!
//! # Usage
//!
//! ```
//! use noc_engine::engine::trid::{TridSlot, TridTracker};
//! use noc_engine::engine::transaction::TransactionId;
//!
//! let mut tracker = TridTracker::new(4, true);
//! let id = TransactionId::new(2);
//!
//! tracker.bind(10, id).unwrap();
//! assert!(tracker.bind(11, id).is_err());
//!
//! tracker.complete(10);
//! assert_eq!(tracker.slot(id), Some(TridSlot::Complete { seq: 10 }));
//! tracker.observe(id);
//! assert_eq!(tracker.slot(id), Some(TridSlot::Free));
//! ```

use std::collections::HashMap;

use super::transaction::TransactionId;
use crate::error::{NocError, Result};

/// State of one transaction ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TridSlot {
    /// Nothing bound.
    #[default]
    Free,
    /// Requests in flight.
    Pending {
        /// Most recent request bound to the ID.
        seq: u64,
        /// Requests not yet complete.
        outstanding: u32,
    },
    /// Done but not yet observed by a wait.
    Complete {
        /// Last request that completed.
        seq: u64,
    },
}

impl TridSlot {
    /// Whether requests are still in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, TridSlot::Pending { .. })
    }
}

/// Tracker statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TridStats {
    /// Requests bound.
    pub binds: u64,
    /// Requests completed.
    pub completions: u64,
    /// Binds that joined a pending ID (unchecked mode).
    pub overlapping_binds: u64,
    /// Completed slots released by a later bind without being observed.
    pub unobserved_rebinds: u64,
}

/// Binds transaction IDs to in-flight requests.
#[derive(Debug, Clone)]
pub struct TridTracker {
    slots: Vec<TridSlot>,
    checked: bool,
    /// Sequence number -> ID it was bound to.
    bound: HashMap<u64, TransactionId>,
    stats: TridStats,
}

impl TridTracker {
    /// Create a tracker with `num_trids` IDs.
    pub fn new(num_trids: u8, checked: bool) -> Self {
        Self {
            slots: vec![TridSlot::Free; num_trids as usize],
            checked,
            bound: HashMap::new(),
            stats: TridStats::default(),
        }
    }

    /// Size of the ID space.
    pub fn num_trids(&self) -> u8 {
        self.slots.len() as u8
    }

    /// Whether reuse is checked.
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// State of an ID, `None` if out of range.
    pub fn slot(&self, id: TransactionId) -> Option<TridSlot> {
        self.slots.get(id.index()).copied()
    }

    /// Whether `id` has requests in flight. Out-of-range IDs never do.
    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.slot(id).is_some_and(|s| s.is_pending())
    }

    /// IDs with requests in flight.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_pending()).count()
    }

    /// Statistics.
    pub fn stats(&self) -> TridStats {
        self.stats
    }

    /// Reject an ID that is out of range.
    pub fn check_range(&self, id: TransactionId) -> Result<()> {
        if id.index() >= self.slots.len() {
            return Err(NocError::InvalidTransactionId { id, count: self.num_trids() });
        }
        Ok(())
    }

    /// Validate a bind without changing anything.
    pub fn check(&self, id: TransactionId) -> Result<()> {
        self.check_range(id)?;
        if let TridSlot::Pending { seq, .. } = self.slots[id.index()] {
            if self.checked {
                return Err(NocError::UseBeforeComplete { id, pending_seq: seq });
            }
        }
        Ok(())
    }

    /// Bind request `seq` to `id`.
    pub fn bind(&mut self, seq: u64, id: TransactionId) -> Result<()> {
        self.check(id)?;
        let slot = &mut self.slots[id.index()];
        *slot = match *slot {
            TridSlot::Free => TridSlot::Pending { seq, outstanding: 1 },
            TridSlot::Complete { seq: old } => {
                log::trace!("{} rebound, releasing #{}", id, old);
                self.stats.unobserved_rebinds += 1;
                TridSlot::Pending { seq, outstanding: 1 }
            }
            TridSlot::Pending { outstanding, .. } => {
                log::debug!("{} rebound while {} request(s) pending", id, outstanding);
                self.stats.overlapping_binds += 1;
                TridSlot::Pending { seq, outstanding: outstanding + 1 }
            }
        };
        self.bound.insert(seq, id);
        self.stats.binds += 1;
        Ok(())
    }

    /// Record completion of request `seq`.
    ///
    /// Returns the ID it was bound to, if any.
    pub fn complete(&mut self, seq: u64) -> Option<TransactionId> {
        let id = self.bound.remove(&seq)?;
        let slot = &mut self.slots[id.index()];
        match *slot {
            TridSlot::Pending { seq: latest, outstanding } if outstanding > 1 => {
                *slot = TridSlot::Pending { seq: latest, outstanding: outstanding - 1 };
            }
            TridSlot::Pending { seq: latest, .. } => {
                *slot = TridSlot::Complete { seq: latest };
            }
            other => {
                log::warn!("{} completed #{} while {:?}", id, seq, other);
            }
        }
        self.stats.completions += 1;
        Some(id)
    }

    /// A wait saw `id` done; release it.
    pub fn observe(&mut self, id: TransactionId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if let TridSlot::Complete { .. } = slot {
                *slot = TridSlot::Free;
            }
        }
    }

    /// Release every completed ID.
    pub fn observe_all(&mut self) {
        for slot in &mut self.slots {
            if let TridSlot::Complete { .. } = slot {
                *slot = TridSlot::Free;
            }
        }
    }
}

/// Round-robin transaction IDs over a fixed window.
///
/// With a window of N, the ID handed out for request k is `k % N`. Once N
/// requests are out, the next ID is also the oldest in flight, so waiting on
/// it before reuse gives FIFO completion checks.
///
/// # Usage
///
/// ```
/// use noc_engine::engine::trid::TridRotation;
///
/// let mut rot = TridRotation::new(2);
/// let a = rot.next();
/// let b = rot.next();
/// let c = rot.next();
/// assert!(!a.wait_first && !b.wait_first);
/// assert!(c.wait_first);
/// assert_eq!(a.id, c.id);
/// ```
#[derive(Debug, Clone)]
pub struct TridRotation {
    base: u8,
    window: u8,
    handed_out: u64,
}

/// One step of a [`TridRotation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TridTurn {
    /// ID to bind.
    pub id: TransactionId,
    /// The ID may still be in flight; wait on it before binding.
    pub wait_first: bool,
}

impl TridRotation {
    /// Rotate over IDs `0..window`.
    pub fn new(window: u8) -> Self {
        Self::starting_at(0, window)
    }

    /// Rotate over IDs `base..base + window`.
    ///
    /// The window is clamped so the last ID still fits in a `u8`.
    pub fn starting_at(base: u8, window: u8) -> Self {
        let window = (window.max(1) as u16).min(256 - base as u16) as u8;
        Self { base, window, handed_out: 0 }
    }

    /// Window size.
    pub fn window(&self) -> u8 {
        self.window
    }

    /// Next ID in the rotation.
    pub fn next(&mut self) -> TridTurn {
        let id = TransactionId::new(self.base + (self.handed_out % self.window as u64) as u8);
        let wait_first = self.handed_out >= self.window as u64;
        self.handed_out += 1;
        TridTurn { id, wait_first }
    }

    /// IDs that may still be in flight, oldest first.
    pub fn in_window(&self) -> Vec<TransactionId> {
        let live = self.handed_out.min(self.window as u64);
        (self.handed_out - live..self.handed_out)
            .map(|k| TransactionId::new(self.base + (k % self.window as u64) as u8))
            .collect()
    }
}
