//! Circular buffer contract.
//!
//! The allocator itself lives outside the engine. The engine only needs the
//! reserve/push (producer) and wait/pop (consumer) handshake and the local
//! address of a reserved page.
//!
//! ```text
//!   producer:  reserve_back(n) ─► write pages ─► push_back(n)
//!   consumer:  wait_front(n)   ─► read pages  ─► pop_front(n)
//! ```
//!
//! A push or pop must use the same page count as its paired reserve or
//! wait. A mismatch desynchronizes producer and consumer for good, so the
//! buffer is poisoned and every later call fails.

use crate::error::{NocError, Result};

/// Paged producer/consumer buffer.
pub trait CircularBuffer {
    /// Buffer identifier.
    fn id(&self) -> u8;

    /// Bytes per page.
    fn page_size(&self) -> u32;

    /// Pages in the ring.
    fn num_pages(&self) -> u32;

    /// Claim `pages` free pages at the back.
    ///
    /// Returns `Ok(false)` while not enough pages are free.
    fn reserve_back(&mut self, pages: u32) -> Result<bool>;

    /// Publish the reserved pages to the consumer.
    fn push_back(&mut self, pages: u32) -> Result<()>;

    /// Claim `pages` filled pages at the front.
    ///
    /// Returns `Ok(false)` while not enough pages are filled.
    fn wait_front(&mut self, pages: u32) -> Result<bool>;

    /// Release the claimed front pages.
    fn pop_front(&mut self, pages: u32) -> Result<()>;

    /// Pages currently reserved at the back.
    fn reserved(&self) -> u32;

    /// Ring index of page `page` of the current reservation.
    fn ring_page(&self, page: u32) -> u32;

    /// Local L1 offset of ring page `ring_page`.
    fn page_offset(&self, ring_page: u32) -> u64;

    /// Whether an earlier overflow poisoned the buffer.
    fn is_poisoned(&self) -> bool {
        false
    }

    /// Fail unless `pages` pages starting at reservation page `first` are
    /// all reserved.
    fn check_reserved(&self, first: u32, pages: u32) -> Result<()> {
        if self.is_poisoned() {
            return Err(NocError::BufferPoisoned { buffer: self.id() });
        }
        let end = first.saturating_add(pages);
        if pages == 0 || end > self.reserved() {
            return Err(NocError::UnreservedPages {
                buffer: self.id(),
                first,
                end,
                reserved: self.reserved(),
            });
        }
        Ok(())
    }
}

/// In-memory ring of fixed-size pages.
#[derive(Debug, Clone)]
pub struct PagedCircularBuffer {
    id: u8,
    base_offset: u64,
    page_size: u32,
    num_pages: u32,
    /// Ring index of the first unreserved back page.
    back: u32,
    /// Ring index of the oldest filled page.
    front: u32,
    /// Pages pushed and not popped.
    filled: u32,
    reserved: Option<u32>,
    claimed: Option<u32>,
    poisoned: bool,
}

impl PagedCircularBuffer {
    /// A ring of `num_pages` pages of `page_size` bytes at `base_offset`.
    pub fn new(id: u8, base_offset: u64, page_size: u32, num_pages: u32) -> Self {
        Self {
            id,
            base_offset,
            page_size,
            num_pages: num_pages.max(1),
            back: 0,
            front: 0,
            filled: 0,
            reserved: None,
            claimed: None,
            poisoned: false,
        }
    }

    /// Pages pushed and not yet popped.
    pub fn filled(&self) -> u32 {
        self.filled
    }

    fn check_poison(&self) -> Result<()> {
        if self.poisoned {
            return Err(NocError::BufferPoisoned { buffer: self.id });
        }
        Ok(())
    }

    fn overflow(&mut self, operation: &'static str, requested: u32, expected: u32) -> NocError {
        log::warn!(
            "circular buffer {}: {} of {} pages against {}; poisoning",
            self.id,
            operation,
            requested,
            expected
        );
        self.poisoned = true;
        NocError::BufferOverflow { buffer: self.id, operation, requested, expected }
    }

    fn free(&self) -> u32 {
        self.num_pages - self.filled - self.reserved.unwrap_or(0)
    }
}

impl CircularBuffer for PagedCircularBuffer {
    fn id(&self) -> u8 {
        self.id
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn num_pages(&self) -> u32 {
        self.num_pages
    }

    fn reserve_back(&mut self, pages: u32) -> Result<bool> {
        self.check_poison()?;
        let held = self.reserved.unwrap_or(0);
        if pages > self.free() + held {
            return Ok(false);
        }
        self.reserved = Some(pages);
        Ok(true)
    }

    fn push_back(&mut self, pages: u32) -> Result<()> {
        self.check_poison()?;
        let expected = self.reserved.unwrap_or(0);
        if pages != expected {
            return Err(self.overflow("push_back", pages, expected));
        }
        self.back = (self.back + pages) % self.num_pages;
        self.filled += pages;
        self.reserved = None;
        log::trace!("circular buffer {}: pushed {} pages ({} filled)", self.id, pages, self.filled);
        Ok(())
    }

    fn wait_front(&mut self, pages: u32) -> Result<bool> {
        self.check_poison()?;
        if pages > self.filled {
            return Ok(false);
        }
        self.claimed = Some(pages);
        Ok(true)
    }

    fn pop_front(&mut self, pages: u32) -> Result<()> {
        self.check_poison()?;
        let expected = self.claimed.unwrap_or(0);
        if pages != expected {
            return Err(self.overflow("pop_front", pages, expected));
        }
        self.front = (self.front + pages) % self.num_pages;
        self.filled -= pages;
        self.claimed = None;
        Ok(())
    }

    fn reserved(&self) -> u32 {
        self.reserved.unwrap_or(0)
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ring_page(&self, page: u32) -> u32 {
        (self.back + page) % self.num_pages
    }

    fn page_offset(&self, ring_page: u32) -> u64 {
        self.base_offset + ring_page as u64 * self.page_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_consumer_cycle() {
        let mut cb = PagedCircularBuffer::new(0, 0x10000, 512, 4);
        assert!(cb.reserve_back(2).unwrap());
        assert_eq!(cb.page_offset(cb.ring_page(1)), 0x10000 + 512);
        cb.push_back(2).unwrap();
        assert_eq!(cb.filled(), 2);

        assert!(cb.wait_front(2).unwrap());
        cb.pop_front(2).unwrap();
        assert_eq!(cb.filled(), 0);

        // Back pointer advanced
        assert!(cb.reserve_back(1).unwrap());
        assert_eq!(cb.ring_page(0), 2);
    }

    #[test]
    fn test_reserve_waits_for_space() {
        let mut cb = PagedCircularBuffer::new(1, 0, 64, 2);
        assert!(cb.reserve_back(2).unwrap());
        cb.push_back(2).unwrap();
        assert!(!cb.reserve_back(1).unwrap());
        assert!(!cb.wait_front(3).unwrap());
    }

    #[test]
    fn test_push_mismatch_poisons() {
        let mut cb = PagedCircularBuffer::new(2, 0, 64, 8);
        cb.reserve_back(4).unwrap();
        assert_eq!(
            cb.push_back(3),
            Err(NocError::BufferOverflow { buffer: 2, operation: "push_back", requested: 3, expected: 4 })
        );
        assert!(cb.is_poisoned());
        assert_eq!(cb.reserve_back(1), Err(NocError::BufferPoisoned { buffer: 2 }));
        assert_eq!(cb.pop_front(0), Err(NocError::BufferPoisoned { buffer: 2 }));
        assert_eq!(cb.check_reserved(0, 1), Err(NocError::BufferPoisoned { buffer: 2 }));
    }

    #[test]
    fn test_pop_without_wait_overflows() {
        let mut cb = PagedCircularBuffer::new(3, 0, 64, 8);
        cb.reserve_back(1).unwrap();
        cb.push_back(1).unwrap();
        assert!(matches!(cb.pop_front(1), Err(NocError::BufferOverflow { operation: "pop_front", expected: 0, .. })));
    }

    #[test]
    fn test_check_reserved() {
        let mut cb = PagedCircularBuffer::new(4, 0, 64, 8);
        assert!(matches!(cb.check_reserved(0, 1), Err(NocError::UnreservedPages { reserved: 0, .. })));
        cb.reserve_back(2).unwrap();
        assert!(cb.check_reserved(0, 2).is_ok());
        assert!(cb.check_reserved(1, 1).is_ok());
        assert_eq!(
            cb.check_reserved(1, 2),
            Err(NocError::UnreservedPages { buffer: 4, first: 1, end: 3, reserved: 2 })
        );
    }
}
