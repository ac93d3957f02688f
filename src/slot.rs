//! Single-slot request tracking
//!
//! Each orchestrator owns one [`RequestSlot`]. A call must acquire the slot
//! before doing any work; while the returned guard is alive further calls are
//! rejected instead of overlapping.

use std::sync::atomic::{AtomicBool, Ordering};

/// At-most-one-outstanding-request gate
#[derive(Debug, Default)]
pub struct RequestSlot {
    busy: AtomicBool,
}

/// Held while a request is outstanding; releases the slot on drop
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slot: &'a RequestSlot,
}

impl RequestSlot {
    /// Create a free slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or `None` when a request is already outstanding
    ///
    /// # Examples
    ///
    /// ```
    /// use ragchat::slot::RequestSlot;
    ///
    /// let slot = RequestSlot::new();
    /// let guard = slot.try_acquire().unwrap();
    /// assert!(slot.try_acquire().is_none());
    /// drop(guard);
    /// assert!(slot.try_acquire().is_some());
    /// ```
    pub fn try_acquire(&self) -> Option<SlotGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard { slot: self })
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}
