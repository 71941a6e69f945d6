// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The per-partition RX/TX buffer pair.
//!
//! Descriptors too large for registers travel through a pair of page-aligned
//! buffers registered with the monitor once, via `FFA_RXTX_MAP`. TX belongs
//! to the partition and is filled before a descriptor-bearing call; RX
//! belongs to the monitor, which writes one reply descriptor into it per
//! transaction step. The partition must not reuse or unmap RX until it has
//! handed it back with `FFA_RX_RELEASE`; [`Mailbox`] tracks that single-slot
//! window so the engines can refuse a second descriptor-bearing call while
//! the first reply is still held.

use thiserror::Error;

/// Size of one translation granule, and of each mailbox buffer.
pub const PAGE_SIZE: usize = 4096;

/// A page-aligned buffer suitable for one side of a mailbox or for a shared
/// memory region.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageBuffer(pub [u8; PAGE_SIZE]);

impl PageBuffer {
    pub const fn new() -> Self {
        Self([0; PAGE_SIZE])
    }
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Violation of the mailbox ownership discipline.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum MailboxError {
    #[error("RX buffer is held by this partition and has not been released")]
    RxHeld,
    #[error("RX buffer is not currently held")]
    RxNotHeld,
}

/// A partition's send/receive buffer pair.
///
/// The buffers are referenced raw because their addresses are exactly what
/// gets registered with the monitor; whoever constructs the mailbox vouches
/// for them (see [`Mailbox::from_raw`]).
pub struct Mailbox {
    tx: *mut u8,
    rx: *const u8,
    len: usize,
    rx_held: bool,
}

// SAFETY: The pointers refer to buffers dedicated to the owning partition for
// the lifetime promised to `from_raw`; the mailbox is not `Sync`, so all
// access stays on the execution context that owns the pair.
unsafe impl Send for Mailbox {}

impl Mailbox {
    /// Creates a mailbox over a caller-provided buffer pair.
    ///
    /// # Safety
    ///
    /// `tx` and `rx` must point to page-aligned buffers of `len` bytes each,
    /// valid and unaliased (other than by the monitor, per the FF-A ownership
    /// rules) for the lifetime of the returned mailbox. `len` must be a
    /// multiple of [`PAGE_SIZE`].
    pub unsafe fn from_raw(tx: *mut u8, rx: *const u8, len: usize) -> Self {
        assert!(len.is_multiple_of(PAGE_SIZE));
        Self {
            tx,
            rx,
            len,
            rx_held: false,
        }
    }

    /// Buffer size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address registered as the send buffer.
    pub fn tx_addr(&self) -> u64 {
        self.tx as u64
    }

    /// Address registered as the receive buffer.
    pub fn rx_addr(&self) -> u64 {
        self.rx as u64
    }

    /// Number of pages per buffer, as `FFA_RXTX_MAP` wants it.
    pub fn page_count(&self) -> u32 {
        (self.len / PAGE_SIZE) as u32
    }

    /// The TX buffer, for building an outgoing descriptor in place.
    pub fn tx_buffer(&mut self) -> &mut [u8] {
        // SAFETY: `from_raw` guarantees `tx` points to `len` valid bytes owned
        // by this partition, and `&mut self` makes this the only live view.
        unsafe { core::slice::from_raw_parts_mut(self.tx, self.len) }
    }

    /// The RX buffer contents. Only meaningful while the buffer is held, i.e.
    /// after the monitor announced a descriptor and before `rx_release`.
    pub fn rx_buffer(&self) -> &[u8] {
        // SAFETY: `from_raw` guarantees `rx` points to `len` valid bytes; the
        // monitor only writes it while the partition is suspended in a call.
        unsafe { core::slice::from_raw_parts(self.rx, self.len) }
    }

    /// Records that the monitor has filled RX for us.
    pub(crate) fn hold_rx(&mut self) -> Result<(), MailboxError> {
        if self.rx_held {
            return Err(MailboxError::RxHeld);
        }
        self.rx_held = true;
        Ok(())
    }

    /// Records that RX was handed back to the monitor.
    pub(crate) fn release_rx(&mut self) -> Result<(), MailboxError> {
        if !self.rx_held {
            return Err(MailboxError::RxNotHeld);
        }
        self.rx_held = false;
        Ok(())
    }

    /// Whether the partition still holds the RX buffer.
    pub fn is_rx_held(&self) -> bool {
        self.rx_held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_window_is_single_slot() {
        let mut tx = PageBuffer::new();
        let rx = PageBuffer::new();
        // SAFETY: both buffers are page-aligned, live for the whole test, and
        // only accessed through the mailbox.
        let mut mailbox = unsafe { Mailbox::from_raw(tx.0.as_mut_ptr(), rx.0.as_ptr(), PAGE_SIZE) };

        assert!(!mailbox.is_rx_held());
        assert_eq!(mailbox.hold_rx(), Ok(()));
        assert_eq!(mailbox.hold_rx(), Err(MailboxError::RxHeld));
        assert_eq!(mailbox.release_rx(), Ok(()));
        assert_eq!(mailbox.release_rx(), Err(MailboxError::RxNotHeld));
    }

    #[test]
    fn addresses_match_buffers() {
        let mut tx = PageBuffer::new();
        let rx = PageBuffer::new();
        // SAFETY: as above.
        let mailbox = unsafe { Mailbox::from_raw(tx.0.as_mut_ptr(), rx.0.as_ptr(), PAGE_SIZE) };
        assert_eq!(mailbox.tx_addr(), tx.0.as_ptr() as u64);
        assert_eq!(mailbox.rx_addr(), rx.0.as_ptr() as u64);
        assert_eq!(mailbox.page_count(), 1);
    }
}
