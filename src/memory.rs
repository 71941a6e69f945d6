// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The memory-sharing transaction engine.
//!
//! A transaction walks a fixed handshake: the sender builds a region
//! descriptor and sends it (`SHARE`/`LEND`/`DONATE`), the monitor mints a
//! handle, each receiver retrieves the composite descriptor, maps and uses
//! the memory, relinquishes, and the sender finally reclaims. `DONATE` is the
//! exception: ownership moves permanently at the first retrieve and the
//! relinquish/reclaim half of the handshake is forever denied.
//!
//! The engine keeps no authoritative state of its own. The monitor owns the
//! handle space and the per-receiver [`TransactionState`] machine below; the
//! partition side trusts whatever the latest reply says and propagates
//! errors without retrying, because the monitor is deterministic.

use crate::{
    endpoint::{CallError, Endpoint, expect_success},
    ffa::{FfaError, Handle, Interface, MemReclaimFlags},
    mailbox::MailboxError,
    memdesc::{self, MemoryAccess, MemoryRegion, Relinquish, RelinquishFlags, TransferKind},
    transport::Transport,
};
use arrayvec::ArrayVec;
use log::debug;
use thiserror::Error;

/// Failure of a memory-transaction operation.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Call(#[from] CallError),
    /// The monitor fragmented the descriptor; the baseline engine only
    /// handles single-fragment transactions.
    #[error("descriptor is fragmented: {frag_len} of {total_len} bytes delivered")]
    Fragmented { total_len: u32, frag_len: u32 },
    /// The announced fragment does not fit the RX buffer.
    #[error("fragment of {frag_len} bytes exceeds the {capacity}-byte RX buffer")]
    FragmentTooLarge { frag_len: u32, capacity: usize },
    /// The monitor minted the reserved invalid handle.
    #[error("monitor returned the invalid handle")]
    InvalidHandle,
    /// The retrieved descriptor does not grant the access the receiver needs.
    #[error("retrieved region does not grant the required access")]
    AccessMismatch,
    /// The retrieved descriptor carries no composite region to use.
    #[error("retrieved region carries no composite descriptor")]
    NoComposite,
    /// A constituent range could not be mapped.
    #[error(transparent)]
    Map(#[from] MapError),
}

impl MemoryError {
    /// The FF-A error code to report across a partition boundary, when the
    /// failure has one.
    pub fn ffa_code(&self) -> Option<FfaError> {
        match self {
            MemoryError::Call(CallError::Ffa(code)) => Some(*code),
            _ => None,
        }
    }
}

impl From<MailboxError> for MemoryError {
    fn from(e: MailboxError) -> Self {
        MemoryError::Call(e.into())
    }
}

impl<T: Transport> Endpoint<T> {
    /// Starts a memory-sharing transaction as the sender.
    ///
    /// The descriptor is built into TX and the matching send call issued; on
    /// success the handle minted by the monitor is returned. The engine does
    /// not check that this partition owns the constituents - the monitor is
    /// the authority and answers `DENIED` or `INVALID_PARAMETERS` when the
    /// transaction violates ownership or policy.
    pub fn memory_send(
        &mut self,
        kind: TransferKind,
        region: &MemoryRegion,
    ) -> Result<Handle, MemoryError> {
        let len = memdesc::build_region(region, self.mailbox_mut().tx_buffer())
            .map_err(CallError::Malformed)? as u32;

        let request = match kind {
            TransferKind::Share => Interface::MemShare {
                total_len: len,
                frag_len: len,
            },
            TransferKind::Lend => Interface::MemLend {
                total_len: len,
                frag_len: len,
            },
            TransferKind::Donate => Interface::MemDonate {
                total_len: len,
                frag_len: len,
            },
        };
        let args = expect_success(self.call(request).map_err(CallError::Parse)?)?;

        let handle = Handle::from_regs(args[0], args[1]);
        if handle == Handle::INVALID {
            return Err(MemoryError::InvalidHandle);
        }
        debug!("sent {kind:?} transaction, handle {handle}");
        Ok(handle)
    }

    /// Retrieves the composite descriptor of a transaction this partition is
    /// a receiver of, asking for the given access.
    ///
    /// On success the RX buffer is held by this partition until
    /// [`rx_release`](Endpoint::rx_release); the returned region is a copy,
    /// so the buffer may be released before the memory itself is used.
    pub fn memory_retrieve(
        &mut self,
        handle: Handle,
        sender: u16,
        access: MemoryAccess,
    ) -> Result<MemoryRegion, MemoryError> {
        if self.mailbox().is_rx_held() {
            return Err(MailboxError::RxHeld.into());
        }

        let mut receivers = ArrayVec::new();
        receivers.push(access);
        let request = MemoryRegion {
            sender,
            attributes: memdesc::NORMAL_WB_OUTER_SHAREABLE,
            flags: Default::default(),
            handle,
            tag: 0,
            receivers,
            constituents: ArrayVec::new(),
        };
        let len =
            memdesc::build_region(&request, self.mailbox_mut().tx_buffer())
                .map_err(CallError::Malformed)? as u32;

        let reply = self
            .call(Interface::MemRetrieveReq {
                total_len: len,
                frag_len: len,
            })
            .map_err(CallError::Parse)?;

        let (total_len, frag_len) = match reply {
            Interface::MemRetrieveResp {
                total_len,
                frag_len,
            } => (total_len, frag_len),
            Interface::Error { error_code, .. } => {
                return Err(CallError::Ffa(error_code).into());
            }
            other => return Err(CallError::Unexpected(other).into()),
        };

        // The baseline path assumes the whole descriptor arrived in one
        // fragment; larger transactions are an extension point in the codec.
        if total_len != frag_len {
            return Err(MemoryError::Fragmented {
                total_len,
                frag_len,
            });
        }
        if frag_len as usize > self.mailbox().len() {
            return Err(MemoryError::FragmentTooLarge {
                frag_len,
                capacity: self.mailbox().len(),
            });
        }

        self.mailbox_mut().hold_rx()?;
        let region = memdesc::parse_region(&self.mailbox().rx_buffer()[..frag_len as usize])
            .map_err(CallError::Malformed)?;
        debug!(
            "retrieved handle {handle}: {} constituents, {} pages",
            region.constituents.len(),
            region.page_count()
        );
        Ok(region)
    }

    /// Gives up this receiver's access to a retrieved region.
    ///
    /// Any mapping of the constituents must have been torn down first, and
    /// the handle must not belong to a `DONATE` transaction (the monitor
    /// answers `DENIED`; this engine propagates).
    pub fn memory_relinquish(
        &mut self,
        handle: Handle,
        flags: RelinquishFlags,
    ) -> Result<(), MemoryError> {
        let mut endpoints = ArrayVec::new();
        endpoints.push(self.id());
        let relinquish = Relinquish {
            handle,
            flags,
            endpoints,
        };
        memdesc::build_relinquish(&relinquish, self.mailbox_mut().tx_buffer())
            .map_err(CallError::Malformed)?;

        expect_success(self.call(Interface::MemRelinquish).map_err(CallError::Parse)?)?;
        debug!("relinquished handle {handle}");
        Ok(())
    }

    /// Reclaims exclusive access as the original sender, after every receiver
    /// has relinquished.
    pub fn memory_reclaim(
        &mut self,
        handle: Handle,
        flags: MemReclaimFlags,
    ) -> Result<(), MemoryError> {
        expect_success(
            self.call(Interface::MemReclaim { handle, flags })
                .map_err(CallError::Parse)?,
        )?;
        debug!("reclaimed handle {handle}");
        Ok(())
    }
}

/// Maps retrieved constituents into the partition's address space.
///
/// Mapping is a platform concern (stage-1 tables on hardware, an identity
/// view in the host harness), so the loop reaches it through this seam. The
/// closure shape ties the mapping's lifetime to the use: the pages are
/// unmapped when the closure returns, which is what makes "the mapping must
/// not outlive the relinquish" hold by construction.
pub trait MemoryMap {
    /// Maps `page_count` pages at `address`, passes the mapped bytes to `f`,
    /// and unmaps them again.
    fn with_mapping(
        &mut self,
        address: u64,
        page_count: u32,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), MapError>;
}

/// A constituent range that could not be mapped.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("failed to map {page_count} pages at {address:#x}")]
pub struct MapError {
    pub address: u64,
    pub page_count: u32,
}

/// Authoritative per-receiver state of one transaction, held by the monitor.
///
/// `Reclaimed` and `Donated` are the two terminal states; a handle never
/// leaves either, and is never reused for another live transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionState {
    /// The sender has sent; this receiver has not retrieved.
    Sent,
    /// The receiver has retrieved and may access the memory.
    Retrieved,
    /// The receiver is done; ownership is on its way back to the sender.
    Relinquished,
    /// The sender has reclaimed exclusive access. Terminal.
    Reclaimed,
    /// Ownership was transferred permanently. Terminal.
    Donated,
}

impl TransactionState {
    /// A retrieve call from the receiver.
    ///
    /// A second retrieve without an intervening relinquish fails
    /// deterministically rather than producing a second descriptor.
    pub fn retrieve(self, kind: TransferKind) -> Result<Self, FfaError> {
        match (self, kind) {
            (TransactionState::Sent, TransferKind::Donate) => Ok(TransactionState::Donated),
            (TransactionState::Sent, _) => Ok(TransactionState::Retrieved),
            _ => Err(FfaError::Denied),
        }
    }

    /// A relinquish call from the receiver.
    pub fn relinquish(self) -> Result<Self, FfaError> {
        match self {
            TransactionState::Retrieved => Ok(TransactionState::Relinquished),
            _ => Err(FfaError::Denied),
        }
    }

    /// The sender's reclaim, applied once every receiver reached
    /// `Relinquished`.
    pub fn reclaim(self) -> Result<Self, FfaError> {
        match self {
            TransactionState::Relinquished => Ok(TransactionState::Reclaimed),
            _ => Err(FfaError::Denied),
        }
    }
}
