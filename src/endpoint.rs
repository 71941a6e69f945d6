// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! One partition's view of the FF-A instance it runs on.
//!
//! An [`Endpoint`] bundles the partition identifier, the mailbox pair and the
//! transport into the context every engine operates on. This module carries
//! the setup and discovery calls (version negotiation, identity, mailbox
//! registration, partition information); the memory-transaction and
//! direct-messaging engines add their operations in their own modules.

use crate::{
    ffa::{self, FfaError, Interface, ParseError, Version},
    mailbox::{Mailbox, MailboxError},
    memdesc::{self, DescriptorError, MAX_PARTITIONS, PartitionInfo},
    transport::Transport,
};
use arrayvec::ArrayVec;
use log::debug;
use thiserror::Error;
use uuid::Uuid;

/// The FF-A version this implementation speaks.
pub const FFA_VERSION: Version = Version(1, 0);

/// Partition identifier of the hypervisor / normal-world driver.
pub const HYP_ID: u16 = 0;

/// Bit 15 of a partition identifier marks a Secure Partition.
pub const SP_ID_MASK: u16 = 1 << 15;

/// Returns true if the identifier belongs to the secure world.
pub const fn is_secure_id(id: u16) -> bool {
    id & SP_ID_MASK != 0
}

/// Failure of an individual FF-A call.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CallError {
    /// The reply frame could not be decoded.
    #[error("failed to decode FF-A reply: {0}")]
    Parse(#[from] ParseError),
    /// The monitor answered with an error frame.
    #[error("FF-A call failed with {0}")]
    Ffa(FfaError),
    /// The reply was well-formed but not one this call can accept.
    #[error("unexpected FF-A reply {0:?}")]
    Unexpected(Interface),
    /// The descriptor in the mailbox was malformed.
    #[error("malformed descriptor: {0}")]
    Malformed(#[from] DescriptorError),
    /// The mailbox discipline would be violated.
    #[error("mailbox violation: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Extracts the result words of a success frame, surfacing an error frame as
/// its code and anything else as a protocol failure.
pub fn expect_success(reply: Interface) -> Result<[u64; 6], CallError> {
    match reply {
        Interface::Success { args, .. } => Ok(args),
        Interface::Error { error_code, .. } => Err(CallError::Ffa(error_code)),
        other => Err(CallError::Unexpected(other)),
    }
}

/// A partition-side execution context.
pub struct Endpoint<T: Transport> {
    transport: T,
    id: u16,
    mailbox: Mailbox,
}

impl<T: Transport> Endpoint<T> {
    pub fn new(transport: T, id: u16, mailbox: Mailbox) -> Self {
        Self {
            transport,
            id,
            mailbox,
        }
    }

    /// This partition's identifier.
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }

    /// Direct access to the transport, for harnesses that embed the monitor.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Issues a typed call and decodes the reply frame.
    pub(crate) fn call(&mut self, interface: Interface) -> Result<Interface, ParseError> {
        debug!("endpoint {:#x}: {interface:x?}", self.id);
        ffa::call(&mut self.transport, interface)
    }

    /// Negotiates the FF-A version with the monitor. Must happen before any
    /// other call.
    pub fn negotiate_version(&mut self) -> Result<Version, CallError> {
        let version = ffa::version(&mut self.transport, FFA_VERSION).map_err(CallError::Ffa)?;
        if !FFA_VERSION.is_compatible_to(&version) {
            return Err(CallError::Ffa(FfaError::NotSupported));
        }
        Ok(version)
    }

    /// Asks the monitor for this partition's identifier.
    pub fn id_get(&mut self) -> Result<u16, CallError> {
        let args = expect_success(self.call(Interface::IdGet)?)?;
        Ok(args[0] as u16)
    }

    /// Asks the monitor for the SPMC's identifier.
    pub fn spm_id_get(&mut self) -> Result<u16, CallError> {
        let args = expect_success(self.call(Interface::SpmIdGet)?)?;
        Ok(args[0] as u16)
    }

    /// Queries whether the monitor implements the given function.
    pub fn features(&mut self, func_id: u32) -> Result<(), CallError> {
        expect_success(self.call(Interface::Features { func_id })?)?;
        Ok(())
    }

    /// Registers the mailbox pair with the monitor. Must be paired with
    /// [`unregister_mailbox`](Self::unregister_mailbox) before the buffers
    /// are reused.
    pub fn register_mailbox(&mut self) -> Result<(), CallError> {
        let request = Interface::RxTxMap {
            tx_addr: self.mailbox.tx_addr(),
            rx_addr: self.mailbox.rx_addr(),
            page_count: self.mailbox.page_count(),
        };
        expect_success(self.call(request)?)?;
        Ok(())
    }

    /// Withdraws the mailbox pair from the monitor.
    pub fn unregister_mailbox(&mut self) -> Result<(), CallError> {
        expect_success(self.call(Interface::RxTxUnmap { id: self.id })?)?;
        Ok(())
    }

    /// Hands the RX buffer back to the monitor.
    pub fn rx_release(&mut self) -> Result<(), CallError> {
        expect_success(self.call(Interface::RxRelease { vm_id: self.id })?)?;
        self.mailbox.release_rx()?;
        Ok(())
    }

    /// Looks up deployed partitions by UUID; the nil UUID matches every
    /// partition. An unrecognised UUID yields an empty list, not an error.
    pub fn partition_info(
        &mut self,
        uuid: Uuid,
    ) -> Result<ArrayVec<PartitionInfo, MAX_PARTITIONS>, CallError> {
        if self.mailbox.is_rx_held() {
            return Err(MailboxError::RxHeld.into());
        }
        let args = expect_success(self.call(Interface::PartitionInfoGet { uuid })?)?;
        let count = args[0] as usize;
        if count == 0 {
            return Ok(ArrayVec::new());
        }
        // The entries landed in our RX buffer, which we hold until released.
        self.mailbox.hold_rx()?;
        let entries = memdesc::parse_partition_info(self.mailbox.rx_buffer(), count)?;
        self.rx_release()?;
        Ok(entries)
    }
}
