// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The per-partition message loop.
//!
//! A test partition spends its life suspended in the monitor: the initial
//! `FFA_MSG_WAIT` signals that initialisation is complete, and from then on
//! every reply re-enters the wait. The loop decodes one incoming request,
//! dispatches it, and answers with a direct response whose blocking call
//! yields the next request.
//!
//! There is no graceful exit. A partition has nobody to return to except the
//! monitor, so a framing violation - a function id that is not a request, a
//! receiver id that is not ours, a source outside the expected caller class -
//! ends the loop with an error the embedding must treat as fatal.

use crate::{
    endpoint::{CallError, Endpoint, is_secure_id},
    ffa::{FfaError, Interface},
    memdesc::{DataAccess, MemRegionFlags, MemoryAccess, MemoryRegion, TransferKind},
    memory::{MemoryError, MemoryMap},
    message::{Command, CommandResponse, MessageError},
    transport::Transport,
};
use arrayvec::ArrayVec;
use core::convert::Infallible;
use log::{debug, error, info};
use thiserror::Error;

/// Number of words a receiver writes into a shared region when the command
/// does not say otherwise.
const DEFAULT_WORDS_TO_WRITE: u32 = 5;

/// A framing violation that ends the message loop.
///
/// Once the request framing cannot be trusted there is no safe degraded mode;
/// the embedding halts the partition.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum FatalError {
    #[error("woke up with non-request interface {0:?}")]
    UnexpectedInterface(Interface),
    #[error("request addressed to {destination:#x} delivered to {own:#x}")]
    WrongDestination { destination: u16, own: u16 },
    #[error("request from unexpected source {source_id:#x}")]
    InvalidSource { source_id: u16 },
    #[error(transparent)]
    Call(#[from] CallError),
}

/// A test partition: an endpoint, a way to map retrieved memory, and a page
/// of its own to offer when commanded to act as a sender.
pub struct Partition<T: Transport, M: MemoryMap> {
    endpoint: Endpoint<T>,
    mapper: M,
    hypervisor_id: u16,
    /// Base address of a page this partition owns and may share onward.
    scratch_page: u64,
}

impl<T: Transport, M: MemoryMap> Partition<T, M> {
    pub fn new(endpoint: Endpoint<T>, mapper: M, hypervisor_id: u16, scratch_page: u64) -> Self {
        Self {
            endpoint,
            mapper,
            hypervisor_id,
            scratch_page,
        }
    }

    /// Runs the message loop; never returns except fatally.
    pub fn run(mut self) -> Result<Infallible, FatalError> {
        info!("partition {:#x} entering message loop", self.endpoint.id());

        // Tells the monitor initialisation is done and blocks for the first
        // request.
        let mut incoming = self
            .endpoint
            .call(Interface::MsgWait)
            .map_err(CallError::Parse)?;

        loop {
            let (src_id, args) = self.check_framing(incoming)?;
            debug!(
                "partition {:#x} request from {src_id:#x}: {args:x?}",
                self.endpoint.id()
            );

            let response = self.dispatch(src_id, args);

            // Replying suspends us until the next request arrives.
            incoming = self
                .endpoint
                .call(Interface::MsgSendDirectResp {
                    src_id: self.endpoint.id(),
                    dst_id: src_id,
                    args: response,
                })
                .map_err(CallError::Parse)?;
        }
    }

    /// Validates one incoming frame against the loop's framing rules.
    fn check_framing(&self, incoming: Interface) -> Result<(u16, [u64; 5]), FatalError> {
        let own_id = self.endpoint.id();
        let Interface::MsgSendDirectReq {
            src_id,
            dst_id,
            args,
        } = incoming
        else {
            error!("partition {own_id:#x}: unexpected interface {incoming:?}");
            return Err(FatalError::UnexpectedInterface(incoming));
        };
        if dst_id != own_id {
            return Err(FatalError::WrongDestination {
                destination: dst_id,
                own: own_id,
            });
        }
        // Requests come from the driver or from a peer partition; a message
        // claiming to come from ourselves, or from an arbitrary normal-world
        // VM, is outside the expected caller class.
        if src_id == own_id || (!is_secure_id(src_id) && src_id != self.hypervisor_id) {
            return Err(FatalError::InvalidSource { source: src_id });
        }
        Ok((src_id, args))
    }

    fn dispatch(&mut self, src_id: u16, args: [u64; 5]) -> [u64; 5] {
        match Command::parse(args) {
            Command::MemSend {
                kind,
                handle,
                word_count,
            } => {
                let word_count = if word_count == 0 {
                    DEFAULT_WORDS_TO_WRITE
                } else {
                    word_count
                };
                match self.handle_mem_send(src_id, kind, handle, word_count) {
                    Ok(()) => CommandResponse::success().to_words(),
                    Err(e) => {
                        error!("receiver-side {kind:?} failed: {e}");
                        CommandResponse::Error {
                            code: e.ffa_code().unwrap_or(FfaError::Aborted),
                        }
                        .to_words()
                    }
                }
            }
            Command::ReqEcho { echo_dest, value } => match self.handle_req_echo(echo_dest, value) {
                Ok(()) => CommandResponse::success().to_words(),
                Err(e) => {
                    error!("echo relay to {echo_dest:#x} failed: {e}");
                    CommandResponse::Error {
                        code: e.ffa_code().unwrap_or(FfaError::Aborted),
                    }
                    .to_words()
                }
            },
            Command::ReqMemSend { kind, receiver } => {
                match self.handle_req_mem_send(kind, receiver) {
                    Ok(()) => CommandResponse::success().to_words(),
                    Err(e) => {
                        error!("sender-side {kind:?} to {receiver:#x} failed: {e}");
                        CommandResponse::Error { code: e }.to_words()
                    }
                }
            }
            Command::Unrecognised { words } => {
                // The echo convention: reflect the value with our id OR-ed in.
                let value = words[0] | self.endpoint.id() as u64;
                debug!("echoing {:#x} as {value:#x}", words[0]);
                [value, 0, 0, 0, 0]
            }
        }
    }

    /// The receiver side of one memory transaction: retrieve, map, write the
    /// witness words, unmap, relinquish (unless ownership was donated to us),
    /// hand RX back.
    fn handle_mem_send(
        &mut self,
        sender: u16,
        kind: TransferKind,
        handle: crate::ffa::Handle,
        word_count: u32,
    ) -> Result<(), MemoryError> {
        let own_id = self.endpoint.id();
        let region = self
            .endpoint
            .memory_retrieve(handle, sender, MemoryAccess::rw_nx(own_id))?;

        // We are about to write; the granted permissions must say we may.
        let granted = region
            .receivers
            .iter()
            .find(|access| access.receiver == own_id)
            .ok_or(MemoryError::AccessMismatch)?;
        if granted.data_access != DataAccess::ReadWrite {
            return Err(MemoryError::AccessMismatch);
        }

        let witness = u32::from(kind.func_id());
        let constituent = *region.constituents.first().ok_or(MemoryError::NoComposite)?;
        self.mapper
            .with_mapping(constituent.address, constituent.page_count, &mut |mem| {
                for chunk in mem.chunks_exact_mut(4).take(word_count as usize) {
                    chunk.copy_from_slice(&witness.to_le_bytes());
                }
            })?;

        // Ownership came to stay on a donate; otherwise give it back. The
        // mapping is already gone either way.
        if kind != TransferKind::Donate {
            self.endpoint
                .memory_relinquish(handle, Default::default())?;
        }
        self.endpoint.rx_release().map_err(MemoryError::Call)?;
        Ok(())
    }

    /// Relays a raw value to another partition and checks the echo
    /// convention's answer.
    fn handle_req_echo(&mut self, echo_dest: u16, value: u64) -> Result<(), MessageError> {
        let reply = self.endpoint.direct_request(echo_dest, [value, 0, 0, 0, 0])?;
        let expected = value | echo_dest as u64;
        if reply[0] != expected {
            return Err(MessageError::EchoMismatch {
                expected,
                actual: reply[0],
            });
        }
        Ok(())
    }

    /// Acts as the sender of a whole transaction toward `receiver`, driving
    /// the peer through its receiver side and reclaiming at the end.
    ///
    /// Reports the FF-A code of whichever call failed, so the driver can
    /// check for policy errors (a secure partition offering memory to a
    /// normal-world endpoint is denied at the send, for example).
    fn handle_req_mem_send(
        &mut self,
        kind: TransferKind,
        receiver: u16,
    ) -> Result<(), FfaError> {
        let mut receivers = ArrayVec::new();
        receivers.push(MemoryAccess::rw_nx(receiver));
        let mut constituents = ArrayVec::new();
        constituents.push(crate::memdesc::Constituent::new(self.scratch_page, 1));
        let region = MemoryRegion {
            sender: self.endpoint.id(),
            attributes: crate::memdesc::NORMAL_WB_OUTER_SHAREABLE,
            flags: MemRegionFlags::empty(),
            handle: crate::ffa::Handle::INVALID,
            tag: 0,
            receivers,
            constituents,
        };

        let handle = self
            .endpoint
            .memory_send(kind, &region)
            .map_err(|e| e.ffa_code().unwrap_or(FfaError::Aborted))?;

        self.endpoint
            .send_command(
                receiver,
                Command::MemSend {
                    kind,
                    handle,
                    word_count: DEFAULT_WORDS_TO_WRITE,
                },
            )
            .map_err(|e| e.ffa_code().unwrap_or(FfaError::Aborted))?;

        if kind != TransferKind::Donate {
            self.endpoint
                .memory_reclaim(handle, Default::default())
                .map_err(|e| e.ffa_code().unwrap_or(FfaError::Aborted))?;
        }
        Ok(())
    }
}
