// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Direct messaging between partitions, and the command convention the test
//! partitions speak over it.
//!
//! A direct message is stateless: a request carries the sender, the receiver
//! and five payload words; the response must come back synchronously with the
//! two identifiers mirrored. The engine checks that mirror on every exchange
//! - a response claiming the wrong pair is a protocol violation surfaced to
//! the caller, never delivered to the application.
//!
//! The command layer fixes word 0 as an opcode and reserves two status values
//! in the response: zero for success and all-ones for a generic failure, with
//! word 1 free to smuggle an FF-A error code back for diagnostics. Opcodes
//! nobody recognises are echoed back with the responder's id OR-ed into the
//! value, which is what the raw echo tests rely on.

use crate::{
    endpoint::{CallError, Endpoint},
    ffa::{FfaError, Handle, Interface},
    memdesc::TransferKind,
    transport::Transport,
};
use log::debug;
use thiserror::Error;

/// Opcode asking a partition to run the receiver side of a memory
/// transaction is the send call's own function id; these are the rest.
const OPCODE_REQ_ECHO: u64 = 0x6563_6870;

/// Opcode asking a partition to itself send memory to a third party.
const OPCODE_REQ_MEM_SEND: u64 = 0x6d65_6d73;

/// Response status word for success.
const STATUS_SUCCESS: u64 = 0;

/// Response status word for a generic failure.
const STATUS_ERROR: u64 = u64::MAX;

/// Failure of a direct-message exchange.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum MessageError {
    #[error(transparent)]
    Call(#[from] CallError),
    /// The response does not come from the partition we addressed.
    #[error("response sender {actual:#x} does not match request receiver {expected:#x}")]
    SourceMismatch { expected: u16, actual: u16 },
    /// The response is not addressed to us.
    #[error("response receiver {actual:#x} does not match request sender {expected:#x}")]
    DestinationMismatch { expected: u16, actual: u16 },
    /// The exchange was interrupted before the final answer; callers that
    /// need to survive this must reissue the request themselves.
    #[error("exchange interrupted by interrupt {interrupt_id}")]
    Interrupted { interrupt_id: u32 },
    /// The peer answered the command with its error status.
    #[error("peer reported failure with {code}")]
    PeerError { code: FfaError },
    /// The peer's response is not in the command convention.
    #[error("unintelligible command response {0:#x?}")]
    BadResponse([u64; 5]),
    /// A relayed echo came back mangled.
    #[error("echo returned {actual:#x}, expected {expected:#x}")]
    EchoMismatch { expected: u64, actual: u64 },
}

impl MessageError {
    /// The FF-A error code to report across a partition boundary, when the
    /// failure has one.
    pub fn ffa_code(&self) -> Option<FfaError> {
        match self {
            MessageError::Call(CallError::Ffa(code)) => Some(*code),
            MessageError::PeerError { code } => Some(*code),
            _ => None,
        }
    }
}

/// Requests the test partitions understand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Run the receiver side of the memory transaction behind `handle`:
    /// retrieve, map, write `word_count` words of the kind's function-id
    /// constant, unmap, relinquish unless donated, release RX.
    MemSend {
        kind: TransferKind,
        handle: Handle,
        word_count: u32,
    },
    /// Forward `value` raw to `echo_dest` and verify the conventions's
    /// reply, `value | echo_dest`.
    ReqEcho { echo_dest: u16, value: u64 },
    /// Act as a memory sender of the given kind toward `receiver`.
    ReqMemSend { kind: TransferKind, receiver: u16 },
    /// Anything else; the loop echoes word 0 with its own id OR-ed in.
    Unrecognised { words: [u64; 5] },
}

impl Command {
    /// Decodes a request payload. Never fails: an unknown opcode is a valid
    /// message by the echo convention.
    pub fn parse(words: [u64; 5]) -> Self {
        if let Ok(func_id) = crate::ffa::FuncId::try_from(words[0] as u32)
            && words[0] <= u32::MAX as u64
            && let Some(kind) = TransferKind::from_func_id(func_id)
        {
            return Command::MemSend {
                kind,
                handle: Handle(words[1]),
                word_count: words[2] as u32,
            };
        }
        match words[0] {
            OPCODE_REQ_ECHO => Command::ReqEcho {
                echo_dest: words[1] as u16,
                value: words[2],
            },
            OPCODE_REQ_MEM_SEND => {
                if let Ok(func_id) = crate::ffa::FuncId::try_from(words[1] as u32)
                    && let Some(kind) = TransferKind::from_func_id(func_id)
                {
                    Command::ReqMemSend {
                        kind,
                        receiver: words[2] as u16,
                    }
                } else {
                    Command::Unrecognised { words }
                }
            }
            _ => Command::Unrecognised { words },
        }
    }

    /// Encodes this command as a request payload.
    pub fn to_words(self) -> [u64; 5] {
        match self {
            Command::MemSend {
                kind,
                handle,
                word_count,
            } => [
                u32::from(kind.func_id()) as u64,
                handle.0,
                word_count as u64,
                0,
                0,
            ],
            Command::ReqEcho { echo_dest, value } => {
                [OPCODE_REQ_ECHO, echo_dest as u64, value, 0, 0]
            }
            Command::ReqMemSend { kind, receiver } => [
                OPCODE_REQ_MEM_SEND,
                u32::from(kind.func_id()) as u64,
                receiver as u64,
                0,
                0,
            ],
            Command::Unrecognised { words } => words,
        }
    }
}

/// A response in the command convention.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandResponse {
    Success { values: [u64; 4] },
    Error { code: FfaError },
}

impl CommandResponse {
    pub fn success() -> Self {
        CommandResponse::Success { values: [0; 4] }
    }

    pub fn to_words(self) -> [u64; 5] {
        match self {
            CommandResponse::Success { values } => [
                STATUS_SUCCESS,
                values[0],
                values[1],
                values[2],
                values[3],
            ],
            CommandResponse::Error { code } => {
                [STATUS_ERROR, i32::from(code) as u32 as u64, 0, 0, 0]
            }
        }
    }

    pub fn parse(words: [u64; 5]) -> Result<Self, MessageError> {
        match words[0] {
            STATUS_SUCCESS => Ok(CommandResponse::Success {
                values: [words[1], words[2], words[3], words[4]],
            }),
            STATUS_ERROR => Ok(CommandResponse::Error {
                code: FfaError::try_from(words[1] as u32 as i32)
                    .unwrap_or(FfaError::Aborted),
            }),
            _ => Err(MessageError::BadResponse(words)),
        }
    }
}

impl<T: Transport> Endpoint<T> {
    /// Sends a direct request and blocks for the response.
    ///
    /// The response's identifier pair must mirror the request's; a mismatch
    /// is rejected here and never reaches the caller's handler.
    pub fn direct_request(
        &mut self,
        dest: u16,
        payload: [u64; 5],
    ) -> Result<[u64; 5], MessageError> {
        let own_id = self.id();
        let reply = self
            .call(Interface::MsgSendDirectReq {
                src_id: own_id,
                dst_id: dest,
                args: payload,
            })
            .map_err(CallError::Parse)?;

        match reply {
            Interface::MsgSendDirectResp {
                src_id,
                dst_id,
                args,
            } => {
                if src_id != dest {
                    return Err(MessageError::SourceMismatch {
                        expected: dest,
                        actual: src_id,
                    });
                }
                if dst_id != own_id {
                    return Err(MessageError::DestinationMismatch {
                        expected: own_id,
                        actual: dst_id,
                    });
                }
                Ok(args)
            }
            Interface::Interrupt { interrupt_id, .. } => {
                Err(MessageError::Interrupted { interrupt_id })
            }
            Interface::Error { error_code, .. } => Err(CallError::Ffa(error_code).into()),
            other => Err(CallError::Unexpected(other).into()),
        }
    }

    /// Sends a typed command and decodes the typed response, surfacing a peer
    /// failure as [`MessageError::PeerError`].
    pub fn send_command(
        &mut self,
        dest: u16,
        command: Command,
    ) -> Result<[u64; 4], MessageError> {
        debug!("sending {command:x?} to {dest:#x}");
        let reply = self.direct_request(dest, command.to_words())?;
        match CommandResponse::parse(reply)? {
            CommandResponse::Success { values } => Ok(values),
            CommandResponse::Error { code } => Err(MessageError::PeerError { code }),
        }
    }
}
