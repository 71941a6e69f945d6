// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Typed view of the FF-A call ABI.
//!
//! Every exchange with the monitor is a [`Frame`] whose first word is a
//! function identifier. [`Interface`] gives each call and reply a typed shape
//! and owns the mapping to and from register frames. The one deliberate
//! exception is the `FFA_VERSION` reply, which carries the version (or a
//! negative error) directly in `w0` rather than a function identifier; the
//! version helpers deal with the raw frame themselves.

use crate::transport::{Frame, Transport};
use core::fmt::{self, Display, Formatter};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use uuid::Uuid;

/// FF-A function identifiers, in the SMC calling convention the original
/// C test suite uses: SMC32 for everything except `RXTX_MAP` and the direct
/// message pair, which need 64-bit address and payload words.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum FuncId {
    Error = 0x8400_0060,
    Success = 0x8400_0061,
    Interrupt = 0x8400_0062,
    Version = 0x8400_0063,
    Features = 0x8400_0064,
    RxRelease = 0x8400_0065,
    RxTxMap = 0xC400_0066,
    RxTxUnmap = 0x8400_0067,
    PartitionInfoGet = 0x8400_0068,
    IdGet = 0x8400_0069,
    MsgWait = 0x8400_006B,
    MsgSendDirectReq = 0xC400_006F,
    MsgSendDirectResp = 0xC400_0070,
    MemDonate = 0x8400_0071,
    MemLend = 0x8400_0072,
    MemShare = 0x8400_0073,
    MemRetrieveReq = 0x8400_0074,
    MemRetrieveResp = 0x8400_0075,
    MemRelinquish = 0x8400_0076,
    MemReclaim = 0x8400_0077,
    SpmIdGet = 0x8400_0085,
}

impl Display for FuncId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}({:#010x})", self, u32::from(*self))
    }
}

/// Status codes carried by an `FFA_ERROR` frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum FfaError {
    #[error("NOT_SUPPORTED")]
    NotSupported = -1,
    #[error("INVALID_PARAMETERS")]
    InvalidParameters = -2,
    #[error("NO_MEMORY")]
    NoMemory = -3,
    #[error("BUSY")]
    Busy = -4,
    #[error("INTERRUPTED")]
    Interrupted = -5,
    #[error("DENIED")]
    Denied = -6,
    #[error("RETRY")]
    Retry = -7,
    #[error("ABORTED")]
    Aborted = -8,
}

/// An FF-A version, `(major, minor)`.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Version(pub u16, pub u16);

impl Version {
    /// Two versions are compatible when the major numbers match and the
    /// caller's minor is not newer than ours.
    pub fn is_compatible_to(&self, other: &Version) -> bool {
        self.0 == other.0 && self.1 <= other.1
    }
}

impl TryFrom<u32> for Version {
    type Error = ParseError;

    fn try_from(raw: u32) -> Result<Self, ParseError> {
        // Bit 31 must be zero in a version word.
        if raw & 0x8000_0000 != 0 {
            return Err(ParseError::InvalidVersion(raw));
        }
        Ok(Self((raw >> 16) as u16, raw as u16))
    }
}

impl From<Version> for u32 {
    fn from(version: Version) -> Self {
        (version.0 as u32) << 16 | version.1 as u32
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

/// Endpoint and vCPU a frame is aimed at; zero in both fields means "the
/// current context" for the calls this crate makes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TargetInfo {
    pub endpoint_id: u16,
    pub vcpu_id: u16,
}

impl From<u32> for TargetInfo {
    fn from(raw: u32) -> Self {
        Self {
            endpoint_id: (raw >> 16) as u16,
            vcpu_id: raw as u16,
        }
    }
}

impl From<TargetInfo> for u32 {
    fn from(info: TargetInfo) -> Self {
        (info.endpoint_id as u32) << 16 | info.vcpu_id as u32
    }
}

/// Opaque identifier of one memory-sharing transaction, minted by the monitor
/// when a send call succeeds.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Handle(pub u64);

impl Handle {
    /// The all-ones value is reserved to mean "no handle".
    pub const INVALID: Handle = Handle(u64::MAX);

    /// Reassembles a handle from the two 32-bit halves of a reply frame.
    pub fn from_regs(lo: u64, hi: u64) -> Self {
        Handle((lo as u32) as u64 | ((hi as u32) as u64) << 32)
    }

    /// The `(lo, hi)` register encoding of this handle.
    pub fn to_regs(self) -> (u64, u64) {
        (self.0 as u32 as u64, self.0 >> 32)
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

bitflags::bitflags! {
    /// Flags accepted by `FFA_MEM_RECLAIM`.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct MemReclaimFlags: u32 {
        const ZERO_MEMORY = 1 << 0;
        const TIME_SLICING = 1 << 1;
    }
}

/// A decoded FF-A call or reply.
///
/// Memory operation calls carry only the descriptor lengths; the descriptor
/// itself travels through the caller's TX buffer (see [`crate::memdesc`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interface {
    Error {
        target_info: TargetInfo,
        error_code: FfaError,
    },
    Success {
        target_info: TargetInfo,
        args: [u64; 6],
    },
    Interrupt {
        target_info: TargetInfo,
        interrupt_id: u32,
    },
    Version {
        input_version: Version,
    },
    Features {
        func_id: u32,
    },
    IdGet,
    SpmIdGet,
    RxTxMap {
        tx_addr: u64,
        rx_addr: u64,
        page_count: u32,
    },
    RxTxUnmap {
        id: u16,
    },
    RxRelease {
        vm_id: u16,
    },
    PartitionInfoGet {
        uuid: Uuid,
    },
    MsgWait,
    MsgSendDirectReq {
        src_id: u16,
        dst_id: u16,
        args: [u64; 5],
    },
    MsgSendDirectResp {
        src_id: u16,
        dst_id: u16,
        args: [u64; 5],
    },
    MemShare {
        total_len: u32,
        frag_len: u32,
    },
    MemLend {
        total_len: u32,
        frag_len: u32,
    },
    MemDonate {
        total_len: u32,
        frag_len: u32,
    },
    MemRetrieveReq {
        total_len: u32,
        frag_len: u32,
    },
    MemRetrieveResp {
        total_len: u32,
        frag_len: u32,
    },
    MemRelinquish,
    MemReclaim {
        handle: Handle,
        flags: MemReclaimFlags,
    },
}

/// Failure to give a register frame a typed shape.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ParseError {
    #[error("unrecognised function id {0:#x}")]
    UnrecognisedFunctionId(u64),
    #[error("unrecognised error code {0}")]
    UnrecognisedErrorCode(i64),
    #[error("invalid version word {0:#x}")]
    InvalidVersion(u32),
    #[error("invalid flags {0:#x}")]
    InvalidFlags(u64),
}

impl Interface {
    /// Decodes a register frame.
    pub fn from_regs(regs: &Frame) -> Result<Self, ParseError> {
        let func_id = FuncId::try_from(regs[0] as u32)
            .map_err(|_| ParseError::UnrecognisedFunctionId(regs[0]))?;

        let msg = match func_id {
            FuncId::Error => Interface::Error {
                target_info: (regs[1] as u32).into(),
                error_code: FfaError::try_from(regs[2] as u32 as i32)
                    .map_err(|_| ParseError::UnrecognisedErrorCode(regs[2] as i64))?,
            },
            FuncId::Success => Interface::Success {
                target_info: (regs[1] as u32).into(),
                args: [regs[2], regs[3], regs[4], regs[5], regs[6], regs[7]],
            },
            FuncId::Interrupt => Interface::Interrupt {
                target_info: (regs[1] as u32).into(),
                interrupt_id: regs[2] as u32,
            },
            FuncId::Version => Interface::Version {
                input_version: Version::try_from(regs[1] as u32)?,
            },
            FuncId::Features => Interface::Features {
                func_id: regs[1] as u32,
            },
            FuncId::IdGet => Interface::IdGet,
            FuncId::SpmIdGet => Interface::SpmIdGet,
            FuncId::RxTxMap => Interface::RxTxMap {
                tx_addr: regs[1],
                rx_addr: regs[2],
                page_count: regs[3] as u32,
            },
            FuncId::RxTxUnmap => Interface::RxTxUnmap {
                id: (regs[1] >> 16) as u16,
            },
            FuncId::RxRelease => Interface::RxRelease {
                vm_id: regs[1] as u16,
            },
            FuncId::PartitionInfoGet => Interface::PartitionInfoGet {
                uuid: uuid_from_regs(&regs[1..5]),
            },
            FuncId::MsgWait => Interface::MsgWait,
            FuncId::MsgSendDirectReq => Interface::MsgSendDirectReq {
                src_id: (regs[1] >> 16) as u16,
                dst_id: regs[1] as u16,
                args: [regs[3], regs[4], regs[5], regs[6], regs[7]],
            },
            FuncId::MsgSendDirectResp => Interface::MsgSendDirectResp {
                src_id: (regs[1] >> 16) as u16,
                dst_id: regs[1] as u16,
                args: [regs[3], regs[4], regs[5], regs[6], regs[7]],
            },
            FuncId::MemShare => Interface::MemShare {
                total_len: regs[1] as u32,
                frag_len: regs[2] as u32,
            },
            FuncId::MemLend => Interface::MemLend {
                total_len: regs[1] as u32,
                frag_len: regs[2] as u32,
            },
            FuncId::MemDonate => Interface::MemDonate {
                total_len: regs[1] as u32,
                frag_len: regs[2] as u32,
            },
            FuncId::MemRetrieveReq => Interface::MemRetrieveReq {
                total_len: regs[1] as u32,
                frag_len: regs[2] as u32,
            },
            FuncId::MemRetrieveResp => Interface::MemRetrieveResp {
                total_len: regs[1] as u32,
                frag_len: regs[2] as u32,
            },
            FuncId::MemRelinquish => Interface::MemRelinquish,
            FuncId::MemReclaim => Interface::MemReclaim {
                handle: Handle::from_regs(regs[1], regs[2]),
                flags: MemReclaimFlags::from_bits(regs[3] as u32)
                    .ok_or(ParseError::InvalidFlags(regs[3]))?,
            },
        };
        Ok(msg)
    }

    /// The function identifier this message is carried by.
    pub fn function_id(&self) -> FuncId {
        match self {
            Interface::Error { .. } => FuncId::Error,
            Interface::Success { .. } => FuncId::Success,
            Interface::Interrupt { .. } => FuncId::Interrupt,
            Interface::Version { .. } => FuncId::Version,
            Interface::Features { .. } => FuncId::Features,
            Interface::IdGet => FuncId::IdGet,
            Interface::SpmIdGet => FuncId::SpmIdGet,
            Interface::RxTxMap { .. } => FuncId::RxTxMap,
            Interface::RxTxUnmap { .. } => FuncId::RxTxUnmap,
            Interface::RxRelease { .. } => FuncId::RxRelease,
            Interface::PartitionInfoGet { .. } => FuncId::PartitionInfoGet,
            Interface::MsgWait => FuncId::MsgWait,
            Interface::MsgSendDirectReq { .. } => FuncId::MsgSendDirectReq,
            Interface::MsgSendDirectResp { .. } => FuncId::MsgSendDirectResp,
            Interface::MemShare { .. } => FuncId::MemShare,
            Interface::MemLend { .. } => FuncId::MemLend,
            Interface::MemDonate { .. } => FuncId::MemDonate,
            Interface::MemRetrieveReq { .. } => FuncId::MemRetrieveReq,
            Interface::MemRetrieveResp { .. } => FuncId::MemRetrieveResp,
            Interface::MemRelinquish => FuncId::MemRelinquish,
            Interface::MemReclaim { .. } => FuncId::MemReclaim,
        }
    }

    /// Encodes this message into a register frame.
    pub fn to_regs(&self) -> Frame {
        let mut regs: Frame = [0; 8];
        regs[0] = u32::from(self.function_id()) as u64;

        match *self {
            Interface::Error {
                target_info,
                error_code,
            } => {
                regs[1] = u32::from(target_info) as u64;
                regs[2] = i32::from(error_code) as u32 as u64;
            }
            Interface::Success { target_info, args } => {
                regs[1] = u32::from(target_info) as u64;
                regs[2..8].copy_from_slice(&args);
            }
            Interface::Interrupt {
                target_info,
                interrupt_id,
            } => {
                regs[1] = u32::from(target_info) as u64;
                regs[2] = interrupt_id as u64;
            }
            Interface::Version { input_version } => {
                regs[1] = u32::from(input_version) as u64;
            }
            Interface::Features { func_id } => {
                regs[1] = func_id as u64;
            }
            Interface::IdGet | Interface::SpmIdGet | Interface::MsgWait => {}
            Interface::RxTxMap {
                tx_addr,
                rx_addr,
                page_count,
            } => {
                regs[1] = tx_addr;
                regs[2] = rx_addr;
                regs[3] = page_count as u64;
            }
            Interface::RxTxUnmap { id } => {
                regs[1] = (id as u64) << 16;
            }
            Interface::RxRelease { vm_id } => {
                regs[1] = vm_id as u64;
            }
            Interface::PartitionInfoGet { uuid } => {
                uuid_to_regs(uuid, &mut regs[1..5]);
            }
            Interface::MsgSendDirectReq {
                src_id,
                dst_id,
                args,
            }
            | Interface::MsgSendDirectResp {
                src_id,
                dst_id,
                args,
            } => {
                regs[1] = (src_id as u64) << 16 | dst_id as u64;
                regs[3..8].copy_from_slice(&args);
            }
            Interface::MemShare {
                total_len,
                frag_len,
            }
            | Interface::MemLend {
                total_len,
                frag_len,
            }
            | Interface::MemDonate {
                total_len,
                frag_len,
            }
            | Interface::MemRetrieveReq {
                total_len,
                frag_len,
            }
            | Interface::MemRetrieveResp {
                total_len,
                frag_len,
            } => {
                regs[1] = total_len as u64;
                regs[2] = frag_len as u64;
            }
            Interface::MemRelinquish => {}
            Interface::MemReclaim { handle, flags } => {
                let (lo, hi) = handle.to_regs();
                regs[1] = lo;
                regs[2] = hi;
                regs[3] = flags.bits() as u64;
            }
        }
        regs
    }

    /// Shorthand for an error frame aimed at the current context.
    pub fn error(error_code: FfaError) -> Self {
        Interface::Error {
            target_info: TargetInfo::default(),
            error_code,
        }
    }

    /// Shorthand for a success frame with no result values.
    pub fn success_noargs() -> Self {
        Interface::Success {
            target_info: TargetInfo::default(),
            args: [0; 6],
        }
    }
}

/// Issues a typed call over the given transport and decodes the reply.
pub fn call<T: Transport>(transport: &mut T, interface: Interface) -> Result<Interface, ParseError> {
    Interface::from_regs(&transport.call(interface.to_regs()))
}

/// Negotiates the FF-A version with the monitor.
///
/// The reply to `FFA_VERSION` is a bare version word (or `NOT_SUPPORTED`) in
/// `w0`, so this bypasses [`Interface::from_regs`].
pub fn version<T: Transport>(
    transport: &mut T,
    input_version: Version,
) -> Result<Version, FfaError> {
    let reply = transport.call(
        Interface::Version {
            input_version,
        }
        .to_regs(),
    );
    let word = reply[0] as u32;
    if (word as i32) < 0 {
        return Err(FfaError::try_from(word as i32).unwrap_or(FfaError::NotSupported));
    }
    Version::try_from(word).map_err(|_| FfaError::NotSupported)
}

fn uuid_from_regs(regs: &[u64]) -> Uuid {
    let mut bytes = [0; 16];
    for (chunk, reg) in bytes.chunks_exact_mut(4).zip(regs) {
        chunk.copy_from_slice(&(*reg as u32).to_le_bytes());
    }
    Uuid::from_bytes(bytes)
}

fn uuid_to_regs(uuid: Uuid, regs: &mut [u64]) {
    for (reg, chunk) in regs.iter_mut().zip(uuid.as_bytes().chunks_exact(4)) {
        *reg = u32::from_le_bytes(chunk.try_into().unwrap()) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_direct_request() {
        let msg = Interface::MsgSendDirectReq {
            src_id: 0,
            dst_id: 0x8001,
            args: [0xa0a0_a0a0, 1, 2, 3, 4],
        };
        assert_eq!(Interface::from_regs(&msg.to_regs()), Ok(msg));
    }

    #[test]
    fn roundtrip_reclaim() {
        let msg = Interface::MemReclaim {
            handle: Handle(0x1234_5678_9abc_def0),
            flags: MemReclaimFlags::ZERO_MEMORY,
        };
        let regs = msg.to_regs();
        assert_eq!(regs[1], 0x9abc_def0);
        assert_eq!(regs[2], 0x1234_5678);
        assert_eq!(Interface::from_regs(&regs), Ok(msg));
    }

    #[test]
    fn roundtrip_partition_info_get() {
        let msg = Interface::PartitionInfoGet {
            uuid: Uuid::parse_str("a1a2a3a4b1b2c1c2d1d2d3d4d5d6d7d8").unwrap(),
        };
        assert_eq!(Interface::from_regs(&msg.to_regs()), Ok(msg));
    }

    #[test]
    fn error_frame_decodes_error_code() {
        let msg = Interface::error(FfaError::Denied);
        let regs = msg.to_regs();
        assert_eq!(regs[2] as u32 as i32, -6);
        assert_eq!(Interface::from_regs(&regs), Ok(msg));
    }

    #[test]
    fn unknown_function_id_is_rejected() {
        let regs = [0x8400_ffff, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            Interface::from_regs(&regs),
            Err(ParseError::UnrecognisedFunctionId(0x8400_ffff))
        );
    }

    #[test]
    fn version_word_with_mbz_bit_is_rejected() {
        assert_eq!(
            Version::try_from(0x8001_0000),
            Err(ParseError::InvalidVersion(0x8001_0000))
        );
        assert_eq!(Version::try_from(0x0001_0002), Ok(Version(1, 2)));
    }

    #[test]
    fn handle_register_halves() {
        let handle = Handle::from_regs(0xdead_beef, 0x0123_4567);
        assert_eq!(handle, Handle(0x0123_4567_dead_beef));
        assert_eq!(handle.to_regs(), (0xdead_beef, 0x0123_4567));
    }
}
