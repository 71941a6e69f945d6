// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Codec for the FF-A memory management descriptors.
//!
//! Pure transforms between the logical [`MemoryRegion`] form and the v1.0
//! wire layout exchanged through the mailboxes: a 32-byte region header, one
//! 16-byte access descriptor per receiver, and an optional composite region
//! (16-byte header plus 16-byte constituents). The relinquish descriptor and
//! the partition-information entries produced by `FFA_PARTITION_INFO_GET`
//! share the same buffer discipline and live here too.
//!
//! Builders write directly into a caller-owned buffer (normally the TX
//! mailbox) to avoid a copy. Fragmentation is confined to this module's
//! length bookkeeping: a fragment parses on its own, and the engines compare
//! the declared total against the bytes actually delivered, so multi-fragment
//! reassembly can be added here without reshaping the transaction engine.

use crate::ffa::{FuncId, Handle};
use arrayvec::ArrayVec;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Most receivers a single transaction may name.
pub const MAX_RECEIVERS: usize = 2;

/// Most constituent page runs a composite region may carry.
pub const MAX_CONSTITUENTS: usize = 16;

/// Most partitions a deployment may report.
pub const MAX_PARTITIONS: usize = 8;

/// Normal memory, write-back cacheable, outer shareable: the attributes every
/// transaction in this suite uses.
pub const NORMAL_WB_OUTER_SHAREABLE: u8 = 0x2e;

/// A malformed or oversized descriptor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum DescriptorError {
    #[error("descriptor names {0} receivers, more than the supported {MAX_RECEIVERS}")]
    TooManyReceivers(usize),
    #[error("composite region has {0} constituents, more than the supported {MAX_CONSTITUENTS}")]
    TooManyConstituents(usize),
    #[error("descriptor names no receivers")]
    NoReceivers,
    #[error("descriptor length {actual} does not match the declared {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("composite offset {offset} points outside the {len}-byte buffer")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("descriptor needs {needed} bytes but the buffer holds {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    #[error("composite declares {declared} pages but constituents sum to {actual}")]
    PageCountMismatch { declared: u32, actual: u32 },
    #[error("buffer too short for a descriptor header")]
    Truncated,
    #[error("reserved memory access permissions {0:#x}")]
    InvalidPermissions(u8),
    #[error("reserved transaction flags {0:#x}")]
    InvalidFlags(u32),
    #[error("relinquish descriptor names no endpoints")]
    NoEndpoints,
}

/// The three transfer kinds, in order of increasing permanence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferKind {
    Share,
    Lend,
    Donate,
}

impl TransferKind {
    /// The send call that starts a transaction of this kind.
    pub fn func_id(self) -> FuncId {
        match self {
            TransferKind::Share => FuncId::MemShare,
            TransferKind::Lend => FuncId::MemLend,
            TransferKind::Donate => FuncId::MemDonate,
        }
    }

    pub fn from_func_id(func_id: FuncId) -> Option<Self> {
        match func_id {
            FuncId::MemShare => Some(TransferKind::Share),
            FuncId::MemLend => Some(TransferKind::Lend),
            FuncId::MemDonate => Some(TransferKind::Donate),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Transaction flags in the region header. Bits 3:4 record the transfer
    /// kind in a retrieve response.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct MemRegionFlags: u32 {
        const ZERO_MEMORY = 1 << 0;
        const TIME_SLICING = 1 << 1;
        const ZERO_AFTER_RELINQUISH = 1 << 2;
        const TYPE_SHARE = 0b01 << 3;
        const TYPE_LEND = 0b10 << 3;
        const TYPE_DONATE = 0b11 << 3;
    }
}

impl MemRegionFlags {
    const TYPE_MASK: u32 = 0b11 << 3;

    /// The transfer kind recorded in the flags, if any.
    pub fn transfer_kind(self) -> Option<TransferKind> {
        match (self.bits() & Self::TYPE_MASK) >> 3 {
            0b01 => Some(TransferKind::Share),
            0b10 => Some(TransferKind::Lend),
            0b11 => Some(TransferKind::Donate),
            _ => None,
        }
    }

    /// Flags recording the given transfer kind.
    pub fn for_kind(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Share => MemRegionFlags::TYPE_SHARE,
            TransferKind::Lend => MemRegionFlags::TYPE_LEND,
            TransferKind::Donate => MemRegionFlags::TYPE_DONATE,
        }
    }
}

bitflags::bitflags! {
    /// Flags in the relinquish descriptor.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RelinquishFlags: u32 {
        const ZERO_MEMORY = 1 << 0;
        const TIME_SLICING = 1 << 1;
    }
}

/// Data access granted to or requested by a receiver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataAccess {
    NotSpecified,
    ReadOnly,
    ReadWrite,
}

/// Instruction access granted to or requested by a receiver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InstructionAccess {
    NotSpecified,
    NotExecutable,
    Executable,
}

/// One receiver's access-permission triple.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryAccess {
    pub receiver: u16,
    pub data_access: DataAccess,
    pub instruction_access: InstructionAccess,
    /// Whether the receiver asks for (or was granted) exclusive access.
    pub exclusive: bool,
}

impl MemoryAccess {
    /// Read-write, never-executable, non-exclusive access: what the memory
    /// sharing tests grant and request throughout.
    pub fn rw_nx(receiver: u16) -> Self {
        Self {
            receiver,
            data_access: DataAccess::ReadWrite,
            instruction_access: InstructionAccess::NotExecutable,
            exclusive: false,
        }
    }

    fn permission_bits(&self) -> u8 {
        let data = match self.data_access {
            DataAccess::NotSpecified => 0b00,
            DataAccess::ReadOnly => 0b01,
            DataAccess::ReadWrite => 0b10,
        };
        let instruction = match self.instruction_access {
            InstructionAccess::NotSpecified => 0b00,
            InstructionAccess::NotExecutable => 0b01,
            InstructionAccess::Executable => 0b10,
        };
        instruction << 2 | data
    }

    fn from_bits(receiver: u16, permissions: u8, flags: u8) -> Result<Self, DescriptorError> {
        let data_access = match permissions & 0b11 {
            0b00 => DataAccess::NotSpecified,
            0b01 => DataAccess::ReadOnly,
            0b10 => DataAccess::ReadWrite,
            _ => return Err(DescriptorError::InvalidPermissions(permissions)),
        };
        let instruction_access = match (permissions >> 2) & 0b11 {
            0b00 => InstructionAccess::NotSpecified,
            0b01 => InstructionAccess::NotExecutable,
            0b10 => InstructionAccess::Executable,
            _ => return Err(DescriptorError::InvalidPermissions(permissions)),
        };
        Ok(Self {
            receiver,
            data_access,
            instruction_access,
            exclusive: flags & 1 != 0,
        })
    }
}

/// One run of physically contiguous pages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Immutable, FromBytes, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct Constituent {
    /// Base address of the run.
    pub address: u64,
    /// Number of pages in the run.
    pub page_count: u32,
    reserved: u32,
}

impl Constituent {
    pub fn new(address: u64, page_count: u32) -> Self {
        Self {
            address,
            page_count,
            reserved: 0,
        }
    }
}

/// The logical form of a memory region descriptor.
///
/// A send descriptor and a retrieve response carry a composite region
/// (non-empty `constituents`); a retrieve request leaves it empty and the
/// monitor fills in the authoritative composite.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    pub sender: u16,
    pub attributes: u8,
    pub flags: MemRegionFlags,
    pub handle: Handle,
    pub tag: u64,
    pub receivers: ArrayVec<MemoryAccess, MAX_RECEIVERS>,
    pub constituents: ArrayVec<Constituent, MAX_CONSTITUENTS>,
}

impl MemoryRegion {
    /// Total pages across all constituents.
    pub fn page_count(&self) -> u32 {
        self.constituents.iter().map(|c| c.page_count).sum()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Immutable, FromBytes, IntoBytes, KnownLayout)]
#[repr(C)]
struct RegionHeader {
    sender: u16,
    attributes: u8,
    reserved_0: u8,
    flags: u32,
    handle: u64,
    tag: u64,
    reserved_1: u32,
    receiver_count: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Immutable, FromBytes, IntoBytes, KnownLayout)]
#[repr(C)]
struct AccessDescriptor {
    receiver: u16,
    permissions: u8,
    flags: u8,
    composite_offset: u32,
    reserved: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Immutable, FromBytes, IntoBytes, KnownLayout)]
#[repr(C)]
struct CompositeHeader {
    total_page_count: u32,
    constituent_count: u32,
    reserved: u64,
}

/// Serialises a memory region descriptor into `buf` and returns the number of
/// bytes written.
pub fn build_region(region: &MemoryRegion, buf: &mut [u8]) -> Result<usize, DescriptorError> {
    if region.receivers.is_empty() {
        return Err(DescriptorError::NoReceivers);
    }

    let access_end = size_of::<RegionHeader>() + region.receivers.len() * size_of::<AccessDescriptor>();
    let composite_offset = if region.constituents.is_empty() {
        0
    } else {
        access_end
    };
    let needed = if region.constituents.is_empty() {
        access_end
    } else {
        access_end
            + size_of::<CompositeHeader>()
            + region.constituents.len() * size_of::<Constituent>()
    };
    if needed > buf.len() {
        return Err(DescriptorError::BufferTooSmall {
            needed,
            capacity: buf.len(),
        });
    }

    let header = RegionHeader {
        sender: region.sender,
        attributes: region.attributes,
        reserved_0: 0,
        flags: region.flags.bits(),
        handle: region.handle.0,
        tag: region.tag,
        reserved_1: 0,
        receiver_count: region.receivers.len() as u32,
    };
    let mut offset = 0;
    write_at(buf, &mut offset, &header);

    for access in &region.receivers {
        let desc = AccessDescriptor {
            receiver: access.receiver,
            permissions: access.permission_bits(),
            flags: access.exclusive as u8,
            composite_offset: composite_offset as u32,
            reserved: 0,
        };
        write_at(buf, &mut offset, &desc);
    }

    if !region.constituents.is_empty() {
        let composite = CompositeHeader {
            total_page_count: region.page_count(),
            constituent_count: region.constituents.len() as u32,
            reserved: 0,
        };
        write_at(buf, &mut offset, &composite);
        for constituent in &region.constituents {
            write_at(buf, &mut offset, constituent);
        }
    }

    debug_assert_eq!(offset, needed);
    Ok(needed)
}

/// Parses one complete (single-fragment) memory region descriptor.
///
/// `buf` must be exactly the fragment: its length is checked against the
/// lengths the descriptor itself declares.
pub fn parse_region(buf: &[u8]) -> Result<MemoryRegion, DescriptorError> {
    let (header, rest) =
        RegionHeader::read_from_prefix(buf).map_err(|_| DescriptorError::Truncated)?;

    let receiver_count = header.receiver_count as usize;
    if receiver_count > MAX_RECEIVERS {
        return Err(DescriptorError::TooManyReceivers(receiver_count));
    }
    if receiver_count == 0 {
        return Err(DescriptorError::NoReceivers);
    }
    let flags =
        MemRegionFlags::from_bits(header.flags).ok_or(DescriptorError::InvalidFlags(header.flags))?;

    let mut receivers = ArrayVec::new();
    let mut composite_offset = 0;
    let mut rest = rest;
    for _ in 0..receiver_count {
        let (desc, remainder) =
            AccessDescriptor::read_from_prefix(rest).map_err(|_| DescriptorError::Truncated)?;
        rest = remainder;
        // All receivers of one transaction point at the same composite.
        composite_offset = desc.composite_offset as usize;
        receivers
            .try_push(MemoryAccess::from_bits(
                desc.receiver,
                desc.permissions,
                desc.flags,
            )?)
            .unwrap();
    }

    let access_end = size_of::<RegionHeader>() + receiver_count * size_of::<AccessDescriptor>();
    let mut constituents = ArrayVec::new();

    let expected_len = if composite_offset == 0 {
        access_end
    } else {
        if composite_offset != access_end || composite_offset + size_of::<CompositeHeader>() > buf.len()
        {
            return Err(DescriptorError::OffsetOutOfBounds {
                offset: composite_offset,
                len: buf.len(),
            });
        }
        let (composite, mut rest) = CompositeHeader::read_from_prefix(&buf[composite_offset..])
            .map_err(|_| DescriptorError::Truncated)?;
        let constituent_count = composite.constituent_count as usize;
        if constituent_count > MAX_CONSTITUENTS {
            return Err(DescriptorError::TooManyConstituents(constituent_count));
        }
        for _ in 0..constituent_count {
            let (constituent, remainder) =
                Constituent::read_from_prefix(rest).map_err(|_| DescriptorError::Truncated)?;
            rest = remainder;
            constituents.try_push(constituent).unwrap();
        }
        let actual_pages: u32 = constituents.iter().map(|c| c.page_count).sum();
        if actual_pages != composite.total_page_count {
            return Err(DescriptorError::PageCountMismatch {
                declared: composite.total_page_count,
                actual: actual_pages,
            });
        }
        composite_offset
            + size_of::<CompositeHeader>()
            + constituent_count * size_of::<Constituent>()
    };

    if expected_len != buf.len() {
        return Err(DescriptorError::LengthMismatch {
            expected: expected_len,
            actual: buf.len(),
        });
    }

    Ok(MemoryRegion {
        sender: header.sender,
        attributes: header.attributes,
        flags,
        handle: Handle(header.handle),
        tag: header.tag,
        receivers,
        constituents,
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Immutable, FromBytes, IntoBytes, KnownLayout)]
#[repr(C)]
struct RelinquishHeader {
    handle: u64,
    flags: u32,
    endpoint_count: u32,
}

/// The logical form of a relinquish descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Relinquish {
    pub handle: Handle,
    pub flags: RelinquishFlags,
    pub endpoints: ArrayVec<u16, MAX_RECEIVERS>,
}

/// Serialises a relinquish descriptor into `buf`.
pub fn build_relinquish(
    relinquish: &Relinquish,
    buf: &mut [u8],
) -> Result<usize, DescriptorError> {
    if relinquish.endpoints.is_empty() {
        return Err(DescriptorError::NoEndpoints);
    }
    let needed = size_of::<RelinquishHeader>() + relinquish.endpoints.len() * size_of::<u16>();
    if needed > buf.len() {
        return Err(DescriptorError::BufferTooSmall {
            needed,
            capacity: buf.len(),
        });
    }

    let header = RelinquishHeader {
        handle: relinquish.handle.0,
        flags: relinquish.flags.bits(),
        endpoint_count: relinquish.endpoints.len() as u32,
    };
    let mut offset = 0;
    write_at(buf, &mut offset, &header);
    for endpoint in &relinquish.endpoints {
        write_at(buf, &mut offset, endpoint);
    }
    Ok(needed)
}

/// Parses a relinquish descriptor.
pub fn parse_relinquish(buf: &[u8]) -> Result<Relinquish, DescriptorError> {
    let (header, mut rest) =
        RelinquishHeader::read_from_prefix(buf).map_err(|_| DescriptorError::Truncated)?;
    let endpoint_count = header.endpoint_count as usize;
    if endpoint_count > MAX_RECEIVERS {
        return Err(DescriptorError::TooManyReceivers(endpoint_count));
    }
    if endpoint_count == 0 {
        return Err(DescriptorError::NoEndpoints);
    }
    let flags = RelinquishFlags::from_bits(header.flags)
        .ok_or(DescriptorError::InvalidFlags(header.flags))?;

    let mut endpoints = ArrayVec::new();
    for _ in 0..endpoint_count {
        let (endpoint, remainder) =
            u16::read_from_prefix(rest).map_err(|_| DescriptorError::Truncated)?;
        rest = remainder;
        endpoints.try_push(endpoint).unwrap();
    }

    Ok(Relinquish {
        handle: Handle(header.handle),
        flags,
        endpoints,
    })
}

bitflags::bitflags! {
    /// Properties advertised in a partition information entry.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct PartitionProperties: u32 {
        /// The partition receives direct message requests.
        const DIRECT_REQ_RECV = 1 << 0;
        /// The partition can send direct message requests.
        const DIRECT_REQ_SEND = 1 << 1;
    }
}

/// One entry of an `FFA_PARTITION_INFO_GET` reply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartitionInfo {
    pub id: u16,
    pub execution_contexts: u16,
    pub properties: PartitionProperties,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Immutable, FromBytes, IntoBytes, KnownLayout)]
#[repr(C)]
struct PartitionInfoEntry {
    id: u16,
    execution_contexts: u16,
    properties: u32,
}

/// Serialises partition information entries into `buf` (the receiver's RX).
pub fn build_partition_info(
    entries: &[PartitionInfo],
    buf: &mut [u8],
) -> Result<usize, DescriptorError> {
    let needed = entries.len() * size_of::<PartitionInfoEntry>();
    if needed > buf.len() {
        return Err(DescriptorError::BufferTooSmall {
            needed,
            capacity: buf.len(),
        });
    }
    let mut offset = 0;
    for info in entries {
        let entry = PartitionInfoEntry {
            id: info.id,
            execution_contexts: info.execution_contexts,
            properties: info.properties.bits(),
        };
        write_at(buf, &mut offset, &entry);
    }
    Ok(needed)
}

/// Parses `count` partition information entries out of `buf`.
pub fn parse_partition_info(
    buf: &[u8],
    count: usize,
) -> Result<ArrayVec<PartitionInfo, MAX_PARTITIONS>, DescriptorError> {
    if count > MAX_PARTITIONS {
        return Err(DescriptorError::TooManyReceivers(count));
    }
    let mut entries = ArrayVec::new();
    let mut rest = buf;
    for _ in 0..count {
        let (entry, remainder) =
            PartitionInfoEntry::read_from_prefix(rest).map_err(|_| DescriptorError::Truncated)?;
        rest = remainder;
        entries
            .try_push(PartitionInfo {
                id: entry.id,
                execution_contexts: entry.execution_contexts,
                properties: PartitionProperties::from_bits_truncate(entry.properties),
            })
            .unwrap();
    }
    Ok(entries)
}

fn write_at<T: IntoBytes + Immutable>(buf: &mut [u8], offset: &mut usize, value: &T) {
    let bytes = value.as_bytes();
    buf[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    *offset += bytes.len();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_region(constituents: &[Constituent]) -> MemoryRegion {
        let mut region = MemoryRegion {
            sender: 0,
            attributes: NORMAL_WB_OUTER_SHAREABLE,
            flags: MemRegionFlags::empty(),
            handle: Handle::INVALID,
            tag: 0,
            receivers: ArrayVec::new(),
            constituents: ArrayVec::new(),
        };
        region.receivers.push(MemoryAccess::rw_nx(0x8001));
        for constituent in constituents {
            region.constituents.push(*constituent);
        }
        region
    }

    #[test]
    fn region_roundtrip() {
        let region = sample_region(&[
            Constituent::new(0x8000_0000, 1),
            Constituent::new(0x8010_0000, 3),
        ]);
        let mut buf = [0; 256];
        let len = build_region(&region, &mut buf).unwrap();
        assert_eq!(len, 32 + 16 + 16 + 2 * 16);
        assert_eq!(parse_region(&buf[..len]).unwrap(), region);
    }

    #[test]
    fn retrieve_request_roundtrip_without_composite() {
        let region = sample_region(&[]);
        let mut buf = [0; 64];
        let len = build_region(&region, &mut buf).unwrap();
        assert_eq!(len, 48);
        assert_eq!(parse_region(&buf[..len]).unwrap(), region);
    }

    #[test]
    fn too_many_receivers_is_rejected() {
        let region = sample_region(&[Constituent::new(0, 1)]);
        let mut buf = [0; 256];
        let len = build_region(&region, &mut buf).unwrap();
        // Forge a receiver count beyond the supported maximum.
        buf[28] = (MAX_RECEIVERS + 1) as u8;
        assert_eq!(
            parse_region(&buf[..len]),
            Err(DescriptorError::TooManyReceivers(MAX_RECEIVERS + 1))
        );
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let region = sample_region(&[Constituent::new(0x8000_0000, 1)]);
        let mut buf = [0; 256];
        let len = build_region(&region, &mut buf).unwrap();
        assert_eq!(
            parse_region(&buf[..len + 16]),
            Err(DescriptorError::LengthMismatch {
                expected: len,
                actual: len + 16,
            })
        );
    }

    #[test]
    fn composite_offset_outside_buffer_is_rejected() {
        let region = sample_region(&[Constituent::new(0x8000_0000, 1)]);
        let mut buf = [0; 256];
        let len = build_region(&region, &mut buf).unwrap();
        // Forge the composite offset in the access descriptor.
        buf[36..40].copy_from_slice(&(len as u32 + 64).to_le_bytes());
        assert!(matches!(
            parse_region(&buf[..len]),
            Err(DescriptorError::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn page_count_mismatch_is_rejected() {
        let region = sample_region(&[Constituent::new(0x8000_0000, 2)]);
        let mut buf = [0; 256];
        let len = build_region(&region, &mut buf).unwrap();
        // Forge the composite total page count.
        buf[48..52].copy_from_slice(&7u32.to_le_bytes());
        assert_eq!(
            parse_region(&buf[..len]),
            Err(DescriptorError::PageCountMismatch {
                declared: 7,
                actual: 2,
            })
        );
    }

    #[test]
    fn buffer_too_small_is_rejected() {
        let region = sample_region(&[Constituent::new(0x8000_0000, 1)]);
        let mut buf = [0; 32];
        assert_eq!(
            build_region(&region, &mut buf),
            Err(DescriptorError::BufferTooSmall {
                needed: 80,
                capacity: 32,
            })
        );
    }

    #[test]
    fn relinquish_roundtrip() {
        let mut endpoints = ArrayVec::new();
        endpoints.push(0x8001);
        let relinquish = Relinquish {
            handle: Handle(0x42),
            flags: RelinquishFlags::empty(),
            endpoints,
        };
        let mut buf = [0; 64];
        let len = build_relinquish(&relinquish, &mut buf).unwrap();
        assert_eq!(len, 18);
        assert_eq!(parse_relinquish(&buf[..len]).unwrap(), relinquish);
    }

    #[test]
    fn partition_info_roundtrip() {
        let entries = [
            PartitionInfo {
                id: 0x8001,
                execution_contexts: 8,
                properties: PartitionProperties::DIRECT_REQ_RECV,
            },
            PartitionInfo {
                id: 0x8002,
                execution_contexts: 1,
                properties: PartitionProperties::DIRECT_REQ_RECV
                    | PartitionProperties::DIRECT_REQ_SEND,
            },
        ];
        let mut buf = [0; 64];
        let len = build_partition_info(&entries, &mut buf).unwrap();
        assert_eq!(len, 16);
        let parsed = parse_partition_info(&buf[..len], 2).unwrap();
        assert_eq!(parsed.as_slice(), &entries);
    }

    #[test]
    fn transfer_kind_flags_roundtrip() {
        for kind in [TransferKind::Share, TransferKind::Lend, TransferKind::Donate] {
            assert_eq!(MemRegionFlags::for_kind(kind).transfer_kind(), Some(kind));
        }
        assert_eq!(MemRegionFlags::empty().transfer_kind(), None);
    }
}
