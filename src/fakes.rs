// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake monitor and partition harness for host-side testing.
//!
//! [`FakeMonitor`] is a reference model of the authority under test: it owns
//! the handle space, enforces the transaction state machine and the mailbox
//! discipline, and routes direct messages between partitions. Each partition
//! runs its real message loop on its own thread behind a channel rendezvous,
//! so the call primitive keeps its defining property - one blocking call in
//! flight per execution context - on the host too.
//!
//! The monitor itself executes on the driver's thread. Delivering a direct
//! request parks the driver inside [`FakeMonitor::call`] while the monitor
//! services the target partition's intermediate calls (retrieve, relinquish,
//! RX release, nested requests to further partitions) until the matching
//! response emerges, exactly like the cooperative world switching it stands
//! in for.

use crate::{
    endpoint::{Endpoint, HYP_ID, is_secure_id},
    ffa::{FfaError, FuncId, Handle, Interface, Version},
    logger,
    mailbox::{Mailbox, PAGE_SIZE, PageBuffer},
    memdesc::{
        self, MemRegionFlags, MemoryRegion, PartitionInfo, PartitionProperties, TransferKind,
    },
    memory::{MapError, MemoryMap, TransactionState},
    partition::Partition,
    transport::{Frame, Transport},
};
use log::{LevelFilter, debug, error, warn};
use std::{collections::BTreeMap, sync::mpsc, thread};
use uuid::Uuid;

/// The version the fake monitor implements.
const SUPPORTED_VERSION: Version = Version(1, 1);

/// Identifier the fake monitor reports for itself.
const SPMC_ID: u16 = 0x8000;

/// Identifiers and UUIDs of the three deployed test partitions.
pub const SP1: u16 = 0x8001;
pub const SP2: u16 = 0x8002;
pub const SP3: u16 = 0x8003;

pub const SP1_UUID: Uuid = Uuid::from_u128(0x1e67_b5b4_e00a_499f_8b4a_9d80_4ae9_9d21);
pub const SP2_UUID: Uuid = Uuid::from_u128(0x092e_347d_7224_4976_9b25_7895_aa6d_99c7);
pub const SP3_UUID: Uuid = Uuid::from_u128(0x735c_b579_b944_4680_8cd2_c85a_9e5f_41b8);

/// Frame handed to a partition when the monitor has gone away; makes the
/// message loop exit through its fatal path instead of panicking the thread.
fn shutdown_frame() -> Frame {
    Interface::error(FfaError::Aborted).to_regs()
}

/// The partition end of the call rendezvous.
pub struct ChannelTransport {
    to_monitor: mpsc::Sender<Frame>,
    from_monitor: mpsc::Receiver<Frame>,
}

impl Transport for ChannelTransport {
    fn call(&mut self, frame: Frame) -> Frame {
        if self.to_monitor.send(frame).is_err() {
            return shutdown_frame();
        }
        self.from_monitor.recv().unwrap_or_else(|_| shutdown_frame())
    }
}

/// Identity mapping: in the harness every constituent address is a live host
/// allocation, so "mapping" is a cast.
pub struct IdentityMap;

impl MemoryMap for IdentityMap {
    fn with_mapping(
        &mut self,
        address: u64,
        page_count: u32,
        f: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), MapError> {
        if address == 0 {
            return Err(MapError {
                address,
                page_count,
            });
        }
        // SAFETY: the harness only passes addresses of leaked page buffers it
        // allocated, and the rendezvous serialises all access to them.
        let mem = unsafe {
            core::slice::from_raw_parts_mut(address as *mut u8, page_count as usize * PAGE_SIZE)
        };
        f(mem);
        Ok(())
    }
}

struct PartitionRecord {
    info: PartitionInfo,
    uuid: Uuid,
    to_partition: mpsc::Sender<Frame>,
    from_partition: mpsc::Receiver<Frame>,
}

struct MailboxRecord {
    tx: u64,
    rx: u64,
    len: usize,
    rx_busy: bool,
}

struct Transaction {
    kind: TransferKind,
    sender: u16,
    region: MemoryRegion,
    states: BTreeMap<u16, TransactionState>,
}

impl Transaction {
    /// A transaction still pins its constituents while any receiver is short
    /// of a terminal state on the reclaim path. A fully donated transaction
    /// no longer pins them - the pages belong to the new owner.
    fn is_live(&self) -> bool {
        self.states.values().any(|state| {
            matches!(
                state,
                TransactionState::Sent | TransactionState::Retrieved | TransactionState::Relinquished
            )
        })
    }
}

/// Reference model of the SPMC/Hypervisor.
pub struct FakeMonitor {
    partitions: BTreeMap<u16, PartitionRecord>,
    mailboxes: BTreeMap<u16, MailboxRecord>,
    transactions: BTreeMap<u64, Transaction>,
    /// Ranges whose ownership moved permanently: `(start, end, new owner)`.
    donated: Vec<(u64, u64, u16)>,
    next_handle: u64,
}

impl Transport for FakeMonitor {
    /// The driver's calls enter the monitor directly.
    fn call(&mut self, frame: Frame) -> Frame {
        self.handle_call(HYP_ID, frame)
    }
}

impl Default for FakeMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMonitor {
    pub fn new() -> Self {
        Self {
            partitions: BTreeMap::new(),
            mailboxes: BTreeMap::new(),
            transactions: BTreeMap::new(),
            donated: Vec::new(),
            next_handle: 1,
        }
    }

    /// Registers a partition and returns the transport its thread will call
    /// the monitor through.
    pub fn add_partition(&mut self, info: PartitionInfo, uuid: Uuid) -> ChannelTransport {
        let (to_partition, partition_inbox) = mpsc::channel();
        let (partition_outbox, from_partition) = mpsc::channel();
        self.partitions.insert(
            info.id,
            PartitionRecord {
                info,
                uuid,
                to_partition,
                from_partition,
            },
        );
        ChannelTransport {
            to_monitor: partition_outbox,
            from_monitor: partition_inbox,
        }
    }

    /// Services a freshly spawned partition's setup calls until it signals
    /// readiness with `FFA_MSG_WAIT`, leaving it parked in the wait state.
    pub fn await_ready(&mut self, id: u16) {
        loop {
            let Some(frame) = self.recv_from(id) else {
                panic!("partition {id:#x} died during initialisation");
            };
            match Interface::from_regs(&frame) {
                Ok(Interface::MsgWait) => break,
                Ok(other) => {
                    let reply = self.service(id, other);
                    self.send_to(id, reply);
                }
                Err(e) => {
                    warn!("undecodable frame from {id:#x} during init: {e}");
                    self.send_to(id, Interface::error(FfaError::NotSupported).to_regs());
                }
            }
        }
    }

    fn handle_call(&mut self, caller: u16, frame: Frame) -> Frame {
        let interface = match Interface::from_regs(&frame) {
            Ok(interface) => interface,
            Err(e) => {
                warn!("undecodable call from {caller:#x}: {e}");
                return Interface::error(FfaError::NotSupported).to_regs();
            }
        };
        debug!("monitor call from {caller:#x}: {interface:x?}");

        match interface {
            Interface::MsgSendDirectReq { src_id, dst_id, .. } => {
                if src_id != caller || dst_id == caller || !self.partitions.contains_key(&dst_id) {
                    return Interface::error(FfaError::InvalidParameters).to_regs();
                }
                self.deliver(caller, dst_id, frame)
            }
            other => self.service(caller, other),
        }
    }

    /// Relays a direct request into a partition and runs that partition until
    /// it produces the matching response, servicing everything it calls in
    /// between.
    fn deliver(&mut self, from: u16, to: u16, request: Frame) -> Frame {
        self.send_to(to, request);
        loop {
            let Some(frame) = self.recv_from(to) else {
                error!("partition {to:#x} died while handling a request");
                return Interface::error(FfaError::Aborted).to_regs();
            };
            match Interface::from_regs(&frame) {
                Ok(Interface::MsgSendDirectResp { src_id, dst_id, .. }) if dst_id == from => {
                    if src_id != to {
                        error!("partition {to:#x} forged response source {src_id:#x}");
                        return Interface::error(FfaError::InvalidParameters).to_regs();
                    }
                    // The partition is now parked in its reply call, which is
                    // its wait state; the response travels back to the caller.
                    return frame;
                }
                Ok(Interface::MsgSendDirectResp { dst_id, .. }) => {
                    error!("partition {to:#x} answered {dst_id:#x} instead of {from:#x}");
                    return Interface::error(FfaError::InvalidParameters).to_regs();
                }
                Ok(Interface::MsgSendDirectReq { src_id, dst_id, .. }) => {
                    // A nested hop in a partition chain.
                    if src_id != to || dst_id == to || !self.partitions.contains_key(&dst_id) {
                        self.send_to(to, Interface::error(FfaError::InvalidParameters).to_regs());
                        continue;
                    }
                    let response = self.deliver(to, dst_id, frame);
                    self.send_to(to, response);
                }
                Ok(Interface::MsgWait) => {
                    error!("partition {to:#x} abandoned a request");
                    return Interface::error(FfaError::Aborted).to_regs();
                }
                Ok(other) => {
                    let reply = self.service(to, other);
                    self.send_to(to, reply);
                }
                Err(e) => {
                    warn!("undecodable call from {to:#x}: {e}");
                    self.send_to(to, Interface::error(FfaError::NotSupported).to_regs());
                }
            }
        }
    }

    /// Everything the monitor answers by itself.
    fn service(&mut self, caller: u16, interface: Interface) -> Frame {
        match interface {
            Interface::Version { input_version } => {
                let mut frame: Frame = [0; 8];
                frame[0] = if input_version.0 == SUPPORTED_VERSION.0 {
                    u32::from(SUPPORTED_VERSION) as u64
                } else {
                    i32::from(FfaError::NotSupported) as u32 as u64
                };
                frame
            }
            Interface::Features { func_id } => {
                if FuncId::try_from(func_id).is_ok() {
                    Interface::success_noargs().to_regs()
                } else {
                    Interface::error(FfaError::NotSupported).to_regs()
                }
            }
            Interface::IdGet => success_with(caller as u64, 0),
            Interface::SpmIdGet => success_with(SPMC_ID as u64, 0),
            Interface::RxTxMap {
                tx_addr,
                rx_addr,
                page_count,
            } => {
                // Mapping again without an unmap is an error.
                if self.mailboxes.contains_key(&caller) {
                    return Interface::error(FfaError::Denied).to_regs();
                }
                self.mailboxes.insert(
                    caller,
                    MailboxRecord {
                        tx: tx_addr,
                        rx: rx_addr,
                        len: page_count as usize * PAGE_SIZE,
                        rx_busy: false,
                    },
                );
                Interface::success_noargs().to_regs()
            }
            Interface::RxTxUnmap { id } => {
                if id != caller || self.mailboxes.remove(&caller).is_none() {
                    return Interface::error(FfaError::InvalidParameters).to_regs();
                }
                Interface::success_noargs().to_regs()
            }
            Interface::RxRelease { vm_id } => {
                let Some(record) = self.mailboxes.get_mut(&vm_id) else {
                    return Interface::error(FfaError::InvalidParameters).to_regs();
                };
                if vm_id != caller || !record.rx_busy {
                    return Interface::error(FfaError::Denied).to_regs();
                }
                record.rx_busy = false;
                Interface::success_noargs().to_regs()
            }
            Interface::PartitionInfoGet { uuid } => self.partition_info_get(caller, uuid),
            Interface::MemShare {
                total_len,
                frag_len,
            } => self.mem_send(caller, TransferKind::Share, total_len, frag_len),
            Interface::MemLend {
                total_len,
                frag_len,
            } => self.mem_send(caller, TransferKind::Lend, total_len, frag_len),
            Interface::MemDonate {
                total_len,
                frag_len,
            } => self.mem_send(caller, TransferKind::Donate, total_len, frag_len),
            Interface::MemRetrieveReq {
                total_len,
                frag_len,
            } => self.mem_retrieve(caller, total_len, frag_len),
            Interface::MemRelinquish => self.mem_relinquish(caller),
            Interface::MemReclaim { handle, .. } => self.mem_reclaim(caller, handle),
            other => {
                warn!("unsupported call from {caller:#x}: {other:x?}");
                Interface::error(FfaError::NotSupported).to_regs()
            }
        }
    }

    fn partition_info_get(&mut self, caller: u16, uuid: Uuid) -> Frame {
        let matches: Vec<PartitionInfo> = self
            .partitions
            .values()
            .filter(|record| uuid.is_nil() || record.uuid == uuid)
            .map(|record| record.info)
            .collect();

        // An unknown UUID simply matches nothing; only a real fault (no
        // mailbox to deliver through, RX still held) is an error.
        if matches.is_empty() {
            return success_with(0, 0);
        }
        match self.write_rx(caller, |buf| memdesc::build_partition_info(&matches, buf)) {
            // Count and per-entry size travel in the success arguments.
            Ok(written) => success_with(
                matches.len() as u64,
                (written / matches.len()) as u64,
            ),
            Err(code) => Interface::error(code).to_regs(),
        }
    }

    fn mem_send(&mut self, caller: u16, kind: TransferKind, total_len: u32, frag_len: u32) -> Frame {
        if total_len != frag_len {
            // Fragmented sends are outside the reference model.
            return Interface::error(FfaError::InvalidParameters).to_regs();
        }
        let bytes = match self.read_tx(caller, total_len as usize) {
            Ok(bytes) => bytes,
            Err(code) => return Interface::error(code).to_regs(),
        };
        let region = match memdesc::parse_region(&bytes) {
            Ok(region) => region,
            Err(e) => {
                error!("malformed send descriptor from {caller:#x}: {e}");
                return Interface::error(FfaError::InvalidParameters).to_regs();
            }
        };

        if region.sender != caller || region.constituents.is_empty() {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        }
        let mut states = BTreeMap::new();
        for access in &region.receivers {
            let receiver = access.receiver;
            if receiver == caller || states.insert(receiver, TransactionState::Sent).is_some() {
                return Interface::error(FfaError::InvalidParameters).to_regs();
            }
            if !self.partitions.contains_key(&receiver) && receiver != HYP_ID {
                return Interface::error(FfaError::InvalidParameters).to_regs();
            }
            // Memory may never leave the secure world.
            if is_secure_id(caller) && !is_secure_id(receiver) {
                return Interface::error(FfaError::Denied).to_regs();
            }
        }

        // The sender must own the pages: they may not be pinned by a live
        // transaction or donated away.
        for constituent in &region.constituents {
            let range = (
                constituent.address,
                constituent.address + constituent.page_count as u64 * PAGE_SIZE as u64,
            );
            let pinned = self.transactions.values().filter(|t| t.is_live()).any(|t| {
                t.region.constituents.iter().any(|c| {
                    ranges_overlap(
                        range,
                        (c.address, c.address + c.page_count as u64 * PAGE_SIZE as u64),
                    )
                })
            });
            let foreign = self
                .donated
                .iter()
                .any(|&(start, end, owner)| ranges_overlap(range, (start, end)) && owner != caller);
            if pinned || foreign {
                return Interface::error(FfaError::Denied).to_regs();
            }
        }

        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.transactions.insert(
            handle.0,
            Transaction {
                kind,
                sender: caller,
                region,
                states,
            },
        );
        debug!("{kind:?} from {caller:#x} minted handle {handle}");

        let (lo, hi) = handle.to_regs();
        success_with(lo, hi)
    }

    fn mem_retrieve(&mut self, caller: u16, total_len: u32, frag_len: u32) -> Frame {
        if total_len != frag_len {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        }
        let bytes = match self.read_tx(caller, total_len as usize) {
            Ok(bytes) => bytes,
            Err(code) => return Interface::error(code).to_regs(),
        };
        let request = match memdesc::parse_region(&bytes) {
            Ok(request) => request,
            Err(e) => {
                error!("malformed retrieve request from {caller:#x}: {e}");
                return Interface::error(FfaError::InvalidParameters).to_regs();
            }
        };

        let Some(transaction) = self.transactions.get(&request.handle.0) else {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        };
        if request.sender != transaction.sender {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        }
        let Some(&state) = transaction.states.get(&caller) else {
            // Not a declared receiver of this transaction.
            return Interface::error(FfaError::Denied).to_regs();
        };
        let next = match state.retrieve(transaction.kind) {
            Ok(next) => next,
            Err(code) => return Interface::error(code).to_regs(),
        };

        let response = MemoryRegion {
            sender: transaction.sender,
            attributes: memdesc::NORMAL_WB_OUTER_SHAREABLE,
            flags: MemRegionFlags::for_kind(transaction.kind),
            handle: request.handle,
            tag: transaction.region.tag,
            receivers: transaction.region.receivers.clone(),
            constituents: transaction.region.constituents.clone(),
        };
        let len = match self.write_rx(caller, |buf| memdesc::build_region(&response, buf)) {
            Ok(len) => len,
            Err(code) => return Interface::error(code).to_regs(),
        };

        let transaction = self.transactions.get_mut(&request.handle.0).unwrap();
        transaction.states.insert(caller, next);
        if next == TransactionState::Donated {
            // Ownership moves for good.
            for constituent in &transaction.region.constituents {
                self.donated.retain(|&(start, end, _)| {
                    !ranges_overlap(
                        (start, end),
                        (
                            constituent.address,
                            constituent.address + constituent.page_count as u64 * PAGE_SIZE as u64,
                        ),
                    )
                });
                self.donated.push((
                    constituent.address,
                    constituent.address + constituent.page_count as u64 * PAGE_SIZE as u64,
                    caller,
                ));
            }
        }

        Interface::MemRetrieveResp {
            total_len: len as u32,
            frag_len: len as u32,
        }
        .to_regs()
    }

    fn mem_relinquish(&mut self, caller: u16) -> Frame {
        let bytes = match self.read_tx(caller, self.mailboxes.get(&caller).map_or(0, |m| m.len)) {
            Ok(bytes) => bytes,
            Err(code) => return Interface::error(code).to_regs(),
        };
        let relinquish = match memdesc::parse_relinquish(&bytes) {
            Ok(relinquish) => relinquish,
            Err(e) => {
                error!("malformed relinquish descriptor from {caller:#x}: {e}");
                return Interface::error(FfaError::InvalidParameters).to_regs();
            }
        };

        let Some(transaction) = self.transactions.get_mut(&relinquish.handle.0) else {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        };
        if !relinquish.endpoints.contains(&caller) {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        }
        let Some(&state) = transaction.states.get(&caller) else {
            return Interface::error(FfaError::Denied).to_regs();
        };
        match state.relinquish() {
            Ok(next) => {
                transaction.states.insert(caller, next);
                Interface::success_noargs().to_regs()
            }
            Err(code) => Interface::error(code).to_regs(),
        }
    }

    fn mem_reclaim(&mut self, caller: u16, handle: Handle) -> Frame {
        let Some(transaction) = self.transactions.get_mut(&handle.0) else {
            return Interface::error(FfaError::InvalidParameters).to_regs();
        };
        // Only the original sender may reclaim.
        if transaction.sender != caller {
            return Interface::error(FfaError::Denied).to_regs();
        }
        // Every receiver must have relinquished; donated and already
        // reclaimed transactions have no reclaim path.
        let mut next_states = BTreeMap::new();
        for (&receiver, &state) in &transaction.states {
            match state.reclaim() {
                Ok(next) => next_states.insert(receiver, next),
                Err(code) => return Interface::error(code).to_regs(),
            };
        }
        transaction.states = next_states;
        Interface::success_noargs().to_regs()
    }

    fn read_tx(&self, caller: u16, len: usize) -> Result<Vec<u8>, FfaError> {
        let record = self.mailboxes.get(&caller).ok_or(FfaError::Denied)?;
        if len > record.len {
            return Err(FfaError::InvalidParameters);
        }
        // SAFETY: the mailbox was registered with addresses of buffers the
        // harness keeps alive, and the rendezvous means the owning partition
        // is suspended while we read.
        Ok(unsafe { core::slice::from_raw_parts(record.tx as *const u8, len) }.to_vec())
    }

    fn write_rx(
        &mut self,
        caller: u16,
        build: impl FnOnce(&mut [u8]) -> Result<usize, memdesc::DescriptorError>,
    ) -> Result<usize, FfaError> {
        let record = self.mailboxes.get_mut(&caller).ok_or(FfaError::Denied)?;
        if record.rx_busy {
            return Err(FfaError::Busy);
        }
        // SAFETY: as in `read_tx`; the partition reads RX only after this
        // call returns.
        let buf = unsafe { core::slice::from_raw_parts_mut(record.rx as *mut u8, record.len) };
        let len = build(buf).map_err(|_| FfaError::NoMemory)?;
        record.rx_busy = true;
        Ok(len)
    }

    fn send_to(&self, id: u16, frame: Frame) {
        if let Some(record) = self.partitions.get(&id) {
            let _ = record.to_partition.send(frame);
        }
    }

    fn recv_from(&self, id: u16) -> Option<Frame> {
        self.partitions.get(&id)?.from_partition.recv().ok()
    }
}

fn success_with(arg0: u64, arg1: u64) -> Frame {
    Interface::Success {
        target_info: Default::default(),
        args: [arg0, arg1, 0, 0, 0, 0],
    }
    .to_regs()
}

fn ranges_overlap(a: (u64, u64), b: (u64, u64)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Leaks one page and returns its address; harness memory lives for the rest
/// of the process.
fn leak_page() -> u64 {
    Box::leak(Box::new(PageBuffer::new())).0.as_mut_ptr() as u64
}

struct StdoutConsole;

impl core::fmt::Write for StdoutConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        print!("{s}");
        Ok(())
    }
}

static LOGGER_INIT: spin::Once = spin::Once::new();

/// Points the crate's logger at standard output, once per process.
pub fn init_test_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = logger::init(Box::leak(Box::new(StdoutConsole)), LevelFilter::Debug);
    });
}

/// A deployed test world: the fake monitor embedded in the driver endpoint,
/// and the three secure partitions running their message loops on threads.
pub struct Harness {
    pub driver: Endpoint<FakeMonitor>,
    driver_page: u64,
}

impl Harness {
    pub fn new() -> Self {
        init_test_logger();
        let mut monitor = FakeMonitor::new();

        for (id, uuid) in [(SP1, SP1_UUID), (SP2, SP2_UUID), (SP3, SP3_UUID)] {
            let info = PartitionInfo {
                id,
                execution_contexts: 1,
                properties: PartitionProperties::DIRECT_REQ_RECV
                    | PartitionProperties::DIRECT_REQ_SEND,
            };
            let transport = monitor.add_partition(info, uuid);
            let (tx_page, rx_page, scratch_page) = (leak_page(), leak_page(), leak_page());

            thread::spawn(move || {
                // SAFETY: the pages are leaked, page-aligned, and used by
                // nothing but this partition and the monitor rendezvous.
                let mailbox =
                    unsafe { Mailbox::from_raw(tx_page as *mut u8, rx_page as *const u8, PAGE_SIZE) };
                let mut endpoint = Endpoint::new(transport, id, mailbox);
                endpoint
                    .negotiate_version()
                    .expect("partition version negotiation failed");
                endpoint
                    .register_mailbox()
                    .expect("partition mailbox registration failed");
                let partition = Partition::new(endpoint, IdentityMap, HYP_ID, scratch_page);
                // Ends only when the monitor goes away or framing breaks.
                let result = partition.run();
                debug!("partition {id:#x} stopped: {:?}", result.unwrap_err());
            });

            monitor.await_ready(id);
        }

        let (tx_page, rx_page, driver_page) = (leak_page(), leak_page(), leak_page());
        // SAFETY: as above; the driver endpoint owns these leaked pages.
        let mailbox =
            unsafe { Mailbox::from_raw(tx_page as *mut u8, rx_page as *const u8, PAGE_SIZE) };
        let mut driver = Endpoint::new(monitor, HYP_ID, mailbox);
        driver
            .negotiate_version()
            .expect("driver version negotiation failed");
        driver
            .register_mailbox()
            .expect("driver mailbox registration failed");

        Self {
            driver,
            driver_page,
        }
    }

    /// Address of a page the driver owns and may offer in a transaction.
    pub fn driver_page(&self) -> u64 {
        self.driver_page
    }

    /// Reads back words a receiver wrote into a shared page.
    pub fn read_words(&self, address: u64, count: usize) -> Vec<u32> {
        (0..count)
            .map(|i| {
                // SAFETY: `address` is one of the leaked harness pages and the
                // partitions that wrote it are parked in their wait state.
                unsafe { core::ptr::read_volatile((address as *const u32).add(i)) }
            })
            .collect()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memdesc::{Constituent, MemoryAccess};
    use arrayvec::ArrayVec;

    /// Registers a synthetic mailbox for `id` and returns its TX address.
    fn map_mailbox(monitor: &mut FakeMonitor, id: u16) -> u64 {
        let (tx, rx) = (leak_page(), leak_page());
        let frame = Interface::RxTxMap {
            tx_addr: tx,
            rx_addr: rx,
            page_count: 1,
        }
        .to_regs();
        let reply = monitor.handle_call(id, frame);
        assert_eq!(
            Interface::from_regs(&reply).unwrap(),
            Interface::success_noargs()
        );
        tx
    }

    fn send_one_page(
        monitor: &mut FakeMonitor,
        sender: u16,
        sender_tx: u64,
        receiver: u16,
        kind: TransferKind,
        page: u64,
    ) -> Handle {
        let mut receivers = ArrayVec::new();
        receivers.push(MemoryAccess::rw_nx(receiver));
        let mut constituents = ArrayVec::new();
        constituents.push(Constituent::new(page, 1));
        let region = MemoryRegion {
            sender,
            attributes: memdesc::NORMAL_WB_OUTER_SHAREABLE,
            flags: MemRegionFlags::empty(),
            handle: Handle::INVALID,
            tag: 0,
            receivers,
            constituents,
        };
        // SAFETY: `sender_tx` is a leaked page dedicated to this test.
        let buf = unsafe { core::slice::from_raw_parts_mut(sender_tx as *mut u8, PAGE_SIZE) };
        let len = memdesc::build_region(&region, buf).unwrap() as u32;
        let reply = monitor.handle_call(
            sender,
            match kind {
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
            }
            .to_regs(),
        );
        let Interface::Success { args, .. } = Interface::from_regs(&reply).unwrap() else {
            panic!("send failed: {reply:x?}");
        };
        Handle::from_regs(args[0], args[1])
    }

    fn retrieve(monitor: &mut FakeMonitor, receiver: u16, receiver_tx: u64, sender: u16, handle: Handle) -> Frame {
        let mut receivers = ArrayVec::new();
        receivers.push(MemoryAccess::rw_nx(receiver));
        let request = MemoryRegion {
            sender,
            attributes: memdesc::NORMAL_WB_OUTER_SHAREABLE,
            flags: MemRegionFlags::empty(),
            handle,
            tag: 0,
            receivers,
            constituents: ArrayVec::new(),
        };
        // SAFETY: `receiver_tx` is a leaked page dedicated to this test.
        let buf = unsafe { core::slice::from_raw_parts_mut(receiver_tx as *mut u8, PAGE_SIZE) };
        let len = memdesc::build_region(&request, buf).unwrap() as u32;
        monitor.handle_call(
            receiver,
            Interface::MemRetrieveReq {
                total_len: len,
                frag_len: len,
            }
            .to_regs(),
        )
    }

    fn expect_error(frame: Frame, code: FfaError) {
        assert_eq!(
            Interface::from_regs(&frame).unwrap(),
            Interface::error(code)
        );
    }

    #[test]
    fn double_rxtx_map_is_denied() {
        let mut monitor = FakeMonitor::new();
        map_mailbox(&mut monitor, HYP_ID);
        let frame = Interface::RxTxMap {
            tx_addr: leak_page(),
            rx_addr: leak_page(),
            page_count: 1,
        }
        .to_regs();
        expect_error(monitor.handle_call(HYP_ID, frame), FfaError::Denied);
    }

    #[test]
    fn retrieve_twice_without_relinquish_is_denied() {
        let mut monitor = FakeMonitor::new();
        let info = PartitionInfo {
            id: SP1,
            execution_contexts: 1,
            properties: PartitionProperties::DIRECT_REQ_RECV,
        };
        let _transport = monitor.add_partition(info, SP1_UUID);
        let driver_tx = map_mailbox(&mut monitor, HYP_ID);
        let sp_tx = map_mailbox(&mut monitor, SP1);

        let handle = send_one_page(
            &mut monitor,
            HYP_ID,
            driver_tx,
            SP1,
            TransferKind::Share,
            leak_page(),
        );

        let first = retrieve(&mut monitor, SP1, sp_tx, HYP_ID, handle);
        assert!(matches!(
            Interface::from_regs(&first).unwrap(),
            Interface::MemRetrieveResp { .. }
        ));

        // Release RX so only the transaction state can refuse the second try.
        let release = monitor.handle_call(SP1, Interface::RxRelease { vm_id: SP1 }.to_regs());
        assert_eq!(
            Interface::from_regs(&release).unwrap(),
            Interface::success_noargs()
        );

        let second = retrieve(&mut monitor, SP1, sp_tx, HYP_ID, handle);
        expect_error(second, FfaError::Denied);
    }

    #[test]
    fn relinquish_and_reclaim_on_donated_handle_are_denied() {
        let mut monitor = FakeMonitor::new();
        let info = PartitionInfo {
            id: SP1,
            execution_contexts: 1,
            properties: PartitionProperties::DIRECT_REQ_RECV,
        };
        let _transport = monitor.add_partition(info, SP1_UUID);
        let driver_tx = map_mailbox(&mut monitor, HYP_ID);
        let sp_tx = map_mailbox(&mut monitor, SP1);

        let page = leak_page();
        let handle = send_one_page(
            &mut monitor,
            HYP_ID,
            driver_tx,
            SP1,
            TransferKind::Donate,
            page,
        );
        let first = retrieve(&mut monitor, SP1, sp_tx, HYP_ID, handle);
        assert!(matches!(
            Interface::from_regs(&first).unwrap(),
            Interface::MemRetrieveResp { .. }
        ));

        // The receiver now owns the pages; neither side may walk the
        // relinquish/reclaim path.
        let mut endpoints = ArrayVec::new();
        endpoints.push(SP1);
        let relinquish = memdesc::Relinquish {
            handle,
            flags: Default::default(),
            endpoints,
        };
        // SAFETY: `sp_tx` is a leaked page dedicated to this test.
        let buf = unsafe { core::slice::from_raw_parts_mut(sp_tx as *mut u8, PAGE_SIZE) };
        memdesc::build_relinquish(&relinquish, buf).unwrap();
        expect_error(
            monitor.handle_call(SP1, Interface::MemRelinquish.to_regs()),
            FfaError::Denied,
        );
        expect_error(
            monitor.handle_call(
                HYP_ID,
                Interface::MemReclaim {
                    handle,
                    flags: Default::default(),
                }
                .to_regs(),
            ),
            FfaError::Denied,
        );

        // And the old owner may not offer the page again.
        let again = {
            let mut receivers = ArrayVec::new();
            receivers.push(MemoryAccess::rw_nx(SP1));
            let mut constituents = ArrayVec::new();
            constituents.push(Constituent::new(page, 1));
            let region = MemoryRegion {
                sender: HYP_ID,
                attributes: memdesc::NORMAL_WB_OUTER_SHAREABLE,
                flags: MemRegionFlags::empty(),
                handle: Handle::INVALID,
                tag: 0,
                receivers,
                constituents,
            };
            // SAFETY: `driver_tx` is a leaked page dedicated to this test.
            let buf = unsafe { core::slice::from_raw_parts_mut(driver_tx as *mut u8, PAGE_SIZE) };
            let len = memdesc::build_region(&region, buf).unwrap() as u32;
            monitor.handle_call(
                HYP_ID,
                Interface::MemShare {
                    total_len: len,
                    frag_len: len,
                }
                .to_regs(),
            )
        };
        expect_error(again, FfaError::Denied);
    }

    #[test]
    fn sending_pinned_pages_is_denied() {
        let mut monitor = FakeMonitor::new();
        let info = PartitionInfo {
            id: SP1,
            execution_contexts: 1,
            properties: PartitionProperties::DIRECT_REQ_RECV,
        };
        let _transport = monitor.add_partition(info, SP1_UUID);
        let driver_tx = map_mailbox(&mut monitor, HYP_ID);

        let page = leak_page();
        let _handle = send_one_page(
            &mut monitor,
            HYP_ID,
            driver_tx,
            SP1,
            TransferKind::Lend,
            page,
        );

        // The same page cannot enter a second live transaction.
        let mut receivers = ArrayVec::new();
        receivers.push(MemoryAccess::rw_nx(SP1));
        let mut constituents = ArrayVec::new();
        constituents.push(Constituent::new(page, 1));
        let region = MemoryRegion {
            sender: HYP_ID,
            attributes: memdesc::NORMAL_WB_OUTER_SHAREABLE,
            flags: MemRegionFlags::empty(),
            handle: Handle::INVALID,
            tag: 0,
            receivers,
            constituents,
        };
        // SAFETY: `driver_tx` is a leaked page dedicated to this test.
        let buf = unsafe { core::slice::from_raw_parts_mut(driver_tx as *mut u8, PAGE_SIZE) };
        let len = memdesc::build_region(&region, buf).unwrap() as u32;
        let reply = monitor.handle_call(
            HYP_ID,
            Interface::MemLend {
                total_len: len,
                frag_len: len,
            }
            .to_regs(),
        );
        expect_error(reply, FfaError::Denied);
    }
}
