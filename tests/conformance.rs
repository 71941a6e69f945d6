// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! End-to-end conformance scenarios against the reference-model monitor.
//!
//! Each test deploys a fresh world: the fake monitor embedded in the driver
//! endpoint and three secure partitions running their real message loops on
//! threads. The driver plays the part the normal-world test framework plays
//! on hardware.

use arrayvec::ArrayVec;
use ffa_conformance::{
    Command, Endpoint, FfaError, HYP_ID, Handle, MemoryAccess, MemoryRegion, TransferKind,
    endpoint::{CallError, FFA_VERSION},
    fakes::{FakeMonitor, Harness, SP1, SP2, SP2_UUID, SP3},
    ffa::{FuncId, Version},
    memdesc::{Constituent, MemRegionFlags, NORMAL_WB_OUTER_SHAREABLE},
    memory::MemoryError,
    message::MessageError,
};
use uuid::Uuid;

/// A one-page region the driver offers to the given receivers.
fn driver_region(page: u64, receivers: &[u16]) -> MemoryRegion {
    let mut access = ArrayVec::new();
    for &receiver in receivers {
        access.push(MemoryAccess::rw_nx(receiver));
    }
    let mut constituents = ArrayVec::new();
    constituents.push(Constituent::new(page, 1));
    MemoryRegion {
        sender: HYP_ID,
        attributes: NORMAL_WB_OUTER_SHAREABLE,
        flags: MemRegionFlags::empty(),
        handle: Handle::INVALID,
        tag: 0,
        receivers: access,
        constituents,
    }
}

/// Drives one whole transaction: send, command the receiver through its
/// retrieve/use/relinquish side, reclaim. Returns the handle it used.
fn run_lifecycle(
    driver: &mut Endpoint<FakeMonitor>,
    kind: TransferKind,
    page: u64,
    receiver: u16,
) -> Handle {
    let handle = driver
        .memory_send(kind, &driver_region(page, &[receiver]))
        .expect("send failed");
    driver
        .send_command(
            receiver,
            Command::MemSend {
                kind,
                handle,
                word_count: 5,
            },
        )
        .expect("receiver side failed");
    if kind != TransferKind::Donate {
        driver
            .memory_reclaim(handle, Default::default())
            .expect("reclaim failed");
    }
    handle
}

fn denied() -> MemoryError {
    MemoryError::Call(CallError::Ffa(FfaError::Denied))
}

#[test]
fn share_and_lend_complete_the_full_lifecycle() {
    let mut harness = Harness::new();
    let page = harness.driver_page();

    for kind in [TransferKind::Share, TransferKind::Lend] {
        let handle = run_lifecycle(&mut harness.driver, kind, page, SP1);

        // The receiver left its witness behind: one word per write, each the
        // send call's own function id.
        let witness = u32::from(kind.func_id());
        assert_eq!(harness.read_words(page, 5), [witness; 5]);

        // The handle is terminal; a second reclaim is refused.
        assert_eq!(
            harness.driver.memory_reclaim(handle, Default::default()),
            Err(denied())
        );
    }
}

#[test]
fn donate_transfers_ownership_permanently() {
    let mut harness = Harness::new();
    let page = harness.driver_page();

    let handle = run_lifecycle(&mut harness.driver, TransferKind::Donate, page, SP1);

    // No reclaim path exists for a donated handle, for either party.
    assert_eq!(
        harness.driver.memory_reclaim(handle, Default::default()),
        Err(denied())
    );
    assert_eq!(
        harness.driver.memory_relinquish(handle, Default::default()),
        Err(denied())
    );

    // The receiver's retrieve succeeded exactly once; commanding it through
    // the sequence again fails at the retrieve.
    assert_eq!(
        harness.driver.send_command(
            SP1,
            Command::MemSend {
                kind: TransferKind::Donate,
                handle,
                word_count: 5,
            },
        ),
        Err(MessageError::PeerError {
            code: FfaError::Denied,
        })
    );

    // The old owner may not offer the pages again either.
    assert_eq!(
        harness
            .driver
            .memory_send(TransferKind::Share, &driver_region(page, &[SP2])),
        Err(denied())
    );
}

#[test]
fn reclaim_waits_for_every_receiver() {
    let mut harness = Harness::new();
    let page = harness.driver_page();

    let handle = harness
        .driver
        .memory_send(TransferKind::Share, &driver_region(page, &[SP1, SP2]))
        .expect("two-receiver send failed");

    let command = Command::MemSend {
        kind: TransferKind::Share,
        handle,
        word_count: 5,
    };
    harness
        .driver
        .send_command(SP1, command)
        .expect("first receiver failed");

    // One receiver has relinquished, the other has not even retrieved.
    assert_eq!(
        harness.driver.memory_reclaim(handle, Default::default()),
        Err(denied())
    );

    harness
        .driver
        .send_command(SP2, command)
        .expect("second receiver failed");
    harness
        .driver
        .memory_reclaim(handle, Default::default())
        .expect("reclaim after all relinquished failed");

    assert_eq!(
        harness.read_words(page, 5),
        [u32::from(FuncId::MemShare); 5]
    );
}

#[test]
fn partitions_send_memory_to_each_other() {
    // Donate goes last: it takes the sender's scratch page with it.
    for kind in [TransferKind::Share, TransferKind::Lend, TransferKind::Donate] {
        let mut harness = Harness::new();
        harness
            .driver
            .send_command(SP1, Command::ReqMemSend { kind, receiver: SP2 })
            .unwrap_or_else(|e| panic!("SP-to-SP {kind:?} failed: {e}"));
    }
}

#[test]
fn secure_memory_never_reaches_the_normal_world() {
    let mut harness = Harness::new();

    // The monitor refuses the send itself, and the partition reports the
    // policy code back through the command protocol.
    for kind in [TransferKind::Share, TransferKind::Lend] {
        assert_eq!(
            harness.driver.send_command(
                SP1,
                Command::ReqMemSend {
                    kind,
                    receiver: HYP_ID,
                },
            ),
            Err(MessageError::PeerError {
                code: FfaError::Denied,
            })
        );
    }
}

#[test]
fn unknown_opcodes_echo_with_the_responder_id() {
    let mut harness = Harness::new();
    let pattern = 0xaaaa_0000;

    for sp in [SP1, SP2, SP3] {
        let reply = harness
            .driver
            .direct_request(sp, [pattern, 0, 0, 0, 0])
            .expect("echo failed");
        assert_eq!(reply[0], pattern | sp as u64);
    }
}

#[test]
fn echo_relays_across_a_partition_chain() {
    let mut harness = Harness::new();

    // SP1 forwards the value to SP2 and verifies SP2's echo before
    // reporting success to us.
    harness
        .driver
        .send_command(
            SP1,
            Command::ReqEcho {
                echo_dest: SP2,
                value: 0xa0a0_a0a0,
            },
        )
        .expect("relay through SP1 failed");
}

#[test]
fn partition_info_matches_by_uuid() {
    let mut harness = Harness::new();

    // The nil UUID is the wildcard: every deployed partition.
    let all = harness
        .driver
        .partition_info(Uuid::nil())
        .expect("wildcard lookup failed");
    let mut ids: Vec<u16> = all.iter().map(|info| info.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, [SP1, SP2, SP3]);

    // A specific UUID matches its partition alone.
    let one = harness
        .driver
        .partition_info(SP2_UUID)
        .expect("specific lookup failed");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].id, SP2);

    // An unknown UUID matches nothing; that is an empty answer, not an error.
    let none = harness
        .driver
        .partition_info(Uuid::from_u128(0xdead_beef))
        .expect("unknown UUID must not be an error");
    assert!(none.is_empty());
}

#[test]
fn mailbox_cannot_be_mapped_twice() {
    let mut harness = Harness::new();

    // The harness already registered the driver's pair.
    assert_eq!(
        harness.driver.register_mailbox(),
        Err(CallError::Ffa(FfaError::Denied))
    );

    // Unmapping first makes a fresh map legal again.
    harness.driver.unregister_mailbox().expect("unmap failed");
    harness.driver.register_mailbox().expect("remap failed");
}

#[test]
fn features_reports_unknown_functions_as_unsupported() {
    let mut harness = Harness::new();

    harness
        .driver
        .features(u32::from(FuncId::MemShare))
        .expect("MEM_SHARE must be supported");
    assert_eq!(
        harness.driver.features(0x8400_dead),
        Err(CallError::Ffa(FfaError::NotSupported))
    );
}

#[test]
fn version_negotiation_returns_a_compatible_version() {
    let mut harness = Harness::new();

    let version = harness
        .driver
        .negotiate_version()
        .expect("negotiation failed");
    assert_eq!(version, Version(1, 1));
    assert!(FFA_VERSION.is_compatible_to(&version));
}
