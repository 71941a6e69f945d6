// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Conformance test core for the Arm Firmware Framework for Armv8-A (FF-A).
//!
//! This crate validates that a reference monitor (an SPMC or hypervisor)
//! implements partition messaging and memory sharing correctly. At its heart
//! is the memory-sharing transaction protocol: the sequence of calls,
//! descriptor encodings and ownership-transfer invariants that let a sender
//! and a receiver on opposite sides of a trust boundary share, lend or
//! donate pages without the memory ever being reachable by two mutually
//! distrusting parties against the declared policy.
//!
//! The layering follows the protocol:
//!
//! - [`transport`] is the blocking register rendezvous everything rides on;
//!   the instruction-level SMC/HVC lives outside this crate.
//! - [`ffa`] gives frames their typed shape.
//! - [`endpoint`] is one partition's execution context: identity, mailbox
//!   and the setup and discovery calls.
//! - [`mailbox`] and [`memdesc`] carry descriptors that do not fit in
//!   registers.
//! - [`memory`] and [`message`] are the two engines: the memory-transaction
//!   handshake and synchronous direct messaging.
//! - [`partition`] is the message loop a test partition lives in.
//! - [`fakes`] (feature `fakes`) is a reference model of the monitor plus a
//!   threaded partition harness, so the whole protocol runs on a host.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod endpoint;
#[cfg(feature = "fakes")]
pub mod fakes;
pub mod ffa;
pub mod logger;
pub mod mailbox;
pub mod memdesc;
pub mod memory;
pub mod message;
pub mod partition;
pub mod transport;

pub use endpoint::{Endpoint, HYP_ID, is_secure_id};
pub use ffa::{FfaError, Handle, Interface, Version};
pub use mailbox::{Mailbox, PAGE_SIZE, PageBuffer};
pub use memdesc::{MemoryAccess, MemoryRegion, TransferKind};
pub use memory::{MemoryMap, TransactionState};
pub use message::{Command, CommandResponse};
pub use partition::Partition;
pub use transport::{Frame, Transport};
