// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The monitor-call primitive.
//!
//! An FF-A call is a synchronous register rendezvous: the caller loads a
//! function identifier and up to seven argument words, traps to the monitor,
//! and is suspended until the reply frame comes back. There is no queuing and
//! no cancellation; one call is in flight per execution context at most.
//!
//! On hardware this is an SMC or HVC; everything above it only needs the seam
//! below, so the instruction-level transport stays outside this crate.

/// Number of registers in a call or reply frame.
pub const FRAME_REGS: usize = 8;

/// A register frame exchanged with the monitor: `w0` holds the function
/// identifier, `w1..w7` the arguments or results.
pub type Frame = [u64; FRAME_REGS];

/// A blocking register-based call into the monitor (or, transitively, a peer
/// partition scheduled by it).
pub trait Transport {
    /// Issues the call and blocks until the monitor produces a reply.
    fn call(&mut self, frame: Frame) -> Frame;
}

/// Any closure over a frame can act as a transport; unit tests use this to
/// script the monitor side of an exchange.
impl<F: FnMut(Frame) -> Frame> Transport for F {
    fn call(&mut self, frame: Frame) -> Frame {
        self(frame)
    }
}
