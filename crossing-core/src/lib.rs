//! Event coordination for dual-context firmware: the pieces that sit
//! between an asynchronous event source (interrupt handler, second
//! core) and the polling code that acts on it.
//!
//! Everything here is free of clocks and pins. Timestamps go in,
//! deadlines come out, and lamp states are read as plain booleans, so
//! the whole crate builds and tests on the host while the firmware
//! crate wires it to real hardware.

#![no_std]

pub mod alarm;
pub mod command;
pub mod debounce;
pub mod handoff;
pub mod intercore;
pub mod trafficlight;

#[cfg(test)]
#[macro_use]
extern crate std;
