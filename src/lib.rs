//! Calibration and self-test routines for the Execution Performance Tester (EPT), a peripheral
//! that measures task and interrupt execution times with a free-running 40-bit cycle counter and a
//! small on-chip sample RAM.
//!
//! The crate is hardware-agnostic: every peripheral is accessed through the [regs::Registers]
//! trait, which is implemented for memory-mapped hardware by [regs::MmioRegisters] and in software
//! by the models in [sim].

#![cfg_attr(not(test), no_std)]

pub mod calibration;
pub mod counter;
pub mod debug_util;
pub mod ept;
pub mod ram;
pub mod regs;
pub mod selftest;
pub mod sim;
pub mod stats;
pub mod status;
pub mod timer;

pub use status::{Error, ErrorKind, Result, Status, StatusKind};
