//! Motor channel implementations
//!
//! This crate provides concrete implementations of the
//! [`MotorChannel`](aliquot_core::traits::MotorChannel) trait defined in
//! aliquot-core:
//!
//! - Simulated stepper channel with hard stop, endstop and load model,
//!   used by the bench runner and the scenario tests

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod sim;

pub use sim::{SimChannel, SimConfig};
