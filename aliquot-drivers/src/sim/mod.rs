//! Simulated motor channel
//!
//! Stands in for a stepper drive with effort feedback. Time only passes
//! when the owner calls [`SimChannel::advance`].

pub mod channel;

pub use channel::{SimChannel, SimConfig};
