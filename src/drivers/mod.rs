//! Peripheral drivers.

pub mod presence_input;
