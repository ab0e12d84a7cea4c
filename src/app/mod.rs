//! Application core: the usermod's domain logic behind port traits.
//!
//! The [`service::HourEffect`] type implements the host hooks. All
//! interaction with the LED runtime, transport, clock and pins happens
//! through the **port traits** defined in [`ports`], so the whole usermod
//! is testable without a host.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
