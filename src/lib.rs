//! HourEffect usermod library.
//!
//! Presence, illuminance and schedule driven LED control for an LED
//! controller host, with a transient effect overlay that borrows the strip
//! and hands it back. The host runtime reaches the usermod through
//! [`app::service::HourEffect`] and implements the traits in
//! [`app::ports`].

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod fusion;
pub mod lamps;
pub mod logic;
pub mod overlay;
pub mod schedule;
pub mod sensors;

pub mod adapters;
pub mod drivers;

pub use error::{Error, Result};
