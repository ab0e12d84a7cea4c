//! Local presence input (PIR / radar module on a GPIO).
//!
//! ## Hardware
//!
//! Digital output of a motion sensor wired straight to a pin. Some modules
//! pull the line low on detection, hence `active_low`.
//!
//! The pin is claimed from the host's registry when configured and released
//! when the configuration changes. A refused claim leaves the input
//! disabled until the next configuration change.
//!
//! `poll()` is called from the main loop; it samples at most every
//! [`POLL_INTERVAL_MS`] and reports level changes only.

use embedded_hal::digital::{Error as _, InputPin};
use log::{info, warn};

use crate::app::ports::GpioPort;
use crate::error::{ResourceError, Result};

pub const POLL_INTERVAL_MS: u32 = 100;

/// Owner tag used with the host pin registry.
pub const PIN_OWNER: &str = "hour-effect";

#[derive(Debug, Default)]
pub struct PresenceInput {
    pin: Option<u8>,
    active_low: bool,
    /// Last reported level (active = presence).
    active: bool,
    last_poll_ms: u32,
}

impl PresenceInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin currently claimed, if any.
    pub fn pin(&self) -> Option<u8> {
        self.pin
    }

    /// Claim `pin` (negative = none), releasing any previous pin first.
    pub fn configure<G: GpioPort + ?Sized>(
        &mut self,
        gpio: &mut G,
        pin: i8,
        active_low: bool,
    ) -> Result<()> {
        let wanted = u8::try_from(pin).ok();
        if wanted.is_some() && wanted == self.pin {
            self.active_low = active_low;
            return Ok(());
        }

        if let Some(old) = self.pin.take() {
            gpio.deallocate(old, PIN_OWNER);
            info!("Presence input: released pin {}", old);
        }
        self.active_low = active_low;
        self.active = false;

        let Some(pin) = wanted else {
            return Ok(());
        };
        if !gpio.allocate(pin, false, PIN_OWNER) {
            warn!("Presence input: pin {} unavailable, input disabled", pin);
            return Err(ResourceError::PinUnavailable(pin).into());
        }
        self.pin = Some(pin);
        info!(
            "Presence input: pin {} (active {})",
            pin,
            if active_low { "low" } else { "high" }
        );
        Ok(())
    }

    /// Release the claimed pin.
    pub fn release<G: GpioPort + ?Sized>(&mut self, gpio: &mut G) {
        if let Some(pin) = self.pin.take() {
            gpio.deallocate(pin, PIN_OWNER);
        }
    }

    /// Sample the pin. Returns the new presence level on a change.
    pub fn poll<G: GpioPort + ?Sized>(&mut self, gpio: &mut G, now_ms: u32) -> Option<bool> {
        let pin = self.pin?;
        if now_ms.wrapping_sub(self.last_poll_ms) < POLL_INTERVAL_MS {
            return None;
        }
        self.last_poll_ms = now_ms;

        let high = match gpio.input(pin)?.is_high() {
            Ok(high) => high,
            Err(e) => {
                warn!(
                    "Presence input: {} ({:?})",
                    ResourceError::PinReadFailed(pin),
                    e.kind()
                );
                return None;
            }
        };
        let active = high != self.active_low;
        if active == self.active {
            return None;
        }
        self.active = active;
        info!("Presence input: pin {} -> {}", pin, if active { "active" } else { "idle" });
        Some(active)
    }
}
