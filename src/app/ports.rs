//! Port traits: the hexagonal boundary between the usermod and its host.
//!
//! ```text
//!   Host runtime ──▶ Port trait ──▶ HourEffect (domain)
//! ```
//!
//! The host LED runtime implements these traits. The
//! [`HourEffect`](super::service::HourEffect) service consumes them via
//! generics at every entry point, so no host global is ever touched
//! directly and every hook can be driven from a test with a mock host.

use embedded_hal::digital::InputPin;

use crate::schedule::LocalTime;

// ───────────────────────────────────────────────────────────────
// LED strip (domain → host LED API)
// ───────────────────────────────────────────────────────────────

/// One addressable region ("segment") of the strip.
pub trait Region {
    fn is_active(&self) -> bool;
    fn is_selected(&self) -> bool;
    fn set_selected(&mut self, selected: bool);

    fn mode(&self) -> u8;
    fn set_mode(&mut self, mode: u8);
    fn speed(&self) -> u8;
    fn set_speed(&mut self, speed: u8);
    fn intensity(&self) -> u8;
    fn set_intensity(&mut self, intensity: u8);
    fn palette(&self) -> u8;
    fn set_palette(&mut self, palette: u8);

    /// Packed `0xWWRRGGBB` colour of slot 0..3.
    fn color(&self, slot: usize) -> u32;
    fn set_color(&mut self, slot: usize, color: u32);

    fn is_on(&self) -> bool;
    fn set_on(&mut self, on: bool);
    fn opacity(&self) -> u8;
    fn set_opacity(&mut self, opacity: u8);

    /// Effect-specific parameter 0..3.
    fn custom(&self, slot: usize) -> u8;
    fn set_custom(&mut self, slot: usize, value: u8);
}

/// Global LED state of the host.
pub trait LedStrip {
    type Region: Region;

    fn region_count(&self) -> usize;
    fn region(&self, index: usize) -> Option<&Self::Region>;
    fn region_mut(&mut self, index: usize) -> Option<&mut Self::Region>;
    /// Index of the region the host treats as "main".
    fn main_region_index(&self) -> usize;

    /// Current master brightness; 0 means off.
    fn brightness(&self) -> u8;
    fn set_brightness(&mut self, brightness: u8);
    /// Commit a brightness change to the output.
    fn apply_brightness(&mut self);
    /// Brightness the host restores on its own "on" command.
    fn last_brightness(&self) -> u8;
    fn set_last_brightness(&mut self, brightness: u8);

    /// Global primary / secondary colours as `[r, g, b, w]`.
    fn primary_color(&self) -> [u8; 4];
    fn set_primary_color(&mut self, color: [u8; 4]);
    fn secondary_color(&self) -> [u8; 4];
    fn set_secondary_color(&mut self, color: [u8; 4]);

    /// Global effect speed, intensity and palette the host applies to new
    /// effects.
    fn effect_speed(&self) -> u8;
    fn effect_intensity(&self) -> u8;
    fn effect_palette(&self) -> u8;

    /// Tell the host a direct state change happened (UI / sync refresh).
    fn notify_state_changed(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    /// Milliseconds since boot; wraps at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Local wall-clock time.
    fn local_time(&self) -> LocalTime;

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Ask the host to re-sync its wall clock at the next opportunity.
    fn request_time_sync(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Message transport (MQTT client of the host)
// ───────────────────────────────────────────────────────────────

pub trait Transport {
    fn is_connected(&self) -> bool;

    /// Device topic prefix, e.g. `wled/kitchen`.
    fn device_topic(&self) -> &str;

    /// Group topic prefix; empty when none is configured.
    fn group_topic(&self) -> &str;

    fn subscribe(&mut self, topic: &str);

    /// Returns `false` if the message could not be queued.
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> bool;
}

// ───────────────────────────────────────────────────────────────
// GPIO / pin registry
// ───────────────────────────────────────────────────────────────

/// Host pin registry plus access to allocated input pins.
pub trait GpioPort {
    type Input: InputPin;

    /// Claim `pin` for `owner`. Returns `false` if it is taken or invalid.
    fn allocate(&mut self, pin: u8, output: bool, owner: &'static str) -> bool;

    fn deallocate(&mut self, pin: u8, owner: &'static str);

    fn is_allocated(&self, pin: u8, owner: &'static str) -> bool;

    /// The input behind an allocated pin.
    fn input(&mut self, pin: u8) -> Option<&mut Self::Input>;
}

// ───────────────────────────────────────────────────────────────
// Co-resident output modules
// ───────────────────────────────────────────────────────────────

/// A display or relay module whose output follows the power gate.
pub trait PowerGateSink {
    /// `true` switches the module's output off.
    fn set_output_disabled(&mut self, disabled: bool);

    /// The module's own LED enable switch, if it has one. `Some(false)`
    /// vetoes LED power changes.
    fn led_output_enabled(&self) -> Option<bool> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The usermod emits structured [`UsermodEvent`](super::events::UsermodEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::UsermodEvent);
}

// ───────────────────────────────────────────────────────────────
// Combined host handle
// ───────────────────────────────────────────────────────────────

/// Everything an entry point may touch. Implemented automatically for any
/// type providing all the ports, which avoids juggling several mutable
/// borrows of the same host.
pub trait UsermodHost: LedStrip + Clock + Transport + GpioPort {}

impl<T: LedStrip + Clock + Transport + GpioPort> UsermodHost for T {}
