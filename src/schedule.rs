//! NightMode / NotHome schedule gate.
//!
//! NightMode is entered and left at configured wall-clock hours; NotHome is
//! an external flag layered on top that always wins. The gate only decides
//! *when* something happens; the service performs the LED actions.
//!
//! ```text
//!               hour == on  (once per hour)
//!        ┌──────────────────────────────────┐
//!        │                                  ▼
//!    ┌───────┐                          ┌───────┐
//!    │  DAY  │                          │ NIGHT │
//!    └───────┘                          └───────┘
//!        ▲                                  │
//!        └──────────────────────────────────┘
//!               hour == off (once per hour)
//!
//!    NotHome = true ──▶ schedule suspended, power gate closed
//! ```

use core::fmt;

use heapless::Vec;
use log::{info, warn};

use crate::fusion::FusionState;

pub const DEFAULT_NIGHT_MODE_ON: u8 = 1;
pub const DEFAULT_NIGHT_MODE_OFF: u8 = 8;

/// Broken-down local time supplied by the host clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl LocalTime {
    pub const fn at(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year: 2024,
            month: 1,
            day: 1,
            hour,
            minute,
            second,
        }
    }

    /// Exactly `hh:00:00`.
    pub fn is_top_of_hour(&self) -> bool {
        self.minute == 0 && self.second == 0
    }
}

/// Rendered as `d.m.yyyy h:m:s`, the form status messages carry.
impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{} {}:{}:{}",
            self.day, self.month, self.year, self.hour, self.minute, self.second
        )
    }
}

/// NightMode related options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NightPolicy {
    /// Presence may still switch the LEDs on during NightMode.
    pub presence_during_night_mode: bool,
    /// Switch the LEDs off when NightMode starts.
    pub power_off: bool,
    /// Switch the LEDs on when NightMode ends.
    pub power_on: bool,
}

/// A NightMode edge produced by [`NightSchedule::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NightTransition {
    Begin,
    End,
}

/// Hour-based NightMode state machine.
#[derive(Debug, Clone)]
pub struct NightSchedule {
    on_hour: u8,
    off_hour: u8,
    /// Hour in which the off edge last fired; cleared once the hour passes.
    last_off_hour: Option<u8>,
    /// Hour in which the on edge last fired; cleared once the hour passes.
    last_on_hour: Option<u8>,
}

impl Default for NightSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_NIGHT_MODE_ON, DEFAULT_NIGHT_MODE_OFF)
    }
}

impl NightSchedule {
    pub fn new(on_hour: u8, off_hour: u8) -> Self {
        let mut schedule = Self {
            on_hour: DEFAULT_NIGHT_MODE_ON,
            off_hour: DEFAULT_NIGHT_MODE_OFF,
            last_off_hour: None,
            last_on_hour: None,
        };
        schedule.set_hours(i32::from(on_hour), i32::from(off_hour));
        schedule
    }

    pub fn on_hour(&self) -> u8 {
        self.on_hour
    }

    pub fn off_hour(&self) -> u8 {
        self.off_hour
    }

    /// Apply new hours. An hour outside 0..=23 falls back to its default and
    /// `false` is returned.
    pub fn set_hours(&mut self, on_hour: i32, off_hour: i32) -> bool {
        let (on, off, valid) = validate_hours(on_hour, off_hour);
        if (on, off) != (self.on_hour, self.off_hour) {
            info!("NightMode: on at {}:00, off at {}:00", on, off);
            self.last_on_hour = None;
            self.last_off_hour = None;
        }
        self.on_hour = on;
        self.off_hour = off;
        valid
    }

    /// Check the clock against the configured hours.
    ///
    /// Each edge fires at most once while its hour lasts, and only when it
    /// actually changes `night_mode`. When both hours are equal the off edge
    /// is evaluated first.
    pub fn poll(&mut self, time: &LocalTime, night_mode: bool) -> Vec<NightTransition, 2> {
        let mut fired = Vec::new();
        let mut night = night_mode;

        if Self::edge(time.hour, self.off_hour, &mut self.last_off_hour) && night {
            night = false;
            // Capacity 2, at most two pushes.
            let _ = fired.push(NightTransition::End);
        }
        if Self::edge(time.hour, self.on_hour, &mut self.last_on_hour) && !night {
            let _ = fired.push(NightTransition::Begin);
        }
        fired
    }

    fn edge(hour: u8, target: u8, last: &mut Option<u8>) -> bool {
        if hour != target {
            *last = None;
            return false;
        }
        if *last == Some(hour) {
            return false;
        }
        *last = Some(hour);
        true
    }
}

/// Check configured hours one by one: an hour outside 0..=23 falls back to
/// its own default, the other is kept. Returns `(on, off, valid)`.
pub fn validate_hours(on_hour: i32, off_hour: i32) -> (u8, u8, bool) {
    let (on, on_ok) = check_hour("on", on_hour, DEFAULT_NIGHT_MODE_ON);
    let (off, off_ok) = check_hour("off", off_hour, DEFAULT_NIGHT_MODE_OFF);
    (on, off, on_ok && off_ok)
}

fn check_hour(name: &str, hour: i32, fallback: u8) -> (u8, bool) {
    match u8::try_from(hour) {
        Ok(h) if h <= 23 => (h, true),
        _ => {
            warn!("NightMode {} hour {} out of range, using {}", name, hour, fallback);
            (fallback, false)
        }
    }
}

/// Whether co-resident displays should switch their output off.
///
/// NotHome always disables. During NightMode only presence with the night
/// override keeps them on. During the day presence keeps them on.
pub fn compute_power_gate(state: &FusionState, policy: &NightPolicy) -> bool {
    if state.not_home {
        true
    } else if state.night_mode {
        !(policy.presence_during_night_mode && state.presence)
    } else {
        !state.presence
    }
}

/// Top-of-hour trigger for the hourly effect.
#[derive(Debug, Clone, Default)]
pub struct HourlyTrigger {
    last_hour: Option<u8>,
    last_fire_ms: u32,
}

impl HourlyTrigger {
    /// Minimum spacing between two fires.
    pub const MIN_SPACING_MS: u32 = 1000;

    /// `hh:00:00` of an hour not yet handled, and not right after a fire.
    pub fn is_due(&self, now_ms: u32, time: &LocalTime) -> bool {
        now_ms.wrapping_sub(self.last_fire_ms) > Self::MIN_SPACING_MS
            && time.is_top_of_hour()
            && self.last_hour != Some(time.hour)
    }

    /// Record the hour as handled without firing.
    pub fn skip(&mut self, hour: u8) {
        self.last_hour = Some(hour);
    }

    /// Record a fire.
    pub fn fired(&mut self, hour: u8, now_ms: u32) {
        self.last_hour = Some(hour);
        self.last_fire_ms = now_ms;
    }
}
