//! Presence / illuminance fusion.
//!
//! Combines presence, illuminance, the manual blocker and the schedule flags
//! into a single LED on/off decision according to the configured
//! [`TriggerMode`].
//!
//! ```text
//!  presence ─┐
//!  lux ──────┼──▶ FusionState::decide(policy, leds_on) ──▶ Option<LedCommand>
//!  schedule ─┘
//! ```

use serde::{Deserialize, Serialize};

use crate::logic::{SensorLookup, evaluate_logic_expression};
use crate::schedule::NightPolicy;
use crate::sensors::SensorConfig;

/// Policy that turns sensor state into LED commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TriggerMode {
    /// Sensors are tracked but never switch the LEDs.
    None = 0,
    /// Presence switches on and off.
    #[default]
    PresenceOnly = 1,
    /// Darkness switches on; light never switches off.
    LuxNoOff = 2,
    /// Darkness switches on, light switches off.
    LuxWithOff = 3,
    /// Presence in the dark switches on; absence switches off.
    LuxAndPresenceOffOnPresenceFalse = 4,
    /// Presence in the dark switches on; absence in the light switches off.
    LuxAndPresenceOffOnBothFalse = 5,
}

impl TryFrom<u8> for TriggerMode {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::None,
            1 => Self::PresenceOnly,
            2 => Self::LuxNoOff,
            3 => Self::LuxWithOff,
            4 => Self::LuxAndPresenceOffOnPresenceFalse,
            5 => Self::LuxAndPresenceOffOnBothFalse,
            _ => return Err("trigger mode must be 0..=5"),
        })
    }
}

impl From<TriggerMode> for u8 {
    fn from(mode: TriggerMode) -> Self {
        mode as u8
    }
}

/// Requested LED power change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    On,
    Off,
}

impl LedCommand {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Derived inputs the decision is made from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionState {
    pub presence: bool,
    pub lux: f32,
    pub lux_threshold: i32,
    pub trigger_mode: TriggerMode,
    pub presence_blocker: bool,
    pub night_mode: bool,
    pub not_home: bool,
}

impl Default for FusionState {
    fn default() -> Self {
        Self {
            presence: false,
            lux: 0.0,
            lux_threshold: 30,
            trigger_mode: TriggerMode::default(),
            presence_blocker: false,
            night_mode: false,
            not_home: false,
        }
    }
}

impl FusionState {
    /// Illuminance is below the threshold.
    pub fn is_dark(&self) -> bool {
        self.lux < self.lux_threshold as f32
    }

    /// Schedule suppresses lux-driven switching.
    pub fn schedule_blocks(&self, policy: &NightPolicy) -> bool {
        self.not_home || (self.night_mode && !policy.presence_during_night_mode)
    }

    /// Decide what the trigger mode asks for, given whether the LEDs are on.
    pub fn decide(&self, policy: &NightPolicy, leds_on: bool) -> Option<LedCommand> {
        let skip = self.schedule_blocks(policy);
        match self.trigger_mode {
            TriggerMode::None => None,
            TriggerMode::PresenceOnly => self.decide_presence(policy),
            TriggerMode::LuxNoOff | TriggerMode::LuxWithOff => {
                if skip {
                    None
                } else if self.is_dark() {
                    Some(LedCommand::On)
                } else if self.trigger_mode == TriggerMode::LuxWithOff {
                    Some(LedCommand::Off)
                } else {
                    None
                }
            }
            TriggerMode::LuxAndPresenceOffOnPresenceFalse => {
                if self.presence && self.is_dark() && !skip && !leds_on {
                    Some(LedCommand::On)
                } else if !self.presence && leds_on {
                    Some(LedCommand::Off)
                } else {
                    None
                }
            }
            TriggerMode::LuxAndPresenceOffOnBothFalse => {
                if self.presence && self.is_dark() && !skip && !leds_on {
                    Some(LedCommand::On)
                } else if !self.presence && !self.is_dark() && leds_on {
                    Some(LedCommand::Off)
                } else {
                    None
                }
            }
        }
    }

    fn decide_presence(&self, policy: &NightPolicy) -> Option<LedCommand> {
        let override_night = policy.presence_during_night_mode;
        if self.presence {
            if self.night_mode && !override_night {
                return None;
            }
            if !self.not_home {
                return Some(LedCommand::On);
            }
        }
        if self.not_home
            || (self.night_mode && policy.power_off)
            || !self.presence
        {
            Some(LedCommand::Off)
        } else {
            None
        }
    }
}

/// Combine a sensor set into one presence value.
///
/// `logic_true` wins when it holds. Otherwise `logic_false` decides: holding
/// means absent, not holding keeps `previous`. Without `logic_false` a
/// failed `logic_true` means absent. Without any logic, any active sensor
/// means present.
pub fn evaluate_presence_state(config: &SensorConfig, previous: bool) -> bool {
    if config.logic_true.is_empty() {
        return config.any_active();
    }
    if evaluate_logic_expression(&config.logic_true, config) {
        return true;
    }
    if config.logic_false.is_empty() {
        return false;
    }
    if evaluate_logic_expression(&config.logic_false, config) {
        false
    } else {
        previous
    }
}
