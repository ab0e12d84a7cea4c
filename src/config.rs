//! Usermod configuration.
//!
//! All options live under one object ([`CONFIG_KEY`]) in the host's config
//! tree. Reading is key by key: a missing or malformed key keeps its current
//! value and marks the load incomplete so the host rewrites the file with
//! the full set of keys.
//!
//! The three sensor sources (`presence`, `lux`, `presence_blocker`) are
//! owned by the service, which encodes them through
//! [`sensors::codec`](crate::sensors::codec).

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::fusion::TriggerMode;
use crate::schedule::{DEFAULT_NIGHT_MODE_OFF, DEFAULT_NIGHT_MODE_ON, NightPolicy, validate_hours};
use crate::sensors::codec::MAX_LAMPS_LEN;

/// Name of the usermod's object in the config tree.
pub const CONFIG_KEY: &str = "HourEffect";

/// Scalar options of the usermod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsermodConfig {
    /// Master switch; when off every hook is a no-op.
    pub enabled: bool,
    /// Flash green when a print job finishes.
    pub job_blink: bool,
    /// White flash at the top of every hour.
    pub hour_effect: bool,
    /// Switch LEDs off when NightMode starts.
    pub night_mode_power_off: bool,
    /// Switch LEDs on when NightMode ends.
    pub night_mode_power_on: bool,
    /// Presence may still switch LEDs on during NightMode.
    pub presence_during_night_mode: bool,
    /// Hour NightMode starts (0-23).
    pub night_mode_on: u8,
    /// Hour NightMode ends (0-23).
    pub night_mode_off: u8,
    /// Illuminance below which it counts as dark.
    pub lux_threshold: i32,
    pub trigger_mode: TriggerMode,
    /// Local presence input pin, -1 for none. Stored as a one-element array.
    #[serde(with = "pin_array")]
    pub input_pin: i8,
    pub input_active_low: bool,
    /// Comma-separated lamp command topics mirrored on LED on/off.
    pub lamps: String,
}

impl Default for UsermodConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            job_blink: false,
            hour_effect: false,
            night_mode_power_off: false,
            night_mode_power_on: false,
            presence_during_night_mode: false,
            night_mode_on: DEFAULT_NIGHT_MODE_ON,
            night_mode_off: DEFAULT_NIGHT_MODE_OFF,
            lux_threshold: 30,
            trigger_mode: TriggerMode::PresenceOnly,
            input_pin: -1,
            input_active_low: false,
            lamps: String::new(),
        }
    }
}

impl UsermodConfig {
    pub fn night_policy(&self) -> NightPolicy {
        NightPolicy {
            presence_during_night_mode: self.presence_during_night_mode,
            power_off: self.night_mode_power_off,
            power_on: self.night_mode_power_on,
        }
    }

    /// Range-check the options. Hours read through [`read_from`] are
    /// already clamped, so after a load only the lamp list can fail.
    ///
    /// [`read_from`]: Self::read_from
    pub fn validate(&self) -> Result<(), Error> {
        if self.night_mode_on > 23 {
            return Err(Error::Config("night_mode_on must be 0..=23"));
        }
        if self.night_mode_off > 23 {
            return Err(Error::Config("night_mode_off must be 0..=23"));
        }
        if self.lamps.len() > MAX_LAMPS_LEN {
            return Err(Error::Config("lamps list too long"));
        }
        Ok(())
    }

    /// Write every option into `obj`.
    pub fn write_into(&self, obj: &mut Map<String, Value>) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            obj.extend(fields);
        }
    }

    /// Read options from `obj`. Returns `true` only if every key was present
    /// and accepted.
    pub fn read_from(&mut self, obj: &Map<String, Value>) -> bool {
        let mut complete = true;
        complete &= read_key(obj, "enabled", &mut self.enabled);
        complete &= read_key(obj, "job_blink", &mut self.job_blink);
        complete &= read_key(obj, "hour_effect", &mut self.hour_effect);
        complete &= read_key(obj, "night_mode_power_off", &mut self.night_mode_power_off);
        complete &= read_key(obj, "night_mode_power_on", &mut self.night_mode_power_on);
        complete &= read_key(
            obj,
            "presence_during_night_mode",
            &mut self.presence_during_night_mode,
        );
        complete &= read_key(obj, "lux_threshold", &mut self.lux_threshold);
        complete &= read_key(obj, "trigger_mode", &mut self.trigger_mode);
        complete &= read_key(obj, "input_active_low", &mut self.input_active_low);

        let mut on = i32::from(self.night_mode_on);
        let mut off = i32::from(self.night_mode_off);
        complete &= read_key(obj, "night_mode_on", &mut on);
        complete &= read_key(obj, "night_mode_off", &mut off);
        let (on, off, valid) = validate_hours(on, off);
        self.night_mode_on = on;
        self.night_mode_off = off;
        complete &= valid;

        complete &= match obj.get("input_pin").and_then(pin_array::from_value) {
            Some(pin) => {
                self.input_pin = pin;
                true
            }
            None => false,
        };

        let previous_lamps = self.lamps.clone();
        complete &= read_key(obj, "lamps", &mut self.lamps);
        if let Err(e) = self.validate() {
            warn!("Config: {}, keeping previous lamps", e);
            self.lamps = previous_lamps;
            complete = false;
        }

        complete
    }
}

/// Deserialize `obj[key]` into `target`. Missing or mistyped keys leave
/// `target` untouched and return `false`.
pub(crate) fn read_key<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    key: &str,
    target: &mut T,
) -> bool {
    let Some(value) = obj.get(key) else {
        return false;
    };
    match T::deserialize(value) {
        Ok(v) => {
            *target = v;
            true
        }
        Err(e) => {
            warn!("Config: rejected '{}' ({})", key, e);
            false
        }
    }
}

/// Pin numbers are stored as `[pin]`; a bare number is accepted on read.
mod pin_array {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(pin: &i8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq([*pin])
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i8, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_value(&value).ok_or_else(|| serde::de::Error::custom("expected pin or [pin]"))
    }

    pub fn from_value(value: &Value) -> Option<i8> {
        let number = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };
        number.as_i64().and_then(|n| i8::try_from(n).ok())
    }
}
