//! Sensor state store: named boolean sensors fed by inbound messages.
//!
//! Each of the three inputs (presence, lux, blocker) is configured either as
//! a plain topic list ([`SimpleTopics`]) or as a structured sensor list with
//! logic expressions ([`SensorConfig`]). See [`codec`] for the stored form.
//!
//! | Item                     | Purpose                                     |
//! |--------------------------|---------------------------------------------|
//! | [`Sensor`]               | one named input and its last state          |
//! | [`SensorConfig`]         | ordered sensors + `logic_true`/`logic_false` |
//! | [`evaluate_sensor_state`]| payload → bool via optional JSON path       |
//! | [`extract_lux_value`]    | payload → illuminance                       |

pub mod codec;

use log::debug;
use serde_json::Value;

use crate::logic::SensorLookup;

// ═══════════════════════════════════════════════════════════════
//  Sensor
// ═══════════════════════════════════════════════════════════════

/// A named input bound to a message topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sensor {
    /// Identifier referenced by logic expressions (case-insensitive).
    pub id: String,
    /// Topic, or topic suffix, this sensor listens on.
    pub topic: String,
    /// Top-level JSON field to read; empty means the raw payload.
    pub path: String,
    /// Substrings that mark the sensor as active.
    pub on_values: Vec<String>,
    /// Last evaluated state.
    pub current_state: bool,
}

impl Sensor {
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Set the JSON field to read.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the on-values from a comma-separated list.
    #[must_use]
    pub fn with_on_values(mut self, list: &str) -> Self {
        self.on_values = parse_list(list);
        self
    }

    /// On-values joined back into their comma-separated stored form.
    pub fn on_values_joined(&self) -> String {
        self.on_values.join(",")
    }

    /// Attribution rule for updates: the inbound topic ends with or
    /// contains this sensor's topic.
    pub fn matches_topic(&self, topic: &str) -> bool {
        !self.topic.is_empty() && (topic.ends_with(&self.topic) || topic.contains(&self.topic))
    }
}

// ═══════════════════════════════════════════════════════════════
//  SensorConfig
// ═══════════════════════════════════════════════════════════════

/// Ordered sensors plus the expressions that combine them.
///
/// An empty `logic_true` / `logic_false` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorConfig {
    pub sensors: Vec<Sensor>,
    pub logic_true: String,
    pub logic_false: String,
}

impl SensorConfig {
    pub fn new(sensors: Vec<Sensor>) -> Self {
        Self {
            sensors,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_logic(mut self, logic_true: &str, logic_false: &str) -> Self {
        self.logic_true = logic_true.to_string();
        self.logic_false = logic_false.to_string();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Routing rule: the inbound topic equals or ends with a sensor topic.
    pub fn claims(&self, topic: &str) -> bool {
        self.sensors
            .iter()
            .any(|s| !s.topic.is_empty() && topic.ends_with(&s.topic))
    }

    /// First sensor (insertion order) the inbound topic is attributed to.
    pub fn sensor_for_topic(&self, topic: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.matches_topic(topic))
    }

    /// Look a sensor up by id, ignoring case.
    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        let id = id.to_lowercase();
        self.sensors.iter().find(|s| s.id.to_lowercase() == id)
    }

    /// Feed one inbound message to the first matching sensor.
    ///
    /// Returns `None` if no sensor matched, otherwise whether that sensor's
    /// state changed.
    pub fn update_sensor_state(&mut self, topic: &str, payload: &str) -> Option<bool> {
        let sensor = self.sensors.iter_mut().find(|s| s.matches_topic(topic))?;
        let state = evaluate_sensor_state(sensor, payload);
        if state == sensor.current_state {
            return Some(false);
        }
        debug!(
            "Sensor '{}' {} -> {} (topic {})",
            sensor.id, sensor.current_state, state, topic
        );
        sensor.current_state = state;
        Some(true)
    }

    /// Topics to subscribe to, in insertion order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|s| s.topic.as_str())
    }
}

impl SensorLookup for SensorConfig {
    fn state_of(&self, id: &str) -> Option<bool> {
        self.sensors
            .iter()
            .find(|s| s.id.to_lowercase() == id)
            .map(|s| s.current_state)
    }

    fn any_active(&self) -> bool {
        self.sensors.iter().any(|s| s.current_state)
    }
}

// ═══════════════════════════════════════════════════════════════
//  SimpleTopics
// ═══════════════════════════════════════════════════════════════

/// Plain topic form: one topic, or a comma-separated list whose per-topic
/// states are tracked so that a multi-topic presence requires all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleTopics {
    raw: String,
    topics: Vec<String>,
    states: Vec<bool>,
}

impl SimpleTopics {
    pub fn new(raw: &str) -> Self {
        let topics = parse_list(raw);
        let states = vec![false; topics.len()];
        Self {
            raw: raw.to_string(),
            topics,
            states,
        }
    }

    /// Stored form, exactly as configured.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// A comma anywhere in the stored form selects multi-topic handling.
    pub fn is_multi(&self) -> bool {
        self.raw.contains(',')
    }

    /// Index of the topic equal to `topic`.
    pub fn position(&self, topic: &str) -> Option<usize> {
        self.topics.iter().position(|t| t == topic)
    }

    /// Index of the first listed topic that `topic` ends with or contains.
    pub fn matching(&self, topic: &str) -> Option<usize> {
        self.topics
            .iter()
            .position(|t| topic.ends_with(t.as_str()) || topic.contains(t.as_str()))
    }

    pub fn state(&self, index: usize) -> bool {
        self.states.get(index).copied().unwrap_or(false)
    }

    pub fn set_state(&mut self, index: usize, state: bool) {
        if let Some(slot) = self.states.get_mut(index) {
            *slot = state;
        }
    }

    /// True when every listed topic last reported active.
    pub fn all_on(&self) -> bool {
        !self.states.is_empty() && self.states.iter().all(|s| *s)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Payload evaluation
// ═══════════════════════════════════════════════════════════════

/// Decide whether `payload` marks `sensor` active.
///
/// With a path the payload must be JSON; a parse failure is inactive.
pub fn evaluate_sensor_state(sensor: &Sensor, payload: &str) -> bool {
    let value = if sensor.path.is_empty() {
        payload.to_lowercase()
    } else {
        match serde_json::from_str::<Value>(payload) {
            Ok(doc) => field_as_string(doc.get(&sensor.path)).to_lowercase(),
            Err(e) => {
                debug!("Sensor '{}': payload is not JSON ({})", sensor.id, e);
                return false;
            }
        }
    };

    sensor
        .on_values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .any(|v| value.contains(&v))
}

/// Read an illuminance value for `sensor` from `payload`.
///
/// Falls back to the leading number of the raw payload, or 0.0.
pub fn extract_lux_value(sensor: &Sensor, payload: &str) -> f32 {
    if !sensor.path.is_empty() {
        if let Ok(doc) = serde_json::from_str::<Value>(payload) {
            return match doc.get(&sensor.path) {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
                Some(Value::String(s)) => parse_leading_f32(s).unwrap_or(0.0),
                _ => 0.0,
            };
        }
    }
    parse_leading_f32(payload).unwrap_or(0.0)
}

fn field_as_string(field: Option<&Value>) -> String {
    match field {
        None | Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Split a comma-separated list, trimming entries and skipping empty ones.
pub fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `true`, `1` or `on` (any case, surrounding whitespace ignored).
pub fn parse_bool_word(payload: &str) -> bool {
    let p = payload.trim();
    p == "1" || p.eq_ignore_ascii_case("true") || p.eq_ignore_ascii_case("on")
}

/// Leading decimal number of `s` (after whitespace), e.g. `"42.5 lx"` → 42.5.
pub fn parse_leading_f32(s: &str) -> Option<f32> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start || has_digits {
            has_digits |= frac_end > frac_start;
            end = frac_end;
        }
    }
    if !has_digits {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}

/// Leading integer of `s`, or 0 (`"3 please"` → 3).
pub fn parse_leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    s[..end].parse().unwrap_or(0)
}
