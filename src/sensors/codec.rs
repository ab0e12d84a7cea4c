//! Stored form of a sensor source.
//!
//! A source is persisted as one string. A plain topic (or comma-separated
//! topic list) selects simple mode. A JSON document selects advanced mode:
//!
//! ```json
//! {"sensors":[{"id":"kitchen","topic":"zigbee/kitchen","path":"occupancy","on_values":"true"}],
//!  "logic_true":"kitchen","logic_false":"!kitchen"}
//! ```
//!
//! The config tree is edited through a web form that cannot hold raw
//! quotes, so `"` is written as `&quot;`. Reading reverses that and strips
//! CR, LF and TAB that form editing leaves behind.

use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use super::{Sensor, SensorConfig, SimpleTopics, parse_list};
use crate::error::CodecError;

/// Upper bound on an advanced-mode document.
pub const MAX_JSON_CONFIG_LEN: usize = 4096;

/// Topic-string limits per source.
pub const MAX_PRESENCE_TOPIC_LEN: usize = 256;
pub const MAX_LUX_TOPIC_LEN: usize = 256;
pub const MAX_BLOCKER_TOPIC_LEN: usize = 128;
pub const MAX_LAMPS_LEN: usize = 512;

/// How one input (presence, lux or blocker) is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorSource {
    Simple(SimpleTopics),
    Advanced(SensorConfig),
}

impl Default for SensorSource {
    fn default() -> Self {
        Self::Simple(SimpleTopics::default())
    }
}

impl SensorSource {
    pub fn simple(topics: &str) -> Self {
        Self::Simple(SimpleTopics::new(topics))
    }

    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced(_))
    }

    /// Topics to subscribe to when the transport connects.
    pub fn subscriptions(&self) -> Vec<&str> {
        match self {
            Self::Simple(simple) => simple.topics().iter().map(String::as_str).collect(),
            Self::Advanced(cfg) => cfg.topics().filter(|t| !t.is_empty()).collect(),
        }
    }

    /// Stored form: the topic list verbatim, or the escaped JSON document.
    pub fn encode(&self) -> String {
        match self {
            Self::Simple(simple) => simple.raw().to_string(),
            Self::Advanced(cfg) => escape_quotes(&sensor_config_to_json(cfg)),
        }
    }

    /// Parse a stored value.
    ///
    /// A document that fails to parse, or that yields no usable sensor, is an
    /// error; the caller decides on the fallback. A plain topic list longer
    /// than `max_topic_len` is rejected.
    pub fn decode(stored: &str, max_topic_len: usize) -> Result<Self, CodecError> {
        let cleaned = unescape(stored);
        if cleaned.starts_with('{') {
            return parse_sensor_config(&cleaned).map(Self::Advanced);
        }
        if cleaned.len() > max_topic_len {
            return Err(CodecError::TopicTooLong);
        }
        Ok(Self::Simple(SimpleTopics::new(&cleaned)))
    }
}

/// Replace every `"` with `&quot;`.
pub fn escape_quotes(s: &str) -> String {
    s.replace('"', "&quot;")
}

/// Trim, turn `&quot;` back into `"` and drop CR / LF / TAB.
pub fn unescape(s: &str) -> String {
    s.trim()
        .replace("&quot;", "\"")
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
        .collect()
}

// ═══════════════════════════════════════════════════════════════
//  Advanced document
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct SensorDoc<'a> {
    id: &'a str,
    topic: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "String::is_empty")]
    on_values: String,
}

#[derive(Serialize)]
struct SensorConfigDoc<'a> {
    sensors: Vec<SensorDoc<'a>>,
    logic_true: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    logic_false: &'a str,
}

/// Render `cfg` as a single-line JSON document (unescaped).
pub fn sensor_config_to_json(cfg: &SensorConfig) -> String {
    let doc = SensorConfigDoc {
        sensors: cfg
            .sensors
            .iter()
            .map(|s| SensorDoc {
                id: &s.id,
                topic: &s.topic,
                path: &s.path,
                on_values: s.on_values_joined(),
            })
            .collect(),
        logic_true: &cfg.logic_true,
        logic_false: &cfg.logic_false,
    };
    // Serialising plain strings into a Vec cannot fail.
    serde_json::to_string(&doc).unwrap_or_default()
}

/// Parse an advanced-mode document.
pub fn parse_sensor_config(json: &str) -> Result<SensorConfig, CodecError> {
    if json.len() > MAX_JSON_CONFIG_LEN {
        warn!(
            "Sensor config: {} bytes exceeds {} byte limit",
            json.len(),
            MAX_JSON_CONFIG_LEN
        );
        return Err(CodecError::TooLarge);
    }
    let doc: Value = serde_json::from_str(json).map_err(|e| {
        warn!("Sensor config: malformed JSON ({})", e);
        CodecError::MalformedJson
    })?;
    parse_sensor_config_value(&doc)
}

/// Build a [`SensorConfig`] from an already-parsed document.
///
/// Entries without an `id` or `topic` are skipped, as are entries repeating
/// an earlier id (ids compare case-insensitively, like the evaluator).
/// `logic` is accepted as an alias of `logic_true`.
pub fn parse_sensor_config_value(doc: &Value) -> Result<SensorConfig, CodecError> {
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).unwrap_or("").to_string();

    let mut cfg = SensorConfig::default();
    if let Some(entries) = doc.get("sensors").and_then(Value::as_array) {
        for entry in entries {
            let id = text(entry, "id");
            let topic = text(entry, "topic");
            if id.is_empty() || topic.is_empty() {
                debug!("Sensor config: skipping entry without id or topic");
                continue;
            }
            let key = id.to_lowercase();
            if cfg.sensors.iter().any(|s| s.id.to_lowercase() == key) {
                warn!("Sensor config: duplicate id '{}' ({}), skipping", id, topic);
                continue;
            }
            cfg.sensors.push(Sensor {
                id,
                topic,
                path: text(entry, "path"),
                on_values: parse_list(&text(entry, "on_values")),
                current_state: false,
            });
        }
    }

    cfg.logic_true = match doc.get("logic_true").and_then(Value::as_str) {
        Some(logic) => logic.to_string(),
        None => text(doc, "logic"),
    };
    cfg.logic_false = text(doc, "logic_false");

    if cfg.sensors.is_empty() {
        return Err(CodecError::NoSensors);
    }
    Ok(cfg)
}
