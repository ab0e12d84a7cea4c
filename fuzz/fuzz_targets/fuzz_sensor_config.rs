//! Fuzz target: stored sensor source decoder
//!
//! Decodes arbitrary stored strings (topic lists or escaped JSON documents)
//! and routes a message through any resulting sensor set:
//! - No panics under arbitrary input
//! - A decoded source always re-encodes
//! - A repeated update never reports a second change
//!
//! cargo fuzz run fuzz_sensor_config

#![no_main]

use hour_effect::sensors::codec::{MAX_PRESENCE_TOPIC_LEN, SensorSource};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let (stored, payload) = text.split_once('\u{0}').unwrap_or((text, "on"));

    let Ok(source) = SensorSource::decode(stored, MAX_PRESENCE_TOPIC_LEN) else {
        return;
    };

    let _ = SensorSource::decode(&source.encode(), MAX_PRESENCE_TOPIC_LEN);

    if let SensorSource::Advanced(mut cfg) = source {
        let topics: Vec<String> = cfg.topics().map(str::to_string).collect();
        for topic in &topics {
            cfg.update_sensor_state(topic, payload);
            assert_ne!(cfg.update_sensor_state(topic, payload), Some(true));
        }
    }
});
