//! Lamp mirroring.
//!
//! External lamps listen on their own command topics. Whenever the usermod
//! switches the strip (or sees it switched from outside), each lamp gets the
//! matching `{"state":"ON"}` / `{"state":"OFF"}` command.

use log::{debug, warn};
use serde_json::json;

use crate::app::ports::Transport;
use crate::sensors::parse_list;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LampGroup {
    topics: Vec<String>,
}

impl LampGroup {
    /// Build from the comma-separated config value.
    pub fn new(list: &str) -> Self {
        Self {
            topics: parse_list(list),
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Command every lamp. Returns how many commands were queued.
    pub fn switch<T: Transport + ?Sized>(&self, transport: &mut T, on: bool) -> usize {
        if self.topics.is_empty() {
            return 0;
        }
        if !transport.is_connected() {
            debug!("Lamps: transport down, {} lamp(s) not switched", self.topics.len());
            return 0;
        }

        let payload = json!({ "state": if on { "ON" } else { "OFF" } }).to_string();
        let mut sent = 0;
        for topic in &self.topics {
            if transport.publish(topic, &payload, false) {
                sent += 1;
            } else {
                warn!("Lamps: publish to '{}' failed", topic);
            }
        }
        debug!("Lamps: {} -> {}/{}", payload, sent, self.topics.len());
        sent
    }
}
