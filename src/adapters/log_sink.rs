//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by rendering every [`UsermodEvent`] through the
//! `log` facade, one line per event, prefixed with a short tag that is easy
//! to grep on the serial console.

use log::{debug, info};

use crate::app::events::UsermodEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`UsermodEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &UsermodEvent) {
        match event {
            UsermodEvent::Started { enabled } => {
                info!("START | enabled={}", enabled);
            }
            UsermodEvent::ConfigLoaded { complete } => {
                info!("CONFIG | loaded, complete={}", complete);
            }
            UsermodEvent::PresenceChanged(p) => info!("INPUT | presence={}", p),
            UsermodEvent::LuxChanged(lux) => debug!("INPUT | lux={:.1}", lux),
            UsermodEvent::BlockerChanged(b) => info!("INPUT | blocker={}", b),
            UsermodEvent::NightModeChanged(n) => info!("SCHED | night_mode={}", n),
            UsermodEvent::NotHomeChanged(a) => info!("SCHED | not_home={}", a),
            UsermodEvent::EffectModeChanged(m) => info!("EFFECT | hourly mode={}", m),
            UsermodEvent::LedsSwitched { on } => {
                info!("LEDS | {}", if *on { "ON" } else { "OFF" });
            }
            UsermodEvent::PowerGate { disabled } => {
                debug!("GATE | outputs {}", if *disabled { "disabled" } else { "enabled" });
            }
            UsermodEvent::OverlayStarted(kind) => info!("OVERLAY | {:?} started", kind),
            UsermodEvent::OverlayRestored => info!("OVERLAY | restored"),
        }
    }
}
