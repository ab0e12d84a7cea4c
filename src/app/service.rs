//! Application service: the hexagonal core.
//!
//! [`HourEffect`] owns the sensor sources, the fusion state, the NightMode
//! schedule and the effect overlay. Every host hook is a method taking the
//! host handle, so the whole usermod runs against mock adapters in tests.
//!
//! ```text
//!  Transport ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                │          HourEffect           │
//!  LedStrip  ◀──│ Sensors · Fusion · Schedule    │ ──▶ PowerGateSink
//!                │ Overlay · Lamps                │
//!  Clock/Gpio ──▶└──────────────────────────────┘
//! ```

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::config::{CONFIG_KEY, UsermodConfig};
use crate::drivers::presence_input::PresenceInput;
use crate::error::CodecError;
use crate::fusion::{FusionState, TriggerMode, evaluate_presence_state};
use crate::lamps::LampGroup;
use crate::logic::evaluate_logic_expression;
use crate::overlay::{EffectOverlay, MIN_JOB_TRIGGER_MS, Rgbw, SETTLE_DELAY_MS};
use crate::schedule::{
    HourlyTrigger, LocalTime, NightSchedule, NightTransition, compute_power_gate,
};
use crate::sensors::codec::{
    MAX_BLOCKER_TOPIC_LEN, MAX_LUX_TOPIC_LEN, MAX_PRESENCE_TOPIC_LEN, SensorSource,
    parse_sensor_config_value,
};
use crate::sensors::{extract_lux_value, parse_bool_word, parse_leading_f32, parse_leading_int};

use super::commands::ControlTopic;
use super::events::{OverlayKind, UsermodEvent};
use super::ports::{EventSink, PowerGateSink, UsermodHost};

/// Brightness used when switching on with no remembered level.
pub const DEFAULT_ON_BRIGHTNESS: u8 = 128;

/// Effect mode of the job-finished flash.
pub const JOB_EFFECT_MODE: u8 = 1;

/// Smallest illuminance change that counts as a change.
pub const LUX_HYSTERESIS: f32 = 0.5;

// ───────────────────────────────────────────────────────────────
// HourEffect
// ───────────────────────────────────────────────────────────────

/// The usermod.
pub struct HourEffect {
    config: UsermodConfig,
    presence: SensorSource,
    lux: SensorSource,
    blocker: SensorSource,
    state: FusionState,
    schedule: NightSchedule,
    hourly: HourlyTrigger,
    overlay: EffectOverlay,
    input: PresenceInput,
    lamps: LampGroup,
    power_sinks: Vec<Box<dyn PowerGateSink>>,
    /// Mode of the hourly flash, as last received on `/NewEffect`.
    effect_mode: u8,
    /// Held while the usermod itself writes the strip.
    internal_state_change: bool,
    last_brightness: u8,
    last_non_zero_brightness: u8,
    last_job_trigger_ms: Option<u32>,
    initialized: bool,
}

impl HourEffect {
    /// Build the service. A config that fails validation is replaced by the
    /// defaults.
    pub fn new(config: UsermodConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Usermod: {}, starting with defaults", e);
                UsermodConfig::default()
            }
        };
        let mut service = Self {
            config,
            presence: SensorSource::default(),
            lux: SensorSource::default(),
            blocker: SensorSource::default(),
            state: FusionState::default(),
            schedule: NightSchedule::default(),
            hourly: HourlyTrigger::default(),
            overlay: EffectOverlay::new(),
            input: PresenceInput::new(),
            lamps: LampGroup::default(),
            power_sinks: Vec::new(),
            effect_mode: 0,
            internal_state_change: false,
            last_brightness: 0,
            last_non_zero_brightness: 0,
            last_job_trigger_ms: None,
            initialized: false,
        };
        service.apply_config();
        service
    }

    /// Register a co-resident module that follows the power gate.
    pub fn register_power_sink(&mut self, sink: Box<dyn PowerGateSink>) {
        self.power_sinks.push(sink);
    }

    pub fn set_presence_source(&mut self, source: SensorSource) {
        self.presence = source;
    }

    pub fn set_lux_source(&mut self, source: SensorSource) {
        self.lux = source;
    }

    pub fn set_blocker_source(&mut self, source: SensorSource) {
        self.blocker = source;
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &UsermodConfig {
        &self.config
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    pub fn overlay(&self) -> &EffectOverlay {
        &self.overlay
    }

    pub fn schedule(&self) -> &NightSchedule {
        &self.schedule
    }

    pub fn presence_source(&self) -> &SensorSource {
        &self.presence
    }

    pub fn lux_source(&self) -> &SensorSource {
        &self.lux
    }

    pub fn blocker_source(&self) -> &SensorSource {
        &self.blocker
    }

    pub fn lamps(&self) -> &LampGroup {
        &self.lamps
    }

    pub fn effect_mode(&self) -> u8 {
        self.effect_mode
    }

    /// `true` while the usermod is writing the strip itself.
    pub fn is_internal_state_change(&self) -> bool {
        self.internal_state_change
    }

    pub fn input_pin(&self) -> Option<u8> {
        self.input.pin()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Host `setup` hook.
    pub fn setup(&mut self, host: &mut impl UsermodHost, sink: &mut impl EventSink) {
        self.apply_config();
        self.overlay.allocate(host.region_count());

        let bri = host.brightness();
        self.last_brightness = bri;
        self.last_non_zero_brightness = [bri, host.last_brightness()]
            .into_iter()
            .find(|b| *b > 0)
            .unwrap_or(DEFAULT_ON_BRIGHTNESS);

        self.configure_input(host);
        self.initialized = true;
        sink.emit(&UsermodEvent::Started {
            enabled: self.config.enabled,
        });
        info!(
            "HourEffect started (enabled={}, mode={:?}, night {}-{})",
            self.config.enabled,
            self.state.trigger_mode,
            self.schedule.on_hour(),
            self.schedule.off_hour()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Host loop hook: input pin, NightMode clock, hourly effect, restore.
    pub fn tick(&mut self, host: &mut impl UsermodHost, sink: &mut impl EventSink) {
        if !self.config.enabled {
            return;
        }
        let now = host.now_ms();

        // 1. Local presence input
        if let Some(active) = self.input.poll(host, now) {
            if self.set_presence(sink, active) && !self.state.presence_blocker {
                self.handle_presence_lux_trigger(host, sink);
            }
        }

        // 2. NightMode clock (suspended while nobody is home)
        let time = host.local_time();
        if !self.state.not_home {
            self.run_night_schedule(host, sink, &time);
        }

        // 3. Hourly flash
        self.run_hourly_effect(host, sink, now, &time);

        // 4. Overlay restore
        if self.overlay.restore_due(host.now_ms()) {
            self.finish_overlay(host, sink);
        }
    }

    /// Host transport-connect hook.
    pub fn on_transport_connected(&mut self, host: &mut impl UsermodHost, session_resumed: bool) {
        if !self.config.enabled || !host.is_connected() {
            return;
        }
        let group = host.group_topic().to_string();
        if group.is_empty() {
            debug!("Transport: no group topic, skipping subscriptions");
            return;
        }

        let mut topics: Vec<String> = ControlTopic::ALL
            .iter()
            .map(|c| c.subscription(&group))
            .collect();
        for source in [&self.presence, &self.lux, &self.blocker] {
            topics.extend(source.subscriptions().into_iter().map(str::to_string));
        }
        for topic in &topics {
            host.subscribe(topic);
        }

        self.overlay.schedule_restore(host.now_ms());
        info!(
            "Transport connected (resumed={}): {} subscriptions, re-evaluating in 10 s",
            session_resumed,
            topics.len()
        );
    }

    // ── Inbound messages ──────────────────────────────────────

    /// Host message hook. Returns `true` when the message was consumed.
    pub fn on_message(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        topic: &str,
        payload: &str,
    ) -> bool {
        if !self.config.enabled || !host.is_connected() {
            return false;
        }
        debug!("Message: {} = {}", topic, payload);

        match ControlTopic::from_topic(topic) {
            Some(ControlTopic::NewEffect) => return self.on_new_effect(host, sink, payload),
            Some(ControlTopic::NightMode) => return self.on_night_mode(host, sink, payload),
            Some(ControlTopic::NotHome) => return self.on_not_home(host, sink, payload),
            Some(ControlTopic::JobFinished)
                if self.config.job_blink && !self.state.not_home && !self.state.night_mode =>
            {
                return self.on_job_finished(host, sink, payload);
            }
            _ => {}
        }

        if let Some(handled) = self.route_presence(host, sink, topic, payload) {
            return handled;
        }
        if let Some(handled) = self.route_lux(host, sink, topic, payload) {
            return handled;
        }
        self.route_blocker(sink, topic, payload)
    }

    fn on_new_effect(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        payload: &str,
    ) -> bool {
        self.effect_mode = parse_leading_int(payload).clamp(0, i32::from(u8::MAX)) as u8;
        host.request_time_sync();
        sink.emit(&UsermodEvent::EffectModeChanged(self.effect_mode));
        info!("Hourly effect mode -> {}", self.effect_mode);
        let time = host.local_time();
        self.publish_status(host, ControlTopic::NewEffect, &format!("{} ({})", payload, time));
        true
    }

    fn on_night_mode(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        payload: &str,
    ) -> bool {
        let night = payload == "true";
        if night == self.state.night_mode {
            debug!("NightMode unchanged");
            return true;
        }
        self.set_night_mode(sink, night);

        let policy = self.config.night_policy();
        let time = host.local_time();
        if night && policy.power_off {
            if policy.presence_during_night_mode && self.state.presence {
                info!("NightMode on with presence, LEDs stay on");
            } else {
                self.drive_leds(host, sink, false);
            }
        } else if !night
            && time.hour >= self.schedule.off_hour()
            && !self.state.not_home
            && policy.power_on
        {
            self.drive_leds(host, sink, true);
        }
        self.publish_status(host, ControlTopic::NightMode, &format!("{} ({})", payload, time));
        true
    }

    fn on_not_home(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        payload: &str,
    ) -> bool {
        let away = payload == "true";
        if away == self.state.not_home {
            debug!("NotHome unchanged");
            return true;
        }
        self.state.not_home = away;
        sink.emit(&UsermodEvent::NotHomeChanged(away));
        info!("NotHome -> {}", away);
        if away {
            self.drive_leds(host, sink, false);
        }
        let time = host.local_time();
        self.publish_status(host, ControlTopic::NotHome, &format!("{} ({})", payload, time));
        true
    }

    fn on_job_finished(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        payload: &str,
    ) -> bool {
        let now = host.now_ms();
        let recent = self
            .last_job_trigger_ms
            .is_some_and(|last| now.wrapping_sub(last) < MIN_JOB_TRIGGER_MS);
        self.last_job_trigger_ms = Some(now);

        if self.overlay.is_blocking() || self.overlay.reset_pending() || recent {
            warn!(
                "Job finished: dropped (blocking={}, pending={}, recent={})",
                self.overlay.is_blocking(),
                self.overlay.reset_pending(),
                recent
            );
            return true;
        }
        if payload == "true" {
            self.start_overlay(host, sink, OverlayKind::JobFinished, Rgbw::GREEN, JOB_EFFECT_MODE);
            let time = host.local_time();
            self.publish_status(
                host,
                ControlTopic::JobFinished,
                &format!("Print finished at: {}", time),
            );
        }
        true
    }

    /// Presence routes. `None` when the topic is not a presence topic.
    fn route_presence(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        topic: &str,
        payload: &str,
    ) -> Option<bool> {
        let presence = match &mut self.presence {
            SensorSource::Advanced(cfg) => {
                if !cfg.claims(topic) {
                    return None;
                }
                cfg.update_sensor_state(topic, payload);
                evaluate_presence_state(cfg, self.state.presence)
            }
            SensorSource::Simple(simple) if simple.is_multi() => {
                let index = simple.matching(topic)?;
                let on = if payload.trim_start().starts_with('{') {
                    match serde_json::from_str::<Value>(payload)
                        .ok()
                        .and_then(|doc| doc.get("presence").and_then(Value::as_bool))
                    {
                        Some(on) => on,
                        None => {
                            warn!("Presence '{}': unusable JSON payload", topic);
                            return Some(true);
                        }
                    }
                } else {
                    parse_bool_word(payload)
                };
                if simple.state(index) == on {
                    debug!("Presence '{}' unchanged", topic);
                    return Some(true);
                }
                simple.set_state(index, on);
                simple.all_on()
            }
            SensorSource::Simple(simple) => {
                if simple.is_empty() || simple.raw() != topic {
                    return None;
                }
                return Some(self.on_simple_presence(host, sink, payload));
            }
        };

        if self.set_presence(sink, presence) {
            self.run_trigger(host, sink);
        }
        Some(true)
    }

    fn on_simple_presence(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        payload: &str,
    ) -> bool {
        let mut lux = None;
        let presence = if payload.trim_start().starts_with('{') {
            let doc = match serde_json::from_str::<Value>(payload) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Presence: {} ({})", CodecError::MalformedJson, e);
                    return false;
                }
            };
            lux = doc.get("illuminance").and_then(Value::as_f64).map(|v| v as f32);
            doc.get("presence").and_then(Value::as_bool).unwrap_or(false)
        } else {
            parse_bool_word(payload)
        };

        let lux_changed = lux.is_some_and(|v| self.set_lux(sink, v));
        let presence_changed = self.set_presence(sink, presence);
        if presence_changed || lux_changed {
            self.run_trigger(host, sink);
        } else {
            debug!("Presence/lux unchanged");
        }
        true
    }

    /// Lux routes. `None` when the topic is not a lux topic.
    fn route_lux(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        topic: &str,
        payload: &str,
    ) -> Option<bool> {
        let lux = match &mut self.lux {
            SensorSource::Advanced(cfg) => {
                if !cfg.claims(topic) {
                    return None;
                }
                cfg.update_sensor_state(topic, payload);
                match cfg.sensor_for_topic(topic) {
                    Some(sensor) => extract_lux_value(sensor, payload),
                    None => return Some(true),
                }
            }
            SensorSource::Simple(simple) if simple.is_multi() => {
                simple.matching(topic)?;
                match read_lux_payload(payload) {
                    Ok((lux, _)) => lux,
                    Err(()) => return Some(true),
                }
            }
            SensorSource::Simple(simple) => {
                if simple.is_empty() || simple.raw() != topic {
                    return None;
                }
                let Ok((lux, presence)) = read_lux_payload(payload) else {
                    return Some(false);
                };
                if let Some(presence) = presence {
                    self.set_presence(sink, presence);
                }
                lux
            }
        };

        if self.set_lux(sink, lux) {
            self.run_trigger(host, sink);
        }
        Some(true)
    }

    /// Blocker routes; the last stop of the routing chain.
    fn route_blocker(&mut self, sink: &mut impl EventSink, topic: &str, payload: &str) -> bool {
        let blocked = match &mut self.blocker {
            SensorSource::Advanced(cfg) => {
                if !cfg.claims(topic) {
                    return false;
                }
                cfg.update_sensor_state(topic, payload);
                evaluate_logic_expression(&cfg.logic_true, &*cfg)
            }
            SensorSource::Simple(simple) => {
                if simple.is_empty() || simple.raw() != topic {
                    return false;
                }
                parse_bool_word(payload)
            }
        };

        if blocked != self.state.presence_blocker {
            self.state.presence_blocker = blocked;
            sink.emit(&UsermodEvent::BlockerChanged(blocked));
            info!("Presence blocker -> {}", if blocked { "active" } else { "inactive" });
        }
        true
    }

    // ── External changes ──────────────────────────────────────

    /// Host state-change hook: someone else changed the LEDs.
    pub fn on_external_state_change(&mut self, host: &mut impl UsermodHost) {
        if !self.config.enabled || self.internal_state_change {
            return;
        }
        let bri = host.brightness();
        if bri == self.last_brightness {
            return;
        }
        let was_on = self.last_brightness > 0;
        let is_on = bri > 0;
        if was_on != is_on {
            info!("External switch -> {}", if is_on { "on" } else { "off" });
            self.lamps.switch(host, is_on);
        }
        if is_on {
            self.last_non_zero_brightness = bri;
        }
        self.last_brightness = bri;
    }

    // ── Config persistence ────────────────────────────────────

    /// Write the usermod's object into the config tree.
    pub fn serialize_config(&self, root: &mut Map<String, Value>) {
        let mut obj = Map::new();
        self.config.write_into(&mut obj);
        obj.insert("presence".into(), Value::String(self.presence.encode()));
        obj.insert("lux".into(), Value::String(self.lux.encode()));
        obj.insert("presence_blocker".into(), Value::String(self.blocker.encode()));
        root.insert(CONFIG_KEY.into(), Value::Object(obj));
    }

    /// Read the usermod's object from the config tree. Returns `true` only
    /// when every key was present and valid.
    pub fn deserialize_config(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        root: &Value,
    ) -> bool {
        let Some(obj) = root.get(CONFIG_KEY).and_then(Value::as_object) else {
            info!("Config: no '{}' object, using defaults", CONFIG_KEY);
            sink.emit(&UsermodEvent::ConfigLoaded { complete: false });
            return false;
        };

        let mut complete = self.config.read_from(obj);
        complete &= read_source(obj, "presence", "presence_config", MAX_PRESENCE_TOPIC_LEN, &mut self.presence);
        complete &= read_source(obj, "lux", "lux_config", MAX_LUX_TOPIC_LEN, &mut self.lux);
        complete &= read_source(
            obj,
            "presence_blocker",
            "blocker_config",
            MAX_BLOCKER_TOPIC_LEN,
            &mut self.blocker,
        );

        self.apply_config();
        if self.initialized {
            self.configure_input(host);
        }

        sink.emit(&UsermodEvent::ConfigLoaded { complete });
        info!(
            "Config loaded (complete={}, presence {}, lux {}, blocker {})",
            complete,
            source_kind(&self.presence),
            source_kind(&self.lux),
            source_kind(&self.blocker)
        );
        complete
    }

    // ── Decision & actuation ──────────────────────────────────

    /// Evaluate the trigger mode and switch the LEDs accordingly.
    pub fn handle_presence_lux_trigger(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
    ) {
        if self.overlay.is_blocking() {
            debug!("Trigger: overlay running, skipped");
            return;
        }
        let policy = self.config.night_policy();
        let leds_on = host.brightness() > 0;
        debug!(
            "Trigger: mode={:?} presence={} lux={:.1}/{} night={} away={}",
            self.state.trigger_mode,
            self.state.presence,
            self.state.lux,
            self.state.lux_threshold,
            self.state.night_mode,
            self.state.not_home
        );
        if let Some(command) = self.state.decide(&policy, leds_on) {
            self.notify_power_gate(sink);
            self.set_leds_on(host, sink, command.is_on());
        }
    }

    /// Switch the LEDs by brightness, honouring the sinks' LED veto.
    pub fn set_leds_on(&mut self, host: &mut impl UsermodHost, sink: &mut impl EventSink, on: bool) {
        let vetoed = self
            .power_sinks
            .iter()
            .any(|s| s.led_output_enabled() == Some(false));
        if vetoed {
            if on && self.overlay.is_blocking() {
                debug!("LEDs: veto overridden for running overlay");
            } else {
                debug!("LEDs: output disabled by a co-resident module");
                return;
            }
        }

        let held = core::mem::replace(&mut self.internal_state_change, true);
        let bri = host.brightness();
        if on {
            if bri == 0 {
                let target = [host.last_brightness(), self.last_non_zero_brightness]
                    .into_iter()
                    .find(|b| *b > 0)
                    .unwrap_or(DEFAULT_ON_BRIGHTNESS);
                host.set_brightness(target);
                host.apply_brightness();
                self.last_brightness = target;
                self.last_non_zero_brightness = target;
                self.lamps.switch(host, true);
                sink.emit(&UsermodEvent::LedsSwitched { on: true });
                info!("LEDs on (brightness {})", target);
            } else {
                self.last_non_zero_brightness = bri;
            }
        } else if bri != 0 {
            host.set_last_brightness(bri);
            self.last_non_zero_brightness = bri;
            host.set_brightness(0);
            host.apply_brightness();
            self.last_brightness = 0;
            self.lamps.switch(host, false);
            sink.emit(&UsermodEvent::LedsSwitched { on: false });
            info!("LEDs off (saved brightness {})", bri);
        }
        self.internal_state_change = held;
    }

    /// Tell every registered sink whether to disable its output.
    pub fn notify_power_gate(&mut self, sink: &mut impl EventSink) -> bool {
        let disabled = compute_power_gate(&self.state, &self.config.night_policy());
        for gate in &mut self.power_sinks {
            gate.set_output_disabled(disabled);
        }
        sink.emit(&UsermodEvent::PowerGate { disabled });
        disabled
    }

    // ── Internals ─────────────────────────────────────────────

    /// Run the trigger unless the blocker or an overlay holds it.
    fn run_trigger(&mut self, host: &mut impl UsermodHost, sink: &mut impl EventSink) {
        if self.state.presence_blocker || self.overlay.is_blocking() {
            debug!(
                "Trigger held (blocker={}, overlay={})",
                self.state.presence_blocker,
                self.overlay.is_blocking()
            );
            return;
        }
        self.handle_presence_lux_trigger(host, sink);
    }

    /// Gate, then switch, unless an overlay owns the strip.
    fn drive_leds(&mut self, host: &mut impl UsermodHost, sink: &mut impl EventSink, on: bool) {
        self.notify_power_gate(sink);
        if self.overlay.is_blocking() {
            debug!("LEDs: overlay running, switch {} deferred", if on { "on" } else { "off" });
            return;
        }
        self.set_leds_on(host, sink, on);
    }

    fn run_night_schedule(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        time: &LocalTime,
    ) {
        let policy = self.config.night_policy();
        for transition in self.schedule.poll(time, self.state.night_mode) {
            let night = transition == NightTransition::Begin;
            self.set_night_mode(sink, night);
            match transition {
                NightTransition::End if policy.power_on => self.drive_leds(host, sink, true),
                NightTransition::Begin if policy.power_off => {
                    if policy.presence_during_night_mode && self.state.presence {
                        self.notify_power_gate(sink);
                    } else {
                        self.drive_leds(host, sink, false);
                    }
                }
                _ => {}
            }
            self.publish_status(host, ControlTopic::NightMode, &format!("{} ({})", night, time));
        }
    }

    fn run_hourly_effect(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        now: u32,
        time: &LocalTime,
    ) {
        if !self.config.hour_effect
            || self.state.night_mode
            || self.state.not_home
            || !self.hourly.is_due(now, time)
        {
            return;
        }
        if self.state.trigger_mode != TriggerMode::None && host.brightness() == 0 {
            debug!("Hourly effect: LEDs off, skipped {}:00", time.hour);
            self.hourly.skip(time.hour);
            return;
        }
        if self.overlay.is_blocking() {
            debug!("Hourly effect: overlay running, skipped {}:00", time.hour);
            self.hourly.skip(time.hour);
            return;
        }
        self.hourly.fired(time.hour, now);
        self.start_overlay(host, sink, OverlayKind::Hourly, Rgbw::WHITE, self.effect_mode);
    }

    /// Block triggers, back up the strip, paint, and arm the restore timer.
    fn start_overlay(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        kind: OverlayKind,
        color: Rgbw,
        mode: u8,
    ) {
        self.overlay.set_blocking(true);
        host.delay_ms(SETTLE_DELAY_MS);
        if let Err(e) = self.overlay.backup(&*host) {
            warn!("Overlay {:?} not started: {}", kind, e);
            self.overlay.set_blocking(false);
            return;
        }
        self.apply_effect_settings(host, sink, color, mode);
        self.overlay.schedule_restore(host.now_ms());
        sink.emit(&UsermodEvent::OverlayStarted(kind));
        info!("Overlay {:?} started (mode {})", kind, mode);
    }

    fn apply_effect_settings(
        &mut self,
        host: &mut impl UsermodHost,
        sink: &mut impl EventSink,
        color: Rgbw,
        mode: u8,
    ) {
        let held = core::mem::replace(&mut self.internal_state_change, true);
        self.overlay.paint(host, color, mode);
        self.notify_power_gate(sink);
        host.notify_state_changed();
        self.set_leds_on(host, sink, true);
        self.internal_state_change = held;
    }

    fn finish_overlay(&mut self, host: &mut impl UsermodHost, sink: &mut impl EventSink) {
        let held = core::mem::replace(&mut self.internal_state_change, true);
        match self.overlay.restore(host) {
            Ok(bri) => {
                if bri > 0 {
                    self.last_non_zero_brightness = bri;
                }
                sink.emit(&UsermodEvent::OverlayRestored);
            }
            Err(e) => debug!("Restore cycle: {}", e),
        }
        self.internal_state_change = held;
        self.overlay.finish();

        if !self.state.presence_blocker {
            self.handle_presence_lux_trigger(host, sink);
        }
    }

    fn set_presence(&mut self, sink: &mut impl EventSink, presence: bool) -> bool {
        if presence == self.state.presence {
            return false;
        }
        self.state.presence = presence;
        sink.emit(&UsermodEvent::PresenceChanged(presence));
        info!("Presence -> {}", presence);
        true
    }

    fn set_lux(&mut self, sink: &mut impl EventSink, lux: f32) -> bool {
        if (lux - self.state.lux).abs() < LUX_HYSTERESIS {
            return false;
        }
        self.state.lux = lux;
        sink.emit(&UsermodEvent::LuxChanged(lux));
        debug!("Lux -> {:.1}", lux);
        true
    }

    fn set_night_mode(&mut self, sink: &mut impl EventSink, night: bool) {
        self.state.night_mode = night;
        sink.emit(&UsermodEvent::NightModeChanged(night));
        info!("NightMode -> {}", night);
    }

    fn publish_status(&self, host: &mut impl UsermodHost, control: ControlTopic, value: &str) {
        if !host.is_connected() {
            return;
        }
        let topic = format!("{}/config/Options/{}", host.device_topic(), control.name());
        if !host.publish(&topic, value, true) {
            warn!("Status publish to '{}' failed", topic);
        }
    }

    fn configure_input(&mut self, host: &mut impl UsermodHost) {
        if !self.config.enabled {
            self.input.release(host);
            return;
        }
        if let Err(e) = self
            .input
            .configure(host, self.config.input_pin, self.config.input_active_low)
        {
            debug!("Presence input disabled: {}", e);
        }
    }

    /// Push scalar options into the runtime components.
    fn apply_config(&mut self) {
        self.state.lux_threshold = self.config.lux_threshold;
        self.state.trigger_mode = self.config.trigger_mode;
        if !self.schedule.set_hours(
            i32::from(self.config.night_mode_on),
            i32::from(self.config.night_mode_off),
        ) {
            self.config.night_mode_on = self.schedule.on_hour();
            self.config.night_mode_off = self.schedule.off_hour();
        }
        self.lamps = LampGroup::new(&self.config.lamps);
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

/// Illuminance (and optional presence) from a lux payload: JSON with
/// `illuminance` or `lux`, or a bare number.
fn read_lux_payload(payload: &str) -> Result<(f32, Option<bool>), ()> {
    if payload.trim_start().starts_with('{') {
        let doc: Value = serde_json::from_str(payload).map_err(|e| {
            warn!("Lux: {} ({})", CodecError::MalformedJson, e);
        })?;
        let lux = doc
            .get("illuminance")
            .or_else(|| doc.get("lux"))
            .and_then(Value::as_f64)
            .ok_or_else(|| warn!("Lux: no illuminance/lux field"))?;
        let presence = doc.get("presence").and_then(Value::as_bool);
        Ok((lux as f32, presence))
    } else {
        parse_leading_f32(payload)
            .map(|lux| (lux, None))
            .ok_or_else(|| warn!("Lux: non-numeric payload '{}'", payload))
    }
}

/// Read one sensor source. A `<override_key>` object wins over the stored
/// string. Returns `false` when the stored value is missing or rejected.
fn read_source(
    obj: &Map<String, Value>,
    key: &str,
    override_key: &str,
    max_topic_len: usize,
    target: &mut SensorSource,
) -> bool {
    let stored = obj.get(key).and_then(Value::as_str);

    if let Some(doc) = obj.get(override_key).filter(|v| v.is_object()) {
        match parse_sensor_config_value(doc) {
            Ok(cfg) => {
                *target = SensorSource::Advanced(cfg);
                return stored.is_some();
            }
            Err(e) => warn!("Config: '{}' ignored ({})", override_key, e),
        }
    }

    let Some(stored) = stored else {
        return false;
    };
    match SensorSource::decode(stored, max_topic_len) {
        Ok(source) => {
            *target = source;
            true
        }
        Err(CodecError::TopicTooLong) => {
            warn!("Config: '{}' exceeds {} chars, keeping previous", key, max_topic_len);
            false
        }
        Err(e) => {
            warn!("Config: '{}' unusable ({}), cleared", key, e);
            *target = SensorSource::default();
            true
        }
    }
}

fn source_kind(source: &SensorSource) -> &'static str {
    match source {
        SensorSource::Advanced(_) => "advanced",
        SensorSource::Simple(s) if s.is_empty() => "off",
        SensorSource::Simple(_) => "simple",
    }
}
