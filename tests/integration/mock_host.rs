//! Mock host for integration tests.
//!
//! Implements every port of the usermod and records what the usermod did
//! with it: brightness writes, region paints, published messages,
//! subscriptions and pin claims. No LED runtime required.

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin};
use hour_effect::app::events::UsermodEvent;
use hour_effect::app::ports::{
    Clock, EventSink, GpioPort, LedStrip, PowerGateSink, Region, Transport,
};
use hour_effect::app::service::HourEffect;
use hour_effect::config::UsermodConfig;
use hour_effect::schedule::LocalTime;

// ── Fixtures ──────────────────────────────────────────────────

/// Default options with the usermod switched on.
pub fn enabled_config() -> UsermodConfig {
    UsermodConfig {
        enabled: true,
        ..UsermodConfig::default()
    }
}

/// Build and set up a usermod against a fresh mock host.
#[allow(dead_code)]
pub fn make_usermod(config: UsermodConfig) -> (HourEffect, MockHost, RecordingSink) {
    make_usermod_with(config, MockHost::new())
}

/// Like [`make_usermod`] with a prepared host.
pub fn make_usermod_with(
    config: UsermodConfig,
    mut host: MockHost,
) -> (HourEffect, MockHost, RecordingSink) {
    let mut app = HourEffect::new(config);
    let mut sink = RecordingSink::new();
    app.setup(&mut host, &mut sink);
    (app, host, sink)
}

// ── Region ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MockRegion {
    pub active: bool,
    pub selected: bool,
    pub mode: u8,
    pub speed: u8,
    pub intensity: u8,
    pub palette: u8,
    pub colors: [u32; 3],
    pub on: bool,
    pub opacity: u8,
    pub custom: [u8; 3],
    pub writes: usize,
}

impl MockRegion {
    pub fn new(mode: u8, color: u32) -> Self {
        Self {
            active: true,
            selected: true,
            mode,
            speed: 100,
            intensity: 90,
            palette: 3,
            colors: [color, 0x0000_00ff, 0],
            on: true,
            opacity: 255,
            custom: [1, 2, 3],
            writes: 0,
        }
    }
}

impl Region for MockRegion {
    fn is_active(&self) -> bool {
        self.active
    }
    fn is_selected(&self) -> bool {
        self.selected
    }
    fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }
    fn mode(&self) -> u8 {
        self.mode
    }
    fn set_mode(&mut self, mode: u8) {
        self.writes += 1;
        self.mode = mode;
    }
    fn speed(&self) -> u8 {
        self.speed
    }
    fn set_speed(&mut self, speed: u8) {
        self.writes += 1;
        self.speed = speed;
    }
    fn intensity(&self) -> u8 {
        self.intensity
    }
    fn set_intensity(&mut self, intensity: u8) {
        self.writes += 1;
        self.intensity = intensity;
    }
    fn palette(&self) -> u8 {
        self.palette
    }
    fn set_palette(&mut self, palette: u8) {
        self.writes += 1;
        self.palette = palette;
    }
    fn color(&self, slot: usize) -> u32 {
        self.colors.get(slot).copied().unwrap_or(0)
    }
    fn set_color(&mut self, slot: usize, color: u32) {
        self.writes += 1;
        if let Some(c) = self.colors.get_mut(slot) {
            *c = color;
        }
    }
    fn is_on(&self) -> bool {
        self.on
    }
    fn set_on(&mut self, on: bool) {
        self.on = on;
    }
    fn opacity(&self) -> u8 {
        self.opacity
    }
    fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
    }
    fn custom(&self, slot: usize) -> u8 {
        self.custom.get(slot).copied().unwrap_or(0)
    }
    fn set_custom(&mut self, slot: usize, value: u8) {
        if let Some(c) = self.custom.get_mut(slot) {
            *c = value;
        }
    }
}

// ── Input pin ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockPin {
    pub high: bool,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.high)
    }
    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.high)
    }
}

// ── MockHost ──────────────────────────────────────────────────

pub struct MockHost {
    pub regions: Vec<MockRegion>,
    pub main_region: usize,
    pub brightness: u8,
    pub last_brightness: u8,
    pub primary: [u8; 4],
    pub secondary: [u8; 4],
    /// Global effect speed, intensity, palette.
    pub effect: (u8, u8, u8),
    pub brightness_writes: Vec<u8>,
    pub state_notifications: usize,

    pub now_ms: u32,
    pub time: LocalTime,
    pub delays: Vec<u32>,
    pub sync_requests: usize,

    pub connected: bool,
    pub device_topic: String,
    pub group_topic: String,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, String, bool)>,

    pub allocated: Vec<u8>,
    pub refused_pins: Vec<u8>,
    pub pin: MockPin,
}

#[allow(dead_code)]
impl MockHost {
    pub fn new() -> Self {
        Self {
            regions: vec![MockRegion::new(9, 0x00ff_0000), MockRegion::new(12, 0x0000_ff00)],
            main_region: 0,
            brightness: 0,
            last_brightness: 0,
            primary: [255, 160, 0, 0],
            secondary: [0, 0, 0, 0],
            effect: (150, 60, 11),
            brightness_writes: Vec::new(),
            state_notifications: 0,
            now_ms: 1000,
            time: LocalTime::at(12, 30, 0),
            delays: Vec::new(),
            sync_requests: 0,
            connected: true,
            device_topic: "wled/kitchen".into(),
            group_topic: "wled/all".into(),
            subscriptions: Vec::new(),
            published: Vec::new(),
            allocated: Vec::new(),
            refused_pins: Vec::new(),
            pin: MockPin::default(),
        }
    }

    pub fn region_writes(&self) -> usize {
        self.regions.iter().map(|r| r.writes).sum()
    }

    /// Everything published to `topic`.
    pub fn published_to(&self, topic: &str) -> Vec<&str> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, p, _)| p.as_str())
            .collect()
    }

    pub fn clear_records(&mut self) {
        self.brightness_writes.clear();
        self.published.clear();
        self.state_notifications = 0;
        for r in &mut self.regions {
            r.writes = 0;
        }
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LedStrip for MockHost {
    type Region = MockRegion;

    fn region_count(&self) -> usize {
        self.regions.len()
    }
    fn region(&self, index: usize) -> Option<&MockRegion> {
        self.regions.get(index)
    }
    fn region_mut(&mut self, index: usize) -> Option<&mut MockRegion> {
        self.regions.get_mut(index)
    }
    fn main_region_index(&self) -> usize {
        self.main_region
    }
    fn brightness(&self) -> u8 {
        self.brightness
    }
    fn set_brightness(&mut self, brightness: u8) {
        self.brightness_writes.push(brightness);
        self.brightness = brightness;
    }
    fn apply_brightness(&mut self) {}
    fn last_brightness(&self) -> u8 {
        self.last_brightness
    }
    fn set_last_brightness(&mut self, brightness: u8) {
        self.last_brightness = brightness;
    }
    fn primary_color(&self) -> [u8; 4] {
        self.primary
    }
    fn set_primary_color(&mut self, color: [u8; 4]) {
        self.primary = color;
    }
    fn secondary_color(&self) -> [u8; 4] {
        self.secondary
    }
    fn set_secondary_color(&mut self, color: [u8; 4]) {
        self.secondary = color;
    }
    fn effect_speed(&self) -> u8 {
        self.effect.0
    }
    fn effect_intensity(&self) -> u8 {
        self.effect.1
    }
    fn effect_palette(&self) -> u8 {
        self.effect.2
    }
    fn notify_state_changed(&mut self) {
        self.state_notifications += 1;
    }
}

impl Clock for MockHost {
    fn now_ms(&self) -> u32 {
        self.now_ms
    }
    fn local_time(&self) -> LocalTime {
        self.time
    }
    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
    fn request_time_sync(&mut self) {
        self.sync_requests += 1;
    }
}

impl Transport for MockHost {
    fn is_connected(&self) -> bool {
        self.connected
    }
    fn device_topic(&self) -> &str {
        &self.device_topic
    }
    fn group_topic(&self) -> &str {
        &self.group_topic
    }
    fn subscribe(&mut self, topic: &str) {
        self.subscriptions.push(topic.to_string());
    }
    fn publish(&mut self, topic: &str, payload: &str, retain: bool) -> bool {
        self.published
            .push((topic.to_string(), payload.to_string(), retain));
        true
    }
}

impl GpioPort for MockHost {
    type Input = MockPin;

    fn allocate(&mut self, pin: u8, _output: bool, _owner: &'static str) -> bool {
        if self.refused_pins.contains(&pin) || self.allocated.contains(&pin) {
            return false;
        }
        self.allocated.push(pin);
        true
    }
    fn deallocate(&mut self, pin: u8, _owner: &'static str) {
        self.allocated.retain(|p| *p != pin);
    }
    fn is_allocated(&self, pin: u8, _owner: &'static str) -> bool {
        self.allocated.contains(&pin)
    }
    fn input(&mut self, pin: u8) -> Option<&mut MockPin> {
        if self.allocated.contains(&pin) {
            Some(&mut self.pin)
        } else {
            None
        }
    }
}

// ── Event sink ────────────────────────────────────────────────

/// Event sink that records every emitted event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<UsermodEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, event: &UsermodEvent) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &UsermodEvent) {
        self.events.push(event.clone());
    }
}

// ── Power gate ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct GateLog {
    pub calls: Vec<bool>,
    pub led_enabled: Option<bool>,
}

/// Power gate sink sharing its log with the test.
pub struct MockGate(pub Rc<RefCell<GateLog>>);

#[allow(dead_code)]
impl MockGate {
    pub fn new() -> (Self, Rc<RefCell<GateLog>>) {
        let log = Rc::new(RefCell::new(GateLog::default()));
        (Self(Rc::clone(&log)), log)
    }
}

impl PowerGateSink for MockGate {
    fn set_output_disabled(&mut self, disabled: bool) {
        self.0.borrow_mut().calls.push(disabled);
    }
    fn led_output_enabled(&self) -> Option<bool> {
        self.0.borrow().led_enabled
    }
}
