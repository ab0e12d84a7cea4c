//! Inbound message routing: control topics, sensor sources, blocker,
//! subscriptions, lamp mirroring and external changes.

use crate::mock_host::{MockHost, enabled_config, make_usermod, make_usermod_with};

use hour_effect::app::events::UsermodEvent;
use hour_effect::config::UsermodConfig;
use hour_effect::fusion::TriggerMode;
use hour_effect::sensors::codec::SensorSource;
use hour_effect::sensors::{Sensor, SensorConfig};

fn kitchen_dining() -> SensorSource {
    SensorSource::Advanced(
        SensorConfig::new(vec![
            Sensor::new("kitchen", "zigbee/kitchen")
                .with_path("occupancy")
                .with_on_values("true"),
            Sensor::new("dining", "zigbee/dining")
                .with_path("occupancy")
                .with_on_values("true"),
        ])
        .with_logic("kitchen OR dining", ""),
    )
}

// ── Control topics ────────────────────────────────────────────

#[test]
fn new_effect_sets_mode_and_requests_time_sync() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());

    assert!(app.on_message(&mut host, &mut sink, "wled/all/NewEffect", "42 sparkle"));
    assert_eq!(app.effect_mode(), 42);
    assert_eq!(host.sync_requests, 1);
    assert_eq!(sink.count(&UsermodEvent::EffectModeChanged(42)), 1);

    let status = host.published_to("wled/kitchen/config/Options/NewEffect");
    assert_eq!(status, vec!["42 sparkle (1.1.2024 12:30:0)"]);
}

#[test]
fn ignored_while_disconnected_or_disabled() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    host.connected = false;
    assert!(!app.on_message(&mut host, &mut sink, "wled/all/NewEffect", "3"));
    assert_eq!(app.effect_mode(), 0);

    let (mut app, mut host, mut sink) = make_usermod(UsermodConfig::default());
    assert!(!app.on_message(&mut host, &mut sink, "wled/all/NotHome", "true"));
    assert!(!app.state().not_home);
}

#[test]
fn unknown_topic_is_not_handled() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_presence_source(SensorSource::simple("sensor/pir"));
    assert!(!app.on_message(&mut host, &mut sink, "sensor/other", "on"));
}

// ── Presence ──────────────────────────────────────────────────

#[test]
fn advanced_presence_follows_logic() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_presence_source(kitchen_dining());

    assert!(app.on_message(&mut host, &mut sink, "zigbee/dining", r#"{"occupancy":false}"#));
    assert!(!app.state().presence);

    assert!(app.on_message(&mut host, &mut sink, "zigbee/kitchen", r#"{"occupancy":true}"#));
    assert!(app.state().presence);
    assert_eq!(host.brightness, 128);

    // Duplicate delivery: no second change, no second switch.
    assert!(app.on_message(&mut host, &mut sink, "zigbee/kitchen", r#"{"occupancy":true}"#));
    assert_eq!(sink.count(&UsermodEvent::PresenceChanged(true)), 1);
    assert_eq!(host.brightness_writes, vec![128]);

    assert!(app.on_message(&mut host, &mut sink, "zigbee/kitchen", r#"{"occupancy":false}"#));
    assert!(!app.state().presence);
    assert_eq!(host.brightness, 0);
}

#[test]
fn multi_topic_presence_requires_all() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_presence_source(SensorSource::simple("a/motion,b/motion"));

    assert!(app.on_message(&mut host, &mut sink, "home/a/motion", "on"));
    assert!(!app.state().presence);
    assert!(app.on_message(&mut host, &mut sink, "home/b/motion", r#"{"presence":true}"#));
    assert!(app.state().presence);
    assert!(app.on_message(&mut host, &mut sink, "home/a/motion", "off"));
    assert!(!app.state().presence);
}

#[test]
fn simple_presence_json_carries_lux() {
    let config = UsermodConfig {
        trigger_mode: TriggerMode::LuxAndPresenceOffOnPresenceFalse,
        ..enabled_config()
    };
    let (mut app, mut host, mut sink) = make_usermod(config);
    app.set_presence_source(SensorSource::simple("sensor/fp2"));

    assert!(app.on_message(
        &mut host,
        &mut sink,
        "sensor/fp2",
        r#"{"presence":true,"illuminance":12.5}"#
    ));
    assert!(app.state().presence);
    assert!((app.state().lux - 12.5).abs() < f32::EPSILON);
    assert_eq!(host.brightness, 128);
}

#[test]
fn malformed_presence_json_is_rejected() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_presence_source(SensorSource::simple("sensor/fp2"));
    assert!(!app.on_message(&mut host, &mut sink, "sensor/fp2", "{presence:"));
    assert!(!app.state().presence);
}

// ── Lux ───────────────────────────────────────────────────────

#[test]
fn bright_room_switches_off_with_lux_with_off() {
    let config = UsermodConfig {
        trigger_mode: TriggerMode::LuxWithOff,
        lux_threshold: 30,
        ..enabled_config()
    };
    let host = MockHost {
        brightness: 100,
        ..MockHost::new()
    };
    let (mut app, mut host, mut sink) = make_usermod_with(config, host);
    app.set_lux_source(SensorSource::simple("sensor/lux"));

    assert!(app.on_message(&mut host, &mut sink, "sensor/lux", "45"));
    assert_eq!(host.brightness, 0);

    // Below the hysteresis: no change.
    assert!(app.on_message(&mut host, &mut sink, "sensor/lux", "45.3"));
    assert_eq!(sink.count(&UsermodEvent::LuxChanged(45.0)), 1);

    assert!(app.on_message(&mut host, &mut sink, "sensor/lux", r#"{"lux":12}"#));
    assert_eq!(host.brightness, 100);
}

#[test]
fn non_numeric_lux_is_rejected() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_lux_source(SensorSource::simple("sensor/lux"));
    assert!(!app.on_message(&mut host, &mut sink, "sensor/lux", "dark"));
    assert!(!app.on_message(&mut host, &mut sink, "sensor/lux", r#"{"level":3}"#));
}

#[test]
fn advanced_lux_reads_matched_sensor() {
    let config = UsermodConfig {
        trigger_mode: TriggerMode::LuxNoOff,
        ..enabled_config()
    };
    let (mut app, mut host, mut sink) = make_usermod(config);
    app.set_lux_source(SensorSource::Advanced(SensorConfig::new(vec![
        Sensor::new("hall", "zigbee/hall_lux").with_path("illuminance"),
    ])));

    assert!(app.on_message(&mut host, &mut sink, "zigbee/hall_lux", r#"{"illuminance":"18"}"#));
    assert!((app.state().lux - 18.0).abs() < f32::EPSILON);
    assert_eq!(host.brightness, 128);
}

// ── Blocker ───────────────────────────────────────────────────

#[test]
fn blocker_holds_presence_trigger() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_presence_source(SensorSource::simple("sensor/pir"));
    app.set_blocker_source(SensorSource::simple("switch/movie"));

    assert!(app.on_message(&mut host, &mut sink, "switch/movie", "ON"));
    assert!(app.state().presence_blocker);
    assert!(app.on_message(&mut host, &mut sink, "sensor/pir", "on"));
    assert!(app.state().presence);
    assert_eq!(host.brightness, 0);

    // Lifting the blocker does not retrigger by itself.
    assert!(app.on_message(&mut host, &mut sink, "switch/movie", "off"));
    assert!(!app.state().presence_blocker);
    assert_eq!(host.brightness, 0);
}

#[test]
fn advanced_blocker_uses_logic_true() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_blocker_source(SensorSource::Advanced(
        SensorConfig::new(vec![
            Sensor::new("tv", "media/tv").with_on_values("playing"),
            Sensor::new("lamp", "media/lamp").with_on_values("on"),
        ])
        .with_logic("tv and !lamp", ""),
    ));

    assert!(app.on_message(&mut host, &mut sink, "media/tv", "Playing"));
    assert!(app.state().presence_blocker);
    assert!(app.on_message(&mut host, &mut sink, "media/lamp", "on"));
    assert!(!app.state().presence_blocker);
    assert_eq!(sink.count(&UsermodEvent::BlockerChanged(true)), 1);
}

// ── Transport connect ─────────────────────────────────────────

#[test]
fn connect_subscribes_controls_and_sources() {
    let (mut app, mut host, _sink) = make_usermod(enabled_config());
    app.set_presence_source(SensorSource::simple("sensor/pir, sensor/radar"));
    app.set_lux_source(SensorSource::Advanced(SensorConfig::new(vec![Sensor::new(
        "hall",
        "zigbee/hall_lux",
    )])));

    app.on_transport_connected(&mut host, false);
    assert_eq!(
        host.subscriptions,
        vec![
            "wled/all/NightMode",
            "wled/all/NotHome",
            "wled/all/NewEffect",
            "wled/all/3dPrinterFinshed",
            "sensor/pir",
            "sensor/radar",
            "zigbee/hall_lux",
        ]
    );
    assert!(app.overlay().reset_pending());
}

#[test]
fn connect_without_group_topic_subscribes_nothing() {
    let host = MockHost {
        group_topic: String::new(),
        ..MockHost::new()
    };
    let (mut app, mut host, _sink) = make_usermod_with(enabled_config(), host);
    app.on_transport_connected(&mut host, true);
    assert!(host.subscriptions.is_empty());
}

#[test]
fn connect_schedules_reevaluation() {
    let (mut app, mut host, mut sink) = make_usermod(enabled_config());
    app.set_presence_source(SensorSource::simple("sensor/pir"));
    app.set_blocker_source(SensorSource::simple("switch/movie"));
    assert!(app.on_message(&mut host, &mut sink, "switch/movie", "on"));
    assert!(app.on_message(&mut host, &mut sink, "sensor/pir", "on"));
    assert!(app.on_message(&mut host, &mut sink, "switch/movie", "off"));
    assert_eq!(host.brightness, 0);

    app.on_transport_connected(&mut host, false);
    host.now_ms += 10_001;
    app.tick(&mut host, &mut sink);
    assert_eq!(host.brightness, 128);
    assert!(!app.overlay().reset_pending());
}

// ── Lamps & external changes ──────────────────────────────────

#[test]
fn lamps_mirror_usermod_switching() {
    let config = UsermodConfig {
        lamps: "lamp/desk/set,lamp/shelf/set".into(),
        ..enabled_config()
    };
    let (mut app, mut host, mut sink) = make_usermod(config);
    app.set_presence_source(SensorSource::simple("sensor/pir"));

    assert!(app.on_message(&mut host, &mut sink, "sensor/pir", "on"));
    assert_eq!(host.published_to("lamp/desk/set"), vec![r#"{"state":"ON"}"#]);
    assert_eq!(host.published_to("lamp/shelf/set"), vec![r#"{"state":"ON"}"#]);
    assert!(
        host.published
            .iter()
            .filter(|(t, _, _)| t.starts_with("lamp/"))
            .all(|(_, _, retain)| !retain)
    );

    assert!(app.on_message(&mut host, &mut sink, "sensor/pir", "off"));
    assert_eq!(
        host.published_to("lamp/desk/set"),
        vec![r#"{"state":"ON"}"#, r#"{"state":"OFF"}"#]
    );

    // The usermod's own switch is not reported back as external.
    app.on_external_state_change(&mut host);
    assert_eq!(host.published_to("lamp/desk/set").len(), 2);
}

#[test]
fn external_switch_is_mirrored_to_lamps() {
    let config = UsermodConfig {
        lamps: "lamp/desk/set".into(),
        ..enabled_config()
    };
    let (mut app, mut host, _sink) = make_usermod(config);

    host.brightness = 90;
    app.on_external_state_change(&mut host);
    assert_eq!(host.published_to("lamp/desk/set"), vec![r#"{"state":"ON"}"#]);

    // Dimming is not a switch.
    host.brightness = 40;
    app.on_external_state_change(&mut host);
    assert_eq!(host.published_to("lamp/desk/set").len(), 1);

    host.brightness = 0;
    app.on_external_state_change(&mut host);
    assert_eq!(
        host.published_to("lamp/desk/set"),
        vec![r#"{"state":"ON"}"#, r#"{"state":"OFF"}"#]
    );
}

#[test]
fn external_change_ignored_when_disabled() {
    let config = UsermodConfig {
        lamps: "lamp/desk/set".into(),
        ..UsermodConfig::default()
    };
    let (mut app, mut host, _sink) = make_usermod(config);
    host.brightness = 90;
    app.on_external_state_change(&mut host);
    assert!(host.published.is_empty());
}

#[test]
fn presence_input_pin_drives_trigger() {
    let config = UsermodConfig {
        input_pin: 4,
        ..enabled_config()
    };
    let (mut app, mut host, mut sink) = make_usermod(config);
    assert_eq!(app.input_pin(), Some(4));
    assert_eq!(host.allocated, vec![4]);

    host.pin.high = true;
    app.tick(&mut host, &mut sink);
    assert!(app.state().presence);
    assert_eq!(host.brightness, 128);

    host.pin.high = false;
    host.now_ms += 100;
    app.tick(&mut host, &mut sink);
    assert!(!app.state().presence);
    assert_eq!(host.brightness, 0);
}

#[test]
fn refused_input_pin_leaves_feature_off() {
    let config = UsermodConfig {
        input_pin: 4,
        ..enabled_config()
    };
    let host = MockHost {
        refused_pins: vec![4],
        ..MockHost::new()
    };
    let (mut app, mut host, mut sink) = make_usermod_with(config, host);
    assert_eq!(app.input_pin(), None);
    host.pin.high = true;
    app.tick(&mut host, &mut sink);
    assert!(!app.state().presence);
}
