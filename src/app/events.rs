//! Outbound usermod events.
//!
//! The [`HourEffect`](super::service::HourEffect) service emits these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters decide what to do
//! with them: log to serial, forward to a dashboard, record in a test.

/// Which trigger started an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// Top-of-hour flash.
    Hourly,
    /// A print job finished.
    JobFinished,
}

/// Structured events emitted by the usermod.
#[derive(Debug, Clone, PartialEq)]
pub enum UsermodEvent {
    /// Setup finished (carries whether the usermod is enabled).
    Started { enabled: bool },
    /// Config tree was read.
    ConfigLoaded { complete: bool },

    PresenceChanged(bool),
    LuxChanged(f32),
    BlockerChanged(bool),
    NightModeChanged(bool),
    NotHomeChanged(bool),
    /// Effect mode for the hourly flash was changed remotely.
    EffectModeChanged(u8),

    /// The usermod switched the LEDs.
    LedsSwitched { on: bool },
    /// Power gate sent to co-resident modules.
    PowerGate { disabled: bool },

    OverlayStarted(OverlayKind),
    OverlayRestored,
}
