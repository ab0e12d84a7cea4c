//! Unified error types for the usermod.
//!
//! A single `Error` enum that every subsystem converts into. Nothing in the
//! usermod panics on bad input: every failure degrades to "no state change"
//! plus a log line, and these types carry the reason to that log line.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level usermod error
// ---------------------------------------------------------------------------

/// Every fallible operation in the usermod funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A structured sensor payload or config document was malformed.
    Codec(CodecError),
    /// A configuration value was out of range and was rejected.
    Config(&'static str),
    /// A hardware resource (pin) could not be claimed.
    Resource(ResourceError),
    /// Backup / apply / restore protocol violation.
    Overlay(OverlayError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Resource(e) => write!(f, "resource: {e}"),
            Self::Overlay(e) => write!(f, "overlay: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Payload was not valid JSON.
    MalformedJson,
    /// Document exceeds the accepted size.
    TooLarge,
    /// JSON parsed, but no usable sensor entry was present.
    NoSensors,
    /// A plain topic string exceeded its length limit.
    TopicTooLong,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson => write!(f, "malformed JSON"),
            Self::TooLarge => write!(f, "document too large"),
            Self::NoSensors => write!(f, "no valid sensors"),
            Self::TopicTooLong => write!(f, "topic too long"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Resource errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    /// The pin registry refused the allocation.
    PinUnavailable(u8),
    /// The pin was allocated but could not be read.
    PinReadFailed(u8),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinUnavailable(pin) => write!(f, "pin {pin} unavailable"),
            Self::PinReadFailed(pin) => write!(f, "pin {pin} read failed"),
        }
    }
}

impl From<ResourceError> for Error {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}

// ---------------------------------------------------------------------------
// Overlay errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayError {
    /// Backup requested while an earlier backup is still held.
    NotIdle,
    /// Restore requested with nothing backed up.
    NothingToRestore,
    /// The backup table was lost between backup and restore.
    BackupMissing,
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotIdle => write!(f, "backup already held"),
            Self::NothingToRestore => write!(f, "nothing to restore"),
            Self::BackupMissing => write!(f, "backup table missing"),
        }
    }
}

impl From<OverlayError> for Error {
    fn from(e: OverlayError) -> Self {
        Self::Overlay(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Usermod-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
