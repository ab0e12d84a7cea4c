//! Inbound control topics.
//!
//! Control messages arrive under the host's group topic. They are matched by
//! suffix so that any group prefix works.

/// Remote controls the usermod listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTopic {
    /// Payload `true` enters NightMode, anything else leaves it.
    NightMode,
    /// Payload `true` marks the home as empty.
    NotHome,
    /// Payload is the effect mode used by the hourly flash.
    NewEffect,
    /// Payload `true` reports a finished print job.
    JobFinished,
}

impl ControlTopic {
    pub const ALL: [Self; 4] = [Self::NightMode, Self::NotHome, Self::NewEffect, Self::JobFinished];

    /// Topic name below the group topic, and the status key it is
    /// reported under.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NightMode => "NightMode",
            Self::NotHome => "NotHome",
            Self::NewEffect => "NewEffect",
            // Wire name as published by existing printer automations.
            Self::JobFinished => "3dPrinterFinshed",
        }
    }

    /// Match an inbound topic against the control names.
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| {
            let name = c.name();
            topic == name
                || topic
                    .strip_suffix(name)
                    .is_some_and(|prefix| prefix.ends_with('/'))
        })
    }

    /// `<group>/<name>`.
    pub fn subscription(self, group_topic: &str) -> String {
        format!("{}/{}", group_topic, self.name())
    }
}
