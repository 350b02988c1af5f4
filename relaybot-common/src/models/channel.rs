use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::models::platform::Platform;

/// How the bot behaves in a channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    Inactive,
    #[serde(rename = "Last seen")]
    LastSeen,
    Read,
    Write,
    #[serde(rename = "VIP")]
    Vip,
    Moderator,
}

impl ChannelMode {
    /// Mode name as used in dispatch failure reasons, e.g. `channel-read`.
    pub fn reason_suffix(&self) -> &'static str {
        match self {
            ChannelMode::Inactive => "inactive",
            ChannelMode::LastSeen => "last-seen",
            ChannelMode::Read => "read",
            ChannelMode::Write => "write",
            ChannelMode::Vip => "vip",
            ChannelMode::Moderator => "moderator",
        }
    }

    /// Whether commands may be run at all in a channel with this mode.
    pub fn accepts_commands(&self) -> bool {
        !matches!(self, ChannelMode::Inactive | ChannelMode::Read)
    }
}

impl FromStr for ChannelMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Inactive" => Ok(ChannelMode::Inactive),
            "Last seen" => Ok(ChannelMode::LastSeen),
            "Read" => Ok(ChannelMode::Read),
            "Write" => Ok(ChannelMode::Write),
            "VIP" => Ok(ChannelMode::Vip),
            "Moderator" => Ok(ChannelMode::Moderator),
            _ => Err(format!("Unknown channel mode: {}", s)),
        }
    }
}

/// What to do with a reply when the channel's moderation API cannot be reached.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum DowntimePolicy {
    /// Send the message unchanged.
    #[default]
    Ignore,
    /// Send the message with a warning glyph in front of it.
    Notify,
    /// Send nothing at all.
    Nothing,
    /// Reply with an explanation of why the message was withheld.
    Refuse,
    /// Send the message privately to the invoking user instead.
    Whisper,
}

impl fmt::Display for DowntimePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DowntimePolicy::Ignore => "Ignore",
            DowntimePolicy::Notify => "Notify",
            DowntimePolicy::Nothing => "Nothing",
            DowntimePolicy::Refuse => "Refuse",
            DowntimePolicy::Whisper => "Whisper",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DowntimePolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ignore" => Ok(DowntimePolicy::Ignore),
            "Notify" => Ok(DowntimePolicy::Notify),
            "Nothing" => Ok(DowntimePolicy::Nothing),
            "Refuse" => Ok(DowntimePolicy::Refuse),
            "Whisper" => Ok(DowntimePolicy::Whisper),
            _ => Err(format!("Unknown banphrase API downtime policy: {}", s)),
        }
    }
}

/// A chat channel on one platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub channel_id: i64,
    pub name: String,
    pub platform: Platform,
    pub mode: ChannelMode,
    /// Whether replies in this channel may start with the invoking user's name.
    pub mention: bool,
    /// Base URL of an external moderation (banphrase) API, if the channel uses one.
    pub banphrase_api_url: Option<String>,
    pub banphrase_api_downtime: Option<DowntimePolicy>,
}

impl Channel {
    pub fn new(channel_id: i64, name: &str, platform: Platform) -> Self {
        Self {
            channel_id,
            name: name.to_string(),
            platform,
            mode: ChannelMode::Write,
            mention: true,
            banphrase_api_url: None,
            banphrase_api_downtime: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_inactive_channels_reject_commands() {
        assert!(!ChannelMode::Inactive.accepts_commands());
        assert!(!ChannelMode::Read.accepts_commands());
        assert!(ChannelMode::Write.accepts_commands());
        assert!(ChannelMode::Moderator.accepts_commands());
        assert_eq!(ChannelMode::Read.reason_suffix(), "read");
    }
}
