// File: relaybot-common/src/models/platform.rs

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Chat platforms a message can arrive from.
/// Stored as lowercase TEXT, the same spelling `Display` produces.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Discord,
    Cytube,
    Irc,
    Console,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Twitch => write!(f, "twitch"),
            Platform::Discord => write!(f, "discord"),
            Platform::Cytube => write!(f, "cytube"),
            Platform::Irc => write!(f, "irc"),
            Platform::Console => write!(f, "console"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitch" => Ok(Platform::Twitch),
            "discord" => Ok(Platform::Discord),
            "cytube" => Ok(Platform::Cytube),
            "irc" => Ok(Platform::Irc),
            "console" => Ok(Platform::Console),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trips_through_display() {
        for p in [Platform::Twitch, Platform::Discord, Platform::Cytube, Platform::Irc, Platform::Console] {
            assert_eq!(p.to_string().parse::<Platform>(), Ok(p));
        }
        assert!("myspace".parse::<Platform>().is_err());
    }
}
