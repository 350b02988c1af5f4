// File: relaybot-common/src/models/filter.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use crate::Error;
use crate::models::id::RecordId;
use crate::models::platform::Platform;
use crate::regex_literal::{self, RegexOptions};

pub type FilterId = RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterType {
    Blacklist,
    Whitelist,
    #[serde(rename = "Opt-out")]
    OptOut,
    Block,
    Unping,
    Unmention,
    Cooldown,
    Flags,
    #[serde(rename = "Online-only")]
    OnlineOnly,
    #[serde(rename = "Offline-only")]
    OfflineOnly,
    Arguments,
    #[serde(rename = "Reminder-prevention")]
    ReminderPrevention,
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterType::Blacklist => "Blacklist",
            FilterType::Whitelist => "Whitelist",
            FilterType::OptOut => "Opt-out",
            FilterType::Block => "Block",
            FilterType::Unping => "Unping",
            FilterType::Unmention => "Unmention",
            FilterType::Cooldown => "Cooldown",
            FilterType::Flags => "Flags",
            FilterType::OnlineOnly => "Online-only",
            FilterType::OfflineOnly => "Offline-only",
            FilterType::Arguments => "Arguments",
            FilterType::ReminderPrevention => "Reminder-prevention",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FilterType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Blacklist" => Ok(FilterType::Blacklist),
            "Whitelist" => Ok(FilterType::Whitelist),
            "Opt-out" => Ok(FilterType::OptOut),
            "Block" => Ok(FilterType::Block),
            "Unping" => Ok(FilterType::Unping),
            "Unmention" => Ok(FilterType::Unmention),
            "Cooldown" => Ok(FilterType::Cooldown),
            "Flags" => Ok(FilterType::Flags),
            "Online-only" => Ok(FilterType::OnlineOnly),
            "Offline-only" => Ok(FilterType::OfflineOnly),
            "Arguments" => Ok(FilterType::Arguments),
            "Reminder-prevention" => Ok(FilterType::ReminderPrevention),
            _ => Err(format!("Unknown filter type: {}", s)),
        }
    }
}

/// How a denying filter phrases its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FilterResponse {
    /// Deny silently.
    #[default]
    None,
    /// Reply is generated from the filter's scope.
    Auto,
    /// Reply is the filter's stored reason.
    Reason,
}

impl fmt::Display for FilterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterResponse::None => "None",
            FilterResponse::Auto => "Auto",
            FilterResponse::Reason => "Reason",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FilterResponse {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(FilterResponse::None),
            "Auto" => Ok(FilterResponse::Auto),
            "Reason" => Ok(FilterResponse::Reason),
            _ => Err(format!("Unknown filter response: {}", s)),
        }
    }
}

/// Payload of a `Cooldown` filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CooldownModifier {
    Multiplier(f64),
    /// Replaces the cooldown. With `respect` set, only when that shortens it.
    Override { length: u64, respect: bool },
}

impl CooldownModifier {
    pub fn apply(&self, cooldown: u64) -> u64 {
        match *self {
            CooldownModifier::Multiplier(m) => (cooldown as f64 * m).round().max(0.0) as u64,
            CooldownModifier::Override { length, respect: true } => length.min(cooldown),
            CooldownModifier::Override { length, respect: false } => length,
        }
    }
}

/// Which positional arguments an argument matcher looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentPosition {
    Index(usize),
    /// Inclusive on both ends; `end: None` runs to the last argument.
    Range { start: usize, end: Option<usize> },
}

impl ArgumentPosition {
    pub fn covers(&self, index: usize) -> bool {
        match *self {
            ArgumentPosition::Index(i) => i == index,
            ArgumentPosition::Range { start, end } => index >= start && end.is_none_or(|e| index <= e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ArgumentTest {
    Exact(String),
    Pattern(Regex),
}

impl ArgumentTest {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            ArgumentTest::Exact(s) => s == value,
            ArgumentTest::Pattern(re) => re.is_match(value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentMatcher {
    pub position: ArgumentPosition,
    pub test: ArgumentTest,
}

impl ArgumentMatcher {
    pub fn matches(&self, args: &[String]) -> bool {
        args.iter()
            .enumerate()
            .any(|(i, arg)| self.position.covers(i) && self.test.matches(arg))
    }
}

#[derive(Debug, Deserialize)]
struct RawArgumentMatcher {
    index: Option<usize>,
    range: Option<(usize, Option<usize>)>,
    string: Option<String>,
    regex: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArguments {
    Wrapped { args: Vec<RawArgumentMatcher> },
    Bare(Vec<RawArgumentMatcher>),
}

#[derive(Debug, Deserialize)]
struct RawCooldown {
    multiplier: Option<f64>,
    #[serde(rename = "override")]
    override_length: Option<u64>,
    respect: Option<bool>,
}

/// Type-specific filter payload, parsed from the stored JSON once at load time.
#[derive(Debug, Clone, Default)]
pub enum FilterData {
    #[default]
    None,
    Cooldown(CooldownModifier),
    Flags(BTreeMap<String, bool>),
    Arguments(Vec<ArgumentMatcher>),
}

impl FilterData {
    pub fn parse(filter_type: FilterType, raw: Option<&Value>) -> Result<Self, Error> {
        let Some(raw) = raw.filter(|v| !v.is_null()) else {
            return match filter_type {
                FilterType::Cooldown | FilterType::Arguments => {
                    Err(Error::Parse(format!("{} filter requires data", filter_type)))
                }
                _ => Ok(FilterData::None),
            };
        };

        match filter_type {
            FilterType::Cooldown => {
                let c: RawCooldown = serde_json::from_value(raw.clone())?;
                if let Some(m) = c.multiplier {
                    if !m.is_finite() || m < 0.0 {
                        return Err(Error::Parse(format!("Invalid cooldown multiplier {}", m)));
                    }
                    Ok(FilterData::Cooldown(CooldownModifier::Multiplier(m)))
                } else if let Some(length) = c.override_length {
                    Ok(FilterData::Cooldown(CooldownModifier::Override {
                        length,
                        respect: c.respect.unwrap_or(true),
                    }))
                } else {
                    Err(Error::Parse("Cooldown filter data has neither multiplier nor override".into()))
                }
            }
            FilterType::Flags => {
                let flags: BTreeMap<String, bool> = serde_json::from_value(raw.clone())?;
                Ok(FilterData::Flags(flags))
            }
            FilterType::Arguments => {
                let raw_list = match serde_json::from_value::<RawArguments>(raw.clone())? {
                    RawArguments::Wrapped { args } => args,
                    RawArguments::Bare(args) => args,
                };
                let mut matchers = Vec::with_capacity(raw_list.len());
                for m in raw_list {
                    if let Some(matcher) = compile_argument_matcher(m)? {
                        matchers.push(matcher);
                    }
                }
                Ok(FilterData::Arguments(matchers))
            }
            _ => Ok(FilterData::None),
        }
    }
}

fn compile_argument_matcher(raw: RawArgumentMatcher) -> Result<Option<ArgumentMatcher>, Error> {
    let position = match (raw.index, raw.range) {
        (Some(_), Some(_)) => {
            warn!("Argument matcher sets both index and range; skipping it");
            return Ok(None);
        }
        (Some(i), None) => ArgumentPosition::Index(i),
        (None, Some((start, end))) => ArgumentPosition::Range { start, end },
        (None, None) => {
            warn!("Argument matcher sets neither index nor range; skipping it");
            return Ok(None);
        }
    };

    let test = match (raw.string, raw.regex) {
        (Some(s), None) => ArgumentTest::Exact(s),
        (None, Some(r)) => ArgumentTest::Pattern(regex_literal::compile(&r, &RegexOptions::default())?),
        _ => {
            warn!("Argument matcher must set exactly one of string/regex; skipping it");
            return Ok(None);
        }
    };

    Ok(Some(ArgumentMatcher { position, test }))
}

/// A filter row exactly as stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FilterRecord {
    pub filter_id: i64,
    pub filter_type: String,
    pub user_id: Option<i64>,
    pub channel_id: Option<i64>,
    pub command: Option<String>,
    pub invocation: Option<String>,
    pub platform: Option<String>,
    pub data: Option<Value>,
    pub response: String,
    pub reason: Option<String>,
    pub active: bool,
    pub blocked_user_id: Option<i64>,
    pub issued_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a filter; IDs and timestamps are assigned on insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFilter {
    pub filter_type: Option<FilterType>,
    pub user: Option<i64>,
    pub channel: Option<i64>,
    pub command: Option<String>,
    pub invocation: Option<String>,
    pub platform: Option<Platform>,
    pub data: Option<Value>,
    pub response: FilterResponse,
    pub reason: Option<String>,
    pub blocked_user: Option<i64>,
    pub issued_by: Option<i64>,
}

/// A policy rule restricting or modifying command behaviour within a scope.
/// `None` in any scoping field is a wildcard.
#[derive(Debug, Clone)]
pub struct Filter {
    pub id: FilterId,
    pub filter_type: FilterType,
    pub user: Option<i64>,
    pub channel: Option<i64>,
    pub command: Option<String>,
    pub invocation: Option<String>,
    pub platform: Option<Platform>,
    pub data: FilterData,
    pub raw_data: Option<Value>,
    pub response: FilterResponse,
    pub reason: Option<String>,
    pub active: bool,
    pub blocked_user: Option<i64>,
    pub issued_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Filter {
    pub const PRIORITY_USER: u8 = 0b10000;
    pub const PRIORITY_CHANNEL: u8 = 0b01000;
    pub const PRIORITY_INVOCATION: u8 = 0b00100;
    pub const PRIORITY_COMMAND: u8 = 0b00010;
    pub const PRIORITY_PLATFORM: u8 = 0b00001;

    /// Bitmask of the scoping fields that are set. Higher means more specific.
    pub fn priority(&self) -> u8 {
        let mut p = 0;
        if self.user.is_some() {
            p |= Self::PRIORITY_USER;
        }
        if self.channel.is_some() {
            p |= Self::PRIORITY_CHANNEL;
        }
        if self.invocation.is_some() {
            p |= Self::PRIORITY_INVOCATION;
        }
        if self.command.is_some() {
            p |= Self::PRIORITY_COMMAND;
        }
        if self.platform.is_some() {
            p |= Self::PRIORITY_PLATFORM;
        }
        p
    }

    pub fn from_record(record: FilterRecord) -> Result<Self, Error> {
        let filter_type: FilterType = record.filter_type.parse()?;
        let platform = record.platform.as_deref().map(str::parse::<Platform>).transpose()?;
        let data = FilterData::parse(filter_type, record.data.as_ref())?;

        Ok(Self {
            id: FilterId::Persisted(record.filter_id),
            filter_type,
            user: record.user_id,
            channel: record.channel_id,
            command: record.command,
            invocation: record.invocation,
            platform,
            data,
            raw_data: record.data,
            response: record.response.parse()?,
            reason: record.reason,
            active: record.active,
            blocked_user: record.blocked_user_id,
            issued_by: record.issued_by,
            created_at: record.created_at,
        })
    }

    /// Builds an in-memory filter from creation data under the given id.
    pub fn from_new(id: FilterId, new: NewFilter) -> Result<Self, Error> {
        let filter_type = new
            .filter_type
            .ok_or_else(|| Error::Parse("Filter type is required".into()))?;
        let data = FilterData::parse(filter_type, new.data.as_ref())?;

        Ok(Self {
            id,
            filter_type,
            user: new.user,
            channel: new.channel,
            command: new.command,
            invocation: new.invocation,
            platform: new.platform,
            data,
            raw_data: new.data,
            response: new.response,
            reason: new.reason,
            active: true,
            blocked_user: new.blocked_user,
            issued_by: new.issued_by,
            created_at: Utc::now(),
        })
    }

    pub fn cooldown_modifier(&self) -> Option<CooldownModifier> {
        match &self.data {
            FilterData::Cooldown(m) => Some(*m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(filter_type: FilterType) -> Filter {
        Filter::from_new(
            FilterId::Ephemeral(1),
            NewFilter { filter_type: Some(filter_type), ..NewFilter::default() },
        )
        .unwrap()
    }

    #[test]
    fn test_priority_counts_scoping_fields() {
        let mut f = filter(FilterType::Blacklist);
        assert_eq!(f.priority(), 0);
        f.command = Some("ping".into());
        let command_only = f.priority();
        f.user = Some(5);
        assert!(f.priority() > command_only);
        assert_eq!(f.priority(), Filter::PRIORITY_USER | Filter::PRIORITY_COMMAND);
    }

    #[test]
    fn test_cooldown_modifier_application() {
        assert_eq!(CooldownModifier::Multiplier(2.0).apply(5000), 10000);
        assert_eq!(CooldownModifier::Multiplier(0.5).apply(5001), 2501);
        let respectful = CooldownModifier::Override { length: 1000, respect: true };
        assert_eq!(respectful.apply(5000), 1000);
        assert_eq!(respectful.apply(500), 500);
        let forced = CooldownModifier::Override { length: 60000, respect: false };
        assert_eq!(forced.apply(5000), 60000);
    }

    #[test]
    fn test_cooldown_data_parsing() {
        let data = FilterData::parse(FilterType::Cooldown, Some(&json!({ "override": 100 }))).unwrap();
        assert!(matches!(data, FilterData::Cooldown(CooldownModifier::Override { length: 100, respect: true })));
        assert!(FilterData::parse(FilterType::Cooldown, None).is_err());
        assert!(FilterData::parse(FilterType::Cooldown, Some(&json!({}))).is_err());
    }

    #[test]
    fn test_argument_matchers() {
        let data = FilterData::parse(FilterType::Arguments, Some(&json!({
            "args": [
                { "index": 0, "string": "secret" },
                { "range": [2, null], "regex": "/^bad/i" },
                { "index": 1, "range": [1, 3], "string": "ambiguous" }
            ]
        }))).unwrap();

        let FilterData::Arguments(matchers) = data else { panic!("expected arguments data") };
        assert_eq!(matchers.len(), 2, "ambiguous matcher is skipped");

        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(matchers[0].matches(&args(&["secret"])));
        assert!(!matchers[0].matches(&args(&["x", "secret"])));
        assert!(matchers[1].matches(&args(&["a", "b", "c", "BADGER"])));
        assert!(!matchers[1].matches(&args(&["a", "badger"])));
    }

    #[test]
    fn test_from_record() {
        let record = FilterRecord {
            filter_id: 12,
            filter_type: "Opt-out".into(),
            user_id: Some(3),
            channel_id: None,
            command: Some("remind".into()),
            invocation: None,
            platform: Some("twitch".into()),
            data: None,
            response: "Auto".into(),
            reason: None,
            active: true,
            blocked_user_id: None,
            issued_by: Some(3),
            created_at: Utc::now(),
        };
        let f = Filter::from_record(record).unwrap();
        assert_eq!(f.id, FilterId::Persisted(12));
        assert_eq!(f.filter_type, FilterType::OptOut);
        assert_eq!(f.platform, Some(Platform::Twitch));
        assert_eq!(f.response, FilterResponse::Auto);
    }
}
