//! A chat platform backed by the process's own stdin/stdout, plus the
//! in-memory user and property stores it runs with.

use std::sync::atomic::{AtomicI64, Ordering};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use relaybot_common::error::Error;
use relaybot_common::models::{Channel, Platform, User};
use relaybot_common::traits::chat_traits::{ChatPlatform, DataPropertyStore, UserDirectory};

pub const CONSOLE_CHANNEL_ID: i64 = 1;

pub struct ConsolePlatform {
    owner: String,
}

impl ConsolePlatform {
    pub fn new(owner: &str) -> Self {
        Self { owner: owner.to_lowercase() }
    }

    pub fn channel(&self) -> Channel {
        Channel::new(CONSOLE_CHANNEL_ID, "console", Platform::Console)
    }
}

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    fn platform(&self) -> Platform {
        Platform::Console
    }

    async fn pm(&self, text: &str, user: &User) -> Result<(), Error> {
        println!("[whisper -> {}] {}", user.name, text);
        Ok(())
    }

    fn create_user_mention(&self, user: &User) -> String {
        format!("@{}", user.name)
    }

    async fn is_user_channel_owner(&self, _channel: &Channel, user: &User) -> Result<bool, Error> {
        Ok(user.name == self.owner)
    }
}

/// Users created on first sight, keyed by lowercase name.
#[derive(Default)]
pub struct MemoryUserDirectory {
    by_name: DashMap<String, User>,
    next_id: AtomicI64,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self { by_name: DashMap::new(), next_id: AtomicI64::new(1) }
    }

    pub fn get_or_create(&self, name: &str) -> User {
        self.by_name
            .entry(name.to_lowercase())
            .or_insert_with(|| User::new(self.next_id.fetch_add(1, Ordering::SeqCst), name))
            .clone()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn get_by_id(&self, user_id: i64) -> Result<Option<User>, Error> {
        Ok(self.by_name.iter().find(|e| e.value().user_id == user_id).map(|e| e.value().clone()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<User>, Error> {
        Ok(self.by_name.get(&name.to_lowercase()).map(|u| u.clone()))
    }
}

#[derive(Default)]
pub struct MemoryPropertyStore {
    channels: DashMap<(i64, String), Value>,
    users: DashMap<(i64, String), Value>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_channel_property(&self, channel_id: i64, name: &str, value: Value) {
        self.channels.insert((channel_id, name.to_string()), value);
    }

    pub fn set_user_property(&self, user_id: i64, name: &str, value: Value) {
        self.users.insert((user_id, name.to_string()), value);
    }
}

#[async_trait]
impl DataPropertyStore for MemoryPropertyStore {
    async fn channel_property(&self, channel: &Channel, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.channels.get(&(channel.channel_id, name.to_string())).map(|v| v.clone()))
    }

    async fn user_property(&self, user: &User, name: &str) -> Result<Option<Value>, Error> {
        Ok(self.users.get(&(user.user_id, name.to_string())).map(|v| v.clone()))
    }
}

/// Splits a console line into `(identifier, args)` if it starts with one of
/// `prefixes`. A bare prefix yields an empty identifier.
pub fn split_command_line(line: &str, prefixes: &[String]) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    let prefix = prefixes.iter().find(|p| line.starts_with(p.as_str()))?;
    let mut words = line[prefix.len()..].split(' ').filter(|w| !w.is_empty()).map(str::to_string);
    if line[prefix.len()..].starts_with(' ') {
        return Some((String::new(), words.collect()));
    }
    let identifier = words.next().unwrap_or_default();
    Some((identifier, words.collect()))
}
