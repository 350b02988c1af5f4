//! Process-local rate limiting.
//!
//! Holds two kinds of inhibitors: cooldowns (channel/user/command scoped, any
//! scope may be a wildcard) and pending guards that stop a user from starting
//! a second command while the first one is still running. Nothing here is
//! persisted.

use std::time::Duration;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;
use crate::config::CooldownConfig;

/// Channel key under which private-message invocations keep their cooldowns.
/// A stored cooldown with no channel still applies here.
pub const PRIVATE_MESSAGE_CHANNEL: i64 = -1;

/// Maps an invocation's channel (`None` for a private message) to the key
/// its cooldowns are stored under.
pub fn channel_key(channel: Option<i64>) -> i64 {
    channel.unwrap_or(PRIVATE_MESSAGE_CHANNEL)
}

#[derive(Debug, Clone)]
pub enum Inhibitor {
    Cooldown {
        channel: Option<i64>,
        user: Option<i64>,
        command: Option<String>,
        expires_at: Instant,
    },
    Pending {
        user: i64,
        description: String,
        expires_at: Instant,
    },
}

impl Inhibitor {
    fn expires_at(&self) -> Instant {
        match self {
            Inhibitor::Cooldown { expires_at, .. } | Inhibitor::Pending { expires_at, .. } => *expires_at,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at() > now
    }

    fn blocks(&self, channel: Option<i64>, user: i64, command: &str, skip_pending: bool, now: Instant) -> bool {
        if !self.is_live(now) {
            return false;
        }
        match self {
            Inhibitor::Cooldown { channel: c, user: u, command: cmd, .. } => {
                c.is_none_or(|c| c == channel_key(channel))
                    && u.is_none_or(|u| u == user)
                    && cmd.as_deref().is_none_or(|cmd| cmd == command)
            }
            Inhibitor::Pending { user: u, .. } => !skip_pending && *u == user,
        }
    }
}

/// Outcome of [`CooldownManager::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Cooldown,
    /// Blocked by the user's own running command; carries its description.
    Pending(String),
}

pub struct CooldownManager {
    inhibitors: Mutex<Vec<Inhibitor>>,
    pending_timeout: Duration,
}

impl CooldownManager {
    pub fn new(config: &CooldownConfig) -> Self {
        Self {
            inhibitors: Mutex::new(Vec::new()),
            pending_timeout: Duration::from_millis(config.pending_timeout_ms),
        }
    }

    /// True if nothing currently inhibits `user` from running `command` in `channel`.
    pub fn check(&self, channel: Option<i64>, user: i64, command: &str, skip_pending: bool) -> bool {
        let now = Instant::now();
        let lock = self.inhibitors.lock();
        !lock.iter().any(|i| i.blocks(channel, user, command, skip_pending, now))
    }

    /// Check and, when admitted, register `pending` in one critical section,
    /// so two concurrent invocations by one user cannot both get through.
    pub fn admit(
        &self,
        channel: Option<i64>,
        user: i64,
        command: &str,
        skip_pending: bool,
        pending: Option<String>,
    ) -> Admission {
        let now = Instant::now();
        let mut lock = self.inhibitors.lock();

        if let Some(blocking) = lock.iter().find(|i| i.blocks(channel, user, command, skip_pending, now)) {
            return match blocking {
                Inhibitor::Pending { description, .. } => Admission::Pending(description.clone()),
                Inhibitor::Cooldown { .. } => {
                    // a pending guard may still exist alongside the cooldown
                    let pending = lock.iter().find_map(|i| match i {
                        Inhibitor::Pending { user: u, description, .. }
                            if !skip_pending && *u == user && i.is_live(now) => Some(description.clone()),
                        _ => None,
                    });
                    pending.map_or(Admission::Cooldown, Admission::Pending)
                }
            };
        }

        if let Some(description) = pending {
            lock.push(Inhibitor::Pending {
                user,
                description,
                expires_at: now + self.pending_timeout,
            });
            Self::prune_locked(&mut lock, now);
        }
        Admission::Admitted
    }

    /// Starts a cooldown. A zero length is recorded but already expired.
    pub fn set(&self, channel: Option<i64>, user: Option<i64>, command: Option<&str>, length_ms: u64) {
        let now = Instant::now();
        let mut lock = self.inhibitors.lock();
        lock.push(Inhibitor::Cooldown {
            channel,
            user,
            command: command.map(str::to_string),
            expires_at: now + Duration::from_millis(length_ms),
        });
        Self::prune_locked(&mut lock, now);
    }

    pub fn set_pending(&self, user: i64, description: String) {
        let now = Instant::now();
        let mut lock = self.inhibitors.lock();
        lock.push(Inhibitor::Pending {
            user,
            description,
            expires_at: now + self.pending_timeout,
        });
        Self::prune_locked(&mut lock, now);
    }

    /// Removes cooldowns whose scope is exactly `(channel, user, command)`.
    pub fn unset(&self, channel: Option<i64>, user: Option<i64>, command: Option<&str>) {
        let mut lock = self.inhibitors.lock();
        lock.retain(|i| match i {
            Inhibitor::Cooldown { channel: c, user: u, command: cmd, .. } => {
                !(*c == channel && *u == user && cmd.as_deref() == command)
            }
            Inhibitor::Pending { .. } => true,
        });
    }

    pub fn unset_pending(&self, user: i64) {
        let mut lock = self.inhibitors.lock();
        lock.retain(|i| !matches!(i, Inhibitor::Pending { user: u, .. } if *u == user));
    }

    pub fn fetch_pending(&self, user: i64) -> Option<String> {
        let now = Instant::now();
        let lock = self.inhibitors.lock();
        lock.iter().find_map(|i| match i {
            Inhibitor::Pending { user: u, description, .. } if *u == user && i.is_live(now) => {
                Some(description.clone())
            }
            _ => None,
        })
    }

    /// Drops expired inhibitors and returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut lock = self.inhibitors.lock();
        Self::prune_locked(&mut lock, now)
    }

    fn prune_locked(inhibitors: &mut Vec<Inhibitor>, now: Instant) -> usize {
        let before = inhibitors.len();
        inhibitors.retain(|i| i.is_live(now));
        let removed = before - inhibitors.len();
        if removed > 0 {
            debug!("CooldownManager: pruned {} expired inhibitors", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inhibitors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inhibitors.lock().is_empty()
    }
}

impl Default for CooldownManager {
    fn default() -> Self {
        Self::new(&CooldownConfig::default())
    }
}
