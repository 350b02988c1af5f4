//! Scoped policy rules ("filters") and the lookups the dispatcher runs on them.
//!
//! A filter applies to a `(user, channel, command, invocation, platform)` tuple
//! when each of its scoping fields is either unset or equal to the tuple's
//! value. When several filters of one type apply, the one with more scoping
//! fields set wins (see [`Filter::priority`]).

mod execute;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, error, info, warn};

use relaybot_common::models::{Filter, FilterData, FilterId, FilterRecord, FilterType, NewFilter, Platform};
use relaybot_common::traits::chat_traits::{DataPropertyStore, UserDirectory};
use relaybot_common::traits::repository_traits::FilterRepository;
use crate::Error;

pub use execute::{FilterDenial, FilterOptions, FilterOutcome, STREAM_LIVE_PROPERTY};

/// Inserted after the first character of an unpinged user's name.
pub const UNPING_SEPARATOR: char = '\u{E0000}';

/// The tuple a filter lookup is made for. `None` only matches wildcard filters.
#[derive(Debug, Clone, Default)]
pub struct FilterScope<'a> {
    pub user: Option<i64>,
    pub channel: Option<i64>,
    pub command: Option<&'a str>,
    pub invocation: Option<&'a str>,
    pub platform: Option<Platform>,
    /// Ignore the filters' user field entirely.
    pub skip_user_check: bool,
}

impl FilterScope<'_> {
    fn matches(&self, filter: &Filter) -> bool {
        (self.skip_user_check || filter.user.is_none_or(|u| Some(u) == self.user))
            && filter.channel.is_none_or(|c| Some(c) == self.channel)
            && filter.command.as_deref().is_none_or(|c| Some(c) == self.command)
            && filter.invocation.as_deref().is_none_or(|i| Some(i) == self.invocation)
            && filter.platform.is_none_or(|p| Some(p) == self.platform)
    }
}

pub struct FilterRegistry {
    filters: RwLock<BTreeMap<FilterId, Arc<Filter>>>,
    repo: Option<Arc<dyn FilterRepository>>,
    users: Option<Arc<dyn UserDirectory>>,
    properties: Option<Arc<dyn DataPropertyStore>>,
    next_ephemeral: AtomicU64,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(BTreeMap::new()),
            repo: None,
            users: None,
            properties: None,
            next_ephemeral: AtomicU64::new(1),
        }
    }

    pub fn with_repository(mut self, repo: Arc<dyn FilterRepository>) -> Self {
        self.repo = Some(repo);
        self
    }

    /// Needed for opt-out/block target resolution, unping and online/offline checks.
    pub fn with_collaborators(mut self, users: Arc<dyn UserDirectory>, properties: Arc<dyn DataPropertyStore>) -> Self {
        self.users = Some(users);
        self.properties = Some(properties);
        self
    }

    fn repo(&self) -> Result<&Arc<dyn FilterRepository>, Error> {
        self.repo
            .as_ref()
            .ok_or_else(|| Error::Config("Filter registry has no repository".into()))
    }

    pub fn len(&self) -> usize {
        self.filters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.read().is_empty()
    }

    pub fn get(&self, id: FilterId) -> Option<Arc<Filter>> {
        self.filters.read().get(&id).cloned()
    }

    /// Active filters of `filter_type` (any type if `None`) applying to `scope`,
    /// most specific first. Equal priorities keep id order.
    pub fn get_locals(&self, filter_type: Option<FilterType>, scope: &FilterScope) -> Vec<Arc<Filter>> {
        let mut found: Vec<Arc<Filter>> = {
            let lock = self.filters.read();
            lock.values()
                .filter(|f| f.active)
                .filter(|f| filter_type.is_none_or(|t| t == f.filter_type))
                .filter(|f| scope.matches(f))
                .cloned()
                .collect()
        };
        found.sort_by(|a, b| b.priority().cmp(&a.priority()));
        found
    }

    /// The most specific `Cooldown` filter for `scope`.
    pub fn get_cooldown_modifiers(&self, scope: &FilterScope) -> Option<Arc<Filter>> {
        self.get_locals(Some(FilterType::Cooldown), scope)
            .into_iter()
            .find(|f| f.cooldown_modifier().is_some())
    }

    /// `length` adjusted by the scope's cooldown modifier, if there is one.
    pub fn modify_cooldown(&self, scope: &FilterScope, length: u64) -> u64 {
        match self.get_cooldown_modifiers(scope).and_then(|f| f.cooldown_modifier()) {
            Some(modifier) => modifier.apply(length),
            None => length,
        }
    }

    /// False if the user asked not to be mentioned in replies.
    pub fn get_mention_status(&self, scope: &FilterScope) -> bool {
        self.get_locals(Some(FilterType::Unmention), scope).is_empty()
    }

    /// Merged `Flags` payloads, more specific filters overriding less specific ones.
    pub fn get_flags(&self, scope: &FilterScope) -> BTreeMap<String, bool> {
        let mut locals = self.get_locals(Some(FilterType::Flags), scope);
        locals.reverse();

        let mut merged = BTreeMap::new();
        for filter in locals {
            if let FilterData::Flags(flags) = &filter.data {
                merged.extend(flags.iter().map(|(k, v)| (k.clone(), *v)));
            }
        }
        merged
    }

    /// Users whose reminders must not be delivered in `channel`.
    pub fn get_reminder_preventions(&self, channel: Option<i64>, platform: Option<Platform>) -> Vec<i64> {
        let scope = FilterScope { channel, platform, skip_user_check: true, ..FilterScope::default() };
        let mut seen = HashSet::new();
        self.get_locals(Some(FilterType::ReminderPrevention), &scope)
            .into_iter()
            .filter_map(|f| f.user)
            .filter(|u| seen.insert(*u))
            .collect()
    }

    /// Breaks up every name of an unpinged user in `text` so it no longer
    /// notifies them.
    pub async fn apply_unping(&self, text: &str, scope: &FilterScope<'_>) -> Result<String, Error> {
        let scope = FilterScope { skip_user_check: true, ..scope.clone() };
        let user_ids: HashSet<i64> = self
            .get_locals(Some(FilterType::Unping), &scope)
            .into_iter()
            .filter_map(|f| f.user)
            .collect();
        if user_ids.is_empty() {
            return Ok(text.to_string());
        }
        let Some(users) = self.users.as_ref() else {
            warn!("Unping filters exist but no user directory is configured");
            return Ok(text.to_string());
        };

        let mut result = text.to_string();
        for id in user_ids {
            let Some(user) = users.get_by_id(id).await? else {
                continue;
            };
            result = unping_name(&result, &user.name)?;
        }
        Ok(result)
    }

    fn insert(&self, filter: Filter) -> Arc<Filter> {
        let filter = Arc::new(filter);
        self.filters.write().insert(filter.id, filter.clone());
        filter
    }

    fn parse_records(records: Vec<FilterRecord>) -> Vec<Filter> {
        records
            .into_iter()
            .filter_map(|record| {
                let id = record.filter_id;
                match Filter::from_record(record) {
                    Ok(f) => Some(f),
                    Err(e) => {
                        error!("Filter {} could not be loaded: {}", id, e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Replaces all persisted filters with the active rows from the repository.
    /// Ephemeral filters are kept.
    pub async fn load_all(&self) -> Result<usize, Error> {
        let records = self.repo()?.list_active().await?;
        let parsed = Self::parse_records(records);

        let mut map: BTreeMap<FilterId, Arc<Filter>> = self
            .filters
            .read()
            .iter()
            .filter(|(id, _)| matches!(id, FilterId::Ephemeral(_)))
            .map(|(id, f)| (*id, f.clone()))
            .collect();
        map.extend(parsed.into_iter().map(|f| (f.id, Arc::new(f))));

        let count = map.len();
        *self.filters.write() = map;
        info!("Loaded {} filters", count);
        Ok(count)
    }

    pub async fn reload_all(&self) -> Result<usize, Error> {
        self.load_all().await
    }

    /// Re-reads the given filters, dropping those that were deleted or deactivated.
    pub async fn reload_specific(&self, ids: &[i64]) -> Result<(), Error> {
        if ids.is_empty() {
            return Ok(());
        }
        let records = self.repo()?.get_by_ids(ids).await?;
        let parsed = Self::parse_records(records);

        let mut lock = self.filters.write();
        for id in ids {
            lock.remove(&FilterId::Persisted(*id));
        }
        for filter in parsed.into_iter().filter(|f| f.active) {
            lock.insert(filter.id, Arc::new(filter));
        }
        debug!("Reloaded filters {:?}", ids);
        Ok(())
    }

    /// Persists a new filter and adds it to the registry.
    pub async fn create(&self, new: NewFilter) -> Result<Arc<Filter>, Error> {
        // validate the payload before anything is written
        Filter::from_new(FilterId::Ephemeral(0), new.clone())?;

        let record = self.repo()?.create(&new).await?;
        let filter = Filter::from_record(record)?;
        info!("Created filter {} ({})", filter.id, filter.filter_type);
        Ok(self.insert(filter))
    }

    /// Adds a filter that only lives in memory.
    pub fn create_ephemeral(&self, new: NewFilter) -> Result<Arc<Filter>, Error> {
        let id = FilterId::Ephemeral(self.next_ephemeral.fetch_add(1, Ordering::Relaxed));
        let filter = Filter::from_new(id, new)?;
        Ok(self.insert(filter))
    }

    fn require(&self, id: FilterId) -> Result<Arc<Filter>, Error> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("Filter {} does not exist", id)))
    }

    pub async fn set_active(&self, id: FilterId, active: bool) -> Result<Arc<Filter>, Error> {
        let current = self.require(id)?;
        if let Some(db_id) = id.persisted() {
            self.repo()?.set_active(db_id, active).await?;
        }

        let mut updated = (*current).clone();
        updated.active = active;
        Ok(self.insert(updated))
    }

    /// Flips the filter's active state; returns the updated filter.
    pub async fn toggle(&self, id: FilterId) -> Result<Arc<Filter>, Error> {
        let current = self.require(id)?;
        self.set_active(id, !current.active).await
    }

    pub async fn set_reason(&self, id: FilterId, reason: Option<String>) -> Result<Arc<Filter>, Error> {
        let current = self.require(id)?;
        if let Some(db_id) = id.persisted() {
            self.repo()?.set_reason(db_id, reason.as_deref()).await?;
        }

        let mut updated = (*current).clone();
        updated.reason = reason;
        Ok(self.insert(updated))
    }
}

fn unping_name(text: &str, name: &str) -> Result<String, Error> {
    if name.is_empty() {
        return Ok(text.to_string());
    }
    let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
        .map_err(|e| Error::Parse(e.to_string()))?;

    Ok(pattern
        .replace_all(text, |caps: &regex::Captures| {
            let found = &caps[0];
            let mut chars = found.chars();
            match chars.next() {
                Some(first) => format!("{}{}{}", first, UNPING_SEPARATOR, chars.as_str()),
                None => String::new(),
            }
        })
        .into_owned())
}
