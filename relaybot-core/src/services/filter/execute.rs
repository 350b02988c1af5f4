use std::sync::Arc;
use serde_json::Value;
use tracing::debug;

use relaybot_common::models::{
    Channel, CommandDefinition, CommandFlag, Filter, FilterData, FilterResponse, FilterType, Platform, User,
};
use crate::Error;
use super::{FilterRegistry, FilterScope};

/// Channel data property holding the stream's live state.
pub const STREAM_LIVE_PROPERTY: &str = "stream_live";

/// Everything [`FilterRegistry::execute`] needs to know about one invocation.
#[derive(Debug, Clone, Copy)]
pub struct FilterOptions<'a> {
    pub user: &'a User,
    pub channel: Option<&'a Channel>,
    pub platform: Platform,
    pub command: &'a CommandDefinition,
    pub invocation: &'a str,
    pub args: &'a [String],
    /// Administrators are not subject to filters.
    pub is_admin: bool,
}

impl<'a> FilterOptions<'a> {
    fn scope(&self, user: Option<i64>) -> FilterScope<'a> {
        FilterScope {
            user,
            channel: self.channel.map(|c| c.channel_id),
            command: Some(self.command.name.as_str()),
            invocation: Some(self.invocation),
            platform: Some(self.platform),
            skip_user_check: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterDenial {
    /// `whitelist`, `arguments`, `opt-out`, `block`, `blacklist`,
    /// `online-only` or `offline-only`.
    pub reason: &'static str,
    pub filter: Option<Arc<Filter>>,
    pub reply: Option<String>,
}

impl FilterDenial {
    /// A blacklist entry for the user alone: banned from everything everywhere.
    pub fn is_global_ban(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| {
            f.filter_type == FilterType::Blacklist
                && f.user.is_some()
                && f.channel.is_none()
                && f.command.is_none()
                && f.invocation.is_none()
                && f.platform.is_none()
        })
    }

    /// Whether the reply is the filter's stored reason, which may contain
    /// arbitrary text.
    pub fn replies_with_reason(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| f.response == FilterResponse::Reason)
    }
}

#[derive(Debug, Clone)]
pub enum FilterOutcome {
    Allowed,
    Denied(FilterDenial),
}

impl FilterOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterOutcome::Allowed)
    }
}

fn deny(reason: &'static str, filter: &Arc<Filter>, auto: impl FnOnce() -> Result<String, Error>) -> Result<FilterOutcome, Error> {
    let reply = match filter.response {
        FilterResponse::None => None,
        FilterResponse::Reason => filter.reason.clone(),
        FilterResponse::Auto => Some(auto()?),
    };
    Ok(FilterOutcome::Denied(FilterDenial { reason, filter: Some(filter.clone()), reply }))
}

fn arguments_reply(filter: &Filter) -> String {
    let scope = if filter.command.is_some() || filter.invocation.is_some() { "this" } else { "any" };
    let kind = if filter.invocation.is_some() { "command invocation" } else { "command" };
    format!("You cannot use {} {} with these arguments!", scope, kind)
}

fn blacklist_reply(filter: &Filter) -> Result<String, Error> {
    let thing = if filter.invocation.is_some() { "that command invocation" } else { "that command" };
    let targeted = filter.command.is_some() || filter.invocation.is_some();

    let reply = match (filter.channel.is_some(), filter.user.is_some(), targeted) {
        (true, true, true) => format!("You cannot execute {} in this channel.", thing),
        (true, false, true) => format!("{} cannot be executed in this channel.", capitalize(thing)),
        (true, true, false) => "You cannot execute any commands in this channel.".to_string(),
        (false, true, true) => format!("You cannot execute {} in any channel.", thing),
        (true, false, false) => "No commands can be executed in this channel.".to_string(),
        (false, false, true) => format!("{} cannot be executed anywhere.", capitalize(thing)),
        (false, true, false) => "You cannot execute any commands in any channel.".to_string(),
        (false, false, false) => {
            return Err(Error::Programmer(format!(
                "Blacklist filter {} has no channel, user, command or invocation set",
                filter.id
            )));
        }
    };
    Ok(reply)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The user a targeting command's first argument names, e.g. `@Forsen,`.
fn target_name(args: &[String]) -> Option<String> {
    let first = args.first()?;
    let name = first.trim_start_matches('@').trim_end_matches(',').to_lowercase();
    (!name.is_empty()).then_some(name)
}

impl FilterRegistry {
    /// Decides whether the invocation may run. Checks, in order: administrator
    /// bypass, whitelist, argument bans, opt-out and block, blacklist, then
    /// online/offline-only.
    pub async fn execute(&self, options: &FilterOptions<'_>) -> Result<FilterOutcome, Error> {
        if options.is_admin {
            return Ok(FilterOutcome::Allowed);
        }

        let user_scope = options.scope(Some(options.user.user_id));
        let command = options.command;

        if command.has_flag(CommandFlag::Whitelist) {
            let whitelisted = self.get_locals(Some(FilterType::Whitelist), &user_scope);
            if whitelisted.is_empty() {
                return Ok(FilterOutcome::Denied(FilterDenial {
                    reason: "whitelist",
                    filter: None,
                    reply: command.whitelist_response.clone(),
                }));
            }
        }

        for filter in self.get_locals(Some(FilterType::Arguments), &user_scope) {
            let FilterData::Arguments(matchers) = &filter.data else {
                continue;
            };
            if matchers.iter().any(|m| m.matches(options.args)) {
                debug!("Arguments filter {} matched {:?}", filter.id, options.args);
                return deny("arguments", &filter, || Ok(arguments_reply(&filter)));
            }
        }

        let targeting = command.has_flag(CommandFlag::OptOut) || command.has_flag(CommandFlag::Block);
        if let (true, Some(name), Some(users)) = (targeting, target_name(options.args), self.users.as_ref()) {
            if let Some(target) = users.get_by_name(&name).await? {
                let target_scope = options.scope(Some(target.user_id));

                if command.has_flag(CommandFlag::OptOut) {
                    if let Some(filter) = self.get_locals(Some(FilterType::OptOut), &target_scope).first() {
                        return deny("opt-out", filter, || {
                            Ok("That user has opted out from being the target of your command.".to_string())
                        });
                    }
                }

                if command.has_flag(CommandFlag::Block) {
                    let blocked = self
                        .get_locals(Some(FilterType::Block), &target_scope)
                        .into_iter()
                        .find(|f| f.blocked_user.is_none_or(|b| b == options.user.user_id));
                    if let Some(filter) = blocked {
                        return deny("block", &filter, || Ok("That user has blocked you from this command.".to_string()));
                    }
                }
            }
        }

        if let Some(filter) = self.get_locals(Some(FilterType::Blacklist), &user_scope).first() {
            return deny("blacklist", filter, || blacklist_reply(filter));
        }

        if let Some(channel) = options.channel {
            let offline_only = self.get_locals(Some(FilterType::OfflineOnly), &user_scope);
            let online_only = self.get_locals(Some(FilterType::OnlineOnly), &user_scope);
            if offline_only.is_empty() && online_only.is_empty() {
                return Ok(FilterOutcome::Allowed);
            }

            let live = self.is_live(channel).await?;
            if let (true, Some(filter)) = (live, offline_only.first()) {
                return deny("offline-only", filter, || {
                    Ok(format!("This command is only available while {} is offline!", channel.name))
                });
            }
            if let (false, Some(filter)) = (live, online_only.first()) {
                return deny("online-only", filter, || {
                    Ok(format!("This command is only available while {} is live!", channel.name))
                });
            }
        }

        Ok(FilterOutcome::Allowed)
    }

    async fn is_live(&self, channel: &Channel) -> Result<bool, Error> {
        let Some(properties) = self.properties.as_ref() else {
            return Ok(false);
        };
        let value = properties.channel_property(channel, STREAM_LIVE_PROPERTY).await?;
        Ok(matches!(value, Some(Value::Bool(true))))
    }
}
