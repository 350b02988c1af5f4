use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Capability tags a command can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CommandFlag {
    /// Reply is prefixed with the invoking user's name.
    Mention,
    /// May take part in a pipe.
    Pipe,
    /// Reply is not run through banphrases.
    SkipBanphrase,
    /// Only the success state matters, no reply post-processing.
    ReadOnly,
    /// Runs inside a database transaction committed only if the reply passes banphrases.
    Rollback,
    /// Requires a matching whitelist filter.
    Whitelist,
    /// Target users may opt out of being targeted.
    OptOut,
    /// Target users may block specific invokers.
    Block,
    /// Output may contain user-supplied text.
    ExternalInput,
    /// Must produce a reply.
    NonNullable,
    /// Channel owners bypass filters.
    OwnerOverride,
    Developer,
    System,
}

impl fmt::Display for CommandFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandFlag::Mention => "mention",
            CommandFlag::Pipe => "pipe",
            CommandFlag::SkipBanphrase => "skip-banphrase",
            CommandFlag::ReadOnly => "read-only",
            CommandFlag::Rollback => "rollback",
            CommandFlag::Whitelist => "whitelist",
            CommandFlag::OptOut => "opt-out",
            CommandFlag::Block => "block",
            CommandFlag::ExternalInput => "external-input",
            CommandFlag::NonNullable => "non-nullable",
            CommandFlag::OwnerOverride => "owner-override",
            CommandFlag::Developer => "developer",
            CommandFlag::System => "system",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CommandFlag {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both kebab-case and the camelCase spelling older rows use.
        match s.to_lowercase().replace('_', "-").as_str() {
            "mention" => Ok(CommandFlag::Mention),
            "pipe" => Ok(CommandFlag::Pipe),
            "skip-banphrase" | "skipbanphrase" => Ok(CommandFlag::SkipBanphrase),
            "read-only" | "readonly" => Ok(CommandFlag::ReadOnly),
            "rollback" => Ok(CommandFlag::Rollback),
            "whitelist" => Ok(CommandFlag::Whitelist),
            "opt-out" | "optout" => Ok(CommandFlag::OptOut),
            "block" => Ok(CommandFlag::Block),
            "external-input" | "externalinput" => Ok(CommandFlag::ExternalInput),
            "non-nullable" | "nonnullable" => Ok(CommandFlag::NonNullable),
            "owner-override" | "owneroverride" => Ok(CommandFlag::OwnerOverride),
            "developer" => Ok(CommandFlag::Developer),
            "system" => Ok(CommandFlag::System),
            other => Err(format!("Unknown command flag: {}", other)),
        }
    }
}

/// Value types a named parameter can be declared with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Regex,
    Language,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

impl ParamDefinition {
    pub fn new(name: &str, param_type: ParamType) -> Self {
        Self { name: name.to_string(), param_type }
    }
}

/// Static description of a command. The executable body is registered
/// separately and looked up by `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandDefinition {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Cooldown in milliseconds. `None` means no cooldown is applied.
    #[serde(default)]
    pub cooldown: Option<u64>,
    #[serde(default)]
    pub flags: HashSet<CommandFlag>,
    #[serde(default)]
    pub params: Vec<ParamDefinition>,
    #[serde(default)]
    pub whitelist_response: Option<String>,
}

impl CommandDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            description: None,
            cooldown: None,
            flags: HashSet::new(),
            params: Vec::new(),
            whitelist_response: None,
        }
    }

    pub fn has_flag(&self, flag: CommandFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// True if `identifier` is this command's name or one of its aliases.
    pub fn is(&self, identifier: &str) -> bool {
        self.name.eq_ignore_ascii_case(identifier)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(identifier))
    }
}
