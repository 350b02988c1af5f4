use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::models::id::RecordId;

pub type BanphraseId = RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BanphraseType {
    /// Only consulted after the external API has rejected a message, to
    /// produce a custom reply.
    #[serde(rename = "API response")]
    ApiResponse,
    #[serde(rename = "Custom response")]
    CustomResponse,
    Denial,
    Inactive,
    Replacement,
}

impl fmt::Display for BanphraseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BanphraseType::ApiResponse => "API response",
            BanphraseType::CustomResponse => "Custom response",
            BanphraseType::Denial => "Denial",
            BanphraseType::Inactive => "Inactive",
            BanphraseType::Replacement => "Replacement",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BanphraseType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "API response" => Ok(BanphraseType::ApiResponse),
            "Custom response" => Ok(BanphraseType::CustomResponse),
            "Denial" => Ok(BanphraseType::Denial),
            "Inactive" => Ok(BanphraseType::Inactive),
            "Replacement" => Ok(BanphraseType::Replacement),
            _ => Err(format!("Unknown banphrase type: {}", s)),
        }
    }
}

/// Declarative body of a banphrase rule, stored as JSON.
///
/// ```json
/// { "kind": "pattern", "pattern": "/b(a)d/i", "output": "g$1od" }
/// { "kind": "phrase", "phrase": "forsen", "output": null }
/// { "kind": "registered", "name": "links" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BanphraseCodeSpec {
    /// Regex test. For replacements `output` is an expansion template applied
    /// to every match; for other types it is the reply text.
    Pattern {
        pattern: String,
        #[serde(default)]
        output: Option<String>,
    },
    /// Case-insensitive substring test.
    Phrase {
        phrase: String,
        #[serde(default)]
        output: Option<String>,
    },
    /// A predicate compiled into the binary and looked up by name.
    Registered { name: String },
}

/// A banphrase row exactly as stored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BanphraseRecord {
    pub banphrase_id: i64,
    pub code: Value,
    pub banphrase_type: String,
    pub platform: Option<String>,
    pub channel_id: Option<i64>,
    pub active: bool,
    pub priority: i32,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_code_spec_deserializes() {
        let spec: BanphraseCodeSpec = serde_json::from_value(json!({
            "kind": "pattern", "pattern": "/bad/i", "output": "good"
        })).unwrap();
        assert_eq!(spec, BanphraseCodeSpec::Pattern { pattern: "/bad/i".into(), output: Some("good".into()) });

        let spec: BanphraseCodeSpec = serde_json::from_value(json!({ "kind": "registered", "name": "links" })).unwrap();
        assert_eq!(spec, BanphraseCodeSpec::Registered { name: "links".into() });
    }

    #[test]
    fn test_type_names() {
        assert_eq!("API response".parse::<BanphraseType>(), Ok(BanphraseType::ApiResponse));
        assert_eq!(BanphraseType::CustomResponse.to_string(), "Custom response");
    }
}
