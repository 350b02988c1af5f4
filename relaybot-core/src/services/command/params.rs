//! Splits command arguments into positional arguments and typed named
//! parameters.
//!
//! `name:value` sets a declared parameter; `name:"some value"` allows spaces,
//! with `\"` standing for a literal quote. The delimiter token (default `--`)
//! stops parameter parsing and passes the rest through unchanged.

use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use relaybot_common::models::{ParamDefinition, ParamType};
use relaybot_common::regex_literal::{self, RegexOptions};
use crate::services::command::language::{find_language, Language};

#[derive(Debug, Clone)]
pub enum ParamValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Object(BTreeMap<String, String>),
    Regex(Regex),
    Language(Language),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            ParamValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_regex(&self) -> Option<&Regex> {
        match self {
            ParamValue::Regex(r) => Some(r),
            _ => None,
        }
    }
}

pub type Parameters = HashMap<String, ParamValue>;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub delimiter: String,
    pub regex: RegexOptions,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: "--".to_string(),
            regex: RegexOptions::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Success { parameters: Parameters, args: Vec<String> },
    Failure { reply: String },
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success { .. })
    }
}

enum ParsedValue {
    Plain(ParamValue),
    ObjectEntry(String, String),
}

fn without_last(s: &str) -> &str {
    match s.char_indices().next_back() {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn parse_parameters(defs: &[ParamDefinition], args: &[String], options: &ParseOptions) -> ParseOutcome {
    let input = args.join(" ");
    let chars: Vec<char> = input.chars().collect();

    let mut positional: Vec<String> = Vec::new();
    let mut parameters = Parameters::new();
    let mut buffer = String::new();
    let mut current: Option<&ParamDefinition> = None;
    let mut quoted = false;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        buffer.push(c);

        match current {
            None => {
                let head = without_last(&buffer);
                if c == ' ' && head == options.delimiter {
                    let rest: String = chars[i + 1..].iter().collect();
                    if !rest.is_empty() {
                        positional.extend(rest.split(' ').map(str::to_string));
                    }
                    return ParseOutcome::Success { parameters, args: positional };
                }

                if c == ':' {
                    if let Some(def) = defs.iter().find(|d| d.name == head) {
                        current = Some(def);
                        buffer.clear();
                        if chars.get(i + 1) == Some(&'"') {
                            i += 1;
                            quoted = true;
                        }
                    }
                } else if c == ' ' {
                    if !head.is_empty() {
                        positional.push(head.to_string());
                    }
                    buffer.clear();
                }
            }
            Some(def) => {
                let end_unquoted = !quoted && c == ' ';
                let end_quoted = quoted && c == '"' && !buffer.ends_with("\\\"");
                if end_unquoted || end_quoted {
                    let raw = without_last(&buffer);
                    let value = if quoted { raw.replace("\\\"", "\"") } else { raw.to_string() };
                    if let Err(reply) = apply_parameter(def, &value, quoted, &mut parameters, options) {
                        return ParseOutcome::Failure { reply };
                    }
                    buffer.clear();
                    current = None;
                    quoted = false;
                }
            }
        }
        i += 1;
    }

    match current {
        Some(def) if quoted => {
            return ParseOutcome::Failure {
                reply: format!("Unclosed quoted parameter \"{}\"!", def.name),
            };
        }
        Some(def) => {
            if let Err(reply) = apply_parameter(def, &buffer, false, &mut parameters, options) {
                return ParseOutcome::Failure { reply };
            }
        }
        None => {
            if !buffer.is_empty() && buffer != options.delimiter {
                positional.push(buffer);
            }
        }
    }

    ParseOutcome::Success { parameters, args: positional }
}

fn apply_parameter(
    def: &ParamDefinition,
    value: &str,
    explicit: bool,
    parameters: &mut Parameters,
    options: &ParseOptions,
) -> Result<(), String> {
    let parsed = parse_value(value, def.param_type, explicit, options)
        .ok_or_else(|| format!("Could not parse parameter \"{}\"!", def.name))?;

    match parsed {
        ParsedValue::Plain(v) => {
            parameters.insert(def.name.clone(), v);
        }
        ParsedValue::ObjectEntry(key, v) => {
            let entry = parameters
                .entry(def.name.clone())
                .or_insert_with(|| ParamValue::Object(BTreeMap::new()));
            let ParamValue::Object(map) = entry else {
                return Err(format!("Could not parse parameter \"{}\"!", def.name));
            };
            if map.contains_key(&key) {
                return Err(format!(
                    "Cannot use multiple values for parameter \"{}\", key {}!",
                    def.name, key
                ));
            }
            map.insert(key, v);
        }
    }
    Ok(())
}

fn parse_value(value: &str, param_type: ParamType, explicit: bool, options: &ParseOptions) -> Option<ParsedValue> {
    // `name:` followed by nothing is a typo, `name:""` is a deliberate empty string
    if value.is_empty() && (param_type != ParamType::String || !explicit) {
        return None;
    }

    let v = match param_type {
        ParamType::String => ParamValue::String(value.to_string()),
        ParamType::Number => {
            let n: f64 = value.parse().ok()?;
            if !n.is_finite() {
                return None;
            }
            ParamValue::Number(n)
        }
        ParamType::Boolean => match value {
            "true" => ParamValue::Boolean(true),
            "false" => ParamValue::Boolean(false),
            _ => return None,
        },
        ParamType::Date => ParamValue::Date(parse_date(value)?),
        ParamType::Object => {
            let (key, v) = value.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            return Some(ParsedValue::ObjectEntry(key.to_string(), v.to_string()));
        }
        ParamType::Regex => ParamValue::Regex(regex_literal::compile(value, &options.regex).ok()?),
        ParamType::Language => ParamValue::Language(find_language(value)?),
    };
    Some(ParsedValue::Plain(v))
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok().map(|n| n.and_utc()))
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok().map(|n| n.and_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|n| n.and_utc())
        })
        .or_else(|| value.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn defs() -> Vec<ParamDefinition> {
        vec![
            ParamDefinition::new("string", ParamType::String),
            ParamDefinition::new("number", ParamType::Number),
            ParamDefinition::new("boolean", ParamType::Boolean),
            ParamDefinition::new("date", ParamType::Date),
            ParamDefinition::new("object", ParamType::Object),
            ParamDefinition::new("regex", ParamType::Regex),
            ParamDefinition::new("language", ParamType::Language),
        ]
    }

    fn split(s: &str) -> Vec<String> {
        s.split(' ').map(str::to_string).collect()
    }

    fn parse(s: &str) -> ParseOutcome {
        parse_parameters(&defs(), &split(s), &ParseOptions::default())
    }

    fn expect_success(s: &str) -> (Parameters, Vec<String>) {
        match parse(s) {
            ParseOutcome::Success { parameters, args } => (parameters, args),
            ParseOutcome::Failure { reply } => panic!("'{}' failed: {}", s, reply),
        }
    }

    fn expect_failure(s: &str) -> String {
        match parse(s) {
            ParseOutcome::Success { .. } => panic!("'{}' should have failed", s),
            ParseOutcome::Failure { reply } => reply,
        }
    }

    #[test]
    fn test_plain_arguments_pass_through() {
        for input in ["hello world", "a b c d", "one", "http://example.com/x:y foo", "unknown:param here"] {
            let (params, args) = expect_success(input);
            assert!(params.is_empty(), "{}", input);
            assert_eq!(args, split(input));
        }
    }

    #[test]
    fn test_quoted_value_then_glued_argument() {
        let (params, args) = expect_success("string:\"foo bar\"buz");
        assert_eq!(params["string"].as_str(), Some("foo bar"));
        assert_eq!(args, vec!["buz".to_string()]);
    }

    #[test]
    fn test_escaped_quote_inside_quoted_value() {
        let (params, _) = expect_success(r#"string:"say \"hi\" now""#);
        assert_eq!(params["string"].as_str(), Some(r#"say "hi" now"#));
    }

    #[test]
    fn test_mixed_parameters_and_arguments() {
        let (params, args) = expect_success("first number:5 second boolean:true third");
        assert_eq!(params["number"].as_number(), Some(5.0));
        assert_eq!(params["boolean"].as_bool(), Some(true));
        assert_eq!(args, split("first second third"));
    }

    #[test]
    fn test_object_keys_accumulate() {
        let (params, _) = expect_success("object:foo=bar object:baz=qux");
        let obj = params["object"].as_object().unwrap();
        assert_eq!(obj.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(obj.get("baz").map(String::as_str), Some("qux"));
        assert_eq!(obj.len(), 2);
    }

    #[test]
    fn test_object_duplicate_key_fails() {
        let reply = expect_failure("object:foo=bar object:foo=baz");
        assert_eq!(reply, "Cannot use multiple values for parameter \"object\", key foo!");
    }

    #[test]
    fn test_last_write_wins_for_plain_types() {
        let (params, _) = expect_success("number:1 number:2");
        assert_eq!(params["number"].as_number(), Some(2.0));
    }

    #[test]
    fn test_empty_values() {
        assert_eq!(expect_failure("string: rest"), "Could not parse parameter \"string\"!");
        assert_eq!(expect_failure("string:"), "Could not parse parameter \"string\"!");
        let (params, args) = expect_success("string:\"\" rest");
        assert_eq!(params["string"].as_str(), Some(""));
        assert_eq!(args, vec!["rest".to_string()]);
        expect_failure("number:\"\"");
    }

    #[test]
    fn test_type_conversions_reject_garbage() {
        expect_failure("number:abc");
        expect_failure("number:inf");
        expect_failure("boolean:yes");
        expect_failure("date:yesterday");
        expect_failure("regex:(unclosed");
        expect_failure("language:klingon");
        expect_failure("object:novalue");
    }

    #[test]
    fn test_date_and_language() {
        let (params, _) = expect_success("date:2024-02-29 language:french");
        match &params["date"] {
            ParamValue::Date(d) => assert_eq!((d.year(), d.month(), d.day()), (2024, 2, 29)),
            other => panic!("unexpected {:?}", other),
        }
        match &params["language"] {
            ParamValue::Language(l) => assert_eq!(l.iso6391, "fr"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_regex_parameter() {
        let (params, _) = expect_success("regex:/^he+llo$/i");
        let re = params["regex"].as_regex().unwrap();
        assert!(re.is_match("HEEELLO"));
    }

    #[test]
    fn test_regex_parameter_linear_mode() {
        let options = ParseOptions {
            regex: RegexOptions { linear: true, ..RegexOptions::default() },
            ..ParseOptions::default()
        };
        let outcome = parse_parameters(&defs(), &split("regex:/abc/i"), &options);
        let ParseOutcome::Success { parameters, .. } = outcome else { panic!("expected success") };
        let re = parameters["regex"].as_regex().unwrap();
        assert!(re.as_str().contains("[aA]"));
        assert!(re.is_match("xABCx"));

        let tight = ParseOptions {
            regex: RegexOptions { linear: true, size_limit: 8 },
            ..ParseOptions::default()
        };
        let outcome = parse_parameters(&defs(), &split("regex:/abcdefghij{30}/i"), &tight);
        assert!(!outcome.is_success(), "oversized linear regex must not fall back");
    }

    #[test]
    fn test_unclosed_quote() {
        let reply = expect_failure("string:\"never closed");
        assert_eq!(reply, "Unclosed quoted parameter \"string\"!");
    }

    #[test]
    fn test_delimiter_stops_parsing() {
        let (params, args) = expect_success("number:3 -- string:raw number:9 text");
        assert_eq!(params["number"].as_number(), Some(3.0));
        assert!(!params.contains_key("string"));
        assert_eq!(args, split("string:raw number:9 text"));
    }

    #[test]
    fn test_trailing_delimiter_is_dropped() {
        let (_, args) = expect_success("foo --");
        assert_eq!(args, vec!["foo".to_string()]);
    }

    #[test]
    fn test_custom_delimiter() {
        let options = ParseOptions { delimiter: "||".into(), ..ParseOptions::default() };
        let outcome = parse_parameters(&defs(), &split("|| number:1"), &options);
        let ParseOutcome::Success { parameters, args } = outcome else { panic!("expected success") };
        assert!(parameters.is_empty());
        assert_eq!(args, split("number:1"));
    }
}
