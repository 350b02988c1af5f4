//! Banphrase bodies compiled into the binary, referenced from stored rules
//! as `{ "kind": "registered", "name": "..." }`.

use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Result of running a banphrase body against a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeOutcome {
    Pass,
    /// The body matched. Carries the rewritten message for replacements and
    /// the reply text for response rules.
    Hit(Option<String>),
}

pub trait BanphrasePredicate: Send + Sync {
    fn evaluate(&self, message: &str) -> CodeOutcome;
}

impl<F> BanphrasePredicate for F
where
    F: Fn(&str) -> CodeOutcome + Send + Sync,
{
    fn evaluate(&self, message: &str) -> CodeOutcome {
        self(message)
    }
}

#[derive(Clone, Default)]
pub struct PredicateTable {
    entries: HashMap<String, Arc<dyn BanphrasePredicate>>,
}

impl PredicateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-filled with the predicates shipped with the bot.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register("links", Arc::new(contains_link));
        table.register("strip-links", Arc::new(strip_links));
        table
    }

    pub fn register(&mut self, name: &str, predicate: Arc<dyn BanphrasePredicate>) {
        self.entries.insert(name.to_lowercase(), predicate);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BanphrasePredicate>> {
        self.entries.get(&name.to_lowercase()).cloned()
    }
}

fn parse_link(word: &str) -> Option<Url> {
    let trimmed = word.trim_matches(|c: char| matches!(c, '(' | ')' | '<' | '>' | ',' | '.' | '"' | '\''));
    let url = Url::parse(trimmed).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn contains_link(message: &str) -> CodeOutcome {
    if message.split_whitespace().any(|w| parse_link(w).is_some()) {
        CodeOutcome::Hit(None)
    } else {
        CodeOutcome::Pass
    }
}

fn strip_links(message: &str) -> CodeOutcome {
    let mut changed = false;
    let words: Vec<String> = message
        .split(' ')
        .map(|w| match parse_link(w) {
            Some(url) => {
                changed = true;
                url.host_str().map_or_else(|| "[link]".to_string(), |h| format!("[{}]", h))
            }
            None => w.to_string(),
        })
        .collect();

    if changed {
        CodeOutcome::Hit(Some(words.join(" ")))
    } else {
        CodeOutcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_predicate() {
        let table = PredicateTable::with_builtins();
        let links = table.get("LINKS").unwrap();
        assert_eq!(links.evaluate("see (https://example.com/x)"), CodeOutcome::Hit(None));
        assert_eq!(links.evaluate("ftp://example.com is fine"), CodeOutcome::Pass);
        assert_eq!(links.evaluate("no links here"), CodeOutcome::Pass);
    }

    #[test]
    fn test_strip_links_rewrites_to_host() {
        let table = PredicateTable::with_builtins();
        let strip = table.get("strip-links").unwrap();
        assert_eq!(
            strip.evaluate("look https://example.com/a?b=c now"),
            CodeOutcome::Hit(Some("look [example.com] now".into()))
        );
        assert!(table.get("unknown").is_none());
    }
}
