//! Command text parsing
//!
//! `!transfer @bob 5 code=123456` becomes an [`Invocation`] with command
//! `transfer`, positional args `["@bob", "5"]` and option `code`.

use std::collections::BTreeMap;

use regex::Regex;

use crate::types::ActorId;

pub const COMMAND_PREFIX: char = '!';

lazy_static::lazy_static! {
    // Discord style `<@123>` / `<@!123>` or plain `@name`
    static ref MENTION: Regex = Regex::new(r"^(?:<@!?([0-9]+)>|@([A-Za-z0-9_.\-]+))$").expect("Invalid mention regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub actor: ActorId,
    /// Lowercased command name without prefix
    pub command: String,
    pub args: Vec<String>,
    /// `key=value` (or `key:value`) options, keys lowercased
    pub options: BTreeMap<String, String>,
}

impl Invocation {
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Parse `text` sent by `actor`; `None` when it is not a command
pub fn parse(actor: &ActorId, text: &str) -> Option<Invocation> {
    let body = text.trim().strip_prefix(COMMAND_PREFIX)?;
    let mut tokens = body.split_whitespace();
    let command = tokens.next()?.to_lowercase();

    let mut args = Vec::new();
    let mut options = BTreeMap::new();
    for token in tokens {
        match split_option(token) {
            Some((key, value)) => {
                options.insert(key.to_lowercase(), value.to_string());
            }
            None => args.push(token.to_string()),
        }
    }

    Some(Invocation {
        actor: actor.clone(),
        command,
        args,
        options,
    })
}

fn split_option(token: &str) -> Option<(&str, &str)> {
    let idx = token.find(|c| c == '=' || c == ':')?;
    let (key, value) = (&token[..idx], &token[idx + 1..]);
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic()) || value.starts_with("//") {
        return None;
    }
    Some((key, value))
}

/// Resolve a recipient argument to an actor id
pub fn mention(arg: &str) -> Option<ActorId> {
    let captures = MENTION.captures(arg.trim())?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| ActorId::new(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ActorId {
        ActorId::new("alice")
    }

    #[test]
    fn test_parse_transfer() {
        let inv = parse(&alice(), "!Transfer @bob 5.5 code=123456 email:alice@example.com").unwrap();
        assert_eq!(inv.command, "transfer");
        assert_eq!(inv.args, vec!["@bob", "5.5"]);
        assert_eq!(inv.option("code"), Some("123456"));
        assert_eq!(inv.option("email"), Some("alice@example.com"));
        assert_eq!(inv.actor, alice());
    }

    #[test]
    fn test_non_command_ignored() {
        assert!(parse(&alice(), "hello there").is_none());
        assert!(parse(&alice(), "!").is_none());
        assert!(parse(&alice(), "   ").is_none());
    }

    #[test]
    fn test_url_like_token_is_positional() {
        let inv = parse(&alice(), "!otp verify https://example.com").unwrap();
        assert_eq!(inv.args, vec!["verify", "https://example.com"]);
        assert!(inv.options.is_empty());
    }

    #[test]
    fn test_mentions() {
        assert_eq!(mention("<@1234>"), Some(ActorId::new("1234")));
        assert_eq!(mention("<@!1234>"), Some(ActorId::new("1234")));
        assert_eq!(mention("@bob"), Some(ActorId::new("bob")));
        assert_eq!(mention("bob"), None);
        assert_eq!(mention("<@abc>"), None);
    }
}
