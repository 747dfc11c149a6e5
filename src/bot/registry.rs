//! Static command registry, built once at startup

use std::collections::BTreeMap;

/// Handler selected for a command name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Transfer,
    Balance,
    Connect,
    Disconnect,
    Otp,
    Confirm,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub kind: CommandKind,
    pub usage: &'static str,
    pub description: &'static str,
    pub aliases: &'static [&'static str],
}

const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "transfer",
        kind: CommandKind::Transfer,
        usage: "!transfer @user <amount> [code=<code>] [email=<address>]",
        description: "Send XLM to another linked user, protected by a one-time code",
        aliases: &["send"],
    },
    CommandSpec {
        name: "balance",
        kind: CommandKind::Balance,
        usage: "!balance",
        description: "Show your Stellar balance",
        aliases: &[],
    },
    CommandSpec {
        name: "connect",
        kind: CommandKind::Connect,
        usage: "!connect",
        description: "Link your chat account to your Stellar account",
        aliases: &["connect-stellar", "link"],
    },
    CommandSpec {
        name: "disconnect",
        kind: CommandKind::Disconnect,
        usage: "!disconnect",
        description: "Remove the link to your Stellar account",
        aliases: &["unlink"],
    },
    CommandSpec {
        name: "otp",
        kind: CommandKind::Otp,
        usage: "!otp generate | !otp verify <code>",
        description: "Enroll an authenticator app or test a code",
        aliases: &[],
    },
    CommandSpec {
        name: "confirm",
        kind: CommandKind::Confirm,
        usage: "!confirm [code=<code>]",
        description: "Confirm your pending sensitive action",
        aliases: &[],
    },
    CommandSpec {
        name: "help",
        kind: CommandKind::Help,
        usage: "!help",
        description: "List commands",
        aliases: &["commands"],
    },
];

/// Maps command names and aliases to their [`CommandSpec`]
pub struct CommandRegistry {
    by_name: BTreeMap<&'static str, &'static CommandSpec>,
}

impl CommandRegistry {
    /// Registry with every built-in command
    pub fn standard() -> Self {
        let mut by_name = BTreeMap::new();
        for spec in COMMANDS {
            by_name.insert(spec.name, spec);
            for alias in spec.aliases {
                by_name.insert(*alias, spec);
            }
        }
        Self { by_name }
    }

    /// Look up by lowercased name or alias
    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.by_name.get(name).copied()
    }

    /// Commands in declaration order, aliases excluded
    pub fn commands(&self) -> impl Iterator<Item = &'static CommandSpec> {
        COMMANDS.iter()
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from("📖 **Commands**");
        for spec in self.commands() {
            text.push_str(&format!("\n• `{}` - {}", spec.usage, spec.description));
        }
        text
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_names_and_aliases() {
        let registry = CommandRegistry::standard();
        assert_eq!(registry.lookup("transfer").unwrap().kind, CommandKind::Transfer);
        assert_eq!(registry.lookup("send").unwrap().kind, CommandKind::Transfer);
        assert_eq!(registry.lookup("connect-stellar").unwrap().kind, CommandKind::Connect);
        assert!(registry.lookup("buy").is_none());
    }

    #[test]
    fn test_names_unique() {
        let registry = CommandRegistry::standard();
        let total: usize = COMMANDS.iter().map(|c| 1 + c.aliases.len()).sum();
        assert_eq!(registry.by_name.len(), total);
    }

    #[test]
    fn test_help_lists_every_command() {
        let registry = CommandRegistry::standard();
        let help = registry.help_text();
        for spec in registry.commands() {
            assert!(help.contains(spec.usage));
        }
    }
}
