//! CLI command implementations

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::bot::{Bot, ConsoleReplyChannel};
use crate::clock;
use crate::config::Config;
use crate::link::LinkError;
use crate::otp::{base32, totp};
use crate::store::spawn_sweeper;
use crate::types::{AccountId, ActorId};

/// One line typed into the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// `<actor> <message text>`
    Message { actor: ActorId, text: String },
    /// `@callback <token> <account>` simulates the web sign-in
    Callback { token: String, account: AccountId },
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_console_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Empty;
    }
    if line == "@quit" || line == "@exit" {
        return ConsoleLine::Quit;
    }
    if let Some(rest) = line.strip_prefix("@callback") {
        let mut parts = rest.split_whitespace();
        return match (parts.next(), parts.next(), parts.next()) {
            (Some(token), Some(account), None) => ConsoleLine::Callback {
                token: token.to_string(),
                account: AccountId::new(account),
            },
            _ => ConsoleLine::Invalid("usage: @callback <token> <account>".to_string()),
        };
    }
    match line.split_once(char::is_whitespace) {
        Some((actor, text)) => ConsoleLine::Message {
            actor: ActorId::new(actor),
            text: text.trim().to_string(),
        },
        None => ConsoleLine::Invalid("usage: <actor> <command text>".to_string()),
    }
}

/// Interactive console: drive the bot from stdin
pub async fn console(config: &Config) -> Result<()> {
    let bot = Bot::from_config(config, clock::system()).context("Failed to assemble bot")?;
    let sweeper = spawn_sweeper(
        bot.sweepers(),
        Duration::from_secs(config.sweep_interval_secs),
    );
    let channel = ConsoleReplyChannel::new();

    println!("linkbot console. Lines are `<actor> <command>`, e.g. `alice !help`.");
    println!("Complete a link with `@callback <token> <account>`; `@quit` exits.");
    info!("Console started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match parse_console_line(&line) {
                    ConsoleLine::Empty => {}
                    ConsoleLine::Quit => break,
                    ConsoleLine::Invalid(usage) => println!("{}", usage),
                    ConsoleLine::Callback { token, account } => {
                        match bot.callback.complete(&token, &account).await {
                            Ok(actor) => println!("✅ Linked {} to {}", actor, account),
                            Err(LinkError::TokenExpiredOrInvalid) => println!("❌ Invalid or expired link"),
                            Err(e) => {
                                error!("Link callback failed: {}", e);
                                println!("❌ {}", e);
                            }
                        }
                    }
                    ConsoleLine::Message { actor, text } => {
                        match bot.dispatcher.handle_and_send(&channel, &actor, &text).await {
                            Ok(true) => {}
                            Ok(false) => println!("(not a command; commands start with `!`)"),
                            Err(e) => warn!("Reply delivery failed: {}", e),
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    sweeper.abort();
    info!("Console stopped");
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Print the current code for a base32 secret
pub fn totp_code(config: &Config, secret: &str) -> Result<()> {
    let key = base32::decode(secret).context("Secret is not valid base32")?;
    if key.is_empty() {
        anyhow::bail!("Secret is empty");
    }

    let params = config.otp.params();
    let now = chrono::Utc::now().timestamp();
    let code = totp::code_at(&key, now, &params)?;
    let step = params.step_secs.max(1) as i64;
    let remaining = step - now.rem_euclid(step);

    println!("{} (valid for {}s)", code, remaining);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_line() {
        assert_eq!(
            parse_console_line("alice !transfer @bob 5 code=123456"),
            ConsoleLine::Message {
                actor: ActorId::new("alice"),
                text: "!transfer @bob 5 code=123456".into()
            }
        );
    }

    #[test]
    fn test_parse_callback_line() {
        assert_eq!(
            parse_console_line("@callback abc123 GALICE"),
            ConsoleLine::Callback {
                token: "abc123".into(),
                account: AccountId::new("GALICE")
            }
        );
        assert!(matches!(parse_console_line("@callback abc123"), ConsoleLine::Invalid(_)));
    }

    #[test]
    fn test_parse_control_lines() {
        assert_eq!(parse_console_line("   "), ConsoleLine::Empty);
        assert_eq!(parse_console_line("@quit"), ConsoleLine::Quit);
        assert!(matches!(parse_console_line("alice"), ConsoleLine::Invalid(_)));
    }

    #[test]
    fn test_totp_code_rejects_bad_secret() {
        let config = Config::default();
        assert!(totp_code(&config, "not base32!").is_err());
        assert!(totp_code(&config, "JBSWY3DPEHPK3PXP").is_ok());
    }
}
