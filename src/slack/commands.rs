//! Slash command parsing and execution.
//!
//! Grammar: `/review ["label expression"] <verb> [args...]`. The label
//! expression defaults to `needs-review` and selects which of the
//! channel's configs the verb mutates. Every reply is a human-readable
//! string.

use std::fmt::Write as _;

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::calendar::parse_hhmm;
use crate::models::channel_config::{DEFAULT_LABEL_EXPRESSION, MAX_REMINDER_INTERVAL_MINUTES};
use crate::models::ChannelConfig;
use crate::persistence::config_repo::ConfigRepo;
use crate::state::AppState;
use crate::Result;

/// One lexical token of a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token text with surrounding quotes removed.
    pub text: String,
    /// Whether the token was written in quotes.
    pub quoted: bool,
}

/// Split a command line on whitespace, honouring single and double quotes.
///
/// An unterminated quote swallows the rest of the input as one token.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            for next in chars.by_ref() {
                if next == c {
                    break;
                }
                text.push(next);
            }
            tokens.push(Token { text, quoted: true });
            continue;
        }
        let mut text = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_whitespace() {
                break;
            }
            text.push(next);
            chars.next();
        }
        tokens.push(Token {
            text,
            quoted: false,
        });
    }
    tokens
}

/// Recognised verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Print usage.
    Help,
    /// Print the selected config.
    Show,
    /// Set the fallback mention.
    SetMention,
    /// Add a repository to the filter.
    AddRepo,
    /// Remove a repository from the filter.
    RemoveRepo,
    /// Change the config's label expression.
    SetLabel,
    /// Add reviewers to the pool.
    AddReviewer,
    /// Remove reviewers from the pool.
    RemoveReviewer,
    /// Set the reminder interval in minutes.
    SetReviewerInterval,
    /// Set the local start of business hours.
    SetBusinessHoursStart,
    /// Set the local end of business hours.
    SetBusinessHoursEnd,
    /// Set the IANA zone.
    SetTimezone,
    /// Activate the config.
    Activate,
    /// Deactivate the config.
    Deactivate,
}

impl Verb {
    /// Parse a verb token.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.to_ascii_lowercase().as_str() {
            "help" => Self::Help,
            "show" => Self::Show,
            "set-mention" => Self::SetMention,
            "add-repo" => Self::AddRepo,
            "remove-repo" => Self::RemoveRepo,
            "set-label" => Self::SetLabel,
            "add-reviewer" => Self::AddReviewer,
            "remove-reviewer" => Self::RemoveReviewer,
            "set-reviewer-interval" => Self::SetReviewerInterval,
            "set-business-hours-start" => Self::SetBusinessHoursStart,
            "set-business-hours-end" => Self::SetBusinessHoursEnd,
            "set-timezone" => Self::SetTimezone,
            "activate" => Self::Activate,
            "deactivate" => Self::Deactivate,
            _ => return None,
        })
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A recognised verb against a label expression.
    Run {
        /// Selected label expression.
        label: String,
        /// Verb.
        verb: Verb,
        /// Remaining arguments.
        args: Vec<String>,
    },
    /// Anything else; carries the offending word for the hint.
    Unknown(String),
}

/// Parse a command line.
///
/// The first token is the label expression when it is quoted, or when it
/// is not a verb and something follows it.
#[must_use]
pub fn parse(input: &str) -> Command {
    let tokens = tokenize(input);
    let Some(first) = tokens.first() else {
        return Command::Run {
            label: DEFAULT_LABEL_EXPRESSION.into(),
            verb: Verb::Help,
            args: Vec::new(),
        };
    };

    let label_first =
        first.quoted || (Verb::parse(&first.text).is_none() && tokens.len() > 1);
    let (label, rest) = if label_first {
        (first.text.trim().to_owned(), &tokens[1..])
    } else {
        (DEFAULT_LABEL_EXPRESSION.to_owned(), &tokens[..])
    };

    let Some(verb_token) = rest.first() else {
        return Command::Run {
            label,
            verb: Verb::Help,
            args: Vec::new(),
        };
    };
    match Verb::parse(&verb_token.text) {
        Some(verb) => Command::Run {
            label,
            verb,
            args: rest[1..].iter().map(|t| t.text.clone()).collect(),
        },
        None => Command::Unknown(verb_token.text.clone()),
    }
}

/// Usage text.
#[must_use]
pub fn help_text() -> String {
    [
        "*Usage:* `/review [\"label expression\"] <command> [args]`",
        "`show`: print the configuration",
        "`set-mention @user`: fallback mention when the pool is empty",
        "`add-repo owner/repo` / `remove-repo owner/repo`: repository filter",
        "`set-label \"a,b\"`: change the label expression",
        "`add-reviewer @u1 @u2` / `remove-reviewer @u1`: reviewer pool",
        "`set-reviewer-interval <minutes>`: reminder interval",
        "`set-business-hours-start HH:MM` / `set-business-hours-end HH:MM` (`off` clears)",
        "`set-timezone Asia/Tokyo`: IANA timezone",
        "`activate` / `deactivate`",
    ]
    .join("\n")
}

/// Normalise a Slack user reference (`<@U123|name>`, `@U123`, `U123`).
#[must_use]
pub fn normalize_user(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map_or(trimmed, |s| s.split('|').next().unwrap_or(s));
    inner.trim_start_matches('@').to_owned()
}

/// Render a config for `show`.
#[must_use]
pub fn describe(cfg: &ChannelConfig) -> String {
    let list = |items: &[String], user: bool| {
        if items.is_empty() {
            "(none)".to_owned()
        } else if user {
            items.iter().map(|u| format!("<@{u}>")).collect::<Vec<_>>().join(", ")
        } else {
            items.join(", ")
        }
    };
    let hours = if cfg.has_business_hours() {
        format!("{}-{}", cfg.business_hours_start, cfg.business_hours_end)
    } else {
        "(always)".to_owned()
    };
    let mention = if cfg.default_mention.is_empty() {
        "(none)".to_owned()
    } else {
        format!("<@{}>", cfg.default_mention)
    };

    let mut out = String::new();
    let _ = writeln!(out, "*Label:* `{}`", cfg.label_expression);
    let _ = writeln!(out, "*Active:* {}", if cfg.active { "yes" } else { "no" });
    let _ = writeln!(out, "*Mention:* {mention}");
    let _ = writeln!(out, "*Reviewers:* {}", list(&cfg.reviewer_pool, true));
    let _ = writeln!(out, "*Repositories:* {}", list(&cfg.repository_filter, false));
    let _ = writeln!(out, "*Business hours:* {hours}");
    let _ = writeln!(out, "*Timezone:* {}", cfg.timezone);
    let _ = write!(out, "*Reminder interval:* {} min", cfg.reminder_interval);
    out
}

/// Handle one slash command invocation and return the reply text.
///
/// Store failures are reported in the reply rather than as an HTTP error.
pub async fn handle_command(
    state: &AppState,
    channel_id: &str,
    user_id: &str,
    text: &str,
) -> String {
    match parse(text) {
        Command::Unknown(word) => {
            info!(channel = channel_id, user = user_id, word, "unknown slash command");
            format!("Unknown command `{word}`. Try `/review help`.\n\n{}", help_text())
        }
        Command::Run {
            verb: Verb::Help, ..
        } => help_text(),
        Command::Run { label, verb, args } => {
            match execute(state, channel_id, &label, verb, &args).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(%err, ?verb, "slash command failed");
                    format!("Could not apply `{label}` settings: {err}")
                }
            }
        }
    }
}

async fn load_or_create(
    repo: &ConfigRepo,
    state: &AppState,
    channel_id: &str,
    label: &str,
) -> Result<ChannelConfig> {
    if let Some(cfg) = repo.get_by_channel_and_label(channel_id, label).await? {
        return Ok(cfg);
    }
    let mut cfg = ChannelConfig::new(channel_id.into(), label.into(), state.clock.now());
    cfg.reminder_interval = state.config.reminder.default_interval_minutes;
    info!(channel = channel_id, label, "creating channel config");
    repo.upsert(&cfg).await
}

#[allow(clippy::too_many_lines)] // One arm per verb.
async fn execute(
    state: &AppState,
    channel_id: &str,
    label: &str,
    verb: Verb,
    args: &[String],
) -> Result<String> {
    let repo = state.configs();
    let mut cfg = load_or_create(&repo, state, channel_id, label).await?;
    let first = args.first().map(|a| a.trim().to_owned()).unwrap_or_default();

    let reply = match verb {
        Verb::Help => return Ok(help_text()),
        Verb::Show => return Ok(describe(&cfg)),
        Verb::SetMention => {
            if first.is_empty() {
                return Ok("Usage: `set-mention @user`".into());
            }
            cfg.default_mention = normalize_user(&first);
            format!("Mention set to <@{}>.", cfg.default_mention)
        }
        Verb::AddRepo => {
            if !first.contains('/') {
                return Ok("Usage: `add-repo owner/repo`".into());
            }
            if !cfg.repository_filter.iter().any(|r| r.eq_ignore_ascii_case(&first)) {
                cfg.repository_filter.push(first.clone());
            }
            format!("Repository `{first}` added.")
        }
        Verb::RemoveRepo => {
            let before = cfg.repository_filter.len();
            cfg.repository_filter.retain(|r| !r.eq_ignore_ascii_case(&first));
            if before == cfg.repository_filter.len() {
                return Ok(format!("Repository `{first}` was not configured."));
            }
            format!("Repository `{first}` removed.")
        }
        Verb::SetLabel => {
            let new_label = args.join(" ").trim().to_owned();
            if new_label.is_empty() {
                return Ok("Usage: `set-label \"label-a,label-b\"`".into());
            }
            cfg.label_expression = new_label;
            format!("Label expression set to `{}`.", cfg.label_expression)
        }
        Verb::AddReviewer => {
            let users: Vec<String> = args
                .iter()
                .map(|a| normalize_user(a))
                .filter(|u| !u.is_empty())
                .collect();
            if users.is_empty() {
                return Ok("Usage: `add-reviewer @user [@user...]`".into());
            }
            for user in &users {
                if !cfg.reviewer_pool.contains(user) {
                    cfg.reviewer_pool.push(user.clone());
                }
            }
            format!("Reviewers now: {}", user_list(&cfg.reviewer_pool))
        }
        Verb::RemoveReviewer => {
            let users: Vec<String> = args.iter().map(|a| normalize_user(a)).collect();
            cfg.reviewer_pool.retain(|u| !users.contains(u));
            format!("Reviewers now: {}", user_list(&cfg.reviewer_pool))
        }
        Verb::SetReviewerInterval => match first.parse::<i64>() {
            Ok(minutes) if (1..=MAX_REMINDER_INTERVAL_MINUTES).contains(&minutes) => {
                cfg.reminder_interval = minutes;
                format!("Reminder interval set to {minutes} min.")
            }
            _ => {
                return Ok(format!(
                    "Usage: `set-reviewer-interval <minutes>` (1 to {MAX_REMINDER_INTERVAL_MINUTES})"
                ))
            }
        },
        Verb::SetBusinessHoursStart | Verb::SetBusinessHoursEnd => {
            let value = if first.eq_ignore_ascii_case("off") {
                String::new()
            } else if let Some(time) = parse_hhmm(&first) {
                time.format("%H:%M").to_string()
            } else {
                return Ok("Expected a time as `HH:MM` (or `off`).".into());
            };
            let (slot, name) = if verb == Verb::SetBusinessHoursStart {
                (&mut cfg.business_hours_start, "start")
            } else {
                (&mut cfg.business_hours_end, "end")
            };
            *slot = value;
            if slot.is_empty() {
                format!("Business hours {name} cleared.")
            } else {
                format!("Business hours {name} set to {slot}.")
            }
        }
        Verb::SetTimezone => {
            if first.parse::<Tz>().is_err() {
                return Ok(format!("Unknown timezone `{first}`."));
            }
            cfg.timezone = first.clone();
            format!("Timezone set to {first}.")
        }
        Verb::Activate => {
            cfg.active = true;
            "Notifications activated.".to_owned()
        }
        Verb::Deactivate => {
            cfg.active = false;
            "Notifications deactivated.".to_owned()
        }
    };

    cfg.updated_at = state.clock.now();
    repo.upsert(&cfg).await?;
    info!(channel = channel_id, label = %cfg.label_expression, ?verb, "channel config updated");
    Ok(reply)
}

fn user_list(users: &[String]) -> String {
    if users.is_empty() {
        "(none)".into()
    } else {
        users.iter().map(|u| format!("<@{u}>")).collect::<Vec<_>>().join(", ")
    }
}
