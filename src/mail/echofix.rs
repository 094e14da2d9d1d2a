//! EchoFix/AreaFix: netmail-driven subscription management (spec §4.9).
//! The first body line is a password; each subsequent line is a command.

use crate::mail::scanner::wildcard_matches;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoFixCommand {
    Subscribe(String),
    Unsubscribe(String),
    Toggle(String),
    List,
    Query,
    Help,
    Pause,
    Resume,
    Unknown(String),
}

pub fn parse_commands(body: &str) -> (Option<&str>, Vec<EchoFixCommand>) {
    let mut lines = body.lines();
    let password = lines.next().map(str::trim).filter(|s| !s.is_empty());
    let commands = lines
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            if let Some(tag) = line.strip_prefix('+') {
                EchoFixCommand::Subscribe(tag.trim().to_string())
            } else if let Some(tag) = line.strip_prefix('-') {
                EchoFixCommand::Unsubscribe(tag.trim().to_string())
            } else {
                match line.to_ascii_uppercase().as_str() {
                    "%LIST" => EchoFixCommand::List,
                    "%QUERY" => EchoFixCommand::Query,
                    "%HELP" => EchoFixCommand::Help,
                    "%PAUSE" => EchoFixCommand::Pause,
                    "%RESUME" => EchoFixCommand::Resume,
                    _ if line.starts_with('%') => EchoFixCommand::Unknown(line.to_string()),
                    _ => EchoFixCommand::Toggle(line.to_string()),
                }
            }
        })
        .collect();
    (password, commands)
}

#[derive(Debug, Clone)]
pub struct DownlinkPolicy {
    pub password: String,
    pub allowed_groups_pattern: String,
    pub allowed_echoes_pattern: String,
    pub max_subscriptions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    Subscribed(String),
    Unsubscribed(String),
    Toggled(String),
    Denied(String),
    AtLimit,
    Other(String),
}

/// Applies a parsed command set against a policy and a subscriber's
/// current subscription list, returning one result per command plus the
/// updated list. Returns `None` if the password is wrong.
pub fn apply(
    password: Option<&str>,
    commands: &[EchoFixCommand],
    policy: &DownlinkPolicy,
    mut current: Vec<String>,
) -> Option<(Vec<String>, Vec<ApplyResult>)> {
    if password != Some(policy.password.as_str()) {
        return None;
    }
    let mut results = Vec::new();
    for cmd in commands {
        let result = match cmd {
            EchoFixCommand::Subscribe(tag) => {
                if !wildcard_matches(&policy.allowed_echoes_pattern, tag) {
                    ApplyResult::Denied(tag.clone())
                } else if current.len() >= policy.max_subscriptions && !current.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                    ApplyResult::AtLimit
                } else {
                    if !current.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                        current.push(tag.clone());
                    }
                    ApplyResult::Subscribed(tag.clone())
                }
            }
            EchoFixCommand::Unsubscribe(tag) => {
                current.retain(|t| !t.eq_ignore_ascii_case(tag));
                ApplyResult::Unsubscribed(tag.clone())
            }
            EchoFixCommand::Toggle(tag) => {
                if current.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                    current.retain(|t| !t.eq_ignore_ascii_case(tag));
                } else if wildcard_matches(&policy.allowed_echoes_pattern, tag) {
                    current.push(tag.clone());
                } else {
                    results.push(ApplyResult::Denied(tag.clone()));
                    continue;
                }
                ApplyResult::Toggled(tag.clone())
            }
            EchoFixCommand::List => ApplyResult::Other(current.join(",")),
            EchoFixCommand::Query => ApplyResult::Other(format!("{} areas", current.len())),
            EchoFixCommand::Help => ApplyResult::Other("help".to_string()),
            EchoFixCommand::Pause => ApplyResult::Other("paused".to_string()),
            EchoFixCommand::Resume => ApplyResult::Other("resumed".to_string()),
            EchoFixCommand::Unknown(s) => ApplyResult::Other(format!("unknown: {s}")),
        };
        results.push(result);
    }
    Some((current, results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DownlinkPolicy {
        DownlinkPolicy {
            password: "secret".to_string(),
            allowed_groups_pattern: "*".to_string(),
            allowed_echoes_pattern: "GEN*".to_string(),
            max_subscriptions: 2,
        }
    }

    #[test]
    fn wrong_password_is_rejected() {
        let (password, commands) = parse_commands("wrong\n+GENERAL\n");
        assert!(apply(password, &commands, &policy(), vec![]).is_none());
    }

    #[test]
    fn subscribe_respects_allowed_pattern_and_limit() {
        let (password, commands) = parse_commands("secret\n+GENERAL\n+SPORTS\n+GENCHAT\n");
        let (subs, results) = apply(password, &commands, &policy(), vec![]).unwrap();
        assert_eq!(subs, vec!["GENERAL", "GENCHAT"]);
        assert_eq!(results[1], ApplyResult::Denied("SPORTS".to_string()));
    }

    #[test]
    fn toggle_flips_subscription_state() {
        let (password, commands) = parse_commands("secret\nGENERAL\n");
        let (subs, _) = apply(password, &commands, &policy(), vec!["GENERAL".to_string()]).unwrap();
        assert!(subs.is_empty());
    }
}
