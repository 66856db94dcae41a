//! Chat command parsing and routing
//!
//! Text that is not a slash command, or names a command this bot does not
//! know, parses to `None` and is ignored.

mod handler;

pub use handler::CommandHandler;

use crate::types::{Platform, Result, RevtrackError, Role, WindowLabel};

/// A recognized chat command with its raw arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Link(Vec<String>),
    Unlink(Vec<String>),
    Report {
        label: WindowLabel,
        token: Option<String>,
    },
    /// Today's combined report for the whole chat
    Stats,
    Models,
}

impl Command {
    /// Parse a message. `/cmd@botname` suffixes are accepted.
    pub fn parse(text: &str) -> Option<Command> {
        let mut parts = text.split_whitespace();
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args: Vec<String> = parts.map(String::from).collect();

        let token = || {
            if args.is_empty() {
                None
            } else {
                Some(args.join(" "))
            }
        };

        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "link" => Command::Link(args.clone()),
            "unlink" => Command::Unlink(args.clone()),
            "today" => Command::Report {
                label: WindowLabel::Today,
                token: token(),
            },
            "yesterday" => Command::Report {
                label: WindowLabel::Yesterday,
                token: token(),
            },
            "week" => Command::Report {
                label: WindowLabel::Week,
                token: token(),
            },
            "stats" => Command::Stats,
            "models" => Command::Models,
            _ => return None,
        };
        Some(command)
    }
}

/// Validated arguments of `/link`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub platform: Platform,
    pub account_id: String,
    pub role: Role,
    pub nickname: Option<String>,
}

impl LinkRequest {
    /// `<platform> <account_id> [agency|chatter] [nickname...]`.
    /// A third argument that is not a role starts the nickname.
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(RevtrackError::InvalidArguments(
                "platform and account id are required".into(),
            ));
        }

        let platform: Platform = args[0].parse()?;
        let account_id = args[1].trim().to_string();
        if !is_valid_account_id(&account_id) {
            return Err(RevtrackError::InvalidArguments(format!(
                "account id `{}` may only contain letters, digits, `-` and `_`",
                account_id
            )));
        }

        let (role, nickname_parts) = match args.get(2).map(|a| a.parse::<Role>()) {
            Some(Ok(role)) => (role, &args[3..]),
            _ => (Role::default(), &args[2..]),
        };

        let nickname = nickname_parts.join(" ");
        let nickname = if nickname.trim().is_empty() {
            None
        } else {
            Some(nickname.trim().to_string())
        };

        Ok(Self {
            platform,
            account_id,
            role,
            nickname,
        })
    }
}

fn is_valid_account_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// What `/unlink` should remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlinkTarget {
    All,
    Account {
        platform: Platform,
        account_id: String,
    },
    /// Nickname or account id, resolved like report tokens
    Token(String),
}

impl UnlinkTarget {
    pub fn from_args(args: &[String]) -> Result<Self> {
        match args {
            [] => Err(RevtrackError::InvalidArguments(
                "tell me which model to unlink".into(),
            )),
            [single] if single.eq_ignore_ascii_case("all") => Ok(UnlinkTarget::All),
            [platform, account_id] if platform.parse::<Platform>().is_ok() => {
                Ok(UnlinkTarget::Account {
                    platform: platform.parse()?,
                    account_id: account_id.clone(),
                })
            }
            _ => Ok(UnlinkTarget::Token(args.join(" "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_plain_and_bot_suffix() {
        assert_eq!(Command::parse("/help"), Some(Command::Help));
        assert_eq!(Command::parse("/START@RevenueBot"), Some(Command::Start));
        assert_eq!(
            Command::parse("/today@RevenueBot Maxes"),
            Some(Command::Report {
                label: WindowLabel::Today,
                token: Some("Maxes".into())
            })
        );
    }

    #[test]
    fn test_parse_report_windows() {
        assert_eq!(
            Command::parse("/week"),
            Some(Command::Report {
                label: WindowLabel::Week,
                token: None
            })
        );
        assert_eq!(
            Command::parse("/yesterday  Big   Candi "),
            Some(Command::Report {
                label: WindowLabel::Yesterday,
                token: Some("Big Candi".into())
            })
        );
        assert_eq!(Command::parse("/stats"), Some(Command::Stats));
        assert_eq!(Command::parse("/models"), Some(Command::Models));
    }

    #[test]
    fn test_parse_ignores_other_text() {
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("/unknown arg"), None);
        assert_eq!(Command::parse("/"), None);
    }

    #[test]
    fn test_link_request_full() {
        let req =
            LinkRequest::from_args(&args(&["OnlyFans", "454315739", "chatter", "Big", "Max"]))
                .unwrap();
        assert_eq!(req.platform, Platform::OnlyFans);
        assert_eq!(req.account_id, "454315739");
        assert_eq!(req.role, Role::Chatter);
        assert_eq!(req.nickname.as_deref(), Some("Big Max"));
    }

    #[test]
    fn test_link_request_third_arg_nickname() {
        let req = LinkRequest::from_args(&args(&["fansly", "1", "Candi"])).unwrap();
        assert_eq!(req.role, Role::Agency);
        assert_eq!(req.nickname.as_deref(), Some("Candi"));

        let bare = LinkRequest::from_args(&args(&["fansly", "1"])).unwrap();
        assert_eq!(bare.nickname, None);
    }

    #[test]
    fn test_link_request_errors() {
        assert!(matches!(
            LinkRequest::from_args(&args(&["onlyfans"])),
            Err(RevtrackError::InvalidArguments(_))
        ));
        let err = LinkRequest::from_args(&args(&["patreon", "1"])).unwrap_err();
        assert!(err.to_string().contains("patreon"));
    }

    #[test]
    fn test_link_request_rejects_path_like_account_ids() {
        for id in ["../x", "a?b", "a/b", "%2e%2e", "."] {
            assert!(
                matches!(
                    LinkRequest::from_args(&args(&["onlyfans", id])),
                    Err(RevtrackError::InvalidArguments(_))
                ),
                "{} should be rejected",
                id
            );
        }
        let req = LinkRequest::from_args(&args(&["fansly", "abc_12-3"])).unwrap();
        assert_eq!(req.account_id, "abc_12-3");
    }

    #[test]
    fn test_unlink_targets() {
        assert!(UnlinkTarget::from_args(&[]).is_err());
        assert_eq!(UnlinkTarget::from_args(&args(&["ALL"])).unwrap(), UnlinkTarget::All);
        assert_eq!(
            UnlinkTarget::from_args(&args(&["onlyfans", "454315739"])).unwrap(),
            UnlinkTarget::Account {
                platform: Platform::OnlyFans,
                account_id: "454315739".into()
            }
        );
        assert_eq!(
            UnlinkTarget::from_args(&args(&["Maxes"])).unwrap(),
            UnlinkTarget::Token("Maxes".into())
        );
        assert_eq!(
            UnlinkTarget::from_args(&args(&["Big", "Max"])).unwrap(),
            UnlinkTarget::Token("Big Max".into())
        );
    }
}
