//! Chat-to-account link types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RevtrackError;

/// Telegram chat identifier (negative for group chats)
pub type ChatId = i64;

/// Creator platform an account lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(alias = "OnlyFans", alias = "ONLYFANS")]
    OnlyFans,
    #[serde(alias = "Fansly", alias = "FANSLY")]
    Fansly,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::OnlyFans, Platform::Fansly];

    /// Path segment used by the analytics API
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::OnlyFans => "onlyfans",
            Platform::Fansly => "fansly",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::OnlyFans => "OnlyFans",
            Platform::Fansly => "Fansly",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = RevtrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "onlyfans" => Ok(Platform::OnlyFans),
            "fansly" => Ok(Platform::Fansly),
            other => Err(RevtrackError::InvalidArguments(format!(
                "unsupported platform `{}` (supported: onlyfans, fansly)",
                other
            ))),
        }
    }
}

/// How a chat relates to the linked account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Agency,
    Chatter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agency => "agency",
            Role::Chatter => "chatter",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RevtrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agency" => Ok(Role::Agency),
            "chatter" => Ok(Role::Chatter),
            other => Err(RevtrackError::InvalidArguments(format!(
                "unknown role `{}` (expected agency or chatter)",
                other
            ))),
        }
    }
}

/// Association of a chat with one tracked account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub chat_id: ChatId,
    pub platform: Platform,
    pub account_id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub nickname: Option<String>,
}

impl Link {
    pub fn new(chat_id: ChatId, platform: Platform, account_id: impl Into<String>) -> Self {
        Self {
            chat_id,
            platform,
            account_id: account_id.into(),
            role: Role::default(),
            nickname: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Nickname when present and non-empty, raw account id otherwise
    pub fn display_name(&self) -> &str {
        match self.nickname.as_deref().map(str::trim) {
            Some(nick) if !nick.is_empty() => nick,
            _ => &self.account_id,
        }
    }

    /// Identity within a chat: (platform, account_id)
    pub fn same_account(&self, platform: Platform, account_id: &str) -> bool {
        self.platform == platform && self.account_id == account_id
    }
}
